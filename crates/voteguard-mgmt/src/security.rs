use dashmap::DashMap;
use std::time::{Duration, Instant};

/// Compare two tokens without short-circuiting on the first differing byte.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes()
        .iter()
        .zip(b.as_bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

const FAILURE_WINDOW: Duration = Duration::from_secs(60);

struct FailureEntry {
    failures: u32,
    first_failure: Instant,
    locked_until: Option<Instant>,
}

/// Locks out clients that fail bearer auth too often.
pub struct AuthLockout {
    entries: DashMap<String, FailureEntry>,
    max_failures: u32,
    lockout: Duration,
}

impl AuthLockout {
    /// Lock a client for `lockout` after `max_failures` failures within a minute.
    pub fn new(max_failures: u32, lockout: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            max_failures: max_failures.max(1),
            lockout,
        }
    }

    /// Record a failed attempt from `client`. Returns true once it is locked out.
    pub fn record_failure(&self, client: &str) -> bool {
        let now = Instant::now();
        let mut entry = self
            .entries
            .entry(client.to_string())
            .or_insert(FailureEntry {
                failures: 0,
                first_failure: now,
                locked_until: None,
            });
        if entry.first_failure + FAILURE_WINDOW < now {
            entry.failures = 0;
            entry.first_failure = now;
        }
        entry.failures += 1;
        if entry.failures >= self.max_failures {
            entry.locked_until = Some(now + self.lockout);
            tracing::warn!(client, failures = entry.failures, "admin auth lockout");
        }
        entry.locked_until.is_some_and(|until| until > now)
    }

    /// Whether `client` is currently locked out.
    pub fn is_locked(&self, client: &str) -> bool {
        self.entries
            .get(client)
            .and_then(|e| e.locked_until)
            .is_some_and(|until| until > Instant::now())
    }

    /// Forget entries whose window and lockout have both passed.
    pub fn prune(&self) {
        let now = Instant::now();
        self.entries.retain(|_, e| {
            e.first_failure + FAILURE_WINDOW > now || e.locked_until.is_some_and(|u| u > now)
        });
    }

    /// Number of clients with recorded failures.
    pub fn tracked(&self) -> usize {
        self.entries.len()
    }
}

impl Default for AuthLockout {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(60))
    }
}

/// Add the standard hardening headers to every response.
pub async fn security_headers_middleware(
    request: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    for (name, value) in [
        ("x-content-type-options", "nosniff"),
        ("x-frame-options", "DENY"),
        ("cache-control", "no-store"),
        ("strict-transport-security", "max-age=31536000; includeSubDomains"),
    ] {
        headers.insert(
            axum::http::header::HeaderName::from_static(name),
            axum::http::HeaderValue::from_static(value),
        );
    }
    response
}
