use crate::api::{ClearFlagResponse, ReviewRequest, UserAnalysis};
use anyhow::Result;
use clap::{Parser, Subcommand};
use reqwest::{Client, Method, RequestBuilder, Response};
use std::path::PathBuf;
use voteguard_core::{FlagEntry, GuardStats, ModerationAction, Report};

/// `vg-mgmt` command line.
#[derive(Parser)]
#[command(name = "vg-mgmt")]
#[command(about = "VoteGuard moderation CLI", long_about = None)]
pub struct Cli {
    /// Admin API base URL.
    #[arg(short, long, default_value = "http://localhost:8443")]
    pub server: String,

    /// Admin bearer token.
    #[arg(short, long, env = "VG_ADMIN_TOKEN")]
    pub token: Option<String>,

    /// Subcommand.
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand)]
pub enum Command {
    /// Run the daemon: admin API plus retention sweeper.
    Serve {
        /// Config file (.toml or .json).
        #[arg(short, long, default_value = "/etc/voteguard/mgmt.toml")]
        config: PathBuf,
    },
    /// Moderation statistics.
    Stats,
    /// Pending reports, newest first.
    Pending,
    /// Show one report.
    Show {
        /// Report id.
        id: String,
    },
    /// Review a pending report.
    Review {
        /// Report id.
        id: String,
        /// dismiss, warn, suspend or ban.
        action: ModerationAction,
        /// Reviewer notes.
        #[arg(short, long, default_value = "")]
        notes: String,
        /// Reviewer id recorded on the report.
        #[arg(short, long, default_value = "admin")]
        reviewer: String,
    },
    /// Run the activity analyzer on a user.
    Analyze {
        /// User id.
        user: String,
    },
    /// Currently flagged users.
    Flags,
    /// Lift a user's flag.
    Unflag {
        /// User id.
        user: String,
    },
}

impl Cli {
    /// Execute the parsed command.
    pub async fn run(self) -> Result<()> {
        match self.command {
            Command::Serve { ref config } => crate::daemon::serve(config).await,
            Command::Stats => self.stats().await,
            Command::Pending => self.pending().await,
            Command::Show { ref id } => self.show(id).await,
            Command::Review {
                ref id,
                action,
                ref notes,
                ref reviewer,
            } => self.review(id, action, notes, reviewer).await,
            Command::Analyze { ref user } => self.analyze(user).await,
            Command::Flags => self.flags().await,
            Command::Unflag { ref user } => self.unflag(user).await,
        }
    }

    fn request(&self, client: &Client, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.server.trim_end_matches('/'), path);
        let mut request = client.request(method, url);
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token);
        }
        request
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| v["error"].as_str().map(str::to_string))
                .unwrap_or(body);
            anyhow::bail!("Request failed: {} {}", status, detail);
        }
        Ok(response)
    }

    async fn stats(&self) -> Result<()> {
        let client = Client::new();
        let response = self
            .send(self.request(&client, Method::GET, "/api/v1/stats"))
            .await?;
        let stats: GuardStats = response.json().await?;

        println!("Total reports:       {}", stats.total_reports);
        println!("Pending:             {}", stats.pending_reports);
        println!("Resolved:            {}", stats.resolved_reports);
        println!("Dismissed:           {}", stats.dismissed_reports);
        println!("Flagged users:       {}", stats.suspicious_users);
        println!("Vote manipulation:   {}", stats.vote_manipulation_detected);
        println!("Actions this week:   {}", stats.actions_this_week);
        Ok(())
    }

    async fn pending(&self) -> Result<()> {
        let client = Client::new();
        let response = self
            .send(self.request(&client, Method::GET, "/api/v1/reports/pending"))
            .await?;
        let reports: Vec<Report> = response.json().await?;

        if reports.is_empty() {
            println!("No pending reports");
            return Ok(());
        }
        println!(
            "{:<36}  {:<8}  {:<20}  {:<18}  {}",
            "ID", "TARGET", "TARGET ID", "REASON", "REPORTER"
        );
        for r in &reports {
            println!(
                "{:<36}  {:<8}  {:<20}  {:<18}  {}",
                r.id, r.target_type, r.target_id, r.reason, r.reporter_id
            );
        }
        Ok(())
    }

    async fn show(&self, id: &str) -> Result<()> {
        let client = Client::new();
        let path = id_path("/api/v1/reports", id, "");
        let response = self.send(self.request(&client, Method::GET, &path)).await?;
        let report: Report = response.json().await?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        Ok(())
    }

    async fn review(
        &self,
        id: &str,
        action: ModerationAction,
        notes: &str,
        reviewer: &str,
    ) -> Result<()> {
        let client = Client::new();
        let path = id_path("/api/v1/reports", id, "/review");
        let body = ReviewRequest {
            reviewer_id: reviewer.to_string(),
            action,
            notes: notes.to_string(),
        };
        let response = self
            .send(self.request(&client, Method::POST, &path).json(&body))
            .await?;
        let report: Report = response.json().await?;
        println!("Report {} is now {}", report.id, report.status);
        Ok(())
    }

    async fn analyze(&self, user: &str) -> Result<()> {
        let client = Client::new();
        let path = id_path("/api/v1/users", user, "/analysis");
        let response = self.send(self.request(&client, Method::GET, &path)).await?;
        let analysis: UserAnalysis = response.json().await?;

        println!(
            "User {} ({} votes, flagged: {})",
            analysis.user_id, analysis.votes_analyzed, analysis.flagged
        );
        if analysis.findings.is_empty() {
            println!("No findings");
        }
        for f in &analysis.findings {
            println!(
                "  {:<18} severity={:<6} confidence={:.2} evidence={}",
                f.kind,
                f.severity,
                f.confidence,
                serde_json::to_string(&f.evidence)?
            );
        }
        Ok(())
    }

    async fn flags(&self) -> Result<()> {
        let client = Client::new();
        let response = self
            .send(self.request(&client, Method::GET, "/api/v1/flags"))
            .await?;
        let flags: Vec<FlagEntry> = response.json().await?;
        for f in &flags {
            println!(
                "{:<24}  {:>15}  {}",
                f.user_id,
                f.flagged_at_ms,
                serde_json::to_string(&f.source)?
            );
        }
        Ok(())
    }

    async fn unflag(&self, user: &str) -> Result<()> {
        let client = Client::new();
        let path = id_path("/api/v1/flags", user, "");
        let response = self
            .send(self.request(&client, Method::DELETE, &path))
            .await?;
        let cleared: ClearFlagResponse = response.json().await?;
        println!("Flag on {} cleared", cleared.user_id);
        Ok(())
    }
}

/// `{prefix}/{id}{suffix}` with `id` as a single percent-encoded segment.
fn id_path(prefix: &str, id: &str, suffix: &str) -> String {
    format!("{}/{}{}", prefix, urlencoding::encode(id), suffix)
}
