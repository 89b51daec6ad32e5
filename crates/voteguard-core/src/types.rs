//! Core entity types: votes, reports, findings and validation decisions.

use crate::error::GuardError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Direction of a vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteDirection {
    /// Positive vote.
    Up,
    /// Negative vote.
    Down,
}

impl VoteDirection {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteDirection::Up => "up",
            VoteDirection::Down => "down",
        }
    }
}

impl fmt::Display for VoteDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VoteDirection {
    type Err = GuardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(VoteDirection::Up),
            "down" => Ok(VoteDirection::Down),
            other => Err(GuardError::InvalidArgument(format!(
                "unknown vote direction '{}'",
                other
            ))),
        }
    }
}

/// An accepted vote. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRecord {
    /// Opaque voter id.
    pub user_id: String,
    /// Content item the vote targets.
    pub content_id: String,
    /// Vote direction.
    pub direction: VoteDirection,
    /// Time the vote was accepted, ms since epoch.
    pub timestamp_ms: u64,
    /// Originating network address, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_address: Option<String>,
    /// Client fingerprint, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_signature: Option<String>,
}

/// Input to vote validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRequest {
    /// Opaque voter id.
    pub user_id: String,
    /// Content item the vote targets.
    pub content_id: String,
    /// Vote direction.
    pub direction: VoteDirection,
    /// Originating network address, when known.
    #[serde(default)]
    pub source_address: Option<String>,
    /// Client fingerprint, when known.
    #[serde(default)]
    pub client_signature: Option<String>,
}

impl VoteRequest {
    /// Vote request without address or signature.
    pub fn new(
        user_id: impl Into<String>,
        content_id: impl Into<String>,
        direction: VoteDirection,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            content_id: content_id.into(),
            direction,
            source_address: None,
            client_signature: None,
        }
    }

    /// Attach the originating network address.
    pub fn with_source_address(mut self, address: impl Into<String>) -> Self {
        self.source_address = Some(address.into());
        self
    }

    /// Attach a client fingerprint.
    pub fn with_client_signature(mut self, signature: impl Into<String>) -> Self {
        self.client_signature = Some(signature.into());
        self
    }

    pub(crate) fn into_record(self, timestamp_ms: u64) -> VoteRecord {
        VoteRecord {
            user_id: self.user_id,
            content_id: self.content_id,
            direction: self.direction,
            timestamp_ms,
            source_address: self.source_address,
            client_signature: self.client_signature,
        }
    }
}

/// Which validation gate denied a vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialKind {
    /// The voter is in the flag registry.
    Flagged,
    /// Too many votes in the burst window.
    Burst,
    /// Per-user hourly cap reached.
    HourlyQuota,
    /// Per-address hourly cap reached.
    AddressQuota,
    /// History is overwhelmingly one-directional.
    DirectionalBias,
    /// Same content voted on within the duplicate window.
    Duplicate,
}

impl DenialKind {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            DenialKind::Flagged => "flagged",
            DenialKind::Burst => "burst",
            DenialKind::HourlyQuota => "hourly_quota",
            DenialKind::AddressQuota => "address_quota",
            DenialKind::DirectionalBias => "directional_bias",
            DenialKind::Duplicate => "duplicate",
        }
    }

    /// All kinds, in pipeline order.
    pub const ALL: [DenialKind; 6] = [
        DenialKind::Flagged,
        DenialKind::Burst,
        DenialKind::HourlyQuota,
        DenialKind::AddressQuota,
        DenialKind::DirectionalBias,
        DenialKind::Duplicate,
    ];
}

/// Outcome of vote validation. A denial is a normal result, not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteDecision {
    /// Whether the vote was accepted and recorded.
    pub allowed: bool,
    /// Human-readable denial reason, surfaced to the voter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Confidence in the decision, 0.0..=1.0.
    pub confidence: f64,
    /// Gate that denied the vote.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub denial: Option<DenialKind>,
}

impl VoteDecision {
    /// Accepted vote.
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
            confidence: 1.0,
            denial: None,
        }
    }

    /// Denied vote.
    pub fn deny(kind: DenialKind, reason: &str, confidence: f64) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.to_string()),
            confidence,
            denial: Some(kind),
        }
    }
}

/// What a report points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    /// A content item.
    Content,
    /// A single vote.
    Vote,
    /// A comment.
    Comment,
    /// A user account.
    User,
}

impl TargetType {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetType::Content => "content",
            TargetType::Vote => "vote",
            TargetType::Comment => "comment",
            TargetType::User => "user",
        }
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetType {
    type Err = GuardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "content" => Ok(TargetType::Content),
            "vote" => Ok(TargetType::Vote),
            "comment" => Ok(TargetType::Comment),
            "user" => Ok(TargetType::User),
            other => Err(GuardError::InvalidArgument(format!(
                "unknown target type '{}'",
                other
            ))),
        }
    }
}

/// Why a report was filed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportReason {
    /// Unsolicited or promotional content.
    Spam,
    /// Offensive content.
    Inappropriate,
    /// False or misleading content.
    Misinformation,
    /// Abusive behavior towards others.
    Harassment,
    /// Coordinated or automated vote manipulation.
    VoteManipulation,
    /// Anything else.
    Other,
}

impl ReportReason {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportReason::Spam => "spam",
            ReportReason::Inappropriate => "inappropriate",
            ReportReason::Misinformation => "misinformation",
            ReportReason::Harassment => "harassment",
            ReportReason::VoteManipulation => "vote_manipulation",
            ReportReason::Other => "other",
        }
    }
}

impl fmt::Display for ReportReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportReason {
    type Err = GuardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "spam" => Ok(ReportReason::Spam),
            "inappropriate" => Ok(ReportReason::Inappropriate),
            "misinformation" => Ok(ReportReason::Misinformation),
            "harassment" => Ok(ReportReason::Harassment),
            "vote_manipulation" => Ok(ReportReason::VoteManipulation),
            "other" => Ok(ReportReason::Other),
            other => Err(GuardError::InvalidArgument(format!(
                "unknown report reason '{}'",
                other
            ))),
        }
    }
}

/// Report lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    /// Awaiting review.
    Pending,
    /// Reviewed with an enforcement action.
    Resolved,
    /// Reviewed and dismissed.
    Dismissed,
}

impl ReportStatus {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::Resolved => "resolved",
            ReportStatus::Dismissed => "dismissed",
        }
    }

    /// Resolved and dismissed reports accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReportStatus::Pending)
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportStatus {
    type Err = GuardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ReportStatus::Pending),
            "resolved" => Ok(ReportStatus::Resolved),
            "dismissed" => Ok(ReportStatus::Dismissed),
            other => Err(GuardError::InvalidArgument(format!(
                "unknown report status '{}'",
                other
            ))),
        }
    }
}

/// Reviewer decision on a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModerationAction {
    /// No action; the report is dismissed.
    Dismiss,
    /// Warn the target.
    Warn,
    /// Suspend the target.
    Suspend,
    /// Ban the target.
    Ban,
}

impl ModerationAction {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ModerationAction::Dismiss => "dismiss",
            ModerationAction::Warn => "warn",
            ModerationAction::Suspend => "suspend",
            ModerationAction::Ban => "ban",
        }
    }

    /// Terminal status a review with this action produces.
    pub fn resulting_status(&self) -> ReportStatus {
        match self {
            ModerationAction::Dismiss => ReportStatus::Dismissed,
            _ => ReportStatus::Resolved,
        }
    }
}

impl fmt::Display for ModerationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModerationAction {
    type Err = GuardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dismiss" => Ok(ModerationAction::Dismiss),
            "warn" => Ok(ModerationAction::Warn),
            "suspend" => Ok(ModerationAction::Suspend),
            "ban" => Ok(ModerationAction::Ban),
            other => Err(GuardError::InvalidArgument(format!(
                "unknown moderation action '{}'",
                other
            ))),
        }
    }
}

/// An abuse report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Globally unique id (UUID v4).
    pub id: String,
    /// Who filed the report; `system` for auto-filed reports.
    pub reporter_id: String,
    /// Kind of target.
    pub target_type: TargetType,
    /// Target id.
    pub target_id: String,
    /// Report reason.
    pub reason: ReportReason,
    /// Free-form description.
    pub description: String,
    /// Creation time, ms since epoch.
    pub created_at_ms: u64,
    /// Lifecycle state.
    pub status: ReportStatus,
    /// Reviewer, once reviewed.
    #[serde(default)]
    pub reviewer_id: Option<String>,
    /// Reviewer notes, once reviewed.
    #[serde(default)]
    pub review_notes: Option<String>,
    /// Action taken, once reviewed.
    #[serde(default)]
    pub action_taken: Option<ModerationAction>,
    /// Review time, ms since epoch.
    #[serde(default)]
    pub reviewed_at_ms: Option<u64>,
}

/// Kind of suspicious behavior a finding describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    /// Many votes in a very short span.
    Burst,
    /// Votes overwhelmingly in one direction.
    Bias,
    /// Inter-vote intervals too regular for a human.
    TimingRegularity,
}

impl FindingKind {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            FindingKind::Burst => "burst",
            FindingKind::Bias => "bias",
            FindingKind::TimingRegularity => "timing_regularity",
        }
    }
}

impl fmt::Display for FindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Finding severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational.
    Low,
    /// Worth a look.
    Medium,
    /// Blocks the user pending review.
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        })
    }
}

/// A scored, evidence-backed detection. Not itself an enforcement action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    /// User the finding is about.
    pub user_id: String,
    /// What was detected.
    pub kind: FindingKind,
    /// How serious it is.
    pub severity: Severity,
    /// Detector confidence, 0.0..=1.0.
    pub confidence: f64,
    /// Detector-specific evidence, ordered by key.
    pub evidence: BTreeMap<String, serde_json::Value>,
    /// Detection time, ms since epoch.
    pub detected_at_ms: u64,
}

impl Finding {
    /// Evidence value by key.
    pub fn evidence(&self, key: &str) -> Option<&serde_json::Value> {
        self.evidence.get(key)
    }
}
