#![warn(missing_docs)]

//! VoteGuard engine: vote validation, rate windows, manipulation analysis, abuse report lifecycle

pub mod analyzer;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod flags;
pub mod history;
pub mod metrics;
pub mod pattern;
pub mod pipeline;
pub mod reports;
pub mod stats;
pub mod types;

pub use analyzer::ActivityAnalyzer;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AnalysisConfig, FlagExpiry, GuardConfig};
pub use engine::{EngineBuilder, ModerationEngine, SweepReport};
pub use error::{GuardError, Result};
pub use flags::{FlagEntry, FlagRegistry, FlagSource, FlagStore, InMemoryFlagStore};
pub use history::VoteHistory;
pub use metrics::GuardMetrics;
pub use reports::{
    InMemoryReportStore, LoggingSink, ModerationCommand, ModerationSink, ReportFilter,
    ReportManager, ReportStore,
};
pub use stats::GuardStats;
pub use types::{
    DenialKind, Finding, FindingKind, ModerationAction, Report, ReportReason, ReportStatus,
    Severity, TargetType, VoteDecision, VoteDirection, VoteRecord, VoteRequest,
};
