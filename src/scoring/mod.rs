pub mod badge;
pub mod feed;
pub mod pipeline;
pub mod reach;
pub mod share;

pub use badge::{Accrual, BadgeThresholds, BadgeTier, BadgeTierTracker};
pub use feed::{FeedConfig, FeedScorer, FeedSignals, FeedWeights};
pub use pipeline::{CandidateSource, RankingPipeline, ScoredCandidate};
pub use reach::{EngagementWeights, ReachBreakdown, ReachConfig, ReachEstimator, ReachInput};
pub use share::{ShareConfig, SharePointCalculator, ShareWeights};
