pub mod fairness;
pub mod lifecycle;
pub mod models;
pub mod store;

pub use fairness::{Commitment, FairnessKey, GameFairnessEngine};
pub use lifecycle::{
    reconcile_winners, CloseOutcome, CloseReport, CloseTrigger, GameLifecycleManager,
    ResolvedWinner, SweepReport,
};
pub use models::{
    Game, GameHistory, GameState, GameSubmission, NewGame, RewardMessage, RewardType,
    WinnerRecord, WinnerState,
};
pub use store::{CloseGate, GameStore, WinnerSelection};
