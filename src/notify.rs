use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::EngineResult;
use crate::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NotificationKind {
    WinnerAnnouncement,
    CreatorGameClosed,
    RewardClaimed,
    RewardDelivered,
}

impl NotificationKind {
    pub fn label(self) -> &'static str {
        match self {
            NotificationKind::WinnerAnnouncement => "winnerAnnouncement",
            NotificationKind::CreatorGameClosed => "creatorGameClosed",
            NotificationKind::RewardClaimed => "rewardClaimed",
            NotificationKind::RewardDelivered => "rewardDelivered",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub user_id: UserId,
    pub kind: NotificationKind,
    pub context: serde_json::Value,
}

/// Outbound notification channel (mail, push, in-app).
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification) -> EngineResult<()>;
}

/// Writes notifications to the log instead of delivering them.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: &Notification) -> EngineResult<()> {
        info!(
            user_id = notification.user_id,
            kind = notification.kind.label(),
            context = %notification.context,
            "notification dispatched"
        );
        Ok(())
    }
}

/// Fire-and-forget dispatch: failures are logged and swallowed.
pub fn dispatch(notifier: &dyn Notifier, notification: Notification) -> bool {
    match notifier.notify(&notification) {
        Ok(()) => true,
        Err(err) => {
            warn!(
                user_id = notification.user_id,
                kind = notification.kind.label(),
                "failed to send notification: {}",
                err
            );
            false
        }
    }
}
