//! Notification sink boundary.
//!
//! The core renders message text and semantic action hints; how the chat
//! front end realizes them (buttons, menus) is its own business.

use async_trait::async_trait;

/// Outcome of one sink call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    SentOk,
    /// Chat platform asked us to wait this many seconds.
    RateLimited { retry_after_s: u64 },
    /// Bot blocked, chat deleted, or user deactivated.
    BlockedUser,
    TransientError,
}

/// Semantic buttons the front end may attach to a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionHint {
    ViewTx(String),
    AddToWatchlist(String),
    Snooze1h,
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, chat_id: i64, message: &str, hints: &[ActionHint]) -> SendOutcome;
}
