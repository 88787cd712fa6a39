//! Deferred actions: backoff-aware auto-unban and delayed message deletion.
//!
//! Both are fire-and-forget tasks; failures are logged inside the task.

use std::sync::Arc;
use std::time::Duration;

use teloxide::types::{ChatId, MessageId, UserId};
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::bot::ChatActions;
use crate::cache::{CacheConfig, TypedCache};

/// Exponent cap for the unban delay; e^20 s is already months.
const MAX_BACKOFF_EXPONENT: u32 = 20;

/// Delay before the `attempts`-th unban: e^attempts seconds.
pub fn unban_delay(attempts: u32) -> Duration {
    Duration::from_secs_f64(f64::from(attempts.min(MAX_BACKOFF_EXPONENT)).exp())
}

pub struct Escalation<A> {
    actions: Arc<A>,
    attempts: TypedCache<u64, u32>,
}

impl<A: ChatActions> Escalation<A> {
    pub fn new(actions: Arc<A>) -> Self {
        Self {
            actions,
            attempts: TypedCache::new("unban_attempts", CacheConfig::unban_attempts()),
        }
    }

    /// Count a temporary ban and schedule the matching unban. Returns the delay.
    pub fn schedule_unban(&self, chat: ChatId, user: UserId) -> Duration {
        let attempts = self.attempts.upsert_with(user.0, |n| n.unwrap_or(0) + 1);
        let delay = unban_delay(attempts);
        info!(
            "Unban of {} in {} scheduled in {:?} (attempt {})",
            user, chat, delay, attempts
        );

        let actions = Arc::clone(&self.actions);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match actions.unban_user(chat, user).await {
                Ok(()) => info!("Unbanned {} in {}", user, chat),
                Err(e) => warn!("Unban of {} in {} failed: {}", user, chat, e),
            }
        });
        delay
    }

    /// Current attempt count inside the sliding window.
    #[cfg(test)]
    pub fn attempts(&self, user: UserId) -> u32 {
        self.attempts.get(&user.0).unwrap_or(0)
    }

    /// Delete `messages` after `delay` unless the returned handle is aborted first.
    pub fn delete_later(
        &self,
        chat: ChatId,
        messages: Vec<MessageId>,
        delay: Duration,
    ) -> AbortHandle {
        let actions = Arc::clone(&self.actions);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            for message in messages {
                if let Err(e) = actions.delete_message(chat, message).await {
                    debug!("Deferred delete of {} in {} failed: {}", message.0, chat, e);
                }
            }
        })
        .abort_handle()
    }
}
