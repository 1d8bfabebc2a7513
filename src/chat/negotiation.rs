//! Language negotiation
//!
//! A participant translates into whatever language the *other* role has
//! stored on the conversation record. Until the counterpart shows up, the
//! fallback language is used.

use anyhow::Result;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::models::{Conversation, Role};
use crate::store::RoomStore;

/// Target language for `local_role` given the current record.
pub fn negotiate(local_role: Role, conversation: &Conversation, fallback: &str) -> String {
    conversation
        .language_of(local_role.opposite())
        .unwrap_or(fallback)
        .to_string()
}

/// Live negotiated language for one room.
///
/// Dropping it releases the underlying record subscription.
pub struct LanguageWatch {
    rx: watch::Receiver<String>,
    task: JoinHandle<()>,
}

impl LanguageWatch {
    pub async fn start(
        store: &dyn RoomStore,
        room_id: &str,
        local_role: Role,
        fallback: String,
    ) -> Result<Self> {
        let mut sub = store.subscribe(room_id).await?;
        let initial = match store.conversation(room_id).await? {
            Some(conv) => negotiate(local_role, &conv, &fallback),
            None => fallback.clone(),
        };
        let (tx, rx) = watch::channel(initial);

        let task = tokio::spawn(async move {
            while let Some(conv) = sub.recv().await {
                let target = negotiate(local_role, &conv, &fallback);
                tx.send_if_modified(|current| {
                    if *current == target {
                        return false;
                    }
                    tracing::info!("Target language updated to: {}", target);
                    *current = target;
                    true
                });
            }
        });

        Ok(Self { rx, task })
    }

    /// Language to translate outbound messages into right now.
    pub fn current(&self) -> String {
        self.rx.borrow().clone()
    }

    /// Receiver that wakes on every change.
    pub fn changes(&self) -> watch::Receiver<String> {
        self.rx.clone()
    }
}

impl Drop for LanguageWatch {
    fn drop(&mut self) {
        self.task.abort();
    }
}
