//! Room state and media storage
//!
//! The protocol only talks to the [`RoomStore`] and [`MediaStore`] traits.
//! Two room stores ship here: an in-process one backed by `watch` channels
//! and a directory-backed one that lets separate processes share a room.

mod fs;
mod media;
mod memory;

pub use fs::FsRoomStore;
pub use media::{FsMediaStore, MemoryMediaStore};
pub use memory::MemoryRoomStore;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::models::{Conversation, ConversationPatch, Message, NewMessage};

/// Shared document store holding one record and one ordered message log per room.
#[async_trait]
pub trait RoomStore: Send + Sync {
    /// Merge `patch` into the room's record, creating it if needed.
    async fn upsert(&self, room_id: &str, patch: ConversationPatch) -> Result<()>;

    /// Current record, if anyone has opened the room yet.
    async fn conversation(&self, room_id: &str) -> Result<Option<Conversation>>;

    /// Live record updates. The current record (if any) is delivered first.
    async fn subscribe(&self, room_id: &str) -> Result<Subscription<Conversation>>;

    /// Append an immutable message and return its store-assigned id.
    async fn append_message(&self, room_id: &str, message: NewMessage) -> Result<String>;

    /// All messages in write order.
    async fn messages(&self, room_id: &str) -> Result<Vec<Message>>;

    /// Live message log snapshots in write order. The current log is delivered first.
    async fn subscribe_messages(&self, room_id: &str) -> Result<Subscription<Vec<Message>>>;

    /// Most recently active rooms, newest first.
    async fn recent(&self, limit: usize) -> Result<Vec<Conversation>>;
}

/// Blob storage for recordings.
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Store `data` under `path` and return a URL it can be fetched from.
    async fn upload(&self, path: &str, data: Vec<u8>) -> Result<String>;
}

/// Handle to a live listener.
///
/// Updates arrive through an unbounded channel fed by a background task.
/// Dropping the handle stops the task, so a listener can't outlive its owner.
pub struct Subscription<T> {
    rx: mpsc::UnboundedReceiver<T>,
    task: JoinHandle<()>,
}

impl<T> Subscription<T> {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<T>, task: JoinHandle<()>) -> Self {
        Self { rx, task }
    }

    /// Wait for the next update. `None` once the source is gone.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Newest update already queued, skipping older ones.
    #[cfg(test)]
    pub fn latest(&mut self) -> Option<T> {
        let mut last = None;
        while let Ok(value) = self.rx.try_recv() {
            last = Some(value);
        }
        last
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Room ids end up in file paths, so keep them to a safe alphabet.
pub fn validate_room_id(room_id: &str) -> Result<()> {
    if room_id.is_empty() || room_id.len() > 128 {
        bail!("Invalid room id: must be 1-128 characters");
    }
    if !room_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        bail!("Invalid room id '{}': use letters, digits, '-' or '_'", room_id);
    }
    Ok(())
}

/// Fresh client-generated room id.
pub fn new_room_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
