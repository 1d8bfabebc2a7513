//! In-process room store
//!
//! Each room keeps its record and message log in `watch` channels, so every
//! subscriber sees the same snapshots in the same order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::WatchStream;
use tokio_stream::StreamExt;

use super::{validate_room_id, RoomStore, Subscription};
use crate::models::{Conversation, ConversationPatch, Message, NewMessage};

struct RoomSlot {
    conversation: watch::Sender<Option<Conversation>>,
    messages: watch::Sender<Vec<Message>>,
}

impl RoomSlot {
    fn new() -> Self {
        Self {
            conversation: watch::channel(None).0,
            messages: watch::channel(Vec::new()).0,
        }
    }
}

#[derive(Default)]
pub struct MemoryRoomStore {
    rooms: Mutex<HashMap<String, RoomSlot>>,
    /// Write sequence shared by all rooms
    next_seq: AtomicU64,
}

impl MemoryRoomStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a room without creating it.
    fn peek_room<R>(&self, room_id: &str, f: impl FnOnce(&RoomSlot) -> R) -> Result<Option<R>> {
        validate_room_id(room_id)?;
        let rooms = self
            .rooms
            .lock()
            .map_err(|_| anyhow!("Room store lock poisoned"))?;
        Ok(rooms.get(room_id).map(f))
    }

    /// Run `f` on the room, creating it on first use. Writes and
    /// subscriptions only.
    fn with_room<R>(&self, room_id: &str, f: impl FnOnce(&RoomSlot) -> R) -> Result<R> {
        validate_room_id(room_id)?;
        let mut rooms = self
            .rooms
            .lock()
            .map_err(|_| anyhow!("Room store lock poisoned"))?;
        let slot = rooms
            .entry(room_id.to_string())
            .or_insert_with(RoomSlot::new);
        Ok(f(slot))
    }
}

#[async_trait]
impl RoomStore for MemoryRoomStore {
    async fn upsert(&self, room_id: &str, patch: ConversationPatch) -> Result<()> {
        let now = Utc::now();
        self.with_room(room_id, |slot| {
            slot.conversation.send_modify(|current| {
                let conv = current.get_or_insert_with(|| Conversation::new(room_id));
                conv.apply(&patch, now);
            });
        })?;
        tracing::debug!("Upserted conversation {}", room_id);
        Ok(())
    }

    async fn conversation(&self, room_id: &str) -> Result<Option<Conversation>> {
        Ok(self
            .peek_room(room_id, |slot| slot.conversation.borrow().clone())?
            .flatten())
    }

    async fn subscribe(&self, room_id: &str) -> Result<Subscription<Conversation>> {
        let rx = self.with_room(room_id, |slot| slot.conversation.subscribe())?;
        let (tx, out) = mpsc::unbounded_channel();

        let task = tokio::spawn(async move {
            let mut stream = WatchStream::new(rx);
            while let Some(value) = stream.next().await {
                // No record yet: nothing to report.
                let Some(conv) = value else { continue };
                if tx.send(conv).is_err() {
                    break;
                }
            }
        });

        Ok(Subscription::new(out, task))
    }

    async fn append_message(&self, room_id: &str, message: NewMessage) -> Result<String> {
        let id = uuid::Uuid::new_v4().simple().to_string();
        // Sequence and timestamp are taken under the room lock so the log
        // order always matches the sequence order.
        let seq = self.with_room(room_id, |slot| {
            let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
            let stored = Message::from_new(message, id.clone(), seq, Utc::now());
            slot.messages.send_modify(|log| log.push(stored));
            seq
        })?;
        tracing::debug!("Appended message {} (seq {}) to {}", id, seq, room_id);
        Ok(id)
    }

    async fn messages(&self, room_id: &str) -> Result<Vec<Message>> {
        Ok(self
            .peek_room(room_id, |slot| slot.messages.borrow().clone())?
            .unwrap_or_default())
    }

    async fn subscribe_messages(&self, room_id: &str) -> Result<Subscription<Vec<Message>>> {
        let rx = self.with_room(room_id, |slot| slot.messages.subscribe())?;
        let (tx, out) = mpsc::unbounded_channel();

        let task = tokio::spawn(async move {
            let mut stream = WatchStream::new(rx);
            while let Some(log) = stream.next().await {
                if tx.send(log).is_err() {
                    break;
                }
            }
        });

        Ok(Subscription::new(out, task))
    }

    async fn recent(&self, limit: usize) -> Result<Vec<Conversation>> {
        let rooms = self
            .rooms
            .lock()
            .map_err(|_| anyhow!("Room store lock poisoned"))?;
        let mut convs: Vec<Conversation> = rooms
            .values()
            .filter_map(|slot| slot.conversation.borrow().clone())
            .collect();
        convs.sort_by(|a, b| b.last_active.cmp(&a.last_active));
        convs.truncate(limit);
        Ok(convs)
    }
}
