//! Directory-backed room store
//!
//! Layout under the root directory:
//!
//! ```text
//! rooms/<room_id>/conversation.jsonl   append-only patch log, folded on read
//! rooms/<room_id>/messages.jsonl       append-only message log, line = write order
//! ```
//!
//! Both files are only ever appended to with one line per write, so several
//! processes can share a room without coordinating. Subscriptions poll.
//!
//! There is no store-side clock here: patch `at` and message `timestamp` come
//! from the writing process. Message order is the line position and never
//! looks at timestamps. `lastActive` only moves forward, so a writer whose
//! clock runs fast can hold it ahead of the others until real time catches up.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, Mutex};
use tokio::time;

use super::{validate_room_id, RoomStore, Subscription};
use crate::models::{Conversation, ConversationPatch, Message, NewMessage};

const CONVERSATION_FILE: &str = "conversation.jsonl";
const MESSAGES_FILE: &str = "messages.jsonl";

#[derive(Debug, Serialize, Deserialize)]
struct StoredPatch {
    at: DateTime<Utc>,
    #[serde(flatten)]
    patch: ConversationPatch,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredMessage {
    id: String,
    timestamp: DateTime<Utc>,
    #[serde(flatten)]
    message: NewMessage,
}

pub struct FsRoomStore {
    root: PathBuf,
    poll_interval: Duration,
    /// Serializes appends from this process
    write_lock: Mutex<()>,
}

impl FsRoomStore {
    pub fn new(root: impl Into<PathBuf>, poll_interval: Duration) -> Self {
        Self {
            root: root.into(),
            poll_interval,
            write_lock: Mutex::new(()),
        }
    }

    fn rooms_dir(&self) -> PathBuf {
        self.root.join("rooms")
    }

    fn room_dir(&self, room_id: &str) -> Result<PathBuf> {
        validate_room_id(room_id)?;
        Ok(self.rooms_dir().join(room_id))
    }

    async fn append_line<T: Serialize>(&self, dir: &Path, file: &str, record: &T) -> Result<()> {
        let mut line = serde_json::to_string(record).context("Failed to serialize record")?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        let path = dir.join(file);
        let mut f = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("Failed to open {}", path.display()))?;
        // One write per record keeps lines from interleaving.
        f.write_all(line.as_bytes())
            .await
            .with_context(|| format!("Failed to append to {}", path.display()))?;
        f.flush().await?;
        Ok(())
    }
}

/// Complete lines of a jsonl file, with their line numbers.
///
/// A trailing fragment without a newline is a write still in progress and
/// is left for the next read.
async fn read_lines(path: &Path) -> Result<Vec<(usize, String)>> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read {}", path.display()));
        }
    };

    let mut lines: Vec<&str> = content.split('\n').collect();
    // Everything after the last '\n' is incomplete (or empty).
    lines.pop();

    Ok(lines
        .into_iter()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty())
        .map(|(i, l)| (i, l.to_string()))
        .collect())
}

async fn read_conversation(dir: &Path, room_id: &str) -> Result<Option<Conversation>> {
    let lines = read_lines(&dir.join(CONVERSATION_FILE)).await?;
    if lines.is_empty() {
        return Ok(None);
    }

    let mut conv = Conversation::new(room_id);
    for (lineno, line) in &lines {
        match serde_json::from_str::<StoredPatch>(line) {
            Ok(stored) => conv.apply(&stored.patch, stored.at),
            Err(e) => tracing::warn!(
                "Skipping bad patch at {}:{}: {}",
                room_id,
                lineno + 1,
                e
            ),
        }
    }
    Ok(Some(conv))
}

async fn read_messages(dir: &Path, room_id: &str) -> Result<Vec<Message>> {
    let lines = read_lines(&dir.join(MESSAGES_FILE)).await?;

    let mut messages = Vec::with_capacity(lines.len());
    for (lineno, line) in lines {
        match serde_json::from_str::<StoredMessage>(&line) {
            // Line position is the write order; it stays stable even when
            // an earlier line is skipped.
            Ok(stored) => messages.push(Message::from_new(
                stored.message,
                stored.id,
                lineno as u64,
                stored.timestamp,
            )),
            Err(e) => tracing::warn!(
                "Skipping bad message at {}:{}: {}",
                room_id,
                lineno + 1,
                e
            ),
        }
    }
    Ok(messages)
}

#[async_trait]
impl RoomStore for FsRoomStore {
    async fn upsert(&self, room_id: &str, patch: ConversationPatch) -> Result<()> {
        let dir = self.room_dir(room_id)?;
        let stored = StoredPatch {
            at: Utc::now(),
            patch,
        };
        self.append_line(&dir, CONVERSATION_FILE, &stored).await?;
        tracing::debug!("Upserted conversation {}", room_id);
        Ok(())
    }

    async fn conversation(&self, room_id: &str) -> Result<Option<Conversation>> {
        let dir = self.room_dir(room_id)?;
        read_conversation(&dir, room_id).await
    }

    async fn subscribe(&self, room_id: &str) -> Result<Subscription<Conversation>> {
        let dir = self.room_dir(room_id)?;
        let room_id = room_id.to_string();
        let period = self.poll_interval;
        let (tx, out) = mpsc::unbounded_channel();

        let task = tokio::spawn(async move {
            let mut ticker = time::interval(period);
            let mut last: Option<Conversation> = None;
            loop {
                ticker.tick().await;
                match read_conversation(&dir, &room_id).await {
                    Ok(Some(conv)) if last.as_ref() != Some(&conv) => {
                        last = Some(conv.clone());
                        if tx.send(conv).is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!("Conversation poll failed for {}: {:#}", room_id, e),
                }
            }
        });

        Ok(Subscription::new(out, task))
    }

    async fn append_message(&self, room_id: &str, message: NewMessage) -> Result<String> {
        let dir = self.room_dir(room_id)?;
        let id = uuid::Uuid::new_v4().simple().to_string();
        let stored = StoredMessage {
            id: id.clone(),
            timestamp: Utc::now(),
            message,
        };
        self.append_line(&dir, MESSAGES_FILE, &stored).await?;
        tracing::debug!("Appended message {} to {}", id, room_id);
        Ok(id)
    }

    async fn messages(&self, room_id: &str) -> Result<Vec<Message>> {
        let dir = self.room_dir(room_id)?;
        read_messages(&dir, room_id).await
    }

    async fn subscribe_messages(&self, room_id: &str) -> Result<Subscription<Vec<Message>>> {
        let dir = self.room_dir(room_id)?;
        let room_id = room_id.to_string();
        let period = self.poll_interval;
        let (tx, out) = mpsc::unbounded_channel();

        let task = tokio::spawn(async move {
            let mut ticker = time::interval(period);
            let mut last: Option<Vec<Message>> = None;
            loop {
                ticker.tick().await;
                match read_messages(&dir, &room_id).await {
                    Ok(log) if last.as_ref() != Some(&log) => {
                        last = Some(log.clone());
                        if tx.send(log).is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!("Message poll failed for {}: {:#}", room_id, e),
                }
            }
        });

        Ok(Subscription::new(out, task))
    }

    async fn recent(&self, limit: usize) -> Result<Vec<Conversation>> {
        let rooms_dir = self.rooms_dir();
        let mut entries = match tokio::fs::read_dir(&rooms_dir).await {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to list {}", rooms_dir.display()))
            }
        };

        let mut convs = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if validate_room_id(&name).is_err() {
                continue;
            }
            if let Some(conv) = read_conversation(&entry.path(), &name).await? {
                convs.push(conv);
            }
        }

        convs.sort_by(|a, b| b.last_active.cmp(&a.last_active));
        convs.truncate(limit);
        Ok(convs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MessageKind, Role};

    fn store(dir: &Path) -> FsRoomStore {
        FsRoomStore::new(dir, Duration::from_millis(20))
    }

    fn audio(role: Role) -> NewMessage {
        NewMessage {
            sender_role: role,
            original_text: "Audio Message".to_string(),
            translated_text: None,
            language: "hi".to_string(),
            kind: MessageKind::Audio {
                audio_url: "file:///a.webm".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn test_two_handles_share_a_room() {
        let dir = tempfile::tempdir().unwrap();
        let doctor = store(dir.path());
        let patient = store(dir.path());

        doctor
            .upsert("r1", ConversationPatch::visit(Role::Doctor, "en", "c".into()))
            .await
            .unwrap();
        patient
            .upsert("r1", ConversationPatch::visit(Role::Patient, "de", "c".into()))
            .await
            .unwrap();
        doctor.append_message("r1", audio(Role::Doctor)).await.unwrap();
        patient.append_message("r1", audio(Role::Patient)).await.unwrap();

        let conv = doctor.conversation("r1").await.unwrap().unwrap();
        assert_eq!(conv.language_of(Role::Doctor), Some("en"));
        assert_eq!(conv.language_of(Role::Patient), Some("de"));

        let log = patient.messages("r1").await.unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].sender_role, Role::Doctor);
        assert_eq!(log[1].sender_role, Role::Patient);
        assert_eq!(log[1].kind.audio_url(), Some("file:///a.webm"));
    }

    #[tokio::test]
    async fn test_partial_trailing_line_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(dir.path());
        s.append_message("r1", audio(Role::Doctor)).await.unwrap();

        let path = dir.path().join("rooms/r1").join(MESSAGES_FILE);
        let mut content = std::fs::read_to_string(&path).unwrap();
        content.push_str("{\"id\":\"half");
        std::fs::write(&path, content).unwrap();

        assert_eq!(s.messages("r1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_line_keeps_later_positions() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(dir.path());
        s.append_message("r1", audio(Role::Doctor)).await.unwrap();

        let path = dir.path().join("rooms/r1").join(MESSAGES_FILE);
        let mut content = std::fs::read_to_string(&path).unwrap();
        content.push_str("not json\n");
        std::fs::write(&path, content).unwrap();
        s.append_message("r1", audio(Role::Patient)).await.unwrap();

        let log = s.messages("r1").await.unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].seq, 0);
        assert_eq!(log[1].seq, 2);
    }

    #[tokio::test]
    async fn test_subscription_reports_changes_only() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(dir.path());
        let mut sub = s.subscribe_messages("r1").await.unwrap();

        assert!(sub.recv().await.unwrap().is_empty());
        s.append_message("r1", audio(Role::Doctor)).await.unwrap();
        assert_eq!(sub.recv().await.unwrap().len(), 1);

        // Several idle polls produce nothing new.
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(sub.latest().is_none());
    }

    #[tokio::test]
    async fn test_recent_lists_rooms_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(dir.path());
        s.upsert("first", ConversationPatch::touch()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        s.upsert("second", ConversationPatch::touch()).await.unwrap();

        let recent = s.recent(20).await.unwrap();
        let ids: Vec<&str> = recent.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["second", "first"]);
    }

    #[tokio::test]
    async fn test_order_ignores_writer_clocks() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(dir.path());
        let room_dir = dir.path().join("rooms/r1");
        std::fs::create_dir_all(&room_dir).unwrap();

        // The first writer's clock is a day ahead of the second's.
        let now = Utc::now();
        let writes = [
            (now + chrono::Duration::days(1), Role::Doctor),
            (now, Role::Patient),
        ];
        let lines: Vec<String> = writes
            .into_iter()
            .enumerate()
            .map(|(i, (timestamp, role))| {
                serde_json::to_string(&StoredMessage {
                    id: format!("m{}", i),
                    timestamp,
                    message: audio(role),
                })
                .unwrap()
            })
            .collect();
        std::fs::write(room_dir.join(MESSAGES_FILE), lines.join("\n") + "\n").unwrap();

        let log = s.messages("r1").await.unwrap();
        let ids: Vec<&str> = log.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m0", "m1"]);
        assert!(log[0].timestamp > log[1].timestamp);

        // A fast clock pins lastActive ahead; later touches never pull it back.
        let ahead = StoredPatch {
            at: now + chrono::Duration::days(1),
            patch: ConversationPatch::touch(),
        };
        std::fs::write(
            room_dir.join(CONVERSATION_FILE),
            serde_json::to_string(&ahead).unwrap() + "\n",
        )
        .unwrap();
        s.upsert("r1", ConversationPatch::touch()).await.unwrap();
        let conv = s.conversation("r1").await.unwrap().unwrap();
        assert_eq!(conv.last_active, Some(ahead.at));
    }

    #[tokio::test]
    async fn test_missing_room_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(dir.path());
        assert!(s.conversation("nobody").await.unwrap().is_none());
        assert!(s.messages("nobody").await.unwrap().is_empty());
        assert!(s.recent(5).await.unwrap().is_empty());
    }
}
