//! Message exchange protocol
//!
//! A [`ChatRoom`] is one participant's view of one room. Outbound messages go
//! through enrichment (translate, or upload + transcribe + translate for
//! recordings) and are then appended to the shared store. Enrichment never
//! fails a send; only persistence, a missing room and the audio budget do.
//!
//! User-facing problems are reported once on the notice channel returned by
//! [`ChatRoom::new`].

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{Local, Utc};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use super::negotiation::LanguageWatch;
use super::report;
use crate::config::{Config, Session};
use crate::gateway::{enrich, Gateway};
use crate::models::{
    default_conversation_name, AudioClip, ConversationPatch, Message, MessageKind, NewMessage,
    Summary,
};
use crate::store::{validate_room_id, MediaStore, RoomStore, Subscription};

/// Blocking notification for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    RoomNotReady,
    SendFailed(String),
    AudioTimedOut,
    SaveStalled,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::RoomNotReady => {
                write!(f, "Please wait for the chat room to load before sending messages.")
            }
            Notice::SendFailed(reason) => write!(f, "Failed to send message: {}", reason),
            Notice::AudioTimedOut => write!(f, "Audio upload timed out. Please try again."),
            Notice::SaveStalled => write!(
                f,
                "Audio message is taking too long to save. It may still appear shortly."
            ),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    #[error("chat room is not ready")]
    RoomNotReady,
    #[error("message is empty")]
    EmptyMessage,
    #[error("failed to store message: {0}")]
    Persistence(String),
    #[error("audio send timed out after {0:?}")]
    TimedOut(Duration),
}

/// Collaborators a room talks to.
#[derive(Clone)]
pub struct RoomServices {
    pub store: Arc<dyn RoomStore>,
    pub media: Arc<dyn MediaStore>,
    pub gateway: Arc<dyn Gateway>,
}

#[derive(Debug, Clone)]
pub struct RoomOptions {
    /// Wall-clock budget for upload + transcription + translation of a recording
    pub audio_budget: Duration,
    pub fallback_language: String,
}

impl RoomOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            audio_budget: config.audio_timeout(),
            fallback_language: config.fallback_language.clone(),
        }
    }
}

impl Default for RoomOptions {
    fn default() -> Self {
        Self {
            audio_budget: Duration::from_secs(5),
            fallback_language: "en".to_string(),
        }
    }
}

struct ActiveRoom {
    id: String,
    language: LanguageWatch,
}

/// Holds the "sending" flag up for as long as it lives.
struct SendingGuard<'a>(&'a watch::Sender<bool>);

impl<'a> SendingGuard<'a> {
    fn raise(flag: &'a watch::Sender<bool>) -> Self {
        flag.send_replace(true);
        Self(flag)
    }
}

impl Drop for SendingGuard<'_> {
    fn drop(&mut self) {
        self.0.send_replace(false);
    }
}

/// How long a claimed audio send may keep the store busy past the budget.
const SAVE_GRACE: Duration = Duration::from_secs(1);

const PENDING: u8 = 0;
const CLAIMED: u8 = 1;
const ABANDONED: u8 = 2;

/// Decides who owns the outcome of an audio send: the pipeline (by claiming
/// it before persisting) or the timeout (by abandoning it). Only the first
/// transition out of `PENDING` succeeds.
#[derive(Debug, Default)]
struct SendClaim(AtomicU8);

impl SendClaim {
    fn claim(&self) -> bool {
        self.0
            .compare_exchange(PENDING, CLAIMED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn abandon(&self) -> bool {
        self.0
            .compare_exchange(PENDING, ABANDONED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Append `message`, then refresh the room's `lastActive`.
///
/// A failed refresh is only logged: the message itself is already stored.
async fn persist(store: &dyn RoomStore, room_id: &str, message: NewMessage) -> Result<String> {
    let id = store
        .append_message(room_id, message)
        .await
        .context("Failed to store message")?;
    debug!("Stored message {} in room {}", id, room_id);

    if let Err(e) = store.upsert(room_id, ConversationPatch::touch()).await {
        warn!("Failed to refresh activity for room {}: {:#}", room_id, e);
    }
    Ok(id)
}

/// Detached audio pipeline. Runs to completion even after a timeout, but
/// only writes a message if it wins the claim.
struct AudioJob {
    services: RoomServices,
    room_id: String,
    session: Session,
    target_language: String,
    clip: AudioClip,
    claim: Arc<SendClaim>,
}

impl AudioJob {
    /// `Ok(None)` means the send was abandoned and nothing was written.
    async fn run(self) -> Result<Option<String>> {
        let path = format!(
            "audio/{}/{}.{}",
            self.room_id,
            Utc::now().timestamp_millis(),
            self.clip.extension
        );
        let audio_url = self
            .services
            .media
            .upload(&path, self.clip.data.clone())
            .await
            .context("Failed to upload recording")?;
        debug!("Uploaded recording to {}", audio_url);

        let gateway = self.services.gateway.as_ref();
        let (original_text, translated_text) = match enrich::transcribe(gateway, &self.clip).await {
            Ok(text) => {
                let translated = enrich::translate(
                    gateway,
                    &text,
                    &self.session.language,
                    &self.target_language,
                )
                .await
                .ok();
                (text, translated)
            }
            Err(degraded) => (degraded.into_sentinel(), None),
        };

        if !self.claim.claim() {
            warn!(
                "Audio send was abandoned after timeout; recording left at {}",
                audio_url
            );
            return Ok(None);
        }

        let message = NewMessage {
            sender_role: self.session.role,
            original_text,
            translated_text,
            language: self.session.language.clone(),
            kind: MessageKind::Audio { audio_url },
        };
        persist(self.services.store.as_ref(), &self.room_id, message)
            .await
            .map(Some)
    }
}

/// One participant in one room at a time.
pub struct ChatRoom {
    session: Session,
    services: RoomServices,
    options: RoomOptions,
    active: Option<ActiveRoom>,
    notices: mpsc::UnboundedSender<Notice>,
    sending: watch::Sender<bool>,
}

impl ChatRoom {
    pub fn new(
        session: Session,
        services: RoomServices,
        options: RoomOptions,
    ) -> (Self, mpsc::UnboundedReceiver<Notice>) {
        let (notices, rx) = mpsc::unbounded_channel();
        let (sending, _) = watch::channel(false);
        let room = Self {
            session,
            services,
            options,
            active: None,
            notices,
            sending,
        };
        (room, rx)
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Open `room_id`: record this visit (name if unset, own language,
    /// activity) and start following the counterpart's language.
    pub async fn enter(&mut self, room_id: &str) -> Result<()> {
        validate_room_id(room_id)?;
        self.leave();

        let patch = ConversationPatch::visit(
            self.session.role,
            &self.session.language,
            default_conversation_name(Local::now()),
        );
        self.services
            .store
            .upsert(room_id, patch)
            .await
            .with_context(|| format!("Failed to open room {}", room_id))?;

        let language = LanguageWatch::start(
            self.services.store.as_ref(),
            room_id,
            self.session.role,
            self.options.fallback_language.clone(),
        )
        .await?;

        info!(
            "Joined room {} as {} ({}), translating into {}",
            room_id,
            self.session.role,
            self.session.language,
            language.current()
        );
        self.active = Some(ActiveRoom {
            id: room_id.to_string(),
            language,
        });
        Ok(())
    }

    /// Stop following the current room.
    pub fn leave(&mut self) {
        if let Some(room) = self.active.take() {
            debug!("Left room {}", room.id);
        }
    }

    /// Negotiated language, or `None` before a room is entered.
    pub fn target_language(&self) -> Option<String> {
        self.active.as_ref().map(|r| r.language.current())
    }

    pub fn language_changes(&self) -> Option<watch::Receiver<String>> {
        self.active.as_ref().map(|r| r.language.changes())
    }

    /// `true` while a send is outstanding.
    pub fn sending(&self) -> watch::Receiver<bool> {
        self.sending.subscribe()
    }

    fn notify(&self, notice: Notice) {
        let _ = self.notices.send(notice);
    }

    fn ready(&self) -> Result<&ActiveRoom, SendError> {
        match self.active.as_ref() {
            Some(room) => Ok(room),
            None => {
                self.notify(Notice::RoomNotReady);
                Err(SendError::RoomNotReady)
            }
        }
    }

    fn persistence_failed(&self, e: anyhow::Error) -> SendError {
        error!("Error sending message: {:#}", e);
        let reason = format!("{:#}", e);
        self.notify(Notice::SendFailed(reason.clone()));
        SendError::Persistence(reason)
    }

    /// Translate and store a text message. Returns the new message id.
    pub async fn send_text(&self, text: &str) -> Result<String, SendError> {
        let room = self.ready()?;
        if text.trim().is_empty() {
            return Err(SendError::EmptyMessage);
        }
        let _sending = SendingGuard::raise(&self.sending);

        let target = room.language.current();
        let translated = enrich::or_sentinel(
            enrich::translate(
                self.services.gateway.as_ref(),
                text,
                &self.session.language,
                &target,
            )
            .await,
        );

        let message = NewMessage {
            sender_role: self.session.role,
            original_text: text.to_string(),
            translated_text: Some(translated),
            language: self.session.language.clone(),
            kind: MessageKind::Text,
        };
        persist(self.services.store.as_ref(), &room.id, message)
            .await
            .map_err(|e| self.persistence_failed(e))
    }

    /// Upload, transcribe, translate and store a recording.
    ///
    /// If the work doesn't reach the store within the audio budget the send
    /// is abandoned: the flag clears, a notice fires and the pipeline, which
    /// keeps running, will not write a message. A send that already reached
    /// the store gets [`SAVE_GRACE`] more; past that the flag clears and the
    /// user is told the message may still appear.
    pub async fn send_audio(&self, clip: AudioClip) -> Result<String, SendError> {
        let room = self.ready()?;
        if clip.data.is_empty() {
            return Err(SendError::EmptyMessage);
        }
        let _sending = SendingGuard::raise(&self.sending);

        let claim = Arc::new(SendClaim::default());
        let job = AudioJob {
            services: self.services.clone(),
            room_id: room.id.clone(),
            session: self.session.clone(),
            target_language: room.language.current(),
            clip,
            claim: claim.clone(),
        };
        let mut handle = tokio::spawn(job.run());

        let joined = tokio::select! {
            joined = &mut handle => joined,
            _ = tokio::time::sleep(self.options.audio_budget) => {
                if claim.abandon() {
                    warn!("Audio send timed out after {:?}", self.options.audio_budget);
                    self.notify(Notice::AudioTimedOut);
                    return Err(SendError::TimedOut(self.options.audio_budget));
                }
                // Already persisting; wait a little for the store.
                match tokio::time::timeout(SAVE_GRACE, &mut handle).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        warn!(
                            "Audio message still saving {:?} past the budget",
                            SAVE_GRACE
                        );
                        self.notify(Notice::SaveStalled);
                        return Err(SendError::TimedOut(self.options.audio_budget));
                    }
                }
            }
        };

        match joined {
            Ok(Ok(Some(id))) => Ok(id),
            Ok(Ok(None)) => Err(SendError::TimedOut(self.options.audio_budget)),
            Ok(Err(e)) => Err(self.persistence_failed(e)),
            Err(e) => Err(self.persistence_failed(anyhow::Error::new(e))),
        }
    }

    pub async fn messages(&self) -> Result<Vec<Message>> {
        let room = self.active.as_ref().context("No room is open")?;
        self.services.store.messages(&room.id).await
    }

    pub async fn subscribe_messages(&self) -> Result<Subscription<Vec<Message>>> {
        let room = self.active.as_ref().context("No room is open")?;
        self.services.store.subscribe_messages(&room.id).await
    }

    /// Clinical summary of the whole room so far.
    pub async fn summarize(&self) -> Result<Summary> {
        let messages = self.messages().await?;
        Ok(report::summarize(self.services.gateway.as_ref(), &messages).await)
    }
}
