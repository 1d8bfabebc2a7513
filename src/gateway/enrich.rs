//! Best-effort enrichment
//!
//! Every gateway call is wrapped into an [`Enriched`] result. The error side
//! never aborts a send: it names the sentinel to store in place of the value.

use thiserror::Error;

use super::Gateway;
use crate::models::{AudioClip, Summary, TranscriptLine, SUMMARY_UNAVAILABLE};

/// Stored as `translatedText` when a text message can't be translated.
pub const TRANSLATION_FAILED: &str = "[Translation Failed]";
/// Stored as `originalText` when a recording can't be transcribed.
pub const AUDIO_PLACEHOLDER: &str = "Audio Message";

/// Which enrichment step fell back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Translation,
    Transcription,
    Summary,
}

/// An enrichment step that failed and the placeholder that replaces its output.
#[derive(Debug, Error)]
#[error("{stage:?} degraded to {sentinel:?}: {cause}")]
pub struct Degraded {
    pub stage: Stage,
    pub sentinel: &'static str,
    pub cause: String,
}

impl Degraded {
    fn new(stage: Stage, sentinel: &'static str, cause: impl std::fmt::Display) -> Self {
        let degraded = Self {
            stage,
            sentinel,
            cause: cause.to_string(),
        };
        tracing::warn!("{}", degraded);
        degraded
    }

    pub fn into_sentinel(self) -> String {
        self.sentinel.to_string()
    }
}

pub type Enriched<T> = Result<T, Degraded>;

/// Collapse an enrichment result to the value to persist.
pub fn or_sentinel(result: Enriched<String>) -> String {
    result.unwrap_or_else(Degraded::into_sentinel)
}

pub async fn translate(
    gateway: &dyn Gateway,
    text: &str,
    source_language: &str,
    target_language: &str,
) -> Enriched<String> {
    match gateway.translate(text, source_language, target_language).await {
        Ok(t) if !t.trim().is_empty() => Ok(t),
        Ok(_) => Err(Degraded::new(
            Stage::Translation,
            TRANSLATION_FAILED,
            "empty translation",
        )),
        Err(e) => Err(Degraded::new(
            Stage::Translation,
            TRANSLATION_FAILED,
            format!("{:#}", e),
        )),
    }
}

pub async fn transcribe(gateway: &dyn Gateway, clip: &AudioClip) -> Enriched<String> {
    match gateway.transcribe(clip).await {
        Ok(t) if !t.trim().is_empty() => Ok(t.trim().to_string()),
        Ok(_) => Err(Degraded::new(
            Stage::Transcription,
            AUDIO_PLACEHOLDER,
            "empty transcript",
        )),
        Err(e) => Err(Degraded::new(
            Stage::Transcription,
            AUDIO_PLACEHOLDER,
            format!("{:#}", e),
        )),
    }
}

pub async fn summarize(gateway: &dyn Gateway, transcript: &[TranscriptLine]) -> Enriched<Summary> {
    gateway
        .summarize(transcript)
        .await
        .map_err(|e| Degraded::new(Stage::Summary, SUMMARY_UNAVAILABLE, format!("{:#}", e)))
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scriptable gateway shared by protocol tests.

    use std::sync::Mutex;

    use anyhow::{bail, Result};
    use async_trait::async_trait;

    use super::Gateway;
    use crate::models::{AudioClip, Summary, TranscriptLine};

    #[derive(Default)]
    pub struct FakeGateway {
        pub fail_translate: bool,
        pub fail_transcribe: bool,
        pub fail_summarize: bool,
        pub transcript: String,
        /// (text, source, target) of every translate call
        pub translate_calls: Mutex<Vec<(String, String, String)>>,
        pub summarized: Mutex<Vec<TranscriptLine>>,
    }

    impl FakeGateway {
        pub fn working() -> Self {
            Self {
                transcript: "my chest hurts".to_string(),
                ..Self::default()
            }
        }

        pub fn broken() -> Self {
            Self {
                fail_translate: true,
                fail_transcribe: true,
                fail_summarize: true,
                ..Self::default()
            }
        }

        pub fn translate_calls(&self) -> Vec<(String, String, String)> {
            self.translate_calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Gateway for FakeGateway {
        async fn translate(&self, text: &str, source: &str, target: &str) -> Result<String> {
            self.translate_calls.lock().unwrap().push((
                text.to_string(),
                source.to_string(),
                target.to_string(),
            ));
            if self.fail_translate {
                bail!("translate unavailable");
            }
            Ok(format!("[{}] {}", target, text))
        }

        async fn transcribe(&self, _clip: &AudioClip) -> Result<String> {
            if self.fail_transcribe {
                bail!("transcribe unavailable");
            }
            Ok(self.transcript.clone())
        }

        async fn summarize(&self, transcript: &[TranscriptLine]) -> Result<Summary> {
            if self.fail_summarize {
                bail!("summarize unavailable");
            }
            self.summarized.lock().unwrap().extend_from_slice(transcript);
            Ok(Summary {
                summary: format!("{} lines", transcript.len()),
                symptoms: vec!["chest pain".to_string()],
                ..Summary::default()
            })
        }
    }
}
