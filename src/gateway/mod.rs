//! Translation, transcription and summarization gateway
//!
//! All three calls are best-effort enrichment: callers go through
//! [`enrich`] which turns any failure into a [`enrich::Degraded`] carrying
//! the sentinel to persist instead.

pub mod client;
pub mod enrich;

pub use client::HttpGateway;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{AudioClip, Summary, TranscriptLine};

#[async_trait]
pub trait Gateway: Send + Sync {
    async fn translate(
        &self,
        text: &str,
        source_language: &str,
        target_language: &str,
    ) -> Result<String>;

    async fn transcribe(&self, clip: &AudioClip) -> Result<String>;

    async fn summarize(&self, transcript: &[TranscriptLine]) -> Result<Summary>;
}
