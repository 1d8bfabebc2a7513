//! Captured audio

use std::path::Path;

use anyhow::{bail, Context, Result};

/// A finished recording, ready to upload and transcribe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    pub data: Vec<u8>,
    /// File extension without the dot, e.g. "webm"
    pub extension: String,
}

impl AudioClip {
    pub fn new(data: Vec<u8>, extension: impl Into<String>) -> Self {
        Self {
            data,
            extension: extension.into(),
        }
    }

    /// Load a recording from disk. The extension picks the content type.
    pub fn from_file(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_else(|| "webm".to_string());
        let data = std::fs::read(path)
            .with_context(|| format!("Failed to read recording {}", path.display()))?;
        if data.is_empty() {
            bail!("Recording {} is empty", path.display());
        }
        Ok(Self::new(data, extension))
    }

    pub fn mime_type(&self) -> &'static str {
        match self.extension.as_str() {
            "ogg" | "oga" => "audio/ogg",
            "wav" => "audio/wav",
            "mp3" => "audio/mpeg",
            "m4a" | "mp4" => "audio/mp4",
            _ => "audio/webm",
        }
    }

    /// Name the gateway sees for the upload.
    pub fn file_name(&self) -> String {
        format!("recording.{}", self.extension)
    }
}
