//! HTTP client for the gateway endpoints
//!
//! Wraps reqwest::Client with the base URL and request timeout from config.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use super::Gateway;
use crate::config::GatewayConfig;
use crate::models::{AudioClip, Summary, TranscriptLine};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TranslateRequest<'a> {
    text: &'a str,
    source_language: &'a str,
    target_language: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TranslateResponse {
    translated_text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TranscribeResponse {
    text: Option<String>,
}

#[derive(Debug, Serialize)]
struct SummarizeRequest<'a> {
    messages: &'a [TranscriptLine],
}

pub struct HttpGateway {
    http: reqwest::Client,
    base: Url,
}

impl HttpGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        let mut base = Url::parse(&config.base_url)
            .with_context(|| format!("Invalid gateway URL: {}", config.base_url))?;
        // Url::join drops the last segment unless the base ends in '/'.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { http, base })
    }

    fn endpoint(&self, name: &str) -> Result<Url> {
        self.base
            .join(&format!("api/{}", name))
            .with_context(|| format!("Failed to build URL for {}", name))
    }

    async fn post_json<B: Serialize + ?Sized>(&self, name: &str, body: &B) -> Result<reqwest::Response> {
        let url = self.endpoint(name)?;
        tracing::debug!("Gateway POST {}", url);

        let resp = self
            .http
            .post(url.clone())
            .json(body)
            .send()
            .await
            .with_context(|| format!("Gateway POST {} failed", url))?;

        check_response(resp, url.as_str()).await
    }
}

#[async_trait]
impl Gateway for HttpGateway {
    async fn translate(
        &self,
        text: &str,
        source_language: &str,
        target_language: &str,
    ) -> Result<String> {
        let body = TranslateRequest {
            text,
            source_language,
            target_language,
        };
        let resp = self.post_json("translate", &body).await?;
        let parsed: TranslateResponse = resp
            .json()
            .await
            .context("Failed to parse translate response")?;

        parsed
            .translated_text
            .context("Translate response missing translatedText")
    }

    async fn transcribe(&self, clip: &AudioClip) -> Result<String> {
        let url = self.endpoint("transcribe")?;
        tracing::debug!("Gateway POST {} ({} bytes)", url, clip.data.len());

        let part = reqwest::multipart::Part::bytes(clip.data.clone())
            .file_name(clip.file_name())
            .mime_str(clip.mime_type())
            .context("Invalid audio content type")?;
        let form = reqwest::multipart::Form::new().part("audio", part);

        let resp = self
            .http
            .post(url.clone())
            .multipart(form)
            .send()
            .await
            .with_context(|| format!("Gateway POST {} failed", url))?;
        let resp = check_response(resp, url.as_str()).await?;

        let parsed: TranscribeResponse = resp
            .json()
            .await
            .context("Failed to parse transcribe response")?;
        parsed.text.context("Transcribe response missing text")
    }

    async fn summarize(&self, transcript: &[TranscriptLine]) -> Result<Summary> {
        let body = SummarizeRequest {
            messages: transcript,
        };
        let resp = self.post_json("summarize", &body).await?;
        resp.json()
            .await
            .context("Failed to parse summarize response")
    }
}

/// Check HTTP response status code and return a clear error on failure.
async fn check_response(resp: reqwest::Response, url: &str) -> Result<reqwest::Response> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        bail!("HTTP {} for {}: {}", status.as_u16(), url, body);
    }
    Ok(resp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    fn gateway(base: &str) -> HttpGateway {
        HttpGateway::new(&GatewayConfig {
            base_url: base.to_string(),
            request_timeout_secs: 1,
        })
        .unwrap()
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let gw = gateway("https://example.org/consult");
        assert_eq!(
            gw.endpoint("translate").unwrap().as_str(),
            "https://example.org/consult/api/translate"
        );

        let gw = gateway("http://localhost:5000");
        assert_eq!(
            gw.endpoint("summarize").unwrap().as_str(),
            "http://localhost:5000/api/summarize"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let result = HttpGateway::new(&GatewayConfig {
            base_url: "not a url".to_string(),
            request_timeout_secs: 1,
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_request_bodies_use_camel_case() {
        let body = TranslateRequest {
            text: "fever",
            source_language: "en",
            target_language: "es",
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["sourceLanguage"], "en");
        assert_eq!(json["targetLanguage"], "es");

        let lines = vec![TranscriptLine {
            sender_role: Role::Patient,
            original_text: "I have a cough".into(),
        }];
        let json = serde_json::to_value(SummarizeRequest { messages: &lines }).unwrap();
        assert_eq!(json["messages"][0]["senderRole"], "PATIENT");
        assert_eq!(json["messages"][0]["originalText"], "I have a cough");
    }

    #[tokio::test]
    async fn test_unreachable_gateway_is_an_error() {
        // Port 9 (discard) on localhost is almost never listening.
        let gw = gateway("http://127.0.0.1:9");
        assert!(gw.translate("hi", "en", "es").await.is_err());
    }
}
