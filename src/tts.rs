use std::sync::LazyLock;

use anyhow::Context as _;
use async_trait::async_trait;
use regex::Regex;

pub const DEFAULT_TTS_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_TTS_MODEL: &str = "tts-1";
pub const DEFAULT_TTS_VOICE: &str = "alloy";

// One sentence: a `.` only ends it when followed by whitespace, so domain
// names like `example.net` stay inside the match.
static AGGREGATOR_PROMO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\s*(?:[^.!?]|\.\S)*website on Google to access chapters of novels early and in the highest quality[^.]*\.\s*",
    )
    .expect("valid promo regex")
});

/// Cleans chapter text before it is read aloud: scene-break asterisks are
/// spelled out and the aggregator's "search our website" line is removed.
pub fn prepare_speech_text(text: &str) -> String {
    let text = text.replace("***", "Asterisk Asterisk Asterisk");
    AGGREGATOR_PROMO.replace_all(&text, " ").trim().to_owned()
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Returns MP3 bytes. A missing or blank `voice` uses the configured default.
    async fn synthesize(&self, text: &str, voice: Option<&str>) -> anyhow::Result<Vec<u8>>;
}

#[derive(Debug, Clone)]
pub struct OpenAiSpeech {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    voice: String,
}

impl OpenAiSpeech {
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        api_key: Option<String>,
        model: impl Into<String>,
        voice: impl Into<String>,
    ) -> Self {
        Self {
            client,
            endpoint: speech_endpoint(base_url),
            api_key,
            model: model.into(),
            voice: voice.into(),
        }
    }
}

pub fn speech_endpoint(base_url: &str) -> String {
    let base_url = base_url.trim_end_matches('/');
    format!("{base_url}/audio/speech")
}

#[async_trait]
impl SpeechSynthesizer for OpenAiSpeech {
    async fn synthesize(&self, text: &str, voice: Option<&str>) -> anyhow::Result<Vec<u8>> {
        let Some(api_key) = self.api_key.as_deref() else {
            anyhow::bail!("speech synthesis is not configured (set NOVEL_READER_TTS_API_KEY)");
        };
        let voice = voice
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(&self.voice);

        let body = serde_json::json!({
            "model": self.model,
            "voice": voice,
            "input": text,
            "response_format": "mp3",
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("POST {}", self.endpoint))?;

        let status = response.status();
        let bytes = response.bytes().await.context("read speech response body")?;
        if !status.is_success() {
            let raw = String::from_utf8_lossy(&bytes);
            let message = parse_error_message(&raw).unwrap_or_else(|| raw.into_owned());
            anyhow::bail!("speech API error ({status}): {message}");
        }
        if bytes.is_empty() {
            anyhow::bail!("speech API returned an empty body");
        }
        tracing::debug!(voice, bytes = bytes.len(), "synthesized speech");
        Ok(bytes.to_vec())
    }
}

fn parse_error_message(raw_json: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(raw_json).ok()?;
    let message = value.get("error")?.get("message")?.as_str()?.to_owned();
    Some(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asterisks_are_spelled_out() {
        assert_eq!(
            prepare_speech_text("End of scene.\n***\nNext"),
            "End of scene.\nAsterisk Asterisk Asterisk\nNext"
        );
    }

    #[test]
    fn aggregator_promo_is_removed() {
        let text = "She left. Search the NovelFire.net website on Google to access chapters of novels early and in the highest quality. He stayed.";
        assert_eq!(prepare_speech_text(text), "She left. He stayed.");

        let leading = "Visit our website on Google to access chapters of novels early and in the highest quality.\nChapter 3";
        assert_eq!(prepare_speech_text(leading), "Chapter 3");
    }

    #[test]
    fn plain_text_is_only_trimmed() {
        assert_eq!(prepare_speech_text("  Hello there.  "), "Hello there.");
    }

    #[test]
    fn error_message_is_read_from_api_envelope() {
        let raw = r#"{"error":{"message":"bad voice","type":"invalid_request_error"}}"#;
        assert_eq!(parse_error_message(raw).as_deref(), Some("bad voice"));
        assert_eq!(parse_error_message("not json"), None);
    }

    #[test]
    fn endpoint_ignores_trailing_slash() {
        assert_eq!(
            speech_endpoint("http://localhost:9/v1/"),
            "http://localhost:9/v1/audio/speech"
        );
    }
}
