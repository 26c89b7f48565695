use std::time::Duration;

use anyhow::Context as _;
use url::Url;

use crate::tts::{DEFAULT_TTS_BASE_URL, DEFAULT_TTS_MODEL, DEFAULT_TTS_VOICE, OpenAiSpeech};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = concat!("novel-reader/", env!("CARGO_PKG_VERSION"));

/// Settings read once at startup from `NOVEL_READER_*` variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub novel_list_url: Option<Url>,
    /// Always ends in `/` so relative joins stay under it.
    pub scrape_base_url: Option<Url>,
    pub tts: TtsConfig,
}

#[derive(Clone)]
pub struct TtsConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub voice: String,
}

impl std::fmt::Debug for TtsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtsConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("voice", &self.voice)
            .finish()
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
        };

        let novel_list_url = var("NOVEL_READER_NOVEL_LIST_URL")
            .map(|raw| parse_http_url(&raw))
            .transpose()
            .context("invalid NOVEL_READER_NOVEL_LIST_URL")?;
        let scrape_base_url = var("NOVEL_READER_SCRAPE_BASE_URL")
            .map(|raw| {
                let raw = if raw.ends_with('/') { raw } else { format!("{raw}/") };
                parse_http_url(&raw)
            })
            .transpose()
            .context("invalid NOVEL_READER_SCRAPE_BASE_URL")?;

        let base_url =
            var("NOVEL_READER_TTS_BASE_URL").unwrap_or_else(|| DEFAULT_TTS_BASE_URL.to_owned());
        parse_http_url(&base_url).context("invalid NOVEL_READER_TTS_BASE_URL")?;
        let tts = TtsConfig {
            base_url,
            api_key: var("NOVEL_READER_TTS_API_KEY").or_else(|| var("OPENAI_API_KEY")),
            model: var("NOVEL_READER_TTS_MODEL").unwrap_or_else(|| DEFAULT_TTS_MODEL.to_owned()),
            voice: var("NOVEL_READER_TTS_VOICE").unwrap_or_else(|| DEFAULT_TTS_VOICE.to_owned()),
        };

        Ok(Self {
            novel_list_url,
            scrape_base_url,
            tts,
        })
    }

    pub fn http_client(&self) -> anyhow::Result<reqwest::Client> {
        reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("build http client")
    }

    pub fn speech(&self, client: reqwest::Client) -> OpenAiSpeech {
        OpenAiSpeech::new(
            client,
            &self.tts.base_url,
            self.tts.api_key.clone(),
            self.tts.model.clone(),
            self.tts.voice.clone(),
        )
    }
}

fn parse_http_url(raw: &str) -> anyhow::Result<Url> {
    let url = Url::parse(raw).with_context(|| format!("parse url: {raw}"))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => anyhow::bail!("unsupported url scheme: {other}"),
    }
}
