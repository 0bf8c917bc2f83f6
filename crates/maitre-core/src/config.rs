use std::path::Path;

use anyhow::{Context, bail};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    pub assistant: AssistantConfig,
    pub llm: LlmConfig,
    pub retrieval: RetrievalConfig,
    pub memory: MemoryConfig,
    pub ingest: IngestConfig,
    pub index: IndexConfig,
    pub gateway: GatewayConfig,
    pub speech: SpeechConfig,
    pub timeouts: TimeoutConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub embedding_model: String,
    pub max_tokens: u32,
    /// Response variability, 0.0 (deterministic) to 2.0.
    pub creativity: f32,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub n_retrievals: u64,
    pub collection: String,
    pub self_query: bool,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub chat_max_tokens: usize,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub docs_dir: String,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub qdrant_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub bind: String,
    pub port: u16,
    pub rate_limit: u32,
    pub max_body_size: usize,
    pub auth_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub stt_url: String,
    pub tts_url: String,
    pub voice: String,
    pub format: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub generation_secs: u64,
}

impl SpeechConfig {
    /// Voice flows are only wired when both services are configured.
    #[must_use]
    pub fn enabled(&self) -> bool {
        !self.stt_url.is_empty() && !self.tts_url.is_empty()
    }
}

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("MAITRE_LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Ok(v) = std::env::var("MAITRE_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Ok(v) = std::env::var("MAITRE_QDRANT_URL") {
            self.index.qdrant_url = v;
        }
        if let Ok(v) = std::env::var("MAITRE_DOCS_DIR") {
            self.ingest.docs_dir = v;
        }
    }

    /// # Errors
    ///
    /// Returns an error if any value is out of its valid range.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(0.0..=2.0).contains(&self.llm.creativity) {
            bail!(
                "llm.creativity must be between 0.0 and 2.0, got {}",
                self.llm.creativity
            );
        }
        if self.retrieval.n_retrievals == 0 {
            bail!("retrieval.n_retrievals must be at least 1");
        }
        if self.ingest.chunk_overlap >= self.ingest.chunk_size {
            bail!(
                "ingest.chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.ingest.chunk_overlap,
                self.ingest.chunk_size
            );
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            assistant: AssistantConfig::default(),
            llm: LlmConfig::default(),
            retrieval: RetrievalConfig::default(),
            memory: MemoryConfig::default(),
            ingest: IngestConfig::default(),
            index: IndexConfig::default(),
            gateway: GatewayConfig::default(),
            speech: SpeechConfig::default(),
            timeouts: TimeoutConfig::default(),
        }
    }
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            name: "Dubula".into(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".into(),
            model: "gpt-3.5-turbo".into(),
            embedding_model: "text-embedding-3-small".into(),
            max_tokens: 1024,
            creativity: 0.7,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            n_retrievals: 4,
            collection: "training_documents".into(),
            self_query: true,
            timeout_secs: 8,
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            chat_max_tokens: 3097,
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            docs_dir: "./docs".into(),
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            qdrant_url: "http://localhost:6334".into(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 8000,
            rate_limit: 120,
            max_body_size: 1_048_576,
            auth_token: None,
        }
    }
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            stt_url: String::new(),
            tts_url: String::new(),
            voice: "neutral".into(),
            format: "wav".into(),
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            generation_secs: 45,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults_when_file_missing() {
        let config = Config::load(Path::new("/does/not/exist.toml")).unwrap();
        assert_eq!(config.assistant.name, "Dubula");
        assert_eq!(config.retrieval.n_retrievals, 4);
        assert_eq!(config.memory.chat_max_tokens, 3097);
        assert!((config.llm.creativity - 0.7).abs() < f32::EPSILON);
        assert_eq!(config.retrieval.collection, "training_documents");
    }

    #[test]
    fn parse_partial_toml_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("maitre.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        write!(
            f,
            r#"
[llm]
model = "gpt-4o-mini"
creativity = 1.2

[gateway]
port = 9000
"#
        )
        .unwrap();

        for key in ["MAITRE_LLM_BASE_URL", "MAITRE_LLM_MODEL"] {
            unsafe { std::env::remove_var(key) };
        }

        let config = Config::load(&path).unwrap();
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert!((config.llm.creativity - 1.2).abs() < f32::EPSILON);
        assert_eq!(config.gateway.port, 9000);
        assert_eq!(config.retrieval.n_retrievals, 4);
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = Config::default();
        unsafe { std::env::set_var("MAITRE_DOCS_DIR", "/srv/training") };
        config.apply_env_overrides();
        unsafe { std::env::remove_var("MAITRE_DOCS_DIR") };
        assert_eq!(config.ingest.docs_dir, "/srv/training");
    }

    #[test]
    fn creativity_out_of_range_rejected() {
        let mut config = Config::default();
        config.llm.creativity = 2.5;
        assert!(config.validate().is_err());
        config.llm.creativity = -0.1;
        assert!(config.validate().is_err());
        config.llm.creativity = 2.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_retrievals_rejected() {
        let mut config = Config::default();
        config.retrieval.n_retrievals = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk() {
        let mut config = Config::default();
        config.ingest.chunk_overlap = config.ingest.chunk_size;
        assert!(config.validate().is_err());
    }

    #[test]
    fn speech_enabled_requires_both_urls() {
        let mut speech = SpeechConfig::default();
        assert!(!speech.enabled());
        speech.stt_url = "http://localhost:8002".into();
        assert!(!speech.enabled());
        speech.tts_url = "http://localhost:8001".into();
        assert!(speech.enabled());
    }
}
