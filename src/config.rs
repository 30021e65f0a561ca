//! Configuração do pulse carregada a partir de `pulse.toml`.
//!
//! A struct [`PulseConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! As variáveis de ambiente `OPENAI_API_KEY` e `PULSE_STORE_PATH` têm
//! precedência sobre o arquivo.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::classifier::ClassifierSettings;
use crate::collector::CollectorSettings;
use crate::error::PulseError;
use crate::llm::client::DEFAULT_BASE_URL;
use crate::retry::Backoff;
use crate::source::DEFAULT_REDDIT_URL;

/// Arquivo procurado no diretório atual quando `--config` não é informado.
pub const DEFAULT_CONFIG_FILE: &str = "pulse.toml";

/// Configuração de nível superior carregada de `pulse.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct PulseConfig {
    /// Chave da API do serviço de classificação.
    #[serde(default)]
    pub api_key: String,

    /// URL base de uma API compatível com `chat/completions`.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Assunto das discussões, injetado no prompt de sistema do classificador.
    #[serde(default = "default_topic")]
    pub topic: String,

    #[serde(default = "default_reddit_base_url")]
    pub reddit_base_url: String,

    /// Subreddits lidos a cada coleta, sem o prefixo `r/`.
    #[serde(default = "default_sources")]
    pub sources: Vec<String>,

    /// Máximo de posts buscados por fonte.
    #[serde(default = "default_fetch_limit")]
    pub fetch_limit: usize,

    /// Pausa entre fontes consecutivas, em milissegundos.
    #[serde(default = "default_politeness_delay_ms")]
    pub politeness_delay_ms: u64,

    /// Máximo de registros enviados numa única chamada de classificação.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Limite de caracteres do conteúdo de cada registro dentro do prompt.
    #[serde(default = "default_content_char_cap")]
    pub content_char_cap: usize,

    /// Espera entre a coleta e a classificação no pipeline, em milissegundos.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Arquivo JSON onde os registros são persistidos.
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,

    #[serde(default)]
    pub retry: RetryConfig,
}

/// Tabela `[retry]`: política de backoff das chamadas externas.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Total de tentativas, incluindo a primeira.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Atraso inicial próprio da chamada de classificação em lote.
    #[serde(default = "default_classify_initial_delay_ms")]
    pub classify_initial_delay_ms: u64,
}

fn default_api_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_topic() -> String {
    "fighter jets and military aviation".to_string()
}

fn default_reddit_base_url() -> String {
    DEFAULT_REDDIT_URL.to_string()
}

fn default_sources() -> Vec<String> {
    ["FighterJets", "aviation", "WarplanePorn", "hoggit"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_fetch_limit() -> usize {
    10
}

fn default_politeness_delay_ms() -> u64 {
    1000
}

fn default_batch_size() -> usize {
    40
}

fn default_content_char_cap() -> usize {
    1000
}

fn default_settle_delay_ms() -> u64 {
    2000
}

fn default_store_path() -> PathBuf {
    PathBuf::from("pulse-records.json")
}

// Valor padrão para tentativas: 3.
fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    10_000
}

// A classificação em lote começa com um atraso maior: 2000ms.
fn default_classify_initial_delay_ms() -> u64 {
    2000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            classify_initial_delay_ms: default_classify_initial_delay_ms(),
        }
    }
}

impl RetryConfig {
    /// Política usada pela coleta.
    pub fn backoff(&self) -> Backoff {
        Backoff {
            max_attempts: self.max_attempts,
            initial_delay_ms: self.initial_delay_ms,
            max_delay_ms: self.max_delay_ms,
        }
    }

    /// Política usada pela chamada de classificação.
    pub fn classify_backoff(&self) -> Backoff {
        self.backoff()
            .with_initial_delay(self.classify_initial_delay_ms)
    }
}

impl Default for PulseConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base_url: default_api_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            topic: default_topic(),
            reddit_base_url: default_reddit_base_url(),
            sources: default_sources(),
            fetch_limit: default_fetch_limit(),
            politeness_delay_ms: default_politeness_delay_ms(),
            batch_size: default_batch_size(),
            content_char_cap: default_content_char_cap(),
            settle_delay_ms: default_settle_delay_ms(),
            store_path: default_store_path(),
            retry: RetryConfig::default(),
        }
    }
}

impl PulseConfig {
    /// Carrega a configuração de `path`, ou de `pulse.toml` no diretório
    /// atual. Um arquivo informado explicitamente precisa existir; o arquivo
    /// padrão ausente resulta nos valores padrão.
    pub fn load(path: Option<&Path>) -> Result<Self, PulseError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.exists() {
                    Self::from_file(default)?
                } else {
                    Self::default()
                }
            }
        };

        // Variáveis de ambiente têm precedência sobre o arquivo de configuração.
        config.apply_overrides(
            std::env::var("OPENAI_API_KEY").ok(),
            std::env::var("PULSE_STORE_PATH").ok(),
        );
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, PulseError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str::<PulseConfig>(&contents)?)
    }

    /// Aplica valores vindos do ambiente. Valores vazios são ignorados.
    pub fn apply_overrides(&mut self, api_key: Option<String>, store_path: Option<String>) {
        if let Some(key) = api_key.filter(|k| !k.is_empty()) {
            self.api_key = key;
        }
        if let Some(path) = store_path.filter(|p| !p.is_empty()) {
            self.store_path = PathBuf::from(path);
        }
    }

    pub fn validate(&self) -> Result<(), PulseError> {
        if self.batch_size == 0 {
            return Err(PulseError::Config(
                "batch_size must be greater than zero".into(),
            ));
        }
        if self.content_char_cap == 0 {
            return Err(PulseError::Config(
                "content_char_cap must be greater than zero".into(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(PulseError::Config(
                "retry.max_attempts must be greater than zero".into(),
            ));
        }
        if self.sources.is_empty() {
            return Err(PulseError::Config("sources must not be empty".into()));
        }
        if self.sources.iter().any(|s| s.trim().is_empty()) {
            return Err(PulseError::Config(
                "sources must not contain blank names".into(),
            ));
        }
        Ok(())
    }

    pub fn collector_settings(&self) -> CollectorSettings {
        CollectorSettings {
            sources: self.sources.clone(),
            fetch_limit: self.fetch_limit,
            politeness_delay: Duration::from_millis(self.politeness_delay_ms),
            backoff: self.retry.backoff(),
        }
    }

    pub fn classifier_settings(&self) -> ClassifierSettings {
        ClassifierSettings {
            model: self.model.clone(),
            temperature: self.temperature,
            topic: self.topic.clone(),
            batch_size: self.batch_size,
            content_char_cap: self.content_char_cap,
            backoff: self.retry.classify_backoff(),
        }
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}
