use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::ConfigError;

pub const DEFAULT_LMSTUDIO_API_URL: &str = "http://127.0.0.1:1234/v1/chat/completions";
pub const DEFAULT_OLLAMA_HOST: &str = "http://127.0.0.1:11434";

/// Headlines with this many whitespace tokens or fewer never get clustered
pub const MIN_TITLE_WORDS: usize = 5;

/// Browser identification sent when downloading article pages
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_11_5) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/50.0.2661.102 Safari/537.36";

/// Which chat backend answers the prompts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    Ollama,
    LmStudio,
}

impl Engine {
    pub fn default_classification_model(&self) -> &'static str {
        match self {
            Engine::Ollama => "gemma3:4b",
            Engine::LmStudio => "google/gemma-3-4b",
        }
    }

    pub fn default_broadcast_model(&self) -> &'static str {
        match self {
            Engine::Ollama => "ilsp/llama-krikri-8b-instruct:latest",
            Engine::LmStudio => "llama-krikri-8b-instruct",
        }
    }
}

impl FromStr for Engine {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(Engine::Ollama),
            "lmstudio" | "lm-studio" | "lm_studio" => Ok(Engine::LmStudio),
            _ => Err(ConfigError::UnknownEngine(s.to_string())),
        }
    }
}

/// How a similarity reply is turned into a match decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPolicy {
    /// First character must be exactly `9` (or the whole reply `Βαθμός: 9`)
    Legacy,
    /// First integer anywhere in the reply, clamped to 0..=9, must be 9
    Tolerant,
}

impl FromStr for MatchPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "legacy" => Ok(MatchPolicy::Legacy),
            "tolerant" => Ok(MatchPolicy::Tolerant),
            _ => Err(ConfigError::UnknownMatchPolicy(s.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub engine: Engine,
    pub ollama_host: String,
    pub lmstudio_api_url: String,
    pub classification_model: String,
    pub broadcast_model: String,
    pub feeds_file: PathBuf,
    pub output_dir: PathBuf,
    pub articles_per_feed: usize,
    pub story_limit: usize,
    pub match_policy: MatchPolicy,
    /// Maximum characters of article text per summary prompt, 0 disables the cap
    pub prompt_char_budget: usize,
    pub context_window: u32,
    pub tts_voice: String,
    pub tts_command: String,
    pub pdf_command: String,
    /// LaTeX engine handed to pandoc; needs Unicode support for Greek text
    pub pdf_engine: String,
    pub pdf_font: String,
}

impl Default for Config {
    fn default() -> Self {
        let engine = Engine::Ollama;
        Self {
            engine,
            ollama_host: DEFAULT_OLLAMA_HOST.to_string(),
            lmstudio_api_url: DEFAULT_LMSTUDIO_API_URL.to_string(),
            classification_model: engine.default_classification_model().to_string(),
            broadcast_model: engine.default_broadcast_model().to_string(),
            feeds_file: PathBuf::from("feeds_gr.yaml"),
            output_dir: PathBuf::from("."),
            articles_per_feed: 25,
            story_limit: 7,
            match_policy: MatchPolicy::Legacy,
            prompt_char_budget: 24_000,
            context_window: 40_960,
            tts_voice: "el-GR-NestorasNeural".to_string(),
            tts_command: "edge-tts".to_string(),
            pdf_command: "pandoc".to_string(),
            pdf_engine: "xelatex".to_string(),
            pdf_font: "DejaVu Serif".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        // Try to load .env from multiple locations
        Self::try_load_dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from any key lookup, starting from the defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let engine = match lookup("BULLETIN_ENGINE") {
            Some(value) => value.parse()?,
            None => defaults.engine,
        };

        let match_policy = match lookup("BULLETIN_MATCH_POLICY") {
            Some(value) => value.parse()?,
            None => defaults.match_policy,
        };

        Ok(Self {
            engine,
            ollama_host: lookup("OLLAMA_HOST").unwrap_or(defaults.ollama_host),
            lmstudio_api_url: lookup("LMSTUDIO_API_URL").unwrap_or(defaults.lmstudio_api_url),
            classification_model: lookup("BULLETIN_CLASSIFICATION_MODEL")
                .unwrap_or_else(|| engine.default_classification_model().to_string()),
            broadcast_model: lookup("BULLETIN_BROADCAST_MODEL")
                .unwrap_or_else(|| engine.default_broadcast_model().to_string()),
            feeds_file: lookup("BULLETIN_FEEDS_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.feeds_file),
            output_dir: lookup("BULLETIN_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            articles_per_feed: parse_var(&lookup, "BULLETIN_ARTICLES_PER_FEED", defaults.articles_per_feed)?,
            story_limit: parse_var(&lookup, "BULLETIN_STORY_LIMIT", defaults.story_limit)?,
            match_policy,
            prompt_char_budget: parse_var(&lookup, "BULLETIN_PROMPT_CHAR_BUDGET", defaults.prompt_char_budget)?,
            context_window: parse_var(&lookup, "BULLETIN_CONTEXT_WINDOW", defaults.context_window)?,
            tts_voice: lookup("BULLETIN_TTS_VOICE").unwrap_or(defaults.tts_voice),
            tts_command: lookup("BULLETIN_TTS_COMMAND").unwrap_or(defaults.tts_command),
            pdf_command: lookup("BULLETIN_PDF_COMMAND").unwrap_or(defaults.pdf_command),
            pdf_engine: lookup("BULLETIN_PDF_ENGINE").unwrap_or(defaults.pdf_engine),
            pdf_font: lookup("BULLETIN_PDF_FONT").unwrap_or(defaults.pdf_font),
        })
    }

    fn try_load_dotenv() {
        // Try locations in order of preference:

        // 1. Current directory (for development)
        if dotenvy::dotenv().is_ok() {
            return;
        }

        // 2. ~/.config/news-bulletin/.env (standard config location)
        if let Some(config_dir) = dirs::config_dir() {
            let config_path = config_dir.join("news-bulletin").join(".env");
            if config_path.exists() && dotenvy::from_path(&config_path).is_ok() {
                return;
            }
        }

        // 3. ~/.env (home directory)
        if let Some(home_dir) = dirs::home_dir() {
            let home_path = home_dir.join(".env");
            if home_path.exists() {
                let _ = dotenvy::from_path(&home_path);
            }
        }

        // If none found, that's okay - environment variables might be set system-wide
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(value) => value.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value,
        }),
        None => Ok(default),
    }
}
