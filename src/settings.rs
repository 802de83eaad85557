//! Effective runtime settings.
//!
//! Each setting is resolved from, in order of priority: a command-line
//! override, its environment variable, the value stored in [`ConfigDb`],
//! and finally the built-in default.

use std::{fmt, str::FromStr};

use serde::Serialize;

use crate::{
    chunking::{ChunkingConfig, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE},
    config_db::ConfigDb,
    error::{Error, Result},
    retrieval::{DEFAULT_TOP_K, MAX_TOP_K},
};

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_GENERATION_MODEL: &str = "llama3";
pub const DEFAULT_EMBEDDING_MODEL: &str = "all-minilm";
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// A persistable setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Setting {
    OllamaUrl,
    GenerationModel,
    EmbeddingModel,
    TimeoutSecs,
    ChunkSize,
    ChunkOverlap,
    TopK,
}

impl Setting {
    pub const ALL: [Setting; 7] = [
        Setting::OllamaUrl,
        Setting::GenerationModel,
        Setting::EmbeddingModel,
        Setting::TimeoutSecs,
        Setting::ChunkSize,
        Setting::ChunkOverlap,
        Setting::TopK,
    ];

    /// Key used in the settings table and on the command line.
    pub fn key(self) -> &'static str {
        match self {
            Setting::OllamaUrl => "ollama_url",
            Setting::GenerationModel => "generation_model",
            Setting::EmbeddingModel => "embedding_model",
            Setting::TimeoutSecs => "timeout_secs",
            Setting::ChunkSize => "chunk_size",
            Setting::ChunkOverlap => "chunk_overlap",
            Setting::TopK => "top_k",
        }
    }

    pub fn env_var(self) -> &'static str {
        match self {
            Setting::OllamaUrl => "AUTORESEARCHER_OLLAMA_URL",
            Setting::GenerationModel => "AUTORESEARCHER_MODEL",
            Setting::EmbeddingModel => "AUTORESEARCHER_EMBED_MODEL",
            Setting::TimeoutSecs => "AUTORESEARCHER_TIMEOUT",
            Setting::ChunkSize => "AUTORESEARCHER_CHUNK_SIZE",
            Setting::ChunkOverlap => "AUTORESEARCHER_CHUNK_OVERLAP",
            Setting::TopK => "AUTORESEARCHER_TOP_K",
        }
    }

    pub fn default_value(self) -> String {
        match self {
            Setting::OllamaUrl => DEFAULT_OLLAMA_URL.to_string(),
            Setting::GenerationModel => DEFAULT_GENERATION_MODEL.to_string(),
            Setting::EmbeddingModel => DEFAULT_EMBEDDING_MODEL.to_string(),
            Setting::TimeoutSecs => DEFAULT_TIMEOUT_SECS.to_string(),
            Setting::ChunkSize => DEFAULT_CHUNK_SIZE.to_string(),
            Setting::ChunkOverlap => DEFAULT_CHUNK_OVERLAP.to_string(),
            Setting::TopK => DEFAULT_TOP_K.to_string(),
        }
    }

    /// Reject values that could never resolve.
    pub fn validate(self, value: &str) -> Result<()> {
        match self {
            Setting::OllamaUrl => {
                if !(value.starts_with("http://")
                    || value.starts_with("https://"))
                {
                    return Err(Error::Config(format!(
                        "{} must be an http(s) URL, got '{value}'",
                        self.key()
                    )));
                }
            }
            Setting::GenerationModel | Setting::EmbeddingModel => {
                if value.trim().is_empty() {
                    return Err(Error::Config(format!(
                        "{} must not be empty",
                        self.key()
                    )));
                }
            }
            Setting::ChunkOverlap => {
                parse_number::<usize>(self, value)?;
            }
            Setting::TimeoutSecs | Setting::ChunkSize => {
                if parse_number::<u64>(self, value)? == 0 {
                    return Err(Error::Config(format!(
                        "{} must be positive",
                        self.key()
                    )));
                }
            }
            Setting::TopK => {
                let top_k = parse_number::<usize>(self, value)?;
                if !(1..=MAX_TOP_K).contains(&top_k) {
                    return Err(Error::Config(format!(
                        "{} must be between 1 and {MAX_TOP_K}, got {top_k}",
                        self.key()
                    )));
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for Setting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Setting {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Setting::ALL
            .into_iter()
            .find(|setting| setting.key() == s)
            .ok_or_else(|| Error::NotFound {
                kind: "setting",
                name: s.to_string(),
            })
    }
}

fn parse_number<T: FromStr>(setting: Setting, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        Error::Config(format!(
            "{} must be a non-negative integer, got '{value}'",
            setting.key()
        ))
    })
}

/// Values given on the command line. `None` falls through to the
/// environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub ollama_url: Option<String>,
    pub generation_model: Option<String>,
    pub embedding_model: Option<String>,
}

impl Overrides {
    fn get(&self, setting: Setting) -> Option<&str> {
        match setting {
            Setting::OllamaUrl => self.ollama_url.as_deref(),
            Setting::GenerationModel => self.generation_model.as_deref(),
            Setting::EmbeddingModel => self.embedding_model.as_deref(),
            _ => None,
        }
    }
}

/// Where a resolved value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Flag,
    Env,
    Stored,
    Default,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Settings {
    pub ollama_url: String,
    pub generation_model: String,
    pub embedding_model: String,
    pub timeout_secs: u64,
    pub chunking: ChunkingConfig,
    pub top_k: usize,
}

impl Settings {
    /// Resolve against the process environment.
    pub fn resolve(config_db: &ConfigDb, overrides: &Overrides) -> Result<Self> {
        Self::resolve_with(config_db, overrides, |var| std::env::var(var).ok())
    }

    /// Resolve with an explicit environment lookup.
    pub fn resolve_with(
        config_db: &ConfigDb,
        overrides: &Overrides,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let lookup = |setting: Setting| -> Result<String> {
            lookup_value(config_db, overrides, &env, setting)
                .map(|(value, _)| value)
        };

        let settings = Self {
            ollama_url: lookup(Setting::OllamaUrl)?,
            generation_model: lookup(Setting::GenerationModel)?,
            embedding_model: lookup(Setting::EmbeddingModel)?,
            timeout_secs: parse_number(
                Setting::TimeoutSecs,
                &lookup(Setting::TimeoutSecs)?,
            )?,
            chunking: ChunkingConfig {
                chunk_size: parse_number(
                    Setting::ChunkSize,
                    &lookup(Setting::ChunkSize)?,
                )?,
                chunk_overlap: parse_number(
                    Setting::ChunkOverlap,
                    &lookup(Setting::ChunkOverlap)?,
                )?,
            },
            top_k: parse_number(Setting::TopK, &lookup(Setting::TopK)?)?,
        };

        for setting in Setting::ALL {
            setting.validate(&lookup(setting)?)?;
        }
        settings.chunking.validate()?;

        Ok(settings)
    }

    /// Persist `value` for `setting`.
    ///
    /// The stored settings must still resolve afterwards (ignoring flags and
    /// the environment), otherwise the previous value is put back and the
    /// error is returned. This catches pairs such as a `chunk_overlap` that
    /// is not smaller than the stored `chunk_size`.
    pub fn store(config_db: &ConfigDb, setting: Setting, value: &str) -> Result<()> {
        setting.validate(value)?;

        let previous = config_db.get_setting(setting.key())?;
        config_db.set_setting(setting.key(), value)?;

        if let Err(e) =
            Self::resolve_with(config_db, &Overrides::default(), |_| None)
        {
            match previous {
                Some(old) => config_db.set_setting(setting.key(), &old)?,
                None => {
                    config_db.remove_setting(setting.key())?;
                }
            }
            return Err(e);
        }
        Ok(())
    }

    /// Every setting with its effective value and origin, for display.
    pub fn describe(
        config_db: &ConfigDb,
        overrides: &Overrides,
    ) -> Result<Vec<(Setting, String, Origin)>> {
        let env = |var: &str| std::env::var(var).ok();
        Setting::ALL
            .into_iter()
            .map(|setting| {
                let (value, origin) =
                    lookup_value(config_db, overrides, &env, setting)?;
                Ok((setting, value, origin))
            })
            .collect()
    }
}

fn lookup_value(
    config_db: &ConfigDb,
    overrides: &Overrides,
    env: &impl Fn(&str) -> Option<String>,
    setting: Setting,
) -> Result<(String, Origin)> {
    if let Some(value) = overrides.get(setting) {
        return Ok((value.to_string(), Origin::Flag));
    }
    if let Some(value) = env(setting.env_var()) {
        return Ok((value, Origin::Env));
    }
    if let Some(value) = config_db.get_setting(setting.key())? {
        return Ok((value, Origin::Stored));
    }
    Ok((setting.default_value(), Origin::Default))
}
