//! Configuração carregada a partir de `nimbusec.toml`.
//!
//! A struct [`NimbusecConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis. As variáveis de
//! ambiente `NIMBUSEC_URL`, `NIMBUSEC_KEY` e `NIMBUSEC_SECRET` têm precedência
//! sobre o arquivo; flags da CLI têm precedência sobre ambos.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::cli::Cli;
use crate::error::AppError;
use crate::nimbusec::DEFAULT_API;

pub const DEFAULT_CONFIG_FILE: &str = "nimbusec.toml";

/// Configuração de nível superior carregada de `nimbusec.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct NimbusecConfig {
    /// URL base da API.
    #[serde(default = "default_url")]
    pub url: String,

    /// Chave da API (consumer key OAuth).
    #[serde(default)]
    pub key: String,

    /// Segredo da API (consumer secret OAuth).
    #[serde(default)]
    pub secret: String,

    /// Número de workers paralelos do pool.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Pausa em segundos após cada criação de domínio.
    #[serde(default)]
    pub throttle_secs: u64,

    /// Tempo máximo de uma requisição HTTP, em segundos.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_url() -> String {
    DEFAULT_API.to_string()
}

// Um único worker, como nas ferramentas originais: a API não gosta de rajadas.
fn default_workers() -> usize {
    1
}

fn default_request_timeout_secs() -> u64 {
    60
}

impl Default for NimbusecConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            key: String::new(),
            secret: String::new(),
            workers: default_workers(),
            throttle_secs: 0,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl NimbusecConfig {
    /// Carrega a configuração de `path`, usando defaults se o arquivo não
    /// existir, e aplica as variáveis de ambiente.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            toml::from_str::<NimbusecConfig>(&contents)
                .with_context(|| format!("failed to parse {}", path.display()))?
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Self::default()
        };

        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    // Variáveis vazias são ignoradas.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let fields = [
            ("NIMBUSEC_URL", &mut self.url),
            ("NIMBUSEC_KEY", &mut self.key),
            ("NIMBUSEC_SECRET", &mut self.secret),
        ];
        for (name, field) in fields {
            if let Some(value) = lookup(name)
                && !value.is_empty()
            {
                *field = value;
            }
        }
    }

    /// Sobrescreve com as flags globais passadas na linha de comando.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(url) = &cli.url {
            self.url.clone_from(url);
        }
        if let Some(key) = &cli.key {
            self.key.clone_from(key);
        }
        if let Some(secret) = &cli.secret {
            self.secret.clone_from(secret);
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.workers == 0 {
            return Err(AppError::Config("workers must be at least 1".into()));
        }
        if self.key.is_empty() || self.secret.is_empty() {
            return Err(AppError::Config(
                "API key and secret are required (--key/--secret, NIMBUSEC_KEY/NIMBUSEC_SECRET or nimbusec.toml)".into(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
