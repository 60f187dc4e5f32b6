//! Interface de linha de comando baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (sync, rm, get,
//! agent-config, infected) e flags globais de acesso à API.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Ferramentas para gerenciar domínios monitorados pelo nimbusec.
#[derive(Debug, Parser)]
#[command(name = "nimbusec", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// URL da API (padrão: https://api.nimbusec.com/).
    #[arg(long, global = true)]
    pub url: Option<String>,

    /// Chave da API para autenticação.
    #[arg(long, global = true)]
    pub key: Option<String>,

    /// Segredo da API para autenticação.
    #[arg(long, global = true)]
    pub secret: Option<String>,

    /// Caminho do arquivo de configuração.
    #[arg(long, global = true, default_value = crate::config::DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

/// Opções do pool compartilhadas pelos comandos em lote.
#[derive(Debug, Clone, Args)]
pub struct PoolArgs {
    /// Número de workers paralelos (use poucos, a API limita rajadas).
    #[arg(long)]
    pub workers: Option<usize>,

    /// Interrompe novas submissões após a primeira falha.
    #[arg(long, default_value_t = false)]
    pub fail_fast: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Cria (ou atualiza) os domínios do CSV e opcionalmente remove os demais.
    Sync {
        /// Caminho do CSV de importação.
        #[arg(long, default_value = "import.csv")]
        file: PathBuf,

        /// Remove do nimbusec os domínios que não estão no CSV.
        #[arg(long, default_value_t = false)]
        delete: bool,

        /// Atualiza domínios existentes; sem a flag apenas insere novos.
        #[arg(long, default_value_t = false)]
        update: bool,

        /// Pausa em segundos após cada criação de domínio.
        #[arg(long)]
        throttle: Option<u64>,

        /// Simula sem escrever nada.
        #[arg(long, default_value_t = false)]
        dry_run: bool,

        #[command(flatten)]
        pool: PoolArgs,
    },

    /// Remove os domínios listados no CSV.
    Rm {
        /// Caminho do CSV com os domínios a remover.
        #[arg(long, default_value = "delete.csv")]
        file: PathBuf,

        /// Simula sem remover nada.
        #[arg(long, default_value_t = false)]
        dry_run: bool,

        #[command(flatten)]
        pool: PoolArgs,
    },

    /// Lista todos os domínios em formato CSV compatível com `sync`.
    Get,

    /// Gera a configuração JSON do agente de servidor a partir de um CSV.
    AgentConfig {
        /// Caminho do CSV (url, docroot).
        #[arg(long, default_value = "import.csv")]
        file: PathBuf,

        /// Chave do agente.
        #[arg(long, default_value = "abc")]
        agent_key: String,

        /// Segredo do agente.
        #[arg(long, default_value = "abc")]
        agent_secret: String,

        /// Arquivo temporário onde o agente grava resultados parciais.
        #[arg(long, default_value = "/tmp/nimbusec.tmp")]
        tmpfile: String,
    },

    /// Lista os recursos infectados por domínio em formato CSV.
    Infected {
        /// Filtro que define quando um domínio é considerado infectado.
        #[arg(
            long,
            default_value = r#"severity ge 3 and (event eq "malware" or event eq "webshell")"#
        )]
        filter: String,

        /// Domínio específico, ou ALL para todos os infectados.
        #[arg(long, default_value = crate::commands::infected::ALL_DOMAINS)]
        domain: String,

        #[command(flatten)]
        pool: PoolArgs,
    },
}
