//! Interface de linha de comando do pulse baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (pipeline, scrape,
//! analyze, clear, health) e flags globais (--config, --json, --verbose).

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// pulse: coleta posts de comunidades e classifica o sentimento em lote.
#[derive(Debug, Parser)]
#[command(name = "pulse", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Caminho para o arquivo de configuração (padrão: ./pulse.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Imprime o resultado estruturado em JSON em vez do resumo colorido.
    #[arg(long, global = true, default_value_t = false)]
    pub json: bool,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Coleta posts e classifica os registros pendentes numa única execução.
    Pipeline,

    /// Apenas coleta posts das fontes configuradas.
    Scrape,

    /// Classifica um lote de registros.
    Analyze {
        /// Reprocessa registros com status `failed` em vez dos `pending`.
        #[arg(long, default_value_t = false)]
        retry: bool,
    },

    /// Remove todos os registros armazenados.
    Clear,

    /// Mostra contagens por status e o veredito de saúde.
    Health,
}
