use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// CLI configuration parsed from command line arguments and environment variables
#[derive(Parser, Debug)]
#[command(name = "licita", version, about = "Incremental harvester for public bidding bulletins")]
#[command(after_help = "Examples:
  licita harvest                         # CSV output, credentials from LICITA_EMAIL/LICITA_PASSWORD
  licita harvest --sink duckdb           # Store rows in licitacoes.duckdb
  licita harvest --no-enrich             # Skip detail pages
  licita classify \"equipe de enfermagem\"
  licita checkpoint")]
pub struct Config {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Collect new bulletins since the last checkpoint
    Harvest(HarvestArgs),

    /// Classify a text offline against the keyword taxonomy
    Classify {
        /// Text to classify
        text: String,
    },

    /// Show the stored checkpoint
    Checkpoint {
        /// Checkpoint file
        #[arg(long, env = "LICITA_CHECKPOINT", default_value = "ultimo_boletim.json")]
        path: PathBuf,
    },
}

#[derive(Args, Debug)]
pub struct HarvestArgs {
    /// Where matched records are stored
    #[arg(long, env = "LICITA_SINK", value_enum, default_value_t = SinkKind::Csv)]
    pub sink: SinkKind,

    /// Output file (defaults to licitacoes_filtradas.csv or licitacoes.duckdb)
    #[arg(long, env = "LICITA_OUTPUT")]
    pub output: Option<PathBuf>,

    /// Checkpoint file
    #[arg(long, env = "LICITA_CHECKPOINT", default_value = "ultimo_boletim.json")]
    pub checkpoint: PathBuf,

    /// Run log file (JSON array, one per run)
    #[arg(long, env = "LICITA_LOG", default_value = "coleta_log.json")]
    pub log: PathBuf,

    /// Portal account email
    #[arg(long, env = "LICITA_EMAIL", hide_env_values = true)]
    pub email: Option<String>,

    /// Portal account password
    #[arg(long, env = "LICITA_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// JSON credentials file with `email` and `password`
    #[arg(long, env = "LICITA_CREDENTIALS")]
    pub credentials: Option<PathBuf>,

    /// Skip detail-page enrichment of matched records
    #[arg(long)]
    pub no_enrich: bool,

    /// Keep the checkpoint before the first bulletin whose fetch failed
    #[arg(long)]
    pub stop_at_failed_fetch: bool,

    /// Portal base URL (bulletin calendar, biddings API and detail pages)
    #[arg(long, env = "LICITA_BASE_URL")]
    pub base_url: Option<String>,

    /// Login page URL
    #[arg(long, env = "LICITA_LOGIN_URL")]
    pub login_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SinkKind {
    Csv,
    Duckdb,
}

impl SinkKind {
    pub fn default_output(self) -> PathBuf {
        match self {
            Self::Csv => PathBuf::from("licitacoes_filtradas.csv"),
            Self::Duckdb => PathBuf::from("licitacoes.duckdb"),
        }
    }
}

/// Credentials file used when none is given and the environment is empty.
pub const DEFAULT_CREDENTIALS: &str = "credentials/credentials.json";
