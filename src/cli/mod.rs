//! CLI command definitions and parsing
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "correspondent",
    version,
    about = "Weekly research-paper discovery with conservative LLM selection",
    long_about = "Correspondent fetches last week's preprints, narrows them to the candidates closest to \
                  your stated interests by semantic search or keyword scoring, and asks a language model \
                  to pick the one to three papers worth reading."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/correspondent/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Where candidates come from
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum CandidateSource {
    /// Nearest neighbours in the vector index
    Semantic,
    /// Keyword scoring over the cached bioRxiv catalog
    Keyword,
}

impl CandidateSource {
    pub fn from_config(name: &str) -> Option<Self> {
        match name {
            "semantic" => Some(CandidateSource::Semantic),
            "keyword" => Some(CandidateSource::Keyword),
            _ => None,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Make sure the cached bioRxiv catalog is fresh
    Refresh {
        /// Refetch even when the cache is still fresh
        #[arg(short, long)]
        force: bool,
    },

    /// Fetch last week's papers and add them to the vector index
    Index {
        /// arXiv boolean search string, e.g. 'cat:q-bio.GN OR all:"gene regulation"'
        #[arg(short, long)]
        query: Option<String>,

        /// Index only arXiv records, skip the cached bioRxiv catalog
        #[arg(long)]
        no_biorxiv: bool,
    },

    /// Select the papers worth reading for an interest statement
    Select {
        /// Free-text interests; keyword search understands AND / OR
        #[arg(short, long)]
        interest: String,

        /// Candidate source (defaults to selection.source from the config)
        #[arg(short, long, value_enum)]
        source: Option<CandidateSource>,

        /// Number of candidates shown to the model
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Print the selection as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Write the default configuration file
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },

    /// Print the effective configuration
    Show,

    /// Validate a configuration file
    Validate {
        /// File to validate (defaults to the global config path)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
