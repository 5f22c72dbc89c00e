use chrono::{Duration as ChronoDuration, Utc};
use correspondent::cache::CorpusCache;
use correspondent::cli::{CandidateSource, Cli, Commands, ConfigAction};
use correspondent::config::Config;
use correspondent::documents::create_document_reader;
use correspondent::embedding::{create_embedding_provider, IndexBuilder, VectorIndex};
use correspondent::error::{CorrespondentError, Result};
use correspondent::llm::{create_llm_provider, LlmGateway};
use correspondent::paper::PaperRecord;
use correspondent::selection::{
    CandidateProvider, CandidateSelector, KeywordCandidates, Selection, SemanticCandidates,
};
use correspondent::sources::{build_client, ArxivSource, BiorxivSource, CatalogSource};
use reqwest::blocking::Client;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

fn main() -> Result<()> {
    let cli = Cli::parse_args();

    init_logging(cli.verbose);

    match cli.command {
        Commands::Refresh { force } => {
            cmd_refresh(cli.config, force)?;
        }
        Commands::Index { query, no_biorxiv } => {
            cmd_index(cli.config, query, no_biorxiv)?;
        }
        Commands::Select {
            interest,
            source,
            top_k,
            json,
        } => {
            cmd_select(cli.config, &interest, source, top_k, json)?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose {
        "correspondent=debug"
    } else {
        "correspondent=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt().with_env_filter(filter).with_target(false).init();
}

fn cmd_refresh(config_path: Option<PathBuf>, force: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let client = http_client(&config)?;
    let cache = corpus_cache(&config, client);

    let count = if force {
        cache.force_refresh()?.articles.len()
    } else {
        cache.get_articles()?.len()
    };

    println!("✓ bioRxiv catalog ready: {} articles", count);
    println!("  Cache: {}", cache.path().display());
    Ok(())
}

fn cmd_index(config_path: Option<PathBuf>, query: Option<String>, no_biorxiv: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let client = http_client(&config)?;

    let search = query.unwrap_or_else(|| config.sources.arxiv_query.clone());
    let arxiv = ArxivSource::new(
        client.clone(),
        config.sources.arxiv_url.clone(),
        config.sources.page_size,
        Duration::from_millis(config.sources.request_delay_ms),
        config.sources.retry.to_policy(),
    )
    .with_search_query(search);

    let end = Utc::now() - ChronoDuration::days(1);
    let start = end - ChronoDuration::days(config.cache.window_days);
    tracing::info!(
        "Fetching arXiv papers updated {} to {}",
        start.format("%Y-%m-%d"),
        end.format("%Y-%m-%d")
    );
    let mut records: Vec<PaperRecord> = arxiv.fetch_window(start, end)?;

    if !no_biorxiv {
        let cache = corpus_cache(&config, client);
        records.extend(cache.get_articles()?);
    }

    let embedder = create_embedding_provider(&config.embedding)?;
    let index = Arc::new(open_index(&config)?);
    let builder = IndexBuilder::new(embedder, index.clone(), config.embedding.batch_size)?;
    let stats = builder.index_records(&records)?;

    println!("✓ Indexed {} papers", stats.indexed);
    println!(
        "  Skipped: {}  Failed: {}  Total in index: {}",
        stats.skipped,
        stats.failed,
        index.len()
    );
    println!("  Took {}ms", stats.duration_ms);
    Ok(())
}

fn cmd_select(
    config_path: Option<PathBuf>,
    interest: &str,
    source: Option<CandidateSource>,
    top_k: Option<usize>,
    json: bool,
) -> Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(top_k) = top_k {
        config.selection.top_k = top_k;
    }
    let source = match source {
        Some(source) => source,
        None => CandidateSource::from_config(&config.selection.source).ok_or_else(|| {
            CorrespondentError::InvalidConfigValue {
                path: "selection.source".to_string(),
                message: format!("Unknown candidate source '{}'", config.selection.source),
            }
        })?,
    };

    let client = http_client(&config)?;

    let provider: Arc<dyn CandidateProvider> = match source {
        CandidateSource::Semantic => {
            let embedder = create_embedding_provider(&config.embedding)?;
            let index = open_index(&config)?;
            if index.is_empty() {
                tracing::warn!("Vector index is empty, run `correspondent index` first");
            }
            Arc::new(SemanticCandidates::new(embedder, Arc::new(index)))
        }
        CandidateSource::Keyword => Arc::new(KeywordCandidates::new(Arc::new(corpus_cache(
            &config,
            client.clone(),
        )))),
    };

    let reader = create_document_reader(&config.selection.reader, client)?;
    let llm = create_llm_provider(&config.llm)?;
    let gateway = Arc::new(LlmGateway::new(
        llm,
        config.llm.retry.to_policy(),
        config.llm.temperature,
    ));

    let selector = CandidateSelector::new(provider, reader, gateway, config.selection.clone())?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| CorrespondentError::Io {
            source: e,
            context: "Failed to start async runtime".to_string(),
        })?;
    let selection = runtime.block_on(selector.select(interest))?;

    if json {
        let out = serde_json::to_string_pretty(&selection).map_err(|e| CorrespondentError::Json {
            source: e,
            context: "Failed to serialize selection".to_string(),
        })?;
        println!("{}", out);
    } else {
        print_selection(&selection);
    }

    Ok(())
}

fn print_selection(selection: &Selection) {
    if selection.is_empty() {
        println!("No paper selected this week ({} considered)", selection.considered);
    } else {
        println!(
            "✓ Selected {} of {} papers:",
            selection.papers.len(),
            selection.considered
        );
        for pick in &selection.papers {
            println!();
            println!("  [{}] {}", pick.rank, pick.paper.title);
            println!("      {} ({})", pick.paper.id, pick.paper.source);
            println!("      {}", pick.paper.pdf_url);
        }
    }

    if let Some(reasoning) = &selection.reasoning {
        println!();
        println!("Reasoning: {}", reasoning);
    }
    if !selection.dropped.is_empty() {
        println!();
        println!("{} candidates could not be read:", selection.dropped.len());
        for dropped in &selection.dropped {
            println!("  - {}: {}", dropped.id, dropped.reason);
        }
    }
    println!();
    println!("Run: {}", selection.run_id);
}

fn cmd_config(config_path: Option<PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path)?;
            let toml = toml::to_string_pretty(&config)?;
            println!("{}", toml);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| CorrespondentError::Io {
                    source: e,
                    context: format!("Failed to create config directory: {:?}", parent),
                })?;
            }

            let config = Config::default();
            config.save(&path)?;

            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };
    Config::load_or_default(&path)
}

fn http_client(config: &Config) -> Result<Client> {
    Ok(build_client(
        &config.sources.user_agent,
        Duration::from_secs(config.sources.timeout_secs),
    )?)
}

fn corpus_cache(config: &Config, client: Client) -> CorpusCache {
    let source: Arc<dyn CatalogSource> = Arc::new(BiorxivSource::new(
        client,
        config.sources.biorxiv_url.clone(),
        Duration::from_millis(config.sources.request_delay_ms),
        config.sources.retry.to_policy(),
    ));
    CorpusCache::new(
        source,
        config.resolve(&config.cache.file),
        ChronoDuration::days(config.cache.max_age_days),
        ChronoDuration::days(config.cache.window_days),
    )
}

fn open_index(config: &Config) -> Result<VectorIndex> {
    Ok(VectorIndex::open(
        config.index.dimension,
        config.resolve(&config.index.index_file),
        config.resolve(&config.index.metadata_file),
    )?)
}
