/// codecortex: hybrid code-search CLI
///
/// Thin wrapper over the public `Engine` API — no scoring or indexing logic
/// lives here, only argument parsing, engine wiring, and output formatting.
///
/// Commands:
/// - index: scan a directory and build/update the on-disk indices
/// - search: run the hybrid retriever against a query
/// - related: walk the structural graph from a symbol id
use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use codecortex::cli::{OutputFormat as CliOutputFormat, OutputWriter, ProgressReporter};
use codecortex::extractors::RustSource;
use codecortex::model::EdgeKind;
use codecortex::name_index::SearchFilter;
use codecortex::semantic_index::embed::{EmbeddingModel, HashEmbeddingModel, OrtEmbeddingModel};
use codecortex::{CoreConfig, Engine};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

#[derive(Parser)]
#[command(name = "codecortex")]
#[command(about = "Hybrid name/semantic/structural code search", long_about = None)]
#[command(version)]
struct Cli {
    /// Directory holding the on-disk indices and config; created on first index
    #[arg(long, global = true, default_value = ".codecortex")]
    data_dir: PathBuf,

    /// Directory containing model.onnx + tokenizer.json for the ONNX embedder;
    /// omit to use the dependency-free hash-based fixture embedder
    #[arg(long, global = true)]
    model_dir: Option<PathBuf>,

    /// Optional log file path; when set, info+ goes to the file and warn+ is
    /// mirrored to stderr. Without it, only warn+ goes to stderr.
    #[arg(long, global = true)]
    log: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a directory and build or update the indices
    Index {
        /// Directory to scan recursively
        #[arg(short, long)]
        dir: PathBuf,

        /// Re-extract every file even if its content hash is unchanged
        #[arg(short, long)]
        force: bool,
    },

    /// Run the hybrid retriever against a query
    Search {
        query: String,

        #[arg(short = 'k', long, default_value_t = 10)]
        top_k: usize,

        /// Skip query analysis and contextual expansion for a low-latency pass
        #[arg(long)]
        fast: bool,

        /// Restrict results to candidates with a known symbol kind
        #[arg(long)]
        code_only: bool,

        /// Restrict by symbol kind (class, interface, enum, method, constructor, field, free_function)
        #[arg(long)]
        kind: Option<String>,

        /// Restrict by a glob-style file path pattern
        #[arg(long)]
        file_pattern: Option<String>,

        #[arg(long, value_enum, default_value_t = OutputFormatArg::Text)]
        output: OutputFormatArg,
    },

    /// Walk the structural graph from a symbol id
    Related {
        id: String,

        /// Comma-separated edge kinds (calls, called_by, overrides, overridden_by,
        /// extends, subclassed_by, implements, implemented_by, reads_field,
        /// writes_field, instantiates, uses_type); defaults to all kinds
        #[arg(long)]
        edges: Option<String>,

        #[arg(short = 'k', long, default_value_t = 10)]
        top_k: usize,

        #[arg(long, value_enum, default_value_t = OutputFormatArg::Text)]
        output: OutputFormatArg,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormatArg {
    Text,
    Json,
    Ndjson,
}

impl From<OutputFormatArg> for CliOutputFormat {
    fn from(f: OutputFormatArg) -> Self {
        match f {
            OutputFormatArg::Text => CliOutputFormat::Text,
            OutputFormatArg::Json => CliOutputFormat::Json,
            OutputFormatArg::Ndjson => CliOutputFormat::Ndjson,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log.as_ref())?;

    std::fs::create_dir_all(&cli.data_dir)
        .with_context(|| format!("failed to create data dir: {:?}", cli.data_dir))?;
    let config_path = cli.data_dir.join("config.toml");
    let config = CoreConfig::load(&config_path);

    let embedding_model = build_embedding_model(cli.model_dir.as_ref(), &config)?;
    let engine = Engine::new(
        config,
        Some(cli.data_dir.clone()),
        embedding_model,
        Box::new(RustSource::new()),
        None,
    )?;

    match cli.command {
        Commands::Index { dir, force } => run_index(&engine, &dir, force).await,
        Commands::Search {
            query,
            top_k,
            fast,
            code_only,
            kind,
            file_pattern,
            output,
        } => run_search(&engine, &query, top_k, fast, code_only, kind, file_pattern, output).await,
        Commands::Related { id, edges, top_k, output } => run_related(&engine, &id, edges, top_k, output),
    }?;

    engine.dispose();
    Ok(())
}

fn build_embedding_model(model_dir: Option<&PathBuf>, config: &CoreConfig) -> Result<Box<dyn EmbeddingModel>> {
    match model_dir {
        Some(dir) => {
            let model_path = dir.join("model.onnx");
            let tokenizer_path = dir.join("tokenizer.json");
            let model = OrtEmbeddingModel::new(&model_path, &tokenizer_path, "bge-small-en-v1.5", Some(dir))
                .with_context(|| format!("failed to load embedding model from {:?}", dir))?;
            Ok(Box::new(model))
        }
        None => Ok(Box::new(HashEmbeddingModel::new(config.embedding_dimensions))),
    }
}

async fn run_index(engine: &Engine, dir: &PathBuf, force: bool) -> Result<()> {
    if !dir.exists() {
        anyhow::bail!("directory does not exist: {:?}", dir);
    }
    let file_count = walkdir::WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .count();

    let reporter = Arc::new(Mutex::new(ProgressReporter::new(file_count)));
    let callback = ProgressReporter::as_callback(reporter.clone());

    let outcome = engine.index_all(dir, force, Some(callback)).await;
    engine.save()?;

    reporter.lock().expect("progress reporter lock poisoned").complete(outcome.symbols_indexed as usize);
    if outcome.files_failed > 0 {
        eprintln!("⚠️  {} file(s) failed to index", outcome.files_failed);
    }
    if outcome.cancelled {
        eprintln!("⚠️  indexing was cancelled before completion");
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn run_search(
    engine: &Engine,
    query: &str,
    top_k: usize,
    fast: bool,
    code_only: bool,
    kind: Option<String>,
    file_pattern: Option<String>,
    output: OutputFormatArg,
) -> Result<()> {
    let filter = if kind.is_some() || file_pattern.is_some() {
        Some(SearchFilter {
            kind: kind.as_deref().and_then(codecortex::model::SymbolKind::parse_str),
            file_pattern,
        })
    } else {
        None
    };

    let results = if fast {
        engine.search_fast(query, top_k)?
    } else if code_only {
        engine.search_code_only(query, top_k).await?
    } else {
        engine.search(query, top_k, filter).await?
    };

    OutputWriter::new(output.into()).write_results(&results)?;
    Ok(())
}

fn run_related(engine: &Engine, id: &str, edges: Option<String>, top_k: usize, output: OutputFormatArg) -> Result<()> {
    let edge_kinds = match edges {
        Some(list) => list.split(',').filter_map(|s| parse_edge_kind(s.trim())).collect(),
        None => all_edge_kinds(),
    };
    let results = engine.related(id, &edge_kinds, top_k);
    OutputWriter::new(output.into()).write_results(&results)?;
    Ok(())
}

fn parse_edge_kind(s: &str) -> Option<EdgeKind> {
    match s.to_lowercase().as_str() {
        "calls" => Some(EdgeKind::Calls),
        "called_by" => Some(EdgeKind::CalledBy),
        "overrides" => Some(EdgeKind::Overrides),
        "overridden_by" => Some(EdgeKind::OverriddenBy),
        "extends" => Some(EdgeKind::Extends),
        "subclassed_by" => Some(EdgeKind::SubclassedBy),
        "implements" => Some(EdgeKind::Implements),
        "implemented_by" => Some(EdgeKind::ImplementedBy),
        "reads_field" => Some(EdgeKind::ReadsField),
        "writes_field" => Some(EdgeKind::WritesField),
        "instantiates" => Some(EdgeKind::Instantiates),
        "uses_type" => Some(EdgeKind::UsesType),
        _ => None,
    }
}

fn all_edge_kinds() -> Vec<EdgeKind> {
    vec![
        EdgeKind::Calls,
        EdgeKind::CalledBy,
        EdgeKind::Overrides,
        EdgeKind::OverriddenBy,
        EdgeKind::Extends,
        EdgeKind::SubclassedBy,
        EdgeKind::Implements,
        EdgeKind::ImplementedBy,
        EdgeKind::ReadsField,
        EdgeKind::WritesField,
        EdgeKind::Instantiates,
        EdgeKind::UsesType,
    ]
}

/// Dual-sink logging: with a log file, info+ goes to the file and warn+ is
/// mirrored to stderr; without one, only warn+ goes to stderr (unless
/// RUST_LOG overrides).
fn init_logging(log_path: Option<&PathBuf>) -> Result<()> {
    use tracing_subscriber::fmt::writer::MakeWriterExt;

    if let Some(log_file) = log_path {
        let env_filter =
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

        let file_appender = tracing_appender::rolling::never(
            log_file.parent().unwrap_or_else(|| std::path::Path::new(".")),
            log_file.file_name().and_then(|n| n.to_str()).unwrap_or("codecortex.log"),
        );

        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(file_appender.and(std::io::stderr.with_max_level(tracing::Level::WARN)))
            .init();

        eprintln!("📝 Debug logging enabled: {:?}", log_file);
    } else {
        let env_filter =
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));

        tracing_subscriber::fmt().with_env_filter(env_filter).with_writer(std::io::stderr).init();
    }

    Ok(())
}
