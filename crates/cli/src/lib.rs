use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use embedload_indexer::{
    effective_workers, ensure_collection, plan_batches, replace_index, require_collection,
    worker_count_from_env, BatchInsertError, BatchRange, IndexReplaceReport, IngestConfig, IngestPipeline,
    IngestReport, SetupMode, DEFAULT_BATCH_SIZE,
};
use embedload_search::{
    BatchedSearcher, SearchConfig, SearchReport, DEFAULT_SEARCH_BATCH_SIZE, DEFAULT_TOP_K,
};
use embedload_vector_store::{
    Connector, IndexParams, IndexSpec, IndexType, MetricType, MilvusRestBackend, SearchParams,
    DEFAULT_MAX_RETRIES, DEFAULT_NLIST, DEFAULT_NPROBE,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

mod config;
mod input;
mod output;

use config::ConnectionFlags;
use output::{print_stdout, write_json_atomic};

const DEFAULT_COLLECTION: &str = "SOICT";

#[derive(Parser)]
#[command(name = "embedload")]
#[command(about = "Bulk-load embeddings into a vector store and search them", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors
    #[arg(long, global = true)]
    quiet: bool,

    /// Print the run summary as JSON on stdout (implies --quiet)
    #[arg(long, global = true)]
    json: bool,

    /// Store host (overrides EMBEDLOAD_HOST, default localhost)
    #[arg(long, global = true)]
    host: Option<String>,

    /// Store port (overrides EMBEDLOAD_PORT, default 19530)
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Connection attempts before giving up
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_RETRIES)]
    retries: u32,

    /// Pause between connection attempts
    #[arg(long, global = true, default_value_t = 5)]
    retry_delay_secs: u64,

    /// Per-request timeout
    #[arg(long, global = true, default_value_t = 30)]
    timeout_secs: u64,

    /// Database to address on the server
    #[arg(long, global = true)]
    database: Option<String>,

    /// Connection alias for the main session
    #[arg(long, global = true, default_value = "default")]
    alias: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Load embeddings and ids, insert them in parallel batches, then build the index
    Insert(InsertArgs),

    /// Release, drop, recreate and load a collection's vector index
    #[command(name = "replace-index")]
    ReplaceIndex(ReplaceIndexArgs),

    /// Search query embeddings and aggregate hits to parent ids
    Search(SearchArgs),

    /// Print the batch plan for a dataset size without connecting
    Plan(PlanArgs),
}

#[derive(Args)]
struct InsertArgs {
    /// Embedding matrix (.npy, N×D)
    #[arg(long)]
    embeddings: PathBuf,

    /// CSV table with one id per embedding row
    #[arg(long)]
    ids: PathBuf,

    /// Zero-based column of the id in the id table
    #[arg(long, default_value_t = input::DEFAULT_ID_COLUMN)]
    id_column: usize,

    #[arg(long, default_value = DEFAULT_COLLECTION)]
    collection: String,

    /// Keep an existing collection instead of recreating it
    #[arg(long)]
    keep: bool,

    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Concurrent insert workers (overrides EMBEDLOAD_WORKERS)
    #[arg(long)]
    workers: Option<usize>,

    /// Skip the index rebuild after inserting
    #[arg(long)]
    skip_index: bool,
}

#[derive(Args)]
struct IndexFlags {
    #[arg(long, default_value = "ivf-flat", value_parser = parse_index_type)]
    index_type: IndexType,

    #[arg(long, default_value = "cosine", value_parser = parse_metric)]
    metric: MetricType,

    #[arg(long, default_value_t = DEFAULT_NLIST)]
    nlist: u32,

    /// HNSW max degree
    #[arg(long)]
    m: Option<u32>,

    /// HNSW build-time candidate list size
    #[arg(long)]
    ef_construction: Option<u32>,
}

impl IndexFlags {
    fn spec(&self) -> IndexSpec {
        IndexSpec {
            index_type: self.index_type,
            metric: self.metric,
            params: IndexParams {
                nlist: self.nlist,
                m: self.m,
                ef_construction: self.ef_construction,
            },
        }
    }
}

#[derive(Args)]
struct ReplaceIndexArgs {
    #[arg(long, default_value = DEFAULT_COLLECTION)]
    collection: String,

    #[command(flatten)]
    index: IndexFlags,
}

#[derive(Args)]
struct SearchArgs {
    /// Query embedding matrix (.npy, N×D)
    #[arg(long)]
    queries: PathBuf,

    /// CSV table mapping chunk ids to parent ids
    #[arg(long)]
    parents: PathBuf,

    #[arg(long, default_value = input::DEFAULT_CHUNK_COLUMN)]
    chunk_column: String,

    #[arg(long, default_value = input::DEFAULT_PARENT_COLUMN)]
    parent_column: String,

    /// Where to write the JSON results
    #[arg(long, short, default_value = "results.json")]
    output: PathBuf,

    #[arg(long, default_value = DEFAULT_COLLECTION)]
    collection: String,

    #[arg(long, default_value_t = DEFAULT_TOP_K)]
    top_k: usize,

    /// Queries per search call
    #[arg(long, default_value_t = DEFAULT_SEARCH_BATCH_SIZE)]
    batch_size: usize,

    #[arg(long, default_value = "cosine", value_parser = parse_metric)]
    metric: MetricType,

    #[arg(long, default_value_t = DEFAULT_NPROBE)]
    nprobe: u32,

    /// HNSW search-time candidate list size
    #[arg(long)]
    ef: Option<u32>,
}

#[derive(Args)]
struct PlanArgs {
    /// Number of rows in the dataset
    #[arg(long)]
    rows: usize,

    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Concurrent insert workers (overrides EMBEDLOAD_WORKERS)
    #[arg(long)]
    workers: Option<usize>,
}

fn parse_index_type(raw: &str) -> std::result::Result<IndexType, String> {
    IndexType::parse(raw).ok_or_else(|| {
        format!("unknown index type {raw:?} (expected flat, ivf-flat, ivf-sq8, ivf-pq or hnsw)")
    })
}

fn parse_metric(raw: &str) -> std::result::Result<MetricType, String> {
    MetricType::parse(raw).ok_or_else(|| format!("unknown metric {raw:?} (expected l2, ip or cosine)"))
}

#[derive(Serialize)]
struct InsertSummary {
    collection: String,
    ingest: IngestReport,
    failed_batches: Vec<BatchRange>,
    index: Option<IndexReplaceReport>,
}

#[derive(Serialize)]
struct SearchSummary {
    #[serde(flatten)]
    report: SearchReport,
    output: PathBuf,
}

#[derive(Serialize)]
struct PlanSummary {
    rows: usize,
    batch_size: usize,
    workers: usize,
    batches: Vec<BatchRange>,
}

struct RunContext {
    connector: Connector,
    alias: String,
    json: bool,
}

pub async fn main_entry() -> Result<()> {
    let mut cli = Cli::parse();
    if cli.json {
        cli.quiet = true;
    }

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    if let Commands::Plan(args) = &cli.command {
        return run_plan(args);
    }

    let config = config::connection_config(ConnectionFlags {
        host: cli.host.clone(),
        port: cli.port,
        retries: cli.retries,
        retry_delay_secs: cli.retry_delay_secs,
        timeout_secs: cli.timeout_secs,
    })?;
    let backend = match &cli.database {
        Some(db) => MilvusRestBackend::new().with_database(db.clone()),
        None => MilvusRestBackend::new(),
    };
    let ctx = RunContext {
        connector: Connector::new(Arc::new(backend), config),
        alias: cli.alias.clone(),
        json: cli.json,
    };

    match cli.command {
        Commands::Insert(args) => run_insert(&ctx, args).await,
        Commands::ReplaceIndex(args) => run_replace_index(&ctx, args).await,
        Commands::Search(args) => run_search(&ctx, args).await,
        Commands::Plan(_) => Ok(()),
    }
}

async fn run_insert(ctx: &RunContext, args: InsertArgs) -> Result<()> {
    let embeddings = input::load_embeddings(&args.embeddings)?;
    let (vectors, dimension) = (embeddings.rows, embeddings.dimension);
    let ids = input::load_ids(&args.ids, args.id_column)?;
    if ids.len() != vectors.len() {
        bail!(
            "{} has {} ids but {} has {} embeddings",
            args.ids.display(),
            ids.len(),
            args.embeddings.display(),
            vectors.len()
        );
    }
    let mode = if args.keep {
        SetupMode::Reuse
    } else {
        SetupMode::Recreate
    };

    {
        let setup = ctx.connector.open(&ctx.alias).await?;
        ensure_collection(&*setup, &args.collection, dimension, mode).await?;
    }

    let config = IngestConfig {
        batch_size: args.batch_size,
        workers: args.workers.unwrap_or_else(worker_count_from_env),
    };
    let pipeline = IngestPipeline::new(ctx.connector.clone(), config);
    let outcome = pipeline.ingest(&args.collection, &ids, &vectors).await?;

    if !ctx.json {
        eprintln!(
            "Inserted {}/{} batches successfully",
            outcome.report.success_count, outcome.report.total_batches
        );
        for failure in &outcome.failures {
            eprintln!("  {failure}");
        }
    }

    // Committed batches stay in the store either way, so index them regardless.
    let index: Result<Option<IndexReplaceReport>> = async {
        if args.skip_index {
            return Ok(None);
        }
        let conn = ctx.connector.open(&ctx.alias).await?;
        let report = replace_index(&*conn, &args.collection, &IndexSpec::default()).await?;
        Ok::<_, anyhow::Error>(Some(report))
    }
    .await;

    if ctx.json {
        let summary = InsertSummary {
            collection: args.collection.clone(),
            ingest: outcome.report.clone(),
            failed_batches: outcome.failures.iter().map(|f| f.range).collect(),
            index: index.as_ref().ok().cloned().flatten(),
        };
        print_stdout(&serde_json::to_string_pretty(&summary)?)?;
    }

    finish_insert(outcome.into_result().map(drop), index.map(drop))
}

/// Exit status of an insert run; an index failure keeps the batch failures in its context.
fn finish_insert(
    ingest: std::result::Result<(), BatchInsertError>,
    index: Result<()>,
) -> Result<()> {
    match (ingest, index) {
        (Ok(()), index) => index,
        (Err(batches), Ok(())) => Err(batches.into()),
        (Err(batches), Err(index)) => Err(index.context(format!(
            "index replacement failed after a partial insert ({batches})"
        ))),
    }
}

async fn run_replace_index(ctx: &RunContext, args: ReplaceIndexArgs) -> Result<()> {
    let spec = args.index.spec();
    let started = Instant::now();
    let report = ctx
        .connector
        .with_connection(&ctx.alias, |conn| async move {
            require_collection(&*conn, &args.collection).await?;
            replace_index(&*conn, &args.collection, &spec).await
        })
        .await?;

    if ctx.json {
        print_stdout(&serde_json::to_string_pretty(&report)?)?;
    } else {
        eprintln!(
            "Replaced index on '{}' with {spec} in {:.2}s",
            report.collection,
            started.elapsed().as_secs_f64()
        );
    }
    Ok(())
}

async fn run_search(ctx: &RunContext, args: SearchArgs) -> Result<()> {
    let queries = input::load_embeddings(&args.queries)?.rows;
    let mapping = input::load_parent_mapping(&args.parents, &args.chunk_column, &args.parent_column)?;

    let searcher = BatchedSearcher::new(SearchConfig {
        top_k: args.top_k,
        batch_size: args.batch_size,
        params: SearchParams {
            metric: args.metric,
            nprobe: args.nprobe,
            ef: args.ef,
        },
    });
    let run = searcher
        .run(&ctx.connector, &ctx.alias, &args.collection, &queries, &mapping)
        .await?;

    write_json_atomic(&args.output, &run.results)
        .with_context(|| format!("Failed to write results to {}", args.output.display()))?;

    if ctx.json {
        let summary = SearchSummary {
            report: run.report,
            output: args.output,
        };
        print_stdout(&serde_json::to_string_pretty(&summary)?)?;
    } else {
        eprintln!(
            "Total queries processed: {} (results in {})",
            run.report.total_queries,
            args.output.display()
        );
    }
    Ok(())
}

fn run_plan(args: &PlanArgs) -> Result<()> {
    if args.batch_size == 0 {
        bail!("--batch-size must be positive");
    }
    let batches = plan_batches(args.rows, args.batch_size);
    let requested = args.workers.unwrap_or_else(worker_count_from_env);
    let summary = PlanSummary {
        rows: args.rows,
        batch_size: args.batch_size,
        workers: effective_workers(requested, batches.len()),
        batches,
    };
    print_stdout(&serde_json::to_string_pretty(&summary)?)
}
