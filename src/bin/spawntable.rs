use anyhow::Result;
use clap::Parser;
use spawntable::compute::subprocess::SubprocessEngine;
use spawntable::config::{DEFAULT_FAILURE_LOG, DEFAULT_TMP_ROOT, DEFAULT_WORKERS, SpawnerConfig, bucket_for_dataset};
use spawntable::runtime::dispatcher::Dispatcher;
use spawntable::runtime::failure_log::FailureLog;
use spawntable::runtime::loader::load_task_list;
use spawntable::runtime::pipeline::TaskPipeline;
use spawntable::storage::http::{DEFAULT_STORAGE_HOST, HttpObjectStore};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Compute spawn tables for every task in a dataset's task list", long_about = None)]
struct Args {
    /// Dataset id (1 = e2198_compressed, 11 = zfish)
    #[arg(long, default_value_t = 11)]
    dataset: u32,

    /// Number of concurrent workers
    #[arg(long, default_value_t = DEFAULT_WORKERS)]
    workers: usize,

    /// Root directory of the artifact cache
    #[arg(long, default_value = DEFAULT_TMP_ROOT)]
    tmp_root: PathBuf,

    /// Object storage host
    #[arg(long, default_value = DEFAULT_STORAGE_HOST)]
    storage_host: String,

    /// Task list file (defaults to <tmp-root>/<bucket>.tasks)
    #[arg(long)]
    tasks: Option<PathBuf>,

    /// Where failed tasks are appended
    #[arg(long, default_value = DEFAULT_FAILURE_LOG)]
    failure_log: PathBuf,

    /// Spawn table engine executable
    #[arg(long)]
    engine: PathBuf,

    /// Extra arguments passed to the engine
    #[arg(long = "engine-arg")]
    engine_args: Vec<String>,

    /// Retry failed uploads with the download backoff policy
    #[arg(long)]
    publish_retry: bool,

    /// Skip tasks whose spawn table already exists
    #[arg(long)]
    skip_existing: bool,

    /// Bearer token for uploads
    #[arg(long, env = "STORAGE_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    // 1. Resolve configuration
    let bucket = bucket_for_dataset(args.dataset)?;
    let config = SpawnerConfig::default()
        .with_tmp_root(&args.tmp_root)
        .with_storage_host(&args.storage_host)
        .with_workers(args.workers)
        .with_publish_retry(args.publish_retry)
        .with_skip_existing(args.skip_existing);
    config.validate()?;

    // 2. Load tasks
    info!("Loading tasks...");
    let task_file = args.tasks.clone().unwrap_or_else(|| config.task_list_path(bucket));
    let pairs = load_task_list(&task_file)?;

    // 3. Wire storage, engine and failure log
    let mut store = HttpObjectStore::new(&config.storage_host);
    if let Some(token) = &args.access_token {
        store = store.with_access_token(token);
    }
    let engine = SubprocessEngine::new(&args.engine).with_args(args.engine_args.clone());
    let failures = Arc::new(FailureLog::open(&args.failure_log).await?);
    let pipeline = TaskPipeline::from_config(&config, Arc::new(store), Arc::new(engine), failures.clone());

    // 4. Run the batch
    let dispatcher = Dispatcher::new(Arc::new(pipeline), config.workers, config.queue_capacity);
    let report = dispatcher.run(bucket, pairs).await?;

    if report.failed > 0 {
        info!(
            failed = report.failed,
            log = %args.failure_log.display(),
            run_id = %failures.run_id(),
            "some tasks failed, see failure log"
        );
    }
    Ok(())
}
