use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tome_catalog::{Database, Repository, RetryPolicy};
use tome_config::Config;
use tome_jobs::{JobQueue, PoolConfig};
use tome_library::naming::{DEFAULT_FILE_TEMPLATE, DEFAULT_FOLDER_TEMPLATE};
use tome_library::{Context, LocalMounter, NameGenerator, Priority, ScanOptions};

/// Turn an error tree into a report, keeping every level of it.
pub fn report(err: impl Debug) -> miette::Report {
    miette::miette!("{err:?}")
}

/// Everything a command needs, wired up from the configuration.
pub struct App {
    pub config: Config,
    pub db: Database,
    pub repo: Repository,
    pub ctx: Arc<Context>,
    pub queue: JobQueue,
}
impl App {
    pub async fn open(config: Config) -> miette::Result<Self> {
        let path = config.database_path().map_err(report)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|err| miette::miette!("could not create {}: {err}", parent.display()))?;
        }
        tracing::debug!(path = %path.display(), "opening catalog");
        let db = Database::connect(&path).await.map_err(report)?;
        let retry = &config.retry;
        let repo = Repository::from(&db).with_retry(RetryPolicy {
            max_attempts: retry.max_attempts,
            base_delay: Duration::from_millis(retry.base_delay_ms),
            max_delay: Duration::from_millis(retry.max_delay_ms),
        });
        let ctx = Arc::new(context(&config, repo.clone())?);
        let queue = JobQueue::new(repo.clone());
        Ok(Self {
            config,
            db,
            repo,
            ctx,
            queue,
        })
    }

    pub fn pool_config(&self) -> PoolConfig {
        let workers = &self.config.workers;
        PoolConfig {
            workers: workers.count,
            poll_interval: workers.poll_interval(),
            max_job_attempts: workers.max_job_attempts,
        }
    }
}

fn context(config: &Config, repo: Repository) -> miette::Result<Context> {
    let organize = &config.organize;
    let mut naming = NameGenerator::new(
        organize.folder_template.as_deref().unwrap_or(DEFAULT_FOLDER_TEMPLATE),
        organize.file_template.as_deref().unwrap_or(DEFAULT_FILE_TEMPLATE),
    )
    .map_err(report)?;
    if let Some(max_length) = organize.max_component_length {
        naming = naming.with_max_length(max_length);
    }

    let defaults = ScanOptions::default();
    let scan = ScanOptions {
        ignore_names: config.scan.ignore_names.clone().unwrap_or(defaults.ignore_names),
        supplement_extensions: config.scan.supplement_extensions.clone().unwrap_or(defaults.supplement_extensions),
        parse_concurrency: config.scan.parse_concurrency.unwrap_or(defaults.parse_concurrency),
    };

    let mut ctx = Context::new(repo, Arc::new(LocalMounter))
        .map_err(report)?
        .with_priority(Priority::new(&config.metadata.priority).map_err(report)?)
        .with_naming(naming)
        .with_scan_options(scan)
        .with_sidecars(config.metadata.write_sidecars);
    if let Some(attempts) = organize.max_collision_attempts {
        ctx = ctx.with_max_collisions(attempts);
    }
    Ok(ctx)
}
