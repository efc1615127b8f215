//! CLI runner - executes commands

use crate::cli::commands::{Cli, Commands, OutputFormat};
use crate::config::PipelineConfig;
use crate::error::{Error, Result, ResultExt};
use crate::pipeline::{Pipeline, RunResult};
use crate::transform::{arrow_to_json, decode_parquet};
use crate::trigger::{landed_archives, parse_notification};
use bytes::Bytes;
use serde::Serialize;
use tokio::io::AsyncReadExt;
use tracing::info;

/// CLI runner
pub struct Runner {
    cli: Cli,
}

impl Runner {
    /// Create a new runner
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Run the CLI command
    pub async fn run(&self) -> Result<()> {
        match &self.cli.command {
            Commands::Run { file_names } => self.transform(file_names).await,
            Commands::Trigger { event } => self.trigger(event).await,
            Commands::Bookmark { job } => self.bookmark(job.as_deref()).await,
            Commands::Runs { job } => self.runs(job.as_deref()).await,
            Commands::Inspect { path, limit } => self.inspect(path, *limit),
            Commands::Serve { port } => {
                let (config, pipeline) = self.open()?;
                pipeline.register(&config).await?;
                crate::cli::serve(pipeline, *port).await
            }
        }
    }

    /// Resolve the pipeline configuration from file, environment and flags
    fn load_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.cli.config {
            Some(path) => PipelineConfig::load(path)?,
            None => PipelineConfig::default().with_env_overrides(|name| std::env::var(name).ok()),
        };
        if let Some(bucket) = &self.cli.bucket {
            config.bucket.clone_from(bucket);
        }
        config.validate()?;
        Ok(config)
    }

    fn open(&self) -> Result<(PipelineConfig, Pipeline)> {
        let config = self.load_config()?;
        let pipeline = Pipeline::from_config(&config)?;
        Ok((config, pipeline))
    }

    /// Print one document in the selected format
    fn emit<T: Serialize>(&self, value: &T) -> Result<()> {
        let line = match self.cli.format {
            OutputFormat::Json => serde_json::to_string(value)?,
            OutputFormat::Pretty => serde_json::to_string_pretty(value)?,
        };
        println!("{line}");
        Ok(())
    }

    /// Print every result; fail if any run failed
    fn report(&self, results: &[RunResult]) -> Result<()> {
        for result in results {
            self.emit(result)?;
        }
        let failed = results.iter().filter(|r| !r.is_success()).count();
        if failed > 0 {
            return Err(Error::Other(format!(
                "{failed} of {} archive(s) failed",
                results.len()
            )));
        }
        Ok(())
    }

    async fn transform(&self, file_names: &[String]) -> Result<()> {
        let (config, pipeline) = self.open()?;
        pipeline.register(&config).await?;
        let results = pipeline.run_all(file_names).await;
        self.report(&results)
    }

    async fn trigger(&self, event: &str) -> Result<()> {
        let body = if event == "-" {
            let mut buf = Vec::new();
            tokio::io::stdin().read_to_end(&mut buf).await?;
            buf
        } else {
            tokio::fs::read(event).await.map_err(|e| {
                Error::config(format!("Failed to read notification '{event}': {e}"))
            })?
        };

        let (config, pipeline) = self.open()?;
        let archives = landed_archives(&parse_notification(&body)?, pipeline.fetcher().landing_dir());
        info!(archives = archives.len(), "Parsed notification");
        if archives.is_empty() {
            return Ok(());
        }

        pipeline.register(&config).await?;
        let file_names: Vec<String> = archives.into_iter().map(|a| a.file_name).collect();
        let results = pipeline.run_all(&file_names).await;
        self.report(&results)
    }

    async fn bookmark(&self, job: Option<&str>) -> Result<()> {
        let (_, pipeline) = self.open()?;
        let job_id = job.unwrap_or(pipeline.job_id());
        let bookmark = pipeline.bookmarks().get_bookmark(job_id).await?;
        self.emit(&bookmark)
    }

    async fn runs(&self, job: Option<&str>) -> Result<()> {
        let (_, pipeline) = self.open()?;
        let job_id = job.unwrap_or(pipeline.job_id());
        for run in pipeline.bookmarks().list_runs(job_id).await? {
            self.emit(&run)?;
        }
        Ok(())
    }

    fn inspect(&self, path: &std::path::Path, limit: Option<usize>) -> Result<()> {
        let data = std::fs::read(path)
            .with_context(|| format!("Failed to read '{}'", path.display()))?;
        let mut remaining = limit.unwrap_or(usize::MAX);
        for batch in decode_parquet(Bytes::from(data))? {
            for record in arrow_to_json(&batch)? {
                if remaining == 0 {
                    return Ok(());
                }
                self.emit(&record)?;
                remaining -= 1;
            }
        }
        Ok(())
    }
}
