use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use tracing_subscriber::EnvFilter;

use catalog_common::Config;
use catalog_reconciler::liveness::HttpLivenessProbe;
use catalog_reconciler::pipeline::{CertificationPipeline, LivenessPipeline};
use catalog_reconciler::scheduling::{run_on_schedule, CronSchedule};
use catalog_reconciler::scoring::{CERTIFICATION_POLICY, LIVENESS_POLICY};
use catalog_reconciler::store::PgStore;
use registry_client::RegistryClient;

#[derive(Parser)]
#[command(name = "reconciler", about = "Scheduled catalog reconciliation jobs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one pipeline once and exit.
    Run {
        #[arg(value_enum)]
        pipeline: PipelineKind,
    },
    /// Run both pipelines on their cron schedules until interrupted.
    Serve,
    /// Create the catalog tables if they do not exist.
    Migrate,
    /// Print the most recent run logs of one pipeline.
    Logs {
        #[arg(value_enum)]
        pipeline: PipelineKind,
        #[arg(long, default_value_t = 10)]
        limit: u32,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum PipelineKind {
    Certification,
    Liveness,
}

impl PipelineKind {
    fn scraper_name(self) -> &'static str {
        match self {
            Self::Certification => CERTIFICATION_POLICY.scraper_name,
            Self::Liveness => LIVENESS_POLICY.scraper_name,
        }
    }
}

fn certification_pipeline(config: &Config, store: &PgStore) -> Result<CertificationPipeline> {
    let registry = RegistryClient::new(
        &config.registry_base_url,
        &config.registry_search_url,
        config.registry_timeout,
    )?;
    let store = Arc::new(store.clone());
    Ok(CertificationPipeline::builder()
        .source(Arc::new(registry))
        .entities(store.clone())
        .proposals(store.clone())
        .run_logs(store)
        .delay(config.certification_delay)
        .commit_batch_size(config.commit_batch_size)
        .build())
}

fn liveness_pipeline(config: &Config, store: &PgStore) -> Result<LivenessPipeline> {
    let probe = HttpLivenessProbe::new(&config.probe_user_agent, config.probe_timeout)?;
    let store = Arc::new(store.clone());
    Ok(LivenessPipeline::builder()
        .probe(Arc::new(probe))
        .entities(store.clone())
        .proposals(store.clone())
        .run_logs(store)
        .delay(config.liveness_delay)
        .commit_batch_size(config.commit_batch_size)
        .build())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("catalog=info".parse()?)
                .add_directive("registry_client=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let config = Config::from_env()?;
    config.log_redacted();

    let pool = PgPoolOptions::new()
        .max_connections(4)
        .connect(&config.database_url)
        .await?;
    let store = PgStore::new(pool);

    match cli.command {
        Command::Migrate => store.migrate().await?,
        Command::Logs { pipeline, limit } => {
            for record in store.recent_run_logs(pipeline.scraper_name(), limit).await? {
                println!("{} {record}", record.timestamp.format("%Y-%m-%d %H:%M:%S UTC"));
                for error in &record.errors {
                    println!("    {error}");
                }
            }
        }
        Command::Run { pipeline } => {
            let report = match pipeline {
                PipelineKind::Certification => certification_pipeline(&config, &store)?.run().await?,
                PipelineKind::Liveness => liveness_pipeline(&config, &store)?.run().await?,
            };
            info!("Run complete. {report}");
        }
        Command::Serve => {
            let certification_schedule =
                CronSchedule::parse(&config.certification_cron, &config.schedule_timezone)?;
            let liveness_schedule =
                CronSchedule::parse(&config.liveness_cron, &config.schedule_timezone)?;
            info!(
                certification = %certification_schedule,
                liveness = %liveness_schedule,
                "Scheduler starting"
            );

            let certification = Arc::new(certification_pipeline(&config, &store)?);
            let liveness = Arc::new(liveness_pipeline(&config, &store)?);

            let certification_loop = tokio::spawn(async move {
                run_on_schedule("certification", certification_schedule, || {
                    let pipeline = certification.clone();
                    async move { pipeline.run().await }
                })
                .await
            });
            let liveness_loop = tokio::spawn(async move {
                run_on_schedule("liveness", liveness_schedule, || {
                    let pipeline = liveness.clone();
                    async move { pipeline.run().await }
                })
                .await
            });

            tokio::select! {
                result = certification_loop => result??,
                result = liveness_loop => result??,
                _ = tokio::signal::ctrl_c() => info!("Shutdown requested"),
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logs_command_targets_the_pipeline_run_log() {
        let cli = Cli::try_parse_from(["reconciler", "logs", "liveness", "--limit", "5"]).unwrap();
        let Command::Logs { pipeline, limit } = cli.command else {
            panic!("expected logs command");
        };
        assert_eq!(pipeline.scraper_name(), "social_liveness");
        assert_eq!(limit, 5);

        let cli = Cli::try_parse_from(["reconciler", "logs", "certification"]).unwrap();
        let Command::Logs { pipeline, limit } = cli.command else {
            panic!("expected logs command");
        };
        assert_eq!(pipeline.scraper_name(), "halal_certification");
        assert_eq!(limit, 10);
    }
}
