use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

use outbreak_watch::config::PipelineConfig;
use outbreak_watch::db::{self, PgStore};
use outbreak_watch::pipeline::Pipeline;
use outbreak_watch::poller::Poller;
use outbreak_watch::predictor::Predictor;
use outbreak_watch::store::Store;
use outbreak_watch::{dispatch, error, intake, models, normalize, outbreak, report};

#[derive(Parser)]
#[command(name = "outbreak-watch")]
#[command(about = "Pairs symptom and water-quality reports and tracks predicted outbreaks", long_about = None)]
struct Cli {
    #[command(flatten)]
    config: PipelineConfig,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load demo water readings for the known districts
    Seed,
    /// Import water readings from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Submit one JSON report payload and process it immediately
    Submit {
        #[arg(long)]
        file: PathBuf,
    },
    /// Predict directly from a flat JSON payload
    Predict {
        #[arg(long)]
        file: PathBuf,
    },
    /// Run the reconciliation poller until interrupted
    Serve,
    /// Print per-disease prediction counts and outbreak flags
    Outbreak {
        #[arg(long)]
        json: bool,
    },
    /// List the most recent predictions
    Predictions {
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// List the most recent water reports
    WaterReports {
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// Generate a markdown outbreak report
    Report {
        #[arg(long, default_value = "outbreak-report.md")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;
    let store: Arc<dyn Store> = Arc::new(PgStore::new(pool.clone()));

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let inserted = db::seed(store.as_ref()).await?;
            println!("Inserted {inserted} demo water reports.");
        }
        Commands::Import { csv } => {
            let pipeline = Pipeline::new(store.clone(), Predictor::load(&cli.config.model_path));
            let reports = db::import_csv(store.as_ref(), &csv).await?;
            let pending: Vec<_> = reports
                .iter()
                .filter_map(|report| report.location.clone())
                .map(|location| dispatch::on_water_saved(&pipeline, location))
                .collect();
            for handle in pending {
                let _ = handle.await;
            }
            println!("Imported {} water reports from {}.", reports.len(), csv.display());
        }
        Commands::Submit { file } => {
            let payload = read_json(&file)?;
            let pipeline = Pipeline::new(store.clone(), Predictor::load(&cli.config.model_path));
            let receipt = intake::submit(&pipeline, &payload).await?.wait().await;
            println!("{}", serde_json::to_string_pretty(&receipt)?);
        }
        Commands::Predict { file } => {
            let payload = read_json(&file)?;
            store.insert_raw_report(&payload).await?;
            let pipeline = Pipeline::new(store.clone(), Predictor::load(&cli.config.model_path));
            if !pipeline.predictor().is_ready() {
                anyhow::bail!(error::PipelineError::ModelUnavailable);
            }
            let object = payload
                .as_object()
                .context("prediction payload must be a JSON object")?;
            let water = normalize::water_report(object);
            let symptoms = normalize::symptom_report(object);
            let prediction = pipeline
                .predict_direct(
                    symptoms.location.clone(),
                    models::WaterAttributes {
                        readings: water.readings,
                        primary_water_source: water.primary_water_source,
                        district: water.district,
                    },
                    models::SymptomAttributes {
                        symptoms: symptoms.symptoms,
                        district: symptoms.district,
                    },
                )
                .await?;
            println!("{}", serde_json::to_string_pretty(&prediction)?);
        }
        Commands::Serve => {
            let pipeline = Pipeline::new(store.clone(), Predictor::load(&cli.config.model_path));
            if !pipeline.predictor().is_ready() {
                warn!("Model unavailable; poller will retry reports but cannot predict");
            }
            info!(
                threshold = cli.config.outbreak_threshold,
                "Starting outbreak-watch worker"
            );
            Poller::new(pipeline, cli.config.poll_interval()).run().await;
        }
        Commands::Outbreak { json } => {
            let summary = outbreak::summarize(store.as_ref(), cli.config.outbreak_threshold).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
                return Ok(());
            }
            if summary.results.is_empty() {
                println!("No predictions recorded yet.");
                return Ok(());
            }
            println!("Predicted diseases (threshold {}):", summary.threshold);
            for result in summary.results.iter() {
                println!(
                    "- {}: {} predictions{}",
                    result.disease,
                    result.count,
                    if result.outbreak { " [OUTBREAK]" } else { "" }
                );
            }
        }
        Commands::Predictions { limit } => {
            let predictions = store.recent_predictions(limit).await?;
            println!("{}", serde_json::to_string_pretty(&predictions)?);
        }
        Commands::WaterReports { limit } => {
            let reports = store.recent_water_reports(limit).await?;
            println!("{}", serde_json::to_string_pretty(&reports)?);
        }
        Commands::Report { out } => {
            let summary = outbreak::summarize(store.as_ref(), cli.config.outbreak_threshold).await?;
            let recent = store.recent_predictions(200).await?;
            let report = report::build_report(chrono::Utc::now(), &summary, &recent);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

fn read_json(path: &std::path::Path) -> anyhow::Result<serde_json::Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("{} is not valid JSON", path.display()))
}
