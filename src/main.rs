use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing_subscriber::EnvFilter;

use scholarship_match::db;
use scholarship_match::eligibility::check_eligibility;
use scholarship_match::models::{ModelScope, TrainedModel};
use scholarship_match::prediction::PredictionService;
use scholarship_match::report;
use scholarship_match::store::{ActiveModelCache, InMemoryModelStore};
use scholarship_match::training::{TrainingConfig, TrainingEngine};

#[derive(Parser)]
#[command(name = "scholarship-match")]
#[command(about = "Scholarship matching and approval prediction engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import historical application outcomes from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Check an applicant's eligibility for a scholarship
    Check {
        #[arg(long)]
        email: String,
        #[arg(long)]
        scholarship: String,
    },
    /// Train the global model across all scholarships
    TrainGlobal {
        #[arg(long, default_value_t = 42)]
        seed: u64,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Train a scholarship-specific model
    TrainScholarship {
        #[arg(long)]
        scholarship: String,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Predict an applicant's approval probability for a scholarship
    Predict {
        #[arg(long)]
        email: String,
        #[arg(long)]
        scholarship: String,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Deactivate the active model for a scope ("global" or a scholarship code)
    Deactivate {
        #[arg(long)]
        scope: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let inserted = db::import_csv(&pool, &csv).await?;
            println!("Inserted {inserted} applications from {}.", csv.display());
        }
        Commands::Check { email, scholarship } => {
            let profile = db::fetch_applicant(&pool, &email).await?;
            let criteria = db::fetch_scholarship(&pool, &scholarship).await?;
            let result = check_eligibility(&profile, &criteria);

            println!(
                "{}: {} (score {})",
                criteria.name,
                if result.passed { "ELIGIBLE" } else { "NOT ELIGIBLE" },
                result.score
            );
            for check in &result.checks {
                println!(
                    "- [{}] {}: {} vs {}",
                    if check.passed { "ok" } else { "FAIL" },
                    check.name,
                    check.applicant_value,
                    check.required_value
                );
                if let Some(error) = &check.error {
                    println!("  condition error: {error}");
                }
            }
        }
        Commands::TrainGlobal { seed, out } => {
            let outcomes = db::fetch_outcomes(&pool, None).await?;
            let criteria_map: HashMap<_, _> = db::fetch_scholarships(&pool)
                .await?
                .into_iter()
                .map(|c| (c.scholarship_id, c))
                .collect();

            let engine = TrainingEngine::new(TrainingConfig {
                seed,
                ..Default::default()
            });
            let model = engine.train_global(&outcomes, &criteria_map)?;
            finish_training(&pool, model, out).await?;
        }
        Commands::TrainScholarship {
            scholarship,
            seed,
            out,
        } => {
            let criteria = db::fetch_scholarship(&pool, &scholarship).await?;
            let outcomes = db::fetch_outcomes(&pool, Some(criteria.scholarship_id)).await?;

            let engine = TrainingEngine::new(TrainingConfig {
                seed,
                ..Default::default()
            });
            let model =
                engine.train_for_scholarship(criteria.scholarship_id, &criteria, &outcomes)?;
            finish_training(&pool, model, out).await?;
        }
        Commands::Predict {
            email,
            scholarship,
            out,
        } => {
            let profile = db::fetch_applicant(&pool, &email).await?;
            let criteria = db::fetch_scholarship(&pool, &scholarship).await?;
            let history = db::fetch_history(&pool, profile.applicant_id).await?;

            let cache = ActiveModelCache::new(InMemoryModelStore::new());
            let scope = ModelScope::Scholarship(criteria.scholarship_id);
            if let Some(model) = db::fetch_active_model(&pool, scope).await? {
                cache.activate(model);
            }
            if let Some(model) = db::fetch_active_model(&pool, ModelScope::Global).await? {
                cache.activate(model);
            }

            let service = PredictionService::new(&cache);
            let result = service.predict(&profile, &criteria, &history)?;

            println!(
                "{}: {:.1}% approval probability ({}, {} confidence, {} model)",
                criteria.name,
                result.probability * 100.0,
                result.recommendation.as_str(),
                result.confidence.as_str(),
                result.model_scope
            );
            println!(
                "Eligibility: {} (score {})",
                if result.eligibility.passed { "passed" } else { "not eligible" },
                result.eligibility.score
            );
            for factor in result.contributions.iter().take(5) {
                println!(
                    "- {}: {:+.4} (value {:.2}, weight {:+.2})",
                    factor.feature, factor.contribution, factor.value, factor.weight
                );
            }

            if let Some(out) = out {
                let report = report::build_prediction_report(&criteria.name, &result);
                std::fs::write(&out, report)?;
                println!("Report written to {}.", out.display());
            }
        }
        Commands::Deactivate { scope } => {
            let scope = if scope == "global" {
                ModelScope::Global
            } else {
                let criteria = db::fetch_scholarship(&pool, &scope).await?;
                ModelScope::Scholarship(criteria.scholarship_id)
            };
            let count = db::deactivate_models(&pool, scope).await?;
            if count == 0 {
                println!("No active model for {scope}.");
            } else {
                println!("Deactivated {count} model(s) for {scope}.");
            }
        }
    }

    Ok(())
}

async fn finish_training(
    pool: &PgPool,
    model: TrainedModel,
    out: Option<PathBuf>,
) -> anyhow::Result<()> {
    db::save_model(pool, &model).await?;
    println!(
        "Trained {} model {} on {} samples: accuracy {:.3} (±{:.3}), F1 {:.3}. Now active.",
        model.scope,
        model.id,
        model.stats.sample_count,
        model.metrics.accuracy,
        model.metrics.accuracy_std,
        model.metrics.f1
    );

    if let Some(out) = out {
        let report = report::build_training_report(&model);
        std::fs::write(&out, report)?;
        println!("Report written to {}.", out.display());
    }
    Ok(())
}
