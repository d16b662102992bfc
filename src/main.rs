use anyhow::Context;
use clap::{Parser, Subcommand};
use songplay_warehouse::config::Settings;
use songplay_warehouse::ingestion::LocalJsonLoader;
use songplay_warehouse::orchestrator::{render_sql_script, Orchestrator, RunSummary};
use songplay_warehouse::resolution::ResolverOptions;
use songplay_warehouse::schema::Dialect;
use songplay_warehouse::warehouse::{SqliteWarehouse, TransactionalExecutor};
use songplay_warehouse::{logging, metrics};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "songplay_warehouse")]
#[command(about = "Stage song and listening-event logs and load the songplay star schema")]
#[command(version = "0.1.0")]
struct Cli {
    /// Settings file with CLUSTER, S3 and IAM_ROLE groups
    #[arg(long, default_value = "dwh.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drop and recreate every staging and star-schema table
    CreateTables,
    /// Load raw staging, resolve artists and fill the star schema
    Etl {
        /// Null out longitude for shared-name and shared-id artists, as the legacy queries did
        #[arg(long)]
        drop_ambiguous_longitude: bool,
    },
    /// create-tables followed by etl
    Run {
        #[arg(long)]
        drop_ambiguous_longitude: bool,
    },
    /// Print the table DDL and raw COPY statements
    Sql {
        /// sqlite or redshift
        #[arg(long, default_value = "redshift")]
        dialect: String,
    },
}

fn load_settings(path: &Path) -> anyhow::Result<Settings> {
    let mut settings = Settings::load(path).with_context(|| format!("loading {}", path.display()))?;
    settings.apply_env_overrides(|key| std::env::var(key).ok())?;
    Ok(settings)
}

fn orchestrator(settings: Settings, drop_ambiguous_longitude: bool) -> anyhow::Result<Orchestrator> {
    let path = settings.database_path();
    let warehouse: Arc<dyn TransactionalExecutor> = Arc::new(SqliteWarehouse::open(&path)?);
    let loader = Arc::new(LocalJsonLoader::new(warehouse.clone()));
    Ok(Orchestrator::new(warehouse, loader, settings).with_resolver_options(ResolverOptions {
        drop_ambiguous_longitude,
    }))
}

fn print_summary(summary: &RunSummary) {
    println!("\n📊 Run {}", summary.run_id);
    for load in &summary.loads {
        println!("   {:<28} {:>8} rows from {} files", load.table, load.rows, load.files);
    }
    for (table, rows) in &summary.rows_written {
        println!("   {:<28} {:>8} rows", table, rows);
    }
    if summary.skipped_plays > 0 {
        println!("   ⚠️  {} song plays skipped", summary.skipped_plays);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    logging::init_logging();
    metrics::register_metrics();

    let cli = Cli::parse();
    let settings = load_settings(&cli.config)?;
    info!("Loaded settings for cluster {:?}", settings.cluster);

    let outcome = match cli.command {
        Commands::CreateTables => {
            orchestrator(settings, false)?.create_tables().await?;
            println!("✅ Tables recreated");
            Ok(())
        }
        Commands::Etl {
            drop_ambiguous_longitude,
        } => orchestrator(settings, drop_ambiguous_longitude)?
            .run_etl()
            .await
            .map(|summary| print_summary(&summary)),
        Commands::Run {
            drop_ambiguous_longitude,
        } => orchestrator(settings, drop_ambiguous_longitude)?
            .refresh()
            .await
            .map(|summary| print_summary(&summary)),
        Commands::Sql { dialect } => {
            let dialect: Dialect = dialect.parse()?;
            println!("{}", render_sql_script(&settings, dialect));
            Ok(())
        }
    };

    if let Err(e) = &outcome {
        error!("Run failed: {}", e);
    }
    Ok(outcome?)
}
