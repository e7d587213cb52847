use anyhow::Context;
use clap::{Parser, Subcommand};
use configd::{create_registry, get_config, MigrationExecutor, SqliteStore};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Configd - configuration lookup service and migration tool
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Database URL, e.g. sqlite://configd.db
    #[arg(long, env = "CONFIGD_DATABASE_URL")]
    database_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply all pending migrations
    Migrate,

    /// Roll back migrations performed after DESTINATION.
    /// Without DESTINATION everything is rolled back, including the ledger table.
    Rollback {
        destination: Option<String>,
    },

    /// Fail unless every migration has been performed
    Ensure,

    /// Print every migration and when it was performed
    Status,

    /// Print the stored configuration for TYPE and NAME
    Get {
        #[arg(value_name = "TYPE")]
        config_type: String,
        name: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    let store = SqliteStore::connect(&args.database_url)
        .await
        .context("failed to connect to the database")?;
    let executor = MigrationExecutor::new(create_registry()?);

    match args.command {
        Command::Migrate => {
            executor.migrate(&store).await.context("migration failed")?;
            info!("Migration finished");
        }
        Command::Rollback { destination } => {
            let destination = destination.unwrap_or_default();
            executor
                .rollback(&store, &destination)
                .await
                .context("rollback failed")?;
            info!("Rollback finished");
        }
        Command::Ensure => {
            executor
                .ensure(&store)
                .await
                .context("database is not fully migrated")?;
            info!("All migrations are performed");
        }
        Command::Status => {
            let status = executor.status(&store).await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Command::Get { config_type, name } => {
            executor
                .ensure(&store)
                .await
                .context("refusing to serve configs before migrations are performed")?;

            match get_config(&store, &config_type, &name).await? {
                Some(data) => println!("{}", serde_json::to_string_pretty(&data)?),
                None => anyhow::bail!("config '{name}' with type '{config_type}' not found"),
            }
        }
    }

    store.close().await;
    Ok(())
}
