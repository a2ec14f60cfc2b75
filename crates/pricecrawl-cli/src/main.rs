mod crawl;
mod inspect;

use clap::{ArgGroup, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "pricecrawl-cli")]
#[command(about = "Multi-retailer grocery price crawler")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Crawl one retailer or all of them.
    #[command(group(ArgGroup::new("target").required(true).args(["store", "all"])))]
    Crawl {
        /// Retailer slug, e.g. `checkers`.
        #[arg(long)]
        store: Option<String>,
        /// Every enabled retailer in the retailers file.
        #[arg(long)]
        all: bool,
        /// Skip categories completed by the last checkpoint.
        #[arg(long)]
        resume: bool,
        /// Keep offers local even when `DATABASE_URL` is set.
        #[arg(long)]
        no_persist: bool,
    },
    /// Run category discovery for one retailer and print the frontier.
    Discover {
        #[arg(long)]
        store: String,
    },
    /// List configured retailers.
    Retailers,
    /// Delete leftover screenshot artifacts.
    Sweep,
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    Ping,
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = pricecrawl_core::load_app_config_from_env()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();
    match cli.command {
        Some(Commands::Crawl {
            store,
            all: _,
            resume,
            no_persist,
        }) => crawl::run_crawl(&config, store.as_deref(), resume, !no_persist).await?,
        Some(Commands::Discover { store }) => inspect::run_discover(&config, &store).await?,
        Some(Commands::Retailers) => inspect::run_retailers(&config)?,
        Some(Commands::Sweep) => inspect::run_sweep(&config).await?,
        Some(Commands::Db { command }) => run_db(&config, command).await?,
        None => println!("pricecrawl-cli: see --help for commands"),
    }

    Ok(())
}

async fn run_db(config: &pricecrawl_core::AppConfig, command: DbCommands) -> anyhow::Result<()> {
    let pool = pricecrawl_db::connect_optional(
        config.database_url.as_deref(),
        pricecrawl_db::PoolConfig::from_env(),
    )
    .await?;
    match command {
        DbCommands::Ping => {
            pricecrawl_db::ping(&pool).await?;
            println!("database reachable");
        }
        DbCommands::Migrate => {
            let applied = pricecrawl_db::run_migrations(&pool).await?;
            println!("applied {applied} migration(s)");
        }
    }
    pool.close().await;
    Ok(())
}
