use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};

mod commands;

#[derive(Parser)]
#[command(name = "mps")]
#[command(about = "Marketplace product sync CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Layered config utilities
    Config {
        #[command(subcommand)]
        cmd: ConfigCmd,
    },

    /// Inspect or move the incremental sync watermark
    Watermark {
        #[command(subcommand)]
        cmd: WatermarkCmd,
    },

    /// Run a single pass against the live store and marketplace, then exit
    Once {
        #[arg(value_enum)]
        pass: OncePass,

        /// Layered config paths in merge order
        #[arg(long = "config", default_value = commands::DEFAULT_CONFIG_PATH)]
        config_paths: Vec<String>,

        /// After the pass, keep polling tickets for up to this many seconds
        #[arg(long, default_value_t = 0)]
        settle_secs: u64,
    },

    /// Resubmit specific product IDs right away, bypassing the watermark
    Trigger {
        #[arg(required = true)]
        ids: Vec<String>,

        #[arg(long = "config", default_value = commands::DEFAULT_CONFIG_PATH)]
        config_paths: Vec<String>,

        #[arg(long, default_value_t = 0)]
        settle_secs: u64,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,

    /// Apply SQL migrations (idempotent).
    Migrate,
}

#[derive(Subcommand)]
enum ConfigCmd {
    /// Compute layered config hash + print canonical JSON
    Hash {
        /// Paths in merge order (base -> site overrides ...)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Validate a layered config and list keys no binary reads
    Check {
        #[arg(required = true)]
        paths: Vec<String>,
    },
}

#[derive(Subcommand)]
enum WatermarkCmd {
    /// Print the committed watermark
    Show {
        #[arg(long = "config", default_value = commands::DEFAULT_CONFIG_PATH)]
        config_paths: Vec<String>,
    },

    /// Overwrite the committed watermark. Rewinding forces a resync of every
    /// row changed after the new value; moving forward skips rows and needs --yes.
    Set {
        /// RFC 3339 timestamp, or `epoch` for a full resync
        #[arg(long)]
        at: String,

        /// Acknowledge that moving forward hides unsynced changes.
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OncePass {
    Sync,
    Audit,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => {
            let pool = mps_db::connect_from_env().await?;
            match cmd {
                DbCmd::Status => {
                    let s = mps_db::status(&pool).await?;
                    println!(
                        "db_ok={} has_products_table={} has_params_table={}",
                        s.ok, s.has_products_table, s.has_params_table
                    );
                }
                DbCmd::Migrate => {
                    mps_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
            pool.close().await;
        }

        Commands::Config { cmd } => match cmd {
            ConfigCmd::Hash { paths } => commands::config_hash(&paths)?,
            ConfigCmd::Check { paths } => commands::config_check(&paths)?,
        },

        Commands::Watermark { cmd } => match cmd {
            WatermarkCmd::Show { config_paths } => commands::watermark_show(&config_paths).await?,
            WatermarkCmd::Set { at, yes } => commands::watermark_set(&at, yes).await?,
        },

        Commands::Once {
            pass,
            config_paths,
            settle_secs,
        } => {
            let kind = match pass {
                OncePass::Sync => mps_runtime::PassKind::Sync,
                OncePass::Audit => mps_runtime::PassKind::Audit,
            };
            commands::pass::run_once(&config_paths, kind, settle_secs).await?;
        }

        Commands::Trigger {
            ids,
            config_paths,
            settle_secs,
        } => commands::pass::run_trigger(&config_paths, ids, settle_secs).await?,
    }

    Ok(())
}

/// Logs go to stderr so stdout stays `key=value` for scripts.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .init();
}
