use clap::{Parser, Subcommand};

use crate::config::Config;

#[derive(Parser, Debug)]
#[command(name = "loyalty-ledger")]
#[command(about = "Loyalty points ledger with accrual reconciliation", long_about = None)]
pub struct Cli {
    /// Address the HTTP server listens on (overrides RUN_ADDRESS)
    #[arg(short = 'a', long, global = true)]
    pub run_address: Option<String>,

    /// Postgres connection URI (overrides DATABASE_URI)
    #[arg(short = 'd', long, global = true)]
    pub database_uri: Option<String>,

    /// Base URL of the accrual system (overrides ACCRUAL_SYSTEM_ADDRESS)
    #[arg(short = 'r', long, global = true)]
    pub accrual_system_address: Option<String>,

    /// Seconds between accrual polls (overrides ACCRUAL_POLL_INTERVAL_SECS)
    #[arg(short = 't', long, global = true)]
    pub poll_interval_secs: Option<u64>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Start the HTTP server and the accrual reconciler (default)
    Serve {
        /// Keep the ledger in memory instead of Postgres
        #[arg(long)]
        in_memory: bool,
    },

    /// Database management commands
    #[command(subcommand)]
    Db(DbCommands),

    /// Configuration validation
    Config,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum DbCommands {
    /// Run database migrations
    Migrate,
}

impl Cli {
    /// Flags win over environment values.
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(addr) = &self.run_address {
            config.run_address = addr.clone();
        }
        if let Some(uri) = &self.database_uri {
            config.database_uri = Some(uri.clone());
        }
        if let Some(addr) = &self.accrual_system_address {
            config.accrual_system_address = addr.clone();
        }
        if let Some(secs) = self.poll_interval_secs {
            config.poll_interval_secs = secs;
        }
    }
}

pub async fn handle_db_migrate(config: &Config) -> anyhow::Result<()> {
    let Some(uri) = config.database_uri.as_deref() else {
        anyhow::bail!("DATABASE_URI is required to run migrations");
    };

    let pool = crate::db::create_pool(uri).await?;
    tracing::info!("Running database migrations...");
    crate::db::run_migrations(&pool).await?;
    println!("✓ Database migrations completed");

    Ok(())
}

pub fn handle_config_validate(config: &Config) -> anyhow::Result<()> {
    tracing::info!("Validating configuration...");

    println!("Configuration:");
    println!("  Run Address: {}", config.run_address);
    println!(
        "  Database URI: {}",
        config
            .database_uri
            .as_deref()
            .map(mask_password)
            .unwrap_or_else(|| "(not set)".to_string())
    );
    println!("  Accrual System Address: {}", config.accrual_system_address);
    println!("  Poll Interval: {}s", config.poll_interval_secs);
    println!("  Queue Capacity: {}", config.queue_capacity);
    println!("  Rate Limit Cooldown: {}s", config.rate_limit_cooldown_secs);

    config.validate()?;

    tracing::info!("Configuration is valid");
    println!("✓ Configuration is valid");

    Ok(())
}

fn mask_password(url: &str) -> String {
    if let Some(at_pos) = url.rfind('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            if let Some(slash_pos) = url[..colon_pos].rfind("//") {
                let prefix = &url[..slash_pos + 2];
                let user = &url[slash_pos + 2..colon_pos];
                let suffix = &url[at_pos..];
                return format!("{}{}:****{}", prefix, user, suffix);
            }
        }
    }
    url.to_string()
}
