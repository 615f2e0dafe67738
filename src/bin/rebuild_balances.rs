//! Recomputes every customer balance from the movement ledger and brings
//! alerts back in line with the recomputed statuses.

use anyhow::{Context, Result};
use clap::Parser;
use equipment_ledger::{config::ConfigLoader, db, ledger, telemetry};

#[derive(Debug, Parser)]
#[command(name = "rebuild_balances", about = "Rebuild balances from the movement ledger")]
struct Args {
    /// Report what would change without writing anything
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let loader = ConfigLoader::new();
    let config = loader.load().context("loading configuration")?;
    telemetry::init_tracing(&config).context("initializing tracing")?;

    let db = db::connect_and_migrate(&config)
        .await
        .context("initializing database connection pool")?;

    let report = ledger::rebuild_balances(&db, ledger::AlertPolicy::from(&config), args.dry_run)
        .await
        .context("rebuilding balances")?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
