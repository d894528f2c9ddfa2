//! eim-apply: Apply an EIM record set to an item stored as JSON.
//!
//! Uses eim-core for all record semantics; this binary only handles files,
//! configuration and logging.

use anyhow::Result;
use clap::Parser;
use eim_core::{
    ApplicatorRegistry, Dispatcher, FailurePolicy, IcalendarValidator, UnknownSchemaPolicy,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use eim_apply::{ApplyRequest, Config, apply_files, save_json};

#[derive(Parser, Debug)]
#[command(name = "eim-apply")]
#[command(about = "Apply an EIM record set to an item")]
struct Args {
    /// Path to the item JSON
    #[arg(short, long)]
    item: PathBuf,

    /// Path to the record set JSON
    #[arg(short, long)]
    records: PathBuf,

    /// Path to the parent collection's children, used to resolve modification links
    #[arg(short, long)]
    siblings: Option<PathBuf>,

    /// Where to write the updated item (stdout if omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Acting user id, for logging
    #[arg(long)]
    user: Option<String>,

    /// Fail instead of skipping records for unregistered schemas
    #[arg(long)]
    reject_unknown_schemas: bool,

    /// Skip failed records instead of stopping at the first one
    #[arg(long)]
    best_effort: bool,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr so stdout stays valid JSON
    let default_filter = if args.verbose {
        "debug,eim_apply=debug,eim_core=debug"
    } else {
        "info,eim_apply=info,eim_core=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut config = Config::from_env()?;
    if args.reject_unknown_schemas {
        config.dispatch.unknown_schema = UnknownSchemaPolicy::Reject;
    }
    if args.best_effort {
        config.dispatch.on_failure = FailurePolicy::SkipRecord;
    }

    let dispatcher = Dispatcher::new(
        ApplicatorRegistry::standard(Arc::new(IcalendarValidator)),
        config.dispatch,
    );
    let request = ApplyRequest {
        item: args.item,
        records: args.records,
        siblings: args.siblings,
        acting_user: args.user,
    };

    let outcome = apply_files(&request, &dispatcher).await?;
    let report = &outcome.report;
    info!(
        "Applied {} record(s) to {} ({} skipped, {} failed)",
        report.applied,
        outcome.item.uid,
        report.skipped.len(),
        report.failed.len()
    );
    for failure in &report.failed {
        warn!("Record {} ({}) skipped: {}", failure.index, failure.schema, failure.error);
    }

    match args.output {
        Some(path) => {
            save_json(&path, &outcome.item).await?;
            info!("Wrote {}", path.display());
        }
        None => println!("{}", serde_json::to_string_pretty(&outcome.item)?),
    }

    Ok(())
}
