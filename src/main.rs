//! KETOGO curator: binary entrypoint.
//!
//! ```bash
//! ketogo daily                    # feeds → observations (+ objects)
//! ketogo weekly-objects           # Amazon rotation → objects
//! ketogo check "Weird lamp" --link https://x/1 --source Reddit
//! ```
//!
//! Exits non-zero only when a collection cannot be written.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ketogo_curator::admission::{Admission, PolicyKind};
use ketogo_curator::commentary::build_commentator;
use ketogo_curator::config::CuratorConfig;
use ketogo_curator::fingerprint::{fingerprint, hash_percent};
use ketogo_curator::ingest::config::load_feeds_default;
use ketogo_curator::ingest::providers::rss::RssFeed;
use ketogo_curator::ingest::types::{FeedProvider, RawItem};
use ketogo_curator::pipeline::{run_daily, run_weekly_objects, RunReport};
use ketogo_curator::products::paapi::{PaapiClient, PaapiCredentials};
use ketogo_curator::products::ProductSearch;
use ketogo_curator::store::JsonFileStore;

/// Deterministic curation for the Observations and Objects feeds.
#[derive(Parser)]
#[command(name = "ketogo", version, about)]
struct Cli {
    /// Curator config (TOML). Defaults to `$KETOGO_CONFIG_PATH`, then
    /// `config/curator.toml`, then built-in defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print run reports as JSON on stdout.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch all feeds once and curate both collections.
    Daily,

    /// Run the weekly product-search rotation into the objects collection.
    /// Skips cleanly when PA-API credentials are not set.
    WeeklyObjects,

    /// Show the admission verdict for one item without touching any store.
    Check {
        title: String,
        #[arg(long, default_value = "")]
        link: String,
        #[arg(long, default_value = "")]
        source: String,
        #[arg(long, value_enum, default_value_t = PolicyKind::Observation)]
        policy: PolicyKind,
    },
}

/// Compact logs by default, JSON lines with `KETOGO_LOG_JSON=1`.
/// Filter from `RUST_LOG`, else info for the curator targets and warn elsewhere.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("ketogo=info,pipeline=info,ingest=info,warn"));

    let json = std::env::var("KETOGO_LOG_JSON")
        .ok()
        .is_some_and(|v| v == "1");

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .init();
    }
}

fn feed_providers() -> Result<Vec<Box<dyn FeedProvider>>> {
    let specs = load_feeds_default()?;
    let mut providers: Vec<Box<dyn FeedProvider>> = Vec::with_capacity(specs.len());
    for spec in &specs {
        match RssFeed::from_spec(spec) {
            Ok(feed) => providers.push(Box::new(feed)),
            Err(e) => warn!(target: "ingest", error = ?e, feed = %spec.name, "feed disabled"),
        }
    }
    Ok(providers)
}

fn emit(reports: &[RunReport], json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(reports).context("serializing run report")?
        );
    } else {
        for r in reports {
            println!(
                "{:<12} fetched={} admitted={} duplicates={} rejected={} capped={}{}{}",
                r.bucket.as_str(),
                r.fetched,
                r.admitted,
                r.duplicates,
                r.rejected_total(),
                r.capped,
                if r.quiet_day { " [quiet-day]" } else { "" },
                if r.skipped { " [skipped]" } else { "" },
            );
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let cfg = CuratorConfig::load_from(cli.config.as_deref())?;
    let now = Utc::now();

    match cli.command {
        Commands::Daily => {
            let providers = feed_providers()?;
            let observations = JsonFileStore::new(cfg.data.observations_path());
            let objects = JsonFileStore::new(cfg.data.objects_path());
            let commentator = build_commentator(&cfg.ai);
            info!(target: "pipeline", feeds = providers.len(), commentary = commentator.name(), "daily run");

            let reports = run_daily(
                &providers,
                &observations,
                &objects,
                commentator.as_ref(),
                &cfg,
                now,
            )
            .await?;
            emit(&reports, cli.json)?;
        }
        Commands::WeeklyObjects => {
            let client = PaapiCredentials::from_env()
                .map(|c| PaapiClient::new(c, &cfg.amazon.marketplace, cfg.amazon.item_count))
                .transpose()?;
            let search = client.as_ref().map(|c| c as &dyn ProductSearch);
            let objects = JsonFileStore::new(cfg.data.objects_path());

            let report = run_weekly_objects(search, &objects, &cfg, now).await?;
            emit(&[report], cli.json)?;
        }
        Commands::Check {
            title,
            link,
            source,
            policy,
        } => {
            let admission = Admission::new(&cfg.admission);
            let item = RawItem {
                source,
                title,
                link,
                published_at: now,
                summary: None,
            };
            let verdict = admission.decide(policy, &item);
            let quota = policy
                .quota_input(&item.title, &item.link)
                .map(|i| hash_percent(&i));
            let out = serde_json::json!({
                "policy": policy,
                "admit": verdict.admit,
                "reason": verdict.reason,
                "fingerprint": fingerprint(policy.namespace(), &item.source, &item.link),
                "quota_percent": quota,
                "quota_threshold": admission.quota_threshold(),
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&out).context("serializing verdict")?
            );
        }
    }

    Ok(())
}
