//! hubsync CLI
//!
//! Runs one sync from HubSpot into a Supabase (PostgREST) project and
//! prints the per-table summary.
//!
//! Credentials come from flags or the `HUBSPOT_TOKEN`, `SUPABASE_URL` and
//! `SUPABASE_KEY` environment variables. The process exits with 0 when
//! every table loaded cleanly and 1 otherwise.

mod client;

use clap::Parser;
use client::ReqwestClient;
use hubsync_engine::{
    HubSpotTransport, PostgrestStore, SyncConfig, SyncError, SyncOrchestrator, SyncReport,
    SyncResult, DEFAULT_HUBSPOT_BASE_URL,
};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Incremental HubSpot to Supabase sync.
#[derive(Parser, Debug)]
#[command(name = "hubsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// HubSpot private app token
    #[arg(long, env = "HUBSPOT_TOKEN", hide_env_values = true)]
    hubspot_token: Option<String>,

    /// Supabase project URL
    #[arg(long, env = "SUPABASE_URL")]
    supabase_url: Option<String>,

    /// Supabase service key
    #[arg(long, env = "SUPABASE_KEY", hide_env_values = true)]
    supabase_key: Option<String>,

    /// HubSpot API base URL
    #[arg(long, env = "HUBSPOT_BASE_URL", default_value = DEFAULT_HUBSPOT_BASE_URL)]
    hubspot_base_url: String,

    /// Rows per upsert batch
    #[arg(long)]
    batch_size: Option<usize>,

    /// Records per source page
    #[arg(long)]
    page_size: Option<u32>,

    /// Ids per page when pre-loading validity sets
    #[arg(long)]
    id_page_size: Option<usize>,

    /// Minutes subtracted from the watermark in incremental mode
    #[arg(long)]
    margin_minutes: Option<u64>,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn sync_config(&self) -> SyncConfig {
        let mut config = SyncConfig::new()
            .with_hubspot_base_url(self.hubspot_base_url.clone())
            .with_request_timeout(Duration::from_secs(self.timeout_secs));
        if let Some(size) = self.batch_size {
            config = config.with_upsert_batch_size(size);
        }
        if let Some(size) = self.page_size {
            config = config.with_api_page_size(size);
        }
        if let Some(size) = self.id_page_size {
            config = config.with_id_scan_page_size(size);
        }
        if let Some(minutes) = self.margin_minutes {
            config = config.with_safety_margin(Duration::from_secs(minutes.saturating_mul(60)));
        }
        config
    }
}

fn required(value: Option<String>, name: &str) -> SyncResult<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| SyncError::Config(format!("{name} is not set")))
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn run(cli: Cli) -> SyncResult<SyncReport> {
    let config = cli.sync_config();
    let token = required(cli.hubspot_token, "HUBSPOT_TOKEN")?;
    let url = required(cli.supabase_url, "SUPABASE_URL")?;
    let key = required(cli.supabase_key, "SUPABASE_KEY")?;

    let client = Arc::new(ReqwestClient::new(config.request_timeout)?);
    let transport = HubSpotTransport::new(&config.hubspot_base_url, token, Arc::clone(&client));
    let store = PostgrestStore::new(url, key, client);

    SyncOrchestrator::new(config, transport, store).run()
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(report) => {
            println!("{}", report.render_summary());
            ExitCode::from(report.exit_code())
        }
        Err(err) => {
            error!(error = %err, "sync aborted");
            ExitCode::FAILURE
        }
    }
}
