//! Statuslive binary.
//!
//! Attaches one status page view to the live-update connection and logs the
//! connection indicator and a view summary whenever either changes.
//!
//! # Usage
//!
//! ```bash
//! # Dashboard against a local backend
//! statuslive --api-url http://localhost:8000/api --ws-url ws://localhost:8000/ws \
//!     --token "$TOKEN" --organization "$ORG_ID"
//!
//! # Public status page of one organization
//! statuslive --view public --slug acme
//! ```

use std::time::Duration;

use clap::{Parser, ValueEnum};
use statuslive_cli::{ApiClient, View};
use statuslive_client::{LiveConfig, LiveUpdates};
use statuslive_core::{ConnectionState, PolicyConfig, ReconnectConfig};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Which view to attach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ViewArg {
    /// Overview of services and incidents
    Dashboard,
    /// Incident list
    Incidents,
    /// Service list
    Services,
    /// Public status page (requires --slug)
    Public,
}

/// Live status page views
#[derive(Parser, Debug)]
#[command(name = "statuslive")]
#[command(about = "Status page views kept fresh over a live-update socket")]
#[command(version)]
struct Args {
    /// Live-update WebSocket endpoint
    #[arg(long, env = "STATUSLIVE_WS_URL", default_value = "ws://localhost:8000/ws")]
    ws_url: String,

    /// Log every frame and default to debug-level logging
    #[arg(long, env = "STATUSLIVE_DEBUG")]
    debug: bool,

    /// REST API base URL
    #[arg(long, env = "STATUSLIVE_API_URL", default_value = "http://localhost:8000/api")]
    api_url: String,

    /// Bearer token for authenticated endpoints
    #[arg(long, env = "STATUSLIVE_TOKEN")]
    token: Option<String>,

    /// Organization ID sent as X-Organization-ID
    #[arg(long, env = "STATUSLIVE_ORGANIZATION")]
    organization: Option<String>,

    /// View to attach
    #[arg(long, value_enum, default_value = "dashboard")]
    view: ViewArg,

    /// Organization slug for the public view
    #[arg(long, required_if_eq("view", "public"))]
    slug: Option<String>,

    /// Automatic reconnect attempts before giving up
    #[arg(long, default_value = "5")]
    max_attempts: u32,

    /// Never reconnect automatically
    #[arg(long)]
    no_auto_reconnect: bool,

    /// Seconds without any reload before a view refreshes anyway
    #[arg(long, env = "STATUSLIVE_FALLBACK_SECS", default_value = "300")]
    fallback_secs: u64,
}

impl Args {
    fn view(&self) -> Result<View, Box<dyn std::error::Error>> {
        Ok(match self.view {
            ViewArg::Dashboard => View::Dashboard,
            ViewArg::Incidents => View::Incidents,
            ViewArg::Services => View::Services,
            ViewArg::Public => {
                let slug = self.slug.clone().ok_or("--slug is required for the public view")?;
                View::PublicStatus { slug }
            },
        })
    }

    fn live_config(&self) -> LiveConfig {
        LiveConfig::new(&self.ws_url)
            .with_debug(self.debug)
            .with_reconnect(ReconnectConfig {
                max_attempts: self.max_attempts,
                auto_reconnect: !self.no_auto_reconnect,
                ..ReconnectConfig::default()
            })
            .with_policy(PolicyConfig {
                fallback_interval: Duration::from_secs(self.fallback_secs.max(1)),
                ..PolicyConfig::default()
            })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let default_level = if args.debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let view = args.view()?;
    let api = ApiClient::new(&args.api_url, args.token.clone(), args.organization.clone())?;

    tracing::info!(%view, api = %api.base_url(), ws = %args.ws_url, "statuslive starting");

    if !matches!(view, View::PublicStatus { .. }) {
        match api.organizations().await {
            Ok(organizations) => {
                for organization in organizations {
                    tracing::info!(name = %organization.name, slug = %organization.slug, "organization");
                }
            },
            Err(e) => tracing::warn!(error = %e, "could not list organizations"),
        }
    }

    let live = LiveUpdates::connect(args.live_config());
    let handle = live.handle();
    let attached = view.attach(&handle, api).await?;

    let mut connection = handle.watch();
    let mut view_state = attached.watch();
    let mut shown: Option<(ConnectionState, u32)> = None;

    tracing::info!("{}", attached.state().summary());

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                if let Err(e) = result {
                    tracing::warn!(error = %e, "failed to listen for ctrl-c");
                }
                break;
            },
            changed = connection.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = {
                    let snapshot = connection.borrow_and_update();
                    (snapshot.state, snapshot.retry_count)
                };
                if shown != Some(current) {
                    shown = Some(current);
                    tracing::info!(status = %handle.indicator(true), "connection");
                }
            },
            changed = view_state.changed() => {
                if changed.is_err() {
                    break;
                }
                let summary = view_state.borrow_and_update().summary();
                tracing::info!("{summary}");
            },
        }
    }

    tracing::info!("shutting down");
    drop(attached);
    live.shutdown().await;

    Ok(())
}
