use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use tickboard::config::Config;
use tickboard::market_data::client::HttpSnapshotSource;
use tickboard::market_data::poller::{run_poller, run_session_worker};
use tickboard::session::{DashboardSession, headless_surface};

/// Poller→session channel buffer. The busy guard keeps at most one cycle in
/// flight, so this only needs a little slack.
const POLL_CHANNEL_BUFFER: usize = 4;

/// How often expired highlights are swept off the surface.
const HIGHLIGHT_SWEEP: Duration = Duration::from_millis(100);

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env().context("loading configuration")?;
    init_tracing(&config.log_level);

    if let Some(port) = config.metrics_port {
        tickboard::metrics::init_metrics_server(port).context("starting metrics exporter")?;
        info!(port, "metrics exporter listening");
    }

    info!(
        base_url = %config.base_url,
        poll_ms = config.poll_interval.as_millis() as u64,
        feed_capacity = config.feed_capacity,
        cash_interval = %config.cash_interval,
        "tickboard starting"
    );

    let source = Arc::new(
        HttpSnapshotSource::new(config.base_url.clone(), config.request_timeout)
            .context("building HTTP client")?,
    );
    let session = DashboardSession::new(&config, headless_surface());
    let print_frames = config.print_frames;

    let (tx, rx) = mpsc::channel(POLL_CHANNEL_BUFFER);

    let poller_handle = tokio::spawn(run_poller(source, config.poll_interval, tx));
    let worker_handle = tokio::spawn(run_session_worker(
        rx,
        session,
        HIGHLIGHT_SWEEP,
        move |session, report| {
            debug!(seq = report.seq, highlighted = report.highlighted(), "frame updated");
            if print_frames {
                println!("{}", session.surface().render_all());
            }
        },
    ));

    tokio::select! {
        res = poller_handle => {
            match res {
                Ok(Ok(())) => warn!("poller exited"),
                Ok(Err(err)) => warn!(error = %err, "poller returned error"),
                Err(err) => warn!(error = %err, "poller task panicked"),
            }
        }
        res = worker_handle => {
            match res {
                Ok(Ok(())) => warn!("session worker exited"),
                Ok(Err(err)) => warn!(error = %err, "session worker returned error"),
                Err(err) => warn!(error = %err, "session worker task panicked"),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received Ctrl-C, shutting down");
        }
    }

    Ok(())
}
