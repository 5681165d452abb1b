//! HTTP service hashing request bodies and tracking per-client statistics.
//!
//! Routes:
//! - `POST /hashcalc`: stream the body through MD5 and record its size and processing time.
//! - `GET /stast`: report the running statistics for the requesting host.
//!
//! Statistics are kept in memory for the lifetime of the process, keyed by the `Host` header.

mod config;
mod error;
mod log;
mod metrics;
mod observability;
mod observability_config;
mod web;

pub use config::*;
pub use error::*;
pub use log::*;
pub use metrics::*;
pub use observability::*;
pub use observability_config::*;
pub use web::*;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	// Only needed for the optional HTTPS listener, but there's no harm in always installing it.
	rustls::crypto::aws_lc_rs::default_provider()
		.install_default()
		.map_err(|_| anyhow::anyhow!("failed to install default crypto provider"))?;

	let config = Config::load()?;

	// OpenTelemetry is disabled unless an OTLP endpoint is configured.
	let otlp_endpoint = config.observability.endpoint();
	if let Some(endpoint) = otlp_endpoint {
		if let Err(err) = observability::init_otel("hashstat", endpoint) {
			eprintln!("Warning: failed to initialize OpenTelemetry: {err}");
		}
	}

	observability::init_logging(&config.log, otlp_endpoint)?;
	tracing::trace!(?config, "final config");

	let stats = hashstat::StatsAggregator::new();
	let metrics = MetricsTracker::new();

	if otlp_endpoint.is_some() {
		observability::start_metrics_export_task(
			metrics.clone(),
			stats.clone(),
			observability::create_service_metrics(),
			config.observability.instance(),
		);
		tracing::info!("metrics export task started");
	}

	let web = Web::new(WebState { stats, metrics }, config.web);

	#[cfg(unix)]
	// Notify systemd that we're ready.
	let _ = sd_notify::notify(true, &[sd_notify::NotifyState::Ready]);

	web.run().await
}
