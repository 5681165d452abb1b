// OpenTelemetry observability module
// Uses tracing-opentelemetry bridge for span export

use opentelemetry::{
	KeyValue, global,
	metrics::{Counter, Meter, UpDownCounter},
};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{Resource, propagation::TraceContextPropagator, trace};

const SERVICE_NAME: &str = "service.name";

/// Initialize the OpenTelemetry SDK with an OTLP metrics exporter.
/// The tracer provider is installed separately by [init_logging].
pub fn init_otel(service_name: &str, otlp_endpoint: &str) -> anyhow::Result<()> {
	global::set_text_map_propagator(TraceContextPropagator::new());

	let resource = Resource::new(vec![KeyValue::new(SERVICE_NAME, service_name.to_string())]);

	let meter_provider = opentelemetry_otlp::new_pipeline()
		.metrics(opentelemetry_sdk::runtime::Tokio)
		.with_exporter(opentelemetry_otlp::new_exporter().tonic().with_endpoint(otlp_endpoint))
		.with_resource(resource)
		.build()?;

	global::set_meter_provider(meter_provider);

	Ok(())
}

pub fn get_meter() -> Meter {
	global::meter("hashstat")
}

pub fn create_service_metrics() -> ServiceMetrics {
	ServiceMetrics::new(&get_meter())
}

/// Periodically export [crate::MetricsTracker] deltas to OTel instruments.
pub fn start_metrics_export_task(
	metrics_tracker: crate::MetricsTracker,
	stats: hashstat::StatsAggregator,
	service_metrics: ServiceMetrics,
	instance: String,
) -> tokio::task::JoinHandle<()> {
	tokio::spawn(async move {
		let mut interval = tokio::time::interval(std::time::Duration::from_secs(10));
		let mut last = Snapshot::default();

		loop {
			interval.tick().await;

			let labels = &[KeyValue::new("instance", instance.clone())];
			let current = Snapshot::capture(&metrics_tracker, &stats);

			// UpDownCounters take the delta from the last exported value.
			let delta_active = current.active_digests - last.active_digests;
			if delta_active != 0 {
				service_metrics.active_digests.add(delta_active as f64, labels);
			}

			let delta_clients = current.clients - last.clients;
			if delta_clients != 0 {
				service_metrics.clients.add(delta_clients as f64, labels);
			}

			let delta_completed = current.digests_completed.saturating_sub(last.digests_completed);
			if delta_completed > 0 {
				service_metrics.digests_total.add(delta_completed, labels);
			}

			let delta_aborted = current.digests_aborted.saturating_sub(last.digests_aborted);
			if delta_aborted > 0 {
				service_metrics.digests_aborted_total.add(delta_aborted, labels);
			}

			let delta_bytes = current.bytes_hashed.saturating_sub(last.bytes_hashed);
			if delta_bytes > 0 {
				service_metrics.bytes_hashed_total.add(delta_bytes, labels);
			}

			let delta_reads = current.stats_reads.saturating_sub(last.stats_reads);
			if delta_reads > 0 {
				service_metrics.stats_reads_total.add(delta_reads, labels);
			}

			tracing::trace!(
				active_digests = current.active_digests,
				clients = current.clients,
				digests_completed = current.digests_completed,
				digests_aborted = current.digests_aborted,
				bytes_hashed = current.bytes_hashed,
				stats_reads = current.stats_reads,
				"metrics exported"
			);

			last = current;
		}
	})
}

#[derive(Default, Debug, Clone, Copy)]
struct Snapshot {
	active_digests: i64,
	clients: i64,
	digests_completed: u64,
	digests_aborted: u64,
	bytes_hashed: u64,
	stats_reads: u64,
}

impl Snapshot {
	fn capture(metrics: &crate::MetricsTracker, stats: &hashstat::StatsAggregator) -> Self {
		Self {
			active_digests: metrics.active_digests() as i64,
			clients: stats.len() as i64,
			digests_completed: metrics.digests_completed(),
			digests_aborted: metrics.digests_aborted(),
			bytes_hashed: metrics.bytes_hashed(),
			stats_reads: metrics.stats_reads(),
		}
	}
}

/// Initialize logging, exporting spans over OTLP when an endpoint is given.
/// With OTel enabled, logs are JSON so they can be correlated by trace_id/span_id.
pub fn init_logging(log_config: &crate::Log, otlp_endpoint: Option<&str>) -> anyhow::Result<()> {
	use tracing_subscriber::layer::SubscriberExt;
	use tracing_subscriber::util::SubscriberInitExt;
	use tracing_subscriber::{EnvFilter, Layer};

	let filter = EnvFilter::builder()
		.with_default_directive(log_config.level().into())
		.from_env_lossy()
		.add_directive("h2=warn".parse()?)
		.add_directive("hyper=info".parse()?)
		.add_directive("tokio=info".parse()?)
		.add_directive("runtime=info".parse()?);

	if let Some(otlp_endpoint) = otlp_endpoint {
		let fmt_layer = tracing_subscriber::fmt::layer()
			.json()
			.with_writer(std::io::stderr)
			.with_filter(filter);

		// install_batch sets the global tracer provider
		opentelemetry_otlp::new_pipeline()
			.tracing()
			.with_exporter(opentelemetry_otlp::new_exporter().tonic().with_endpoint(otlp_endpoint))
			.with_trace_config(trace::Config::default().with_resource(Resource::new(vec![KeyValue::new(
				SERVICE_NAME,
				"hashstat".to_string(),
			)])))
			.install_batch(opentelemetry_sdk::runtime::Tokio)?;

		let otel_layer = tracing_opentelemetry::layer();

		#[cfg(feature = "tokio-console")]
		{
			let console_layer = console_subscriber::spawn();
			tracing_subscriber::registry()
				.with(fmt_layer)
				.with(otel_layer)
				.with(console_layer)
				.init();
		}

		#[cfg(not(feature = "tokio-console"))]
		{
			tracing_subscriber::registry().with(fmt_layer).with(otel_layer).init();
		}
	} else {
		let fmt_layer = tracing_subscriber::fmt::layer()
			.with_writer(std::io::stderr)
			.with_filter(filter);

		#[cfg(feature = "tokio-console")]
		{
			let console_layer = console_subscriber::spawn();
			tracing_subscriber::registry()
				.with(fmt_layer)
				.with(console_layer)
				.init();
		}

		#[cfg(not(feature = "tokio-console"))]
		{
			tracing_subscriber::registry().with(fmt_layer).init();
		}
	}

	Ok(())
}

/// OTel instruments for the service.
/// Names follow Prometheus conventions; the only label is the instance.
pub struct ServiceMetrics {
	pub active_digests: UpDownCounter<f64>,
	pub clients: UpDownCounter<f64>,
	pub digests_total: Counter<u64>,
	pub digests_aborted_total: Counter<u64>,
	pub bytes_hashed_total: Counter<u64>,
	pub stats_reads_total: Counter<u64>,
}

impl ServiceMetrics {
	pub fn new(meter: &Meter) -> Self {
		Self {
			active_digests: meter
				.f64_up_down_counter("hashstat_active_digests")
				.with_description("Number of request bodies currently being hashed")
				.init(),
			clients: meter
				.f64_up_down_counter("hashstat_clients")
				.with_description("Number of distinct client hosts with statistics")
				.init(),
			digests_total: meter
				.u64_counter("hashstat_digests_total")
				.with_description("Total request bodies hashed to completion")
				.init(),
			digests_aborted_total: meter
				.u64_counter("hashstat_digests_aborted_total")
				.with_description("Request bodies abandoned before the end of the stream")
				.init(),
			bytes_hashed_total: meter
				.u64_counter("hashstat_bytes_hashed_total")
				.with_description("Total payload bytes hashed by completed requests")
				.init(),
			stats_reads_total: meter
				.u64_counter("hashstat_stats_reads_total")
				.with_description("Total statistics lookups")
				.init(),
		}
	}
}
