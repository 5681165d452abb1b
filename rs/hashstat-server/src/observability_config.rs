use serde::{Deserialize, Serialize};

#[derive(clap::Args, Clone, Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct ObservabilityConfig {
	/// OpenTelemetry OTLP endpoint, e.g. http://localhost:4317 (disabled when unset or "disabled")
	#[arg(long = "otel-endpoint", env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
	pub otlp_endpoint: Option<String>,

	/// The instance label attached to exported metrics.
	#[arg(long = "otel-instance", env = "HASHSTAT_INSTANCE")]
	pub instance: Option<String>,
}

impl ObservabilityConfig {
	/// The configured OTLP endpoint, or `None` if export is disabled.
	pub fn endpoint(&self) -> Option<&str> {
		let endpoint = self.otlp_endpoint.as_deref()?.trim();
		match endpoint {
			"" | "disabled" => None,
			endpoint => Some(endpoint),
		}
	}

	pub fn instance(&self) -> String {
		self.instance.clone().unwrap_or_else(|| "hashstat-1".to_string())
	}
}
