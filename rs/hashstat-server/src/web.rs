use std::convert::Infallible;
use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;

use anyhow::Context;
use axum::{
	Json, Router,
	body::Body,
	extract::{DefaultBodyLimit, FromRequestParts, State},
	http::{Method, StatusCode, header, request::Parts},
	response::{IntoResponse, Response},
	routing::{get, post},
};
use hashstat::{StatsAggregator, StatsRecord};
use serde::{Deserialize, Serialize, Serializer, ser::SerializeMap};

use crate::{Error, MetricsTracker};

const DEFAULT_HTTP_LISTEN: SocketAddr = SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 8080);

#[derive(clap::Args, Clone, Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct WebConfig {
	#[command(flatten)]
	pub http: HttpConfig,

	#[command(flatten)]
	pub https: HttpsConfig,
}

#[derive(clap::Args, Clone, Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct HttpConfig {
	/// Listen for plain HTTP on this address [default: [::]:8080]
	#[arg(long = "web-http-listen", id = "web-http-listen", env = "HASHSTAT_WEB_HTTP_LISTEN")]
	pub listen: Option<SocketAddr>,
}

impl HttpConfig {
	pub fn listen(&self) -> SocketAddr {
		self.listen.unwrap_or(DEFAULT_HTTP_LISTEN)
	}
}

#[derive(clap::Args, Clone, Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct HttpsConfig {
	/// Optionally listen for HTTPS on this address.
	#[arg(
		long = "web-https-listen",
		id = "web-https-listen",
		env = "HASHSTAT_WEB_HTTPS_LISTEN",
		requires = "web-https-cert",
		requires = "web-https-key"
	)]
	pub listen: Option<SocketAddr>,

	/// The PEM certificate chain for the HTTPS listener.
	#[arg(long = "web-https-cert", id = "web-https-cert", env = "HASHSTAT_WEB_HTTPS_CERT")]
	pub cert: Option<PathBuf>,

	/// The PEM private key for the HTTPS listener.
	#[arg(long = "web-https-key", id = "web-https-key", env = "HASHSTAT_WEB_HTTPS_KEY")]
	pub key: Option<PathBuf>,
}

/// Shared state handed to every request handler.
#[derive(Clone, Default)]
pub struct WebState {
	pub stats: StatsAggregator,
	pub metrics: MetricsTracker,
}

pub struct Web {
	state: WebState,
	config: WebConfig,
}

impl Web {
	pub fn new(state: WebState, config: WebConfig) -> Self {
		Self { state, config }
	}

	pub async fn run(self) -> anyhow::Result<()> {
		let app = router(self.state);

		let listen = self.config.http.listen();
		tracing::info!(%listen, "listening");

		let http = axum_server::bind(listen).serve(app.clone().into_make_service());
		let https = serve_https(self.config.https, app);

		tokio::select! {
			res = http => res.context("http server failed"),
			res = https => res.context("https server failed"),
		}
	}
}

async fn serve_https(config: HttpsConfig, app: Router) -> anyhow::Result<()> {
	let Some(listen) = config.listen else {
		// Nothing to serve, wait for the HTTP listener instead.
		return std::future::pending().await;
	};

	let cert = config.cert.context("missing --web-https-cert")?;
	let key = config.key.context("missing --web-https-key")?;

	let tls = axum_server::tls_rustls::RustlsConfig::from_pem_file(&cert, &key)
		.await
		.with_context(|| format!("failed to load TLS config: {}", cert.display()))?;

	tracing::info!(%listen, "listening (https)");
	axum_server::bind_rustls(listen, tls)
		.serve(app.into_make_service())
		.await?;

	Ok(())
}

/// Build the HTTP routes.
///
/// Anything other than `POST /hashcalc` and `GET /stast` is a 404, including other methods on those paths.
pub fn router(state: WebState) -> Router {
	Router::new()
		.route(
			"/hashcalc",
			post(hashcalc)
				.fallback(handle_404)
				.layer(DefaultBodyLimit::disable()),
		)
		.route("/stast", get(stast).fallback(handle_404))
		.fallback(handle_404)
		.with_state(state)
}

async fn handle_404() -> impl IntoResponse {
	(StatusCode::NOT_FOUND, "Not found")
}

/// The host the client claims to be, used to group statistics.
///
/// Taken from the `Host` header, or the URI authority for HTTP/2.
/// It's client-supplied and not validated in any way.
pub struct ClientHost(pub String);

impl<S: Send + Sync> FromRequestParts<S> for ClientHost {
	type Rejection = Infallible;

	async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
		let host = parts
			.headers
			.get(header::HOST)
			.map(|host| String::from_utf8_lossy(host.as_bytes()).into_owned())
			.or_else(|| parts.uri.authority().map(|authority| authority.to_string()))
			.unwrap_or_default();

		Ok(Self(host))
	}
}

#[derive(Debug, Serialize)]
struct HashResponse {
	host: String,
	hash: String,
	time: f64,
	size: u64,
}

#[tracing::instrument("hashcalc", skip_all, fields(host = %host))]
async fn hashcalc(
	State(state): State<WebState>,
	ClientHost(host): ClientHost,
	body: Body,
) -> Result<Json<HashResponse>, Error> {
	// Counts as aborted if this future is dropped before completion.
	let guard = state.metrics.start_digest();

	let measurement = match hashstat::measure(body.into_data_stream()).await {
		Ok(measurement) => measurement,
		Err(err) => {
			tracing::warn!(%err, "request body aborted");
			return Err(err.into());
		}
	};

	let time = measurement.time_ms();
	let record = state.stats.update(&host, measurement.size, time);
	guard.complete(measurement.size);

	tracing::debug!(hash = %measurement.hash, size = measurement.size, time, count = record.count, "hashed");

	Ok(Json(HashResponse {
		host,
		hash: measurement.hash,
		time,
		size: measurement.size,
	}))
}

#[derive(Debug, Serialize)]
struct StatsResponse {
	host: String,
	#[serde(serialize_with = "serialize_stats")]
	stats: Option<StatsRecord>,
}

// Unknown hosts are reported as an empty object rather than null.
fn serialize_stats<S: Serializer>(stats: &Option<StatsRecord>, serializer: S) -> Result<S::Ok, S::Error> {
	match stats {
		Some(stats) => stats.serialize(serializer),
		None => serializer.serialize_map(Some(0))?.end(),
	}
}

#[tracing::instrument("stast", skip_all, fields(host = %host))]
async fn stast(method: Method, State(state): State<WebState>, ClientHost(host): ClientHost) -> Response {
	// axum routes HEAD to GET handlers, but only GET is served.
	if method != Method::GET {
		return handle_404().await.into_response();
	}

	state.metrics.record_stats_read();
	let stats = state.stats.read(&host);

	tracing::debug!(found = stats.is_some(), "stats");

	Json(StatsResponse { host, stats }).into_response()
}
