use std::ffi::OsString;

use anyhow::Context;
use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::{Log, ObservabilityConfig, WebConfig};

#[derive(Parser, Clone, Debug, Default, Deserialize, Serialize)]
#[command(version, about)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
	/// The HTTP listeners.
	#[command(flatten)]
	pub web: WebConfig,

	#[command(flatten)]
	pub log: Log,

	#[command(flatten)]
	pub observability: ObservabilityConfig,

	/// If provided, load the configuration from this TOML file.
	/// Command line arguments and environment variables take precedence over the file.
	#[arg(long)]
	#[serde(skip)]
	pub file: Option<String>,
}

impl Config {
	pub fn load() -> anyhow::Result<Self> {
		Self::load_from(std::env::args_os().collect::<Vec<_>>())
	}

	pub fn load_from<I, T>(args: I) -> anyhow::Result<Self>
	where
		I: IntoIterator<Item = T> + Clone,
		T: Into<OsString> + Clone,
	{
		// Parse just the CLI arguments initially.
		let mut config = Config::try_parse_from(args.clone())?;

		// If a file is provided, load it and merge the CLI arguments on top.
		if let Some(file) = config.file.take() {
			let contents = std::fs::read_to_string(&file).with_context(|| format!("failed to read config: {file}"))?;
			config = toml::from_str(&contents).with_context(|| format!("failed to parse config: {file}"))?;
			config.try_update_from(args)?;
			config.file = Some(file);
		}

		Ok(config)
	}
}

#[cfg(test)]
mod tests {
	use std::io::Write;

	use super::*;

	#[test]
	fn test_defaults() {
		let config = Config::load_from(["hashstat-server"]).unwrap();
		assert_eq!(config.web.http.listen(), "[::]:8080".parse().unwrap());
		assert!(config.web.https.listen.is_none());
		assert!(config.file.is_none());
	}

	#[test]
	fn test_cli() {
		let config = Config::load_from([
			"hashstat-server",
			"--web-http-listen",
			"127.0.0.1:9000",
			"--log-level",
			"debug",
		])
		.unwrap();

		assert_eq!(config.web.http.listen(), "127.0.0.1:9000".parse().unwrap());
		assert_eq!(config.log.level, Some(tracing::Level::DEBUG));
	}

	#[test]
	fn test_file_with_cli_override() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(
			file,
			r#"
[web.http]
listen = "127.0.0.1:8081"

[log]
level = "warn"

[observability]
otlp_endpoint = "disabled"
"#
		)
		.unwrap();

		let path = file.path().to_str().unwrap().to_string();

		let config = Config::load_from(["hashstat-server", "--file", &path]).unwrap();
		assert_eq!(config.web.http.listen(), "127.0.0.1:8081".parse().unwrap());
		assert_eq!(config.log.level, Some(tracing::Level::WARN));
		assert_eq!(config.observability.endpoint(), None);
		assert_eq!(config.file.as_deref(), Some(path.as_str()));

		let config = Config::load_from(["hashstat-server", "--file", &path, "--log-level", "trace"]).unwrap();
		assert_eq!(config.web.http.listen(), "127.0.0.1:8081".parse().unwrap());
		assert_eq!(config.log.level, Some(tracing::Level::TRACE));
	}

	#[test]
	fn test_collected_args() {
		let args: Vec<OsString> = ["hashstat-server", "--web-http-listen", "127.0.0.1:9001"]
			.into_iter()
			.map(OsString::from)
			.collect();

		let config = Config::load_from(args).unwrap();
		assert_eq!(config.web.http.listen(), "127.0.0.1:9001".parse().unwrap());
	}

	#[test]
	fn test_file_unknown_field() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(file, "bogus = true").unwrap();

		let path = file.path().to_str().unwrap().to_string();
		assert!(Config::load_from(["hashstat-server", "--file", &path]).is_err());
	}

	#[test]
	fn test_file_missing() {
		assert!(Config::load_from(["hashstat-server", "--file", "/nonexistent/hashstat.toml"]).is_err());
	}
}
