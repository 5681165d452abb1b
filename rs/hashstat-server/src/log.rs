use serde::{Deserialize, Serialize};
use serde_with::DisplayFromStr;
use tracing::Level;
use tracing::level_filters::LevelFilter;

/// Logging configuration.
///
/// The level is the default directive; `RUST_LOG` still takes precedence for individual targets.
#[serde_with::serde_as]
#[derive(clap::Args, Clone, Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Log {
	/// The level filter to use [default: info]
	#[serde_as(as = "Option<DisplayFromStr>")]
	#[arg(id = "log-level", long = "log-level", env = "HASHSTAT_LOG_LEVEL")]
	pub level: Option<Level>,
}

impl Log {
	pub fn level(&self) -> LevelFilter {
		LevelFilter::from_level(self.level.unwrap_or(Level::INFO))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_level_filter() {
		assert_eq!(Log::default().level(), LevelFilter::INFO);
		assert_eq!(
			Log {
				level: Some(Level::TRACE)
			}
			.level(),
			LevelFilter::TRACE
		);
	}

	#[test]
	fn test_deserialize() {
		let log: Log = toml::from_str(r#"level = "debug""#).unwrap();
		assert_eq!(log.level, Some(Level::DEBUG));
		assert_eq!(log.level(), LevelFilter::DEBUG);

		let log: Log = toml::from_str("").unwrap();
		assert_eq!(log.level, None);
		assert_eq!(log.level(), LevelFilter::INFO);
	}
}
