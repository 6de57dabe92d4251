use bridge_relay_core::{network::rpc::RpcConfig, types::tracing_level_format};
use serde::{Deserialize, Serialize};
use tracing::Level;

/// Representation of a configuration used by this project.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct RuntimeConfig {
	#[serde(flatten)]
	pub rpc: RpcConfig,
	/// Log level, default is `INFO`.
	#[serde(with = "tracing_level_format")]
	pub log_level: Level,
	/// If set to true, logs are displayed in JSON format, which is used for
	/// structured logging. Otherwise, plain text format is used (default: false).
	pub log_format_json: bool,
}

impl Default for RuntimeConfig {
	fn default() -> Self {
		RuntimeConfig {
			rpc: Default::default(),
			log_level: Level::INFO,
			log_format_json: false,
		}
	}
}
