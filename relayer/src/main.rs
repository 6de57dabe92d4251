//! One-shot catch-up pass for the parachain message bridge.
//!
//! Reads the channel nonces on both chains, reconstructs the commitments the
//! destination chain is missing, and emits the proved message packages as
//! JSON. Delivery is left to the submission tooling; this binary never writes
//! to either chain.

use crate::cli::CliOpts;
use bridge_relay_core::{
	catchup,
	network::rpc::{EthereumRpc, ParachainRpc},
	shutdown::Controller,
	types::Checkpoint,
	utils::{default_subscriber, install_panic_hooks, json_subscriber, spawn_in_span},
};
use clap::Parser;
use color_eyre::{
	eyre::{eyre, WrapErr},
	Result,
};
use config::RuntimeConfig;
use std::fs;
use tracing::{error, info};

mod cli;
mod config;

pub fn load_runtime_config(opts: &CliOpts) -> Result<RuntimeConfig> {
	let mut cfg: RuntimeConfig = if let Some(config_path) = &opts.config {
		fs::metadata(config_path).map_err(|_| eyre!("Provided config file doesn't exist."))?;
		confy::load_path(config_path)
			.wrap_err(format!("Failed to load configuration from {config_path}"))?
	} else {
		RuntimeConfig::default()
	};

	// Flags override the config parameters
	cfg.log_format_json = opts.logs_json || cfg.log_format_json;
	cfg.log_level = opts.verbosity.unwrap_or(cfg.log_level);

	Ok(cfg)
}

#[tokio::main]
pub async fn main() -> Result<()> {
	let opts = CliOpts::parse();
	let cfg = load_runtime_config(&opts)?;

	if cfg.log_format_json {
		tracing::subscriber::set_global_default(json_subscriber(cfg.log_level))?;
	} else {
		tracing::subscriber::set_global_default(default_subscriber(cfg.log_level))?;
	}

	let shutdown = Controller::<String>::new();
	install_panic_hooks(shutdown.clone())?;

	let version = clap::crate_version!();
	info!("Running bridge relay catch-up version: {version}.");
	info!("Using config: {cfg:?}");

	let checkpoint = Checkpoint {
		block_number: opts.checkpoint_block,
		hash: opts.checkpoint_hash,
	};

	let parachain = ParachainRpc::new(&cfg.rpc)?;
	let ethereum = EthereumRpc::new(&cfg.rpc)?;

	let ctrlc_shutdown = shutdown.clone();
	spawn_in_span(async move {
		if tokio::signal::ctrl_c().await.is_err() {
			error!("Cannot listen for the interrupt signal");
			return;
		}
		let _ = ctrlc_shutdown.trigger_shutdown("Interrupted by the operator".to_string());
	});

	info!(checkpoint = %checkpoint, "Starting catch-up pass");
	let packages = catchup::run(&parachain, &ethereum, &shutdown, checkpoint).await?;

	if packages.is_empty() {
		info!("Channels are up to date, nothing to relay");
	} else {
		info!(packages = packages.len(), "Catch-up pass produced packages");
	}

	let serialized =
		serde_json::to_string_pretty(&packages).wrap_err("Failed to serialize packages")?;
	match &opts.output {
		Some(path) => fs::write(path, serialized)
			.wrap_err_with(|| format!("Failed to write packages to {path}"))?,
		None => println!("{serialized}"),
	}

	Ok(())
}
