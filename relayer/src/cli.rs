use clap::{command, Parser};
use sp_core::H256;
use std::str::FromStr;
use tracing::Level;

#[derive(Parser)]
#[command(version)]
pub struct CliOpts {
	/// Number of the finalized checkpoint block to anchor proofs at
	#[arg(long, value_name = "BLOCK_NUMBER")]
	pub checkpoint_block: u64,
	/// Hash of the finalized checkpoint block
	#[arg(long, value_name = "BLOCK_HASH", value_parser = parse_hash)]
	pub checkpoint_hash: H256,
	/// Path to the toml configuration file
	#[arg(short, long, value_name = "FILE")]
	pub config: Option<String>,
	/// Write the resulting packages to this file instead of stdout
	#[arg(short, long, value_name = "FILE")]
	pub output: Option<String>,
	/// Log level
	#[arg(long)]
	pub verbosity: Option<Level>,
	/// Set logs format to JSON
	#[arg(long)]
	pub logs_json: bool,
}

fn parse_hash(value: &str) -> Result<H256, String> {
	let hex = value.strip_prefix("0x").unwrap_or(value);
	H256::from_str(hex).map_err(|error| format!("invalid block hash: {error}"))
}
