//! Concrete JSON-RPC clients for the parachain node and the destination
//! chain's execution endpoint.
//!
//! Both clients are plain HTTP POST JSON-RPC: the catch-up pipeline is a
//! sequential read path, so no subscriptions or connection pooling are
//! needed here. Timeouts come from the configured reqwest client; a timeout
//! surfaces as a fatal error for the whole run, retries belong to the caller.

use async_trait::async_trait;
use codec::Decode;
use color_eyre::{
	eyre::{eyre, WrapErr},
	Result,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sp_core::{bytes, keccak_256, twox_128, H160, H256};
use std::time::Duration;
use tracing::trace;

use crate::{
	network::{EthereumClient, ParachainClient},
	types::{
		AuxiliaryDigest, BasicOutboundMessage, ChannelId, CommitmentBatch, GeneratedMmrProof,
		IncentivizedOutboundMessage, MmrPath, StorageEntry,
	},
};

/// Endpoints and contract addresses of one catch-up deployment.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
	/// HTTP JSON-RPC endpoint of the parachain node.
	pub parachain_endpoint: String,
	/// HTTP JSON-RPC endpoint of the destination chain node.
	pub ethereum_endpoint: String,
	/// Address of the basic inbound channel contract.
	pub basic_inbound_channel: H160,
	/// Address of the incentivized inbound channel contract.
	pub incentivized_inbound_channel: H160,
	/// First block covered by the MMR; leaves are offset by it.
	pub beefy_activation_block: u64,
	/// Per-request timeout in seconds.
	pub request_timeout_seconds: u64,
}

impl Default for RpcConfig {
	fn default() -> Self {
		Self {
			parachain_endpoint: "http://localhost:9933".to_string(),
			ethereum_endpoint: "http://localhost:8545".to_string(),
			basic_inbound_channel: H160::zero(),
			incentivized_inbound_channel: H160::zero(),
			beefy_activation_block: 0,
			request_timeout_seconds: 30,
		}
	}
}

#[derive(Deserialize)]
struct RpcResponse {
	result: Option<Value>,
	error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
	code: i64,
	message: String,
}

async fn request(
	http: &reqwest::Client,
	endpoint: &str,
	method: &str,
	params: Value,
) -> Result<Value> {
	trace!(method, %params, "Sending JSON-RPC request");
	let response = http
		.post(endpoint)
		.json(&json!({
			"jsonrpc": "2.0",
			"id": 1,
			"method": method,
			"params": params,
		}))
		.send()
		.await
		.wrap_err_with(|| format!("{method} request failed"))?;

	let response: RpcResponse = response
		.json()
		.await
		.wrap_err_with(|| format!("{method} returned a malformed response"))?;

	if let Some(error) = response.error {
		return Err(eyre!(
			"{method} returned error {}: {}",
			error.code,
			error.message
		));
	}
	response
		.result
		.ok_or_else(|| eyre!("{method} returned neither result nor error"))
}

fn from_hex_value(method: &str, value: &Value) -> Result<Vec<u8>> {
	let data = value
		.as_str()
		.ok_or_else(|| eyre!("{method} result is not a hex string"))?;
	bytes::from_hex(data).map_err(|error| eyre!("{method} returned invalid hex: {error}"))
}

/// Storage key of a plain (unhashed-key) storage item.
fn storage_key(pallet: &str, item: &str) -> Vec<u8> {
	let mut key = twox_128(pallet.as_bytes()).to_vec();
	key.extend(twox_128(item.as_bytes()));
	key
}

/// Offchain storage key the outbound channel pallets index committed batches
/// under.
fn commitment_offchain_key(commitment_hash: H256) -> Vec<u8> {
	let mut key = b"commitment".to_vec();
	key.extend(commitment_hash.as_bytes());
	key
}

/// Leaf index covering `leaf_block`, accounting for an MMR that started
/// after genesis.
fn leaf_index_for_block(leaf_block: u64, beefy_activation_block: u64) -> Result<u64> {
	let leaf_index = if beefy_activation_block == 0 {
		leaf_block.checked_sub(1)
	} else {
		leaf_block.checked_sub(beefy_activation_block)
	};
	leaf_index.ok_or_else(|| {
		eyre!("block {leaf_block} precedes the MMR activation block {beefy_activation_block}")
	})
}

/// Read client for the parachain node.
#[derive(Clone)]
pub struct ParachainRpc {
	http: reqwest::Client,
	endpoint: String,
	beefy_activation_block: u64,
}

impl ParachainRpc {
	pub fn new(config: &RpcConfig) -> Result<Self> {
		let http = reqwest::Client::builder()
			.timeout(Duration::from_secs(config.request_timeout_seconds))
			.build()
			.wrap_err("Failed to build parachain HTTP client")?;
		Ok(Self {
			http,
			endpoint: config.parachain_endpoint.clone(),
			beefy_activation_block: config.beefy_activation_block,
		})
	}

	async fn request(&self, method: &str, params: Value) -> Result<Value> {
		request(&self.http, &self.endpoint, method, params).await
	}

	async fn get_storage(&self, key: &[u8], at: H256) -> Result<StorageEntry<Vec<u8>>> {
		let result = self
			.request("state_getStorage", json!([bytes::to_hex(key, false), at]))
			.await?;
		match &result {
			Value::Null => Ok(StorageEntry::Absent),
			value => Ok(StorageEntry::Found(from_hex_value(
				"state_getStorage",
				value,
			)?)),
		}
	}
}

#[async_trait]
impl ParachainClient for ParachainRpc {
	async fn block_hash(&self, block_number: u64) -> Result<H256> {
		let result = self
			.request("chain_getBlockHash", json!([block_number]))
			.await?;
		if result.is_null() {
			return Err(eyre!("no block hash for block {block_number}"));
		}
		serde_json::from_value(result)
			.wrap_err_with(|| format!("malformed block hash for block {block_number}"))
	}

	async fn auxiliary_digest(&self, at: H256) -> Result<StorageEntry<AuxiliaryDigest>> {
		let key = storage_key("LeafProvider", "LatestDigest");
		match self.get_storage(&key, at).await? {
			StorageEntry::Absent => Ok(StorageEntry::Absent),
			StorageEntry::Found(data) => {
				let digest = AuxiliaryDigest::decode(&mut &data[..])
					.wrap_err("Failed to decode auxiliary digest")?;
				Ok(StorageEntry::Found(digest))
			},
		}
	}

	async fn outbound_commitment(
		&self,
		channel_id: ChannelId,
		commitment_hash: H256,
	) -> Result<CommitmentBatch> {
		let key = commitment_offchain_key(commitment_hash);
		let result = self
			.request(
				"offchain_localStorageGet",
				json!(["PERSISTENT", bytes::to_hex(&key, false)]),
			)
			.await?;
		if result.is_null() {
			return Err(eyre!(
				"no commitment data for {commitment_hash:?} on {channel_id} channel"
			));
		}
		let data = from_hex_value("offchain_localStorageGet", &result)?;

		let nonces = match channel_id {
			ChannelId::Basic => Vec::<BasicOutboundMessage>::decode(&mut &data[..])
				.wrap_err("Failed to decode basic channel batch")?
				.iter()
				.map(|message| message.nonce)
				.collect(),
			ChannelId::Incentivized => Vec::<IncentivizedOutboundMessage>::decode(&mut &data[..])
				.wrap_err("Failed to decode incentivized channel batch")?
				.iter()
				.map(|message| message.nonce)
				.collect(),
		};
		Ok(CommitmentBatch { nonces, data })
	}

	async fn channel_nonce(
		&self,
		channel_id: ChannelId,
		at: H256,
	) -> Result<StorageEntry<u64>> {
		let key = storage_key(channel_id.outbound_pallet(), "Nonce");
		match self.get_storage(&key, at).await? {
			StorageEntry::Absent => Ok(StorageEntry::Absent),
			StorageEntry::Found(data) => {
				let nonce = u64::decode(&mut &data[..])
					.wrap_err_with(|| format!("Failed to decode {channel_id} channel nonce"))?;
				Ok(StorageEntry::Found(nonce))
			},
		}
	}

	async fn mmr_leaf_proof(&self, leaf_block: u64, at: H256) -> Result<GeneratedMmrProof> {
		let leaf_index = leaf_index_for_block(leaf_block, self.beefy_activation_block)?;
		let result = self
			.request("mmr_generateProof", json!([leaf_index, at]))
			.await?;

		#[derive(Deserialize)]
		#[serde(rename_all = "camelCase")]
		struct RawProof {
			block_hash: H256,
			leaf: String,
			proof: String,
		}
		let raw: RawProof = serde_json::from_value(result)
			.wrap_err("mmr_generateProof returned a malformed response")?;

		let leaf = bytes::from_hex(&raw.leaf)
			.map_err(|error| eyre!("mmr_generateProof returned an invalid leaf: {error}"))?;
		let proof_bytes = bytes::from_hex(&raw.proof)
			.map_err(|error| eyre!("mmr_generateProof returned an invalid proof: {error}"))?;
		let proof = MmrPath::decode(&mut &proof_bytes[..])
			.wrap_err("Failed to decode MMR proof path")?;

		Ok(GeneratedMmrProof {
			block_hash: raw.block_hash,
			leaf,
			proof,
		})
	}

	async fn mmr_root(&self, at: H256) -> Result<StorageEntry<H256>> {
		let key = storage_key("Mmr", "RootHash");
		match self.get_storage(&key, at).await? {
			StorageEntry::Absent => Ok(StorageEntry::Absent),
			StorageEntry::Found(data) => {
				let root =
					H256::decode(&mut &data[..]).wrap_err("Failed to decode MMR root hash")?;
				Ok(StorageEntry::Found(root))
			},
		}
	}

	async fn mmr_leaf_count(&self, at: H256) -> Result<StorageEntry<u64>> {
		let key = storage_key("Mmr", "NumberOfLeaves");
		match self.get_storage(&key, at).await? {
			StorageEntry::Absent => Ok(StorageEntry::Absent),
			StorageEntry::Found(data) => {
				let count =
					u64::decode(&mut &data[..]).wrap_err("Failed to decode MMR leaf count")?;
				Ok(StorageEntry::Found(count))
			},
		}
	}
}

/// Read client for the destination chain's inbound channel contracts.
#[derive(Clone)]
pub struct EthereumRpc {
	http: reqwest::Client,
	endpoint: String,
	basic_inbound_channel: H160,
	incentivized_inbound_channel: H160,
}

impl EthereumRpc {
	pub fn new(config: &RpcConfig) -> Result<Self> {
		let http = reqwest::Client::builder()
			.timeout(Duration::from_secs(config.request_timeout_seconds))
			.build()
			.wrap_err("Failed to build ethereum HTTP client")?;
		Ok(Self {
			http,
			endpoint: config.ethereum_endpoint.clone(),
			basic_inbound_channel: config.basic_inbound_channel,
			incentivized_inbound_channel: config.incentivized_inbound_channel,
		})
	}
}

/// Selector of the inbound channel contracts' `nonce()` view function.
fn nonce_selector() -> [u8; 4] {
	let hash = keccak_256(b"nonce()");
	[hash[0], hash[1], hash[2], hash[3]]
}

/// The nonce is a uint64 in the low-order bytes of the returned 32-byte word.
fn decode_nonce_word(word: &[u8]) -> Result<u64> {
	if word.len() != 32 {
		return Err(eyre!(
			"eth_call returned {} bytes, expected a 32 byte word",
			word.len()
		));
	}
	let mut nonce = [0u8; 8];
	nonce.copy_from_slice(&word[24..]);
	Ok(u64::from_be_bytes(nonce))
}

#[async_trait]
impl EthereumClient for EthereumRpc {
	async fn channel_nonce(&self, channel_id: ChannelId) -> Result<u64> {
		let contract = match channel_id {
			ChannelId::Basic => self.basic_inbound_channel,
			ChannelId::Incentivized => self.incentivized_inbound_channel,
		};

		// the pending view keeps in-flight deliveries from reading as
		// divergence
		let result = request(
			&self.http,
			&self.endpoint,
			"eth_call",
			json!([
				{
					"to": contract,
					"data": bytes::to_hex(&nonce_selector(), false),
				},
				"pending",
			]),
		)
		.await?;

		let word = from_hex_value("eth_call", &result)?;
		decode_nonce_word(&word)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use hex_literal::hex;
	use test_case::test_case;

	#[test]
	fn storage_key_matches_known_twox_vectors() {
		assert_eq!(
			storage_key("System", "Account"),
			hex!("26aa394eea5630e07c48ae0c9558cef7b99d880ec681799c0cf30e8886371da9").to_vec()
		);
	}

	#[test]
	fn nonce_selector_matches_known_abi_vector() {
		assert_eq!(nonce_selector(), hex!("affed0e0"));
	}

	#[test]
	fn commitment_key_is_prefix_plus_hash() {
		let key = commitment_offchain_key(H256::repeat_byte(5));
		assert_eq!(&key[..10], &b"commitment"[..]);
		assert_eq!(&key[10..], H256::repeat_byte(5).as_bytes());
	}

	#[test_case(101, 0 => 100; "activation at genesis is off by one")]
	#[test_case(101, 50 => 51; "later activation offsets the index")]
	fn leaf_index_table(leaf_block: u64, activation: u64) -> u64 {
		leaf_index_for_block(leaf_block, activation).unwrap()
	}

	#[test]
	fn pre_activation_block_has_no_leaf() {
		assert!(leaf_index_for_block(0, 0).is_err());
		assert!(leaf_index_for_block(49, 50).is_err());
	}

	#[test]
	fn nonce_word_decodes_low_order_bytes() {
		let mut word = [0u8; 32];
		word[24..].copy_from_slice(&42u64.to_be_bytes());
		assert_eq!(decode_nonce_word(&word).unwrap(), 42);

		assert!(decode_nonce_word(&[0u8; 8]).is_err());
	}
}
