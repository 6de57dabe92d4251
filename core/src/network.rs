//! Client traits for the two chain endpoints the catch-up engine reads from.
//!
//! Connection and session management belong to the implementations; the
//! engine only consumes these read paths. Mocks are generated for tests.

use async_trait::async_trait;
use color_eyre::Result;
use mockall::automock;
use sp_core::H256;

use crate::types::{AuxiliaryDigest, ChannelId, CommitmentBatch, GeneratedMmrProof, StorageEntry};

pub mod rpc;

/// Read access to the source parachain (and the relay chain state it is
/// anchored to) at specific block hashes.
#[async_trait]
#[automock]
pub trait ParachainClient {
	async fn block_hash(&self, block_number: u64) -> Result<H256>;

	/// Auxiliary digest of the block with the given hash; `Absent` when the
	/// block carried no digest entry.
	async fn auxiliary_digest(&self, at: H256) -> Result<StorageEntry<AuxiliaryDigest>>;

	/// Outbound message batch recorded under the given commitment hash.
	async fn outbound_commitment(
		&self,
		channel_id: ChannelId,
		commitment_hash: H256,
	) -> Result<CommitmentBatch>;

	/// Latest nonce generated by the channel's outbound pallet, read at the
	/// given (checkpoint) block hash.
	async fn channel_nonce(&self, channel_id: ChannelId, at: H256)
		-> Result<StorageEntry<u64>>;

	/// MMR membership proof for the leaf covering `leaf_block`, anchored at
	/// the given (checkpoint) block hash.
	async fn mmr_leaf_proof(&self, leaf_block: u64, at: H256) -> Result<GeneratedMmrProof>;

	async fn mmr_root(&self, at: H256) -> Result<StorageEntry<H256>>;

	async fn mmr_leaf_count(&self, at: H256) -> Result<StorageEntry<u64>>;
}

/// Read access to the destination chain's inbound channel contracts.
#[async_trait]
#[automock]
pub trait EthereumClient {
	/// Latest nonce delivered to the channel's inbound contract, read with a
	/// pending view so in-flight deliveries do not read as divergence.
	async fn channel_nonce(&self, channel_id: ChannelId) -> Result<u64>;
}
