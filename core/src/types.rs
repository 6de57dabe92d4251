//! Shared catch-up engine structs and enums.

use codec::{Decode, Encode};
use serde::{Deserialize, Serialize};
use sp_core::{H160, H256, U256};
use std::fmt::{self, Display, Formatter};

/// Identifier of one of the two independent, nonce-ordered message lanes
/// between the parachain and the destination chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Encode, Decode, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelId {
	Basic,
	Incentivized,
}

impl ChannelId {
	pub const ALL: [ChannelId; 2] = [ChannelId::Basic, ChannelId::Incentivized];

	/// Name of the outbound channel pallet on the parachain side.
	pub fn outbound_pallet(&self) -> &'static str {
		match self {
			ChannelId::Basic => "BasicOutboundChannel",
			ChannelId::Incentivized => "IncentivizedOutboundChannel",
		}
	}
}

impl Display for ChannelId {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			ChannelId::Basic => "basic",
			ChannelId::Incentivized => "incentivized",
		})
	}
}

/// A finalized relay chain block all proofs of one catch-up run are anchored to.
///
/// The MMR root and total leaf count are read once at this block's state and
/// reused for every proof in the run; proofs anchored at different checkpoints
/// must never be mixed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Checkpoint {
	pub block_number: u64,
	pub hash: H256,
}

impl Display for Checkpoint {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		write!(f, "#{} ({:?})", self.block_number, self.hash)
	}
}

/// Result of a single storage lookup, with "no entry" kept apart from both
/// success and failure so skip-vs-fail decisions stay explicit at call sites.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageEntry<T> {
	Found(T),
	Absent,
}

impl<T> StorageEntry<T> {
	pub fn found(self) -> Option<T> {
		match self {
			StorageEntry::Found(value) => Some(value),
			StorageEntry::Absent => None,
		}
	}

	/// Treats an absent entry as the type's default value (an absent channel
	/// nonce reads as 0: the channel was never used).
	pub fn unwrap_or_default(self) -> T
	where
		T: Default,
	{
		self.found().unwrap_or_default()
	}
}

/// Auxiliary digest attached to one parachain block, as stored by the leaf
/// provider pallet.
#[derive(Clone, Debug, Default, PartialEq, Eq, Encode, Decode)]
pub struct AuxiliaryDigest {
	pub logs: Vec<AuxiliaryDigestItem>,
}

impl AuxiliaryDigest {
	/// Commitment-tagged digest items, in digest order.
	pub fn commitments(&self) -> impl Iterator<Item = (ChannelId, H256)> + '_ {
		self.logs.iter().map(|item| {
			let AuxiliaryDigestItem::Commitment {
				channel_id,
				commitment_hash,
			} = item;
			(*channel_id, *commitment_hash)
		})
	}
}

#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub enum AuxiliaryDigestItem {
	Commitment {
		channel_id: ChannelId,
		commitment_hash: H256,
	},
}

/// A commitment digest item paired with the raw storage bytes backing its
/// message batch, retained so packaging needs no re-fetch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DigestItemWithData {
	pub channel_id: ChannelId,
	pub commitment_hash: H256,
	pub data: Vec<u8>,
}

/// A parachain block visited during search, with the digest items that were
/// still unresolved when the block was reached.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParaBlockWithDigest {
	pub block_number: u64,
	pub digest: AuxiliaryDigest,
	pub digest_items_with_data: Vec<DigestItemWithData>,
}

/// A searched block augmented with its MMR membership proof and the
/// checkpoint root the proof is anchored to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParaBlockWithProofs {
	pub block: ParaBlockWithDigest,
	pub proof: GeneratedMmrProof,
	pub mmr_root: H256,
	/// `checkpoint.block_number - 1` for every block of one run: the
	/// checkpoint, not the individual block, determines which leaf the
	/// destination chain verifies against.
	pub mmr_proof_leaf_index: u64,
}

/// Decoded nonce view of one channel's outbound message batch plus the raw
/// SCALE bytes the batch was decoded from.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommitmentBatch {
	pub nonces: Vec<u64>,
	pub data: Vec<u8>,
}

impl CommitmentBatch {
	/// True when the batch reaches at or below the target nonce, i.e. this is
	/// the batch straddling or preceding the last delivered message.
	pub fn has_nonce_at_or_below(&self, target: u64) -> bool {
		self.nonces.iter().any(|nonce| *nonce <= target)
	}

	/// True when the batch still carries undelivered messages past the target.
	pub fn has_nonce_above(&self, target: u64) -> bool {
		self.nonces.iter().any(|nonce| *nonce > target)
	}
}

/// Message layout of the basic outbound channel pallet.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct BasicOutboundMessage {
	pub target: H160,
	pub nonce: u64,
	pub payload: Vec<u8>,
}

/// Message layout of the incentivized outbound channel pallet.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct IncentivizedOutboundMessage {
	pub target: H160,
	pub nonce: u64,
	pub fee: U256,
	pub payload: Vec<u8>,
}

/// Response of the node's `mmr_generateProof` RPC, with the opaque encoded
/// leaf and the decoded proof path.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GeneratedMmrProof {
	pub block_hash: H256,
	#[serde(with = "sp_core::bytes")]
	pub leaf: Vec<u8>,
	pub proof: MmrPath,
}

#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode, Serialize)]
pub struct MmrPath {
	pub leaf_index: u64,
	pub leaf_count: u64,
	pub items: Vec<H256>,
}

/// The final transport unit: one channel commitment with its proof, ready for
/// delivery to the destination chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessagePackage {
	pub channel_id: ChannelId,
	pub commitment_hash: H256,
	#[serde(with = "sp_core::bytes")]
	pub commitment_data: Vec<u8>,
	pub para_block_number: u64,
	pub leaf_index: u64,
	pub leaf_count: u64,
	pub proof: GeneratedMmrProof,
	pub mmr_root: H256,
}

/// Failure classes callers must tell apart from plain connectivity errors.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CatchupError {
	/// Backward search reached block 0 while a channel's target nonce was
	/// still unresolved: the gap exceeds recorded history and the run must
	/// not pretend the result is complete.
	#[error("parachain history exhausted while nonce {nonce} on {channel_id} channel was still unresolved")]
	HistoryExhausted { channel_id: ChannelId, nonce: u64 },
	#[error("no MMR root in storage at checkpoint {0:?}")]
	MissingMmrRoot(H256),
	#[error("no MMR leaf count in storage at checkpoint {0:?}")]
	MissingLeafCount(H256),
	#[error("catch-up run cancelled: {0}")]
	Cancelled(String),
}

pub mod tracing_level_format {
	use serde::{self, Deserialize, Deserializer, Serializer};
	use std::str::FromStr;
	use tracing::Level;

	pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(&level.to_string())
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
	where
		D: Deserializer<'de>,
	{
		let value = String::deserialize(deserializer)?;
		Level::from_str(&value).map_err(serde::de::Error::custom)
	}
}
