//! Attaches MMR membership proofs to searched parachain blocks.

use color_eyre::Result;
use tracing::debug;

use crate::{
	network::ParachainClient,
	shutdown::Controller,
	types::{CatchupError, Checkpoint, ParaBlockWithDigest, ParaBlockWithProofs, StorageEntry},
};

/// Augments each searched block with an MMR membership proof anchored at the
/// checkpoint, preserving the given (descending) order.
///
/// The checkpoint's MMR root is read once and reused for every block: all
/// proofs of one run are anchored to the same root, and a checkpoint without
/// a root is unusable.
pub async fn parablocks_with_proofs(
	parachain: &impl ParachainClient,
	shutdown: &Controller<String>,
	blocks: Vec<ParaBlockWithDigest>,
	checkpoint: Checkpoint,
) -> Result<Vec<ParaBlockWithProofs>> {
	shutdown.ensure_running()?;
	let mmr_root = match parachain.mmr_root(checkpoint.hash).await? {
		StorageEntry::Found(root) => root,
		StorageEntry::Absent => return Err(CatchupError::MissingMmrRoot(checkpoint.hash).into()),
	};
	let mmr_proof_leaf_index = checkpoint.block_number.saturating_sub(1);

	let mut blocks_with_proof = Vec::with_capacity(blocks.len());
	for block in blocks {
		shutdown.ensure_running()?;
		debug!(
			block_number = block.block_number,
			checkpoint = %checkpoint,
			"Getting MMR leaf proof for block"
		);

		// the parachain's own leaf for a block lands in the MMR one block
		// after that block's header
		let proof = parachain
			.mmr_leaf_proof(block.block_number + 1, checkpoint.hash)
			.await?;

		blocks_with_proof.push(ParaBlockWithProofs {
			block,
			proof,
			mmr_root,
			mmr_proof_leaf_index,
		});
	}

	Ok(blocks_with_proof)
}
