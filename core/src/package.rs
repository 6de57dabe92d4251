//! Final assembly of proved blocks into transport-ready message packages.

use color_eyre::{eyre::eyre, Result};

use crate::types::{MessagePackage, ParaBlockWithDigest, ParaBlockWithProofs};

/// Builds one package per commitment item out of blocks already sorted into
/// ascending (replay) order, resolving each block's leaf index against the
/// checkpoint's total leaf count.
pub fn create_message_packages(
	blocks_with_proofs: Vec<ParaBlockWithProofs>,
	mmr_leaf_count: u64,
) -> Result<Vec<MessagePackage>> {
	let mut packages = Vec::new();

	for ParaBlockWithProofs {
		block,
		proof,
		mmr_root,
		mmr_proof_leaf_index,
	} in blocks_with_proofs
	{
		let leaf_index = resolve_leaf_index(mmr_proof_leaf_index, mmr_leaf_count)?;
		let ParaBlockWithDigest {
			block_number,
			digest_items_with_data,
			..
		} = block;

		for item in digest_items_with_data {
			packages.push(MessagePackage {
				channel_id: item.channel_id,
				commitment_hash: item.commitment_hash,
				commitment_data: item.data,
				para_block_number: block_number,
				leaf_index,
				leaf_count: mmr_leaf_count,
				proof: proof.clone(),
				mmr_root,
			});
		}
	}

	Ok(packages)
}

/// The per-run leaf index hint is `checkpoint - 1`; when the MMR started
/// after genesis it is shorter than the chain and the last leaf sits below
/// the hint, so the index is clamped to the final leaf of the checkpoint's
/// MMR.
fn resolve_leaf_index(hint: u64, mmr_leaf_count: u64) -> Result<u64> {
	if mmr_leaf_count == 0 {
		return Err(eyre!("checkpoint MMR has no leaves"));
	}
	Ok(hint.min(mmr_leaf_count - 1))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::types::{ChannelId, DigestItemWithData, GeneratedMmrProof, MmrPath};
	use sp_core::H256;
	use test_case::test_case;

	fn proved_block(
		block_number: u64,
		channels: Vec<ChannelId>,
		mmr_proof_leaf_index: u64,
	) -> ParaBlockWithProofs {
		let digest_items_with_data = channels
			.into_iter()
			.map(|channel_id| DigestItemWithData {
				channel_id,
				commitment_hash: H256::repeat_byte(block_number as u8),
				data: vec![block_number as u8],
			})
			.collect();
		ParaBlockWithProofs {
			block: ParaBlockWithDigest {
				block_number,
				digest: Default::default(),
				digest_items_with_data,
			},
			proof: GeneratedMmrProof {
				block_hash: H256::repeat_byte(0xcc),
				leaf: vec![block_number as u8],
				proof: MmrPath {
					leaf_index: block_number,
					leaf_count: 200,
					items: vec![],
				},
			},
			mmr_root: H256::repeat_byte(0xaa),
			mmr_proof_leaf_index,
		}
	}

	#[test_case(199, 200 => 199; "activation at genesis")]
	#[test_case(199, 150 => 149; "later activation clamps to last leaf")]
	fn leaf_index_resolution(hint: u64, leaf_count: u64) -> u64 {
		resolve_leaf_index(hint, leaf_count).unwrap()
	}

	#[test]
	fn empty_mmr_is_an_error() {
		assert!(resolve_leaf_index(199, 0).is_err());
	}

	#[test]
	fn packages_preserve_block_order_and_expand_items() {
		let blocks = vec![
			proved_block(98, vec![ChannelId::Basic], 199),
			proved_block(99, vec![ChannelId::Basic, ChannelId::Incentivized], 199),
			proved_block(100, vec![ChannelId::Incentivized], 199),
		];

		let packages = create_message_packages(blocks, 200).unwrap();

		let order: Vec<(u64, ChannelId)> = packages
			.iter()
			.map(|p| (p.para_block_number, p.channel_id))
			.collect();
		assert_eq!(
			order,
			vec![
				(98, ChannelId::Basic),
				(99, ChannelId::Basic),
				(99, ChannelId::Incentivized),
				(100, ChannelId::Incentivized),
			]
		);
		for package in &packages {
			assert_eq!(package.leaf_index, 199);
			assert_eq!(package.leaf_count, 200);
			assert_eq!(package.mmr_root, H256::repeat_byte(0xaa));
		}
	}
}
