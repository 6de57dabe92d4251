//! One catch-up pass: detect nonce divergence, reconstruct the missing
//! commitments, and package them with proofs anchored at a single checkpoint.
//!
//! # Flow
//!
//! * Read the delivered nonce of each inbound channel on the destination
//!   chain (pending view) and the generated nonce of each outbound channel on
//!   the parachain at the checkpoint's state
//! * If every channel is up to date, return early with no packages
//! * Scan the parachain backward for the blocks carrying the missing
//!   commitments
//! * Attach an MMR membership proof per block, anchored at the checkpoint
//! * Reverse into replay (ascending) order and build the final packages
//!
//! The whole pass is a read path: nothing is submitted anywhere, and every
//! run re-derives its state from the checkpoint instead of caching.

use color_eyre::Result;
use tracing::info;

use crate::{
	network::{EthereumClient, ParachainClient},
	package::create_message_packages,
	proof::parablocks_with_proofs,
	search::search_for_lost_commitments,
	shutdown::Controller,
	types::{CatchupError, ChannelId, Checkpoint, MessagePackage},
};

/// Builds the packages for all commitments missed before the given
/// checkpoint. Proofs are anchored to the checkpoint's MMR root, so they must
/// be verified against that same checkpoint by whoever delivers them.
///
/// An empty result means the destination is up to date. A non-empty result is
/// ascending by parachain block number.
pub async fn run(
	parachain: &impl ParachainClient,
	ethereum: &impl EthereumClient,
	shutdown: &Controller<String>,
	checkpoint: Checkpoint,
) -> Result<Vec<MessagePackage>> {
	let mut nonces_to_find = Vec::new();

	for channel_id in ChannelId::ALL {
		shutdown.ensure_running()?;
		let delivered = ethereum.channel_nonce(channel_id).await?;
		info!(
			channel = %channel_id,
			nonce = delivered,
			"Checked latest nonce delivered to inbound channel"
		);

		let generated = parachain
			.channel_nonce(channel_id, checkpoint.hash)
			.await?
			.unwrap_or_default();
		info!(
			channel = %channel_id,
			nonce = generated,
			"Checked latest nonce generated by outbound channel"
		);

		if delivered != generated {
			nonces_to_find.push((channel_id, delivered));
		}
	}

	if nonces_to_find.is_empty() {
		return Ok(Vec::new());
	}

	info!("Nonces are not all up to date, searching for lost commitments");
	let para_blocks =
		search_for_lost_commitments(parachain, shutdown, checkpoint.block_number, &nonces_to_find)
			.await?;
	info!(
		blocks = para_blocks.len(),
		"Stopped searching for lost commitments"
	);

	let mut blocks_with_proofs =
		parablocks_with_proofs(parachain, shutdown, para_blocks, checkpoint).await?;

	// search order is newest first; replay must happen oldest first so the
	// destination accepts nonces in order
	blocks_with_proofs.reverse();

	shutdown.ensure_running()?;
	let mmr_leaf_count = parachain
		.mmr_leaf_count(checkpoint.hash)
		.await?
		.found()
		.ok_or(CatchupError::MissingLeafCount(checkpoint.hash))?;

	let packages = create_message_packages(blocks_with_proofs, mmr_leaf_count)?;
	info!(packages = packages.len(), "Created message packages");

	Ok(packages)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::network::{MockEthereumClient, MockParachainClient};
	use crate::types::{
		AuxiliaryDigest, AuxiliaryDigestItem, CommitmentBatch, GeneratedMmrProof, MmrPath,
		StorageEntry,
	};
	use sp_core::H256;

	const CHECKPOINT: Checkpoint = Checkpoint {
		block_number: 101,
		hash: H256::repeat_byte(0xcc),
	};

	fn block_hash(block_number: u64) -> H256 {
		H256::repeat_byte(block_number as u8)
	}

	fn ethereum_with_nonces(basic: u64, incentivized: u64) -> MockEthereumClient {
		let mut ethereum = MockEthereumClient::new();
		ethereum
			.expect_channel_nonce()
			.times(2)
			.returning(move |channel_id| {
				let nonce = match channel_id {
					ChannelId::Basic => basic,
					ChannelId::Incentivized => incentivized,
				};
				Box::pin(async move { Ok(nonce) })
			});
		ethereum
	}

	/// Parachain with basic-channel commitments at the given blocks, plus the
	/// full proof surface of one checkpoint.
	fn parachain_with_commitments(
		generated: (u64, u64),
		commitments: Vec<(u64, Vec<u64>)>,
	) -> MockParachainClient {
		let mut parachain = MockParachainClient::new();

		parachain
			.expect_channel_nonce()
			.returning(move |channel_id, at| {
				assert_eq!(at, CHECKPOINT.hash);
				let nonce = match channel_id {
					ChannelId::Basic => generated.0,
					ChannelId::Incentivized => generated.1,
				};
				Box::pin(async move { Ok(StorageEntry::Found(nonce)) })
			});

		parachain
			.expect_block_hash()
			.returning(|block_number| Box::pin(async move { Ok(block_hash(block_number)) }));

		let digests = commitments.clone();
		parachain.expect_auxiliary_digest().returning(move |at| {
			let entry = match digests
				.iter()
				.find(|(block_number, _)| block_hash(*block_number) == at)
			{
				None => StorageEntry::Absent,
				Some((block_number, _)) => StorageEntry::Found(AuxiliaryDigest {
					logs: vec![AuxiliaryDigestItem::Commitment {
						channel_id: ChannelId::Basic,
						commitment_hash: H256::repeat_byte(0x40 ^ *block_number as u8),
					}],
				}),
			};
			Box::pin(async move { Ok(entry) })
		});

		parachain
			.expect_outbound_commitment()
			.returning(move |channel_id, hash| {
				assert_eq!(channel_id, ChannelId::Basic);
				let (_, nonces) = commitments
					.iter()
					.find(|(block_number, _)| H256::repeat_byte(0x40 ^ *block_number as u8) == hash)
					.expect("commitment fetched for unknown hash");
				let batch = CommitmentBatch {
					nonces: nonces.clone(),
					data: nonces.iter().map(|nonce| *nonce as u8).collect::<Vec<_>>(),
				};
				Box::pin(async move { Ok(batch) })
			});

		parachain.expect_mmr_root().returning(|at| {
			assert_eq!(at, CHECKPOINT.hash);
			Box::pin(async { Ok(StorageEntry::Found(H256::repeat_byte(0xaa))) })
		});
		parachain
			.expect_mmr_leaf_proof()
			.returning(|leaf_block, at| {
				assert_eq!(at, CHECKPOINT.hash);
				let proof = GeneratedMmrProof {
					block_hash: at,
					leaf: vec![leaf_block as u8],
					proof: MmrPath {
						leaf_index: leaf_block - 1,
						leaf_count: CHECKPOINT.block_number,
						items: vec![H256::repeat_byte(0xee)],
					},
				};
				Box::pin(async move { Ok(proof) })
			});

		// leaf count expectations stay with the individual tests
		parachain
	}

	#[tokio::test]
	async fn equal_nonces_are_a_cheap_no_op() {
		// only the four nonce reads may happen: the mocks would panic on any
		// search or proof call
		let mut parachain = MockParachainClient::new();
		parachain
			.expect_channel_nonce()
			.times(2)
			.returning(|_, _| Box::pin(async { Ok(StorageEntry::Found(5)) }));
		let ethereum = ethereum_with_nonces(5, 5);
		let shutdown = Controller::new();

		let packages = run(&parachain, &ethereum, &shutdown, CHECKPOINT)
			.await
			.unwrap();

		assert!(packages.is_empty());
	}

	#[tokio::test]
	async fn never_used_channels_read_as_zero_and_stay_in_sync() {
		let mut parachain = MockParachainClient::new();
		parachain
			.expect_channel_nonce()
			.times(2)
			.returning(|_, _| Box::pin(async { Ok(StorageEntry::Absent) }));
		let ethereum = ethereum_with_nonces(0, 0);
		let shutdown = Controller::new();

		let packages = run(&parachain, &ethereum, &shutdown, CHECKPOINT)
			.await
			.unwrap();

		assert!(packages.is_empty());
	}

	#[tokio::test]
	async fn divergent_channel_is_caught_up_in_replay_order() {
		// destination basic nonce 3, parachain generated 7, commitments
		// spread over blocks 98..=100 with a straddling batch at 98
		let mut parachain = parachain_with_commitments(
			(7, 5),
			vec![(100, vec![6, 7]), (99, vec![5]), (98, vec![3, 4])],
		);
		parachain.expect_mmr_leaf_count().returning(|_| {
			Box::pin(async { Ok(StorageEntry::Found(CHECKPOINT.block_number)) })
		});
		let ethereum = ethereum_with_nonces(3, 5);
		let shutdown = Controller::new();

		let packages = run(&parachain, &ethereum, &shutdown, CHECKPOINT)
			.await
			.unwrap();

		let block_numbers: Vec<u64> = packages.iter().map(|p| p.para_block_number).collect();
		assert_eq!(block_numbers, vec![98, 99, 100]);

		// every missing nonce in (3, 7] appears in some package's batch
		let mut delivered_nonces: Vec<u64> = packages
			.iter()
			.flat_map(|p| p.commitment_data.iter().map(|nonce| *nonce as u64))
			.collect();
		delivered_nonces.sort_unstable();
		assert_eq!(delivered_nonces, vec![3, 4, 5, 6, 7]);

		for package in &packages {
			assert_eq!(package.channel_id, ChannelId::Basic);
			assert_eq!(package.mmr_root, H256::repeat_byte(0xaa));
			assert_eq!(package.leaf_index, CHECKPOINT.block_number - 1);
			assert_eq!(package.leaf_count, CHECKPOINT.block_number);
		}
	}

	#[tokio::test]
	async fn missing_leaf_count_is_fatal() {
		let mut parachain = parachain_with_commitments((7, 5), vec![(100, vec![3, 4, 5, 6, 7])]);
		parachain
			.expect_mmr_leaf_count()
			.returning(|_| Box::pin(async { Ok(StorageEntry::Absent) }));

		let ethereum = ethereum_with_nonces(3, 5);
		let shutdown = Controller::new();

		let result = run(&parachain, &ethereum, &shutdown, CHECKPOINT).await;

		let error = result.unwrap_err();
		assert_eq!(
			error.downcast_ref::<CatchupError>(),
			Some(&CatchupError::MissingLeafCount(CHECKPOINT.hash))
		);
	}

	#[tokio::test]
	async fn cancellation_discards_partial_results() {
		let parachain = MockParachainClient::new();
		let ethereum = MockEthereumClient::new();
		let shutdown = Controller::new();
		shutdown.trigger_shutdown("new checkpoint observed".to_string());

		let result = run(&parachain, &ethereum, &shutdown, CHECKPOINT).await;

		let error = result.unwrap_err();
		assert_eq!(
			error.downcast_ref::<CatchupError>(),
			Some(&CatchupError::Cancelled("new checkpoint observed".to_string()))
		);
	}
}
