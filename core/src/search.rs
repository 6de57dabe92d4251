//! Backward search for channel commitments missing on the destination chain.
//!
//! The parachain keeps no "commitments since nonce N" index, only per-block
//! auxiliary digests, so the missing range is reconstructed by a linear scan
//! backward from the checkpoint's parachain block. Each channel stops
//! independently at the first batch reaching at or below its target nonce;
//! worst-case work is bounded by how far behind the destination has fallen.

use codec::Encode;
use color_eyre::Result;
use tracing::{debug, info};

use crate::{
	network::ParachainClient,
	shutdown::Controller,
	types::{CatchupError, ChannelId, DigestItemWithData, ParaBlockWithDigest, StorageEntry},
	utils::digest_content_hash,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CursorState {
	Searching,
	Found,
}

/// Per-channel search cursor. Channels advance independently within one scan,
/// so adding a lane means adding a cursor, not restructuring the loop.
#[derive(Clone, Copy, Debug)]
struct ChannelCursor {
	channel_id: ChannelId,
	nonce_to_find: u64,
	state: CursorState,
}

impl ChannelCursor {
	fn searching(&self) -> bool {
		self.state == CursorState::Searching
	}
}

/// Scans backward from `last_para_block_number` (inclusive) until a batch
/// containing a nonce at or below each channel's target has been located.
///
/// Only divergent channels belong in `nonces_to_find`; a channel that never
/// emitted a commitment would otherwise drive the scan to the start of
/// history. The terminal batch is itself retained when it straddles the
/// target, since its tail nonces are still undelivered.
///
/// Returns the visited blocks that still carried unresolved commitment items,
/// in descending block-number order. Reaching block 0 with any cursor still
/// searching is a hard [`CatchupError::HistoryExhausted`] error.
pub async fn search_for_lost_commitments(
	parachain: &impl ParachainClient,
	shutdown: &Controller<String>,
	last_para_block_number: u64,
	nonces_to_find: &[(ChannelId, u64)],
) -> Result<Vec<ParaBlockWithDigest>> {
	debug!(
		latest_block_number = last_para_block_number,
		?nonces_to_find,
		"Searching backwards from latest parachain block to find blocks with nonces"
	);

	let mut cursors: Vec<ChannelCursor> = nonces_to_find
		.iter()
		.map(|(channel_id, nonce_to_find)| ChannelCursor {
			channel_id: *channel_id,
			nonce_to_find: *nonce_to_find,
			state: CursorState::Searching,
		})
		.collect();

	let mut blocks = Vec::new();
	let mut current_block_number = last_para_block_number + 1;

	while cursors.iter().any(ChannelCursor::searching) {
		if current_block_number == 0 {
			let unresolved = cursors
				.iter()
				.find(|cursor| cursor.searching())
				.expect("loop condition guarantees a searching cursor");
			return Err(CatchupError::HistoryExhausted {
				channel_id: unresolved.channel_id,
				nonce: unresolved.nonce_to_find,
			}
			.into());
		}
		current_block_number -= 1;

		shutdown.ensure_running()?;
		debug!(block_number = current_block_number, "Checking header");
		let block_hash = parachain.block_hash(current_block_number).await?;

		let digest = match parachain.auxiliary_digest(block_hash).await? {
			StorageEntry::Found(digest) => digest,
			// no digest entry at this block, keep scanning
			StorageEntry::Absent => continue,
		};
		debug!(
			block_number = current_block_number,
			digest_hash = ?digest_content_hash(&digest),
			digest_size = digest.encode().len(),
			"Found auxiliary digest"
		);

		let mut digest_items_with_data = Vec::new();
		for (channel_id, commitment_hash) in digest.commitments() {
			let Some(cursor) = cursors
				.iter_mut()
				.find(|cursor| cursor.channel_id == channel_id && cursor.searching())
			else {
				continue;
			};

			shutdown.ensure_running()?;
			let batch = parachain
				.outbound_commitment(channel_id, commitment_hash)
				.await?;
			if batch.has_nonce_at_or_below(cursor.nonce_to_find) {
				cursor.state = CursorState::Found;
				info!(
					block_number = current_block_number,
					channel = %channel_id,
					nonce = cursor.nonce_to_find,
					"Reached last delivered nonce, stopping search for channel"
				);
				if batch.has_nonce_above(cursor.nonce_to_find) {
					// the terminal batch straddles the target: its tail is
					// still undelivered and must be relayed with the rest
					digest_items_with_data.push(DigestItemWithData {
						channel_id,
						commitment_hash,
						data: batch.data,
					});
				}
			} else {
				digest_items_with_data.push(DigestItemWithData {
					channel_id,
					commitment_hash,
					data: batch.data,
				});
			}
		}

		if !digest_items_with_data.is_empty() {
			blocks.push(ParaBlockWithDigest {
				block_number: current_block_number,
				digest,
				digest_items_with_data,
			});
		}
	}

	Ok(blocks)
}
