//! Core catch-up engine of the parachain message bridge relayer.
//!
//! Detects nonce divergence between the parachain's outbound channels and the
//! destination chain's inbound channels, reconstructs the missing commitments
//! by scanning parachain history backward, and packages them with MMR
//! membership proofs anchored at a single finalized checkpoint. Delivery of
//! the packages is a separate concern.

pub mod catchup;
pub mod network;
pub mod package;
pub mod proof;
pub mod search;
pub mod shutdown;
pub mod types;
pub mod utils;
