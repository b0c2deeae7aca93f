/// A Tokio codec that transforms a byte stream into a stream of `Message`s.
pub mod codec;
/// Inventory items.
mod inv;
/// An enum of all supported Bitcoin message types.
mod message;

/// The command field identifying a Bitcoin message type.
mod command;
/// Newtype wrappers for primitive types.
pub mod types;

pub use codec::Codec;
pub use command::Command;
pub use inv::{InventoryHash, SplitInventory};
pub use message::{GetBlocks, GetHeaders, MerkleBlock, Message, RejectReason, Version};
