pub mod shard;

pub use shard::PartitionSelector;
