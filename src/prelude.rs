pub use crate::builder::{CacheBuilder, HerdGuardedCache, PartitionedHerdGuardedCache};
pub use crate::config::CacheConfig;
pub use crate::error::{ConfigError, InvariantError, SharedError};
pub use crate::metrics::CacheMetricsSnapshot;
pub use crate::policy::direct::DirectCache;
pub use crate::policy::events::{CacheId, EvictionBatch, EvictionListener};
pub use crate::policy::generational::{CacheGuard, Insertion, Version};
pub use crate::policy::partitioned::PartitionedCache;
pub use crate::policy::read_through::ReadThroughCache;
pub use crate::source::FnSource;
pub use crate::source::herd::ThunderingHerdGuard;
pub use crate::traits::{AsyncCache, CoreCache, DataSource};
