//! Descriptor management
//!
//! Pools with fixed quotas, layouts built from declared bindings, and a
//! writer that validates writes against the layout. The writer reaches pool
//! and layout internals through `pub(super)` accessors only.

/// Descriptor set layouts
pub mod layout;

/// Descriptor pools and quota tracking
pub mod pool;

/// Batched descriptor writes
pub mod writer;

pub use layout::{BindingSpec, DescriptorSetLayout, DescriptorSetLayoutBuilder, LayoutBindings};
pub use pool::{DescriptorPool, DescriptorPoolBuilder, PoolBudget};
pub use writer::{DescriptorWriter, WriteBatch};
