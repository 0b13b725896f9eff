//! Internal implementation details.

pub(crate) mod dispose_bag;
pub(crate) mod instance_cache;

pub(crate) use dispose_bag::{DisposeBag, Disposal};
pub(crate) use instance_cache::{InstanceCache, InstanceKey};
