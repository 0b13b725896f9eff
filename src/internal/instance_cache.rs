//! Per-scope cache of created instances.

use std::sync::Arc;

use ahash::AHashMap;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::error::DiResult;
use crate::key::ServiceType;
use crate::registration::{AnyArc, FactoryId};

/// Cache slot identity: the produced service type plus every factory that
/// contributes to the instance, outermost decorator first.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct InstanceKey {
    pub(crate) service_type: ServiceType,
    pub(crate) chain: SmallVec<[FactoryId; 4]>,
}

impl InstanceKey {
    pub(crate) fn new(service_type: ServiceType, chain: SmallVec<[FactoryId; 4]>) -> Self {
        Self { service_type, chain }
    }
}

/// Single-flight instance slots.
///
/// The map lock is held only to fetch the slot; creation runs under the slot's
/// `OnceCell`, so concurrent requests for one key wait for a single factory call
/// while other keys proceed. A failed creation leaves the slot empty.
#[derive(Default)]
pub(crate) struct InstanceCache {
    slots: Mutex<AHashMap<InstanceKey, Arc<OnceCell<AnyArc>>>>,
}

impl InstanceCache {
    pub(crate) fn get_or_create<F>(&self, key: &InstanceKey, create: F) -> DiResult<AnyArc>
    where
        F: FnOnce() -> DiResult<AnyArc>,
    {
        let slot = {
            let mut slots = self.slots.lock();
            slots.entry(key.clone()).or_default().clone()
        };
        slot.get_or_try_init(create).cloned()
    }

    pub(crate) fn clear(&self) {
        self.slots.lock().clear();
    }

    /// Number of created instances.
    pub(crate) fn len(&self) -> usize {
        self.slots.lock().values().filter(|slot| slot.get().is_some()).count()
    }
}
