//! Factory registry.
//!
//! The registry maps a [`ServiceType`] to the ordered list of registrations made
//! for it. It is a plain value: the provider publishes a new snapshot for every
//! mutation and resolvers only ever read a complete snapshot.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use ahash::AHashMap;
use smallvec::SmallVec;

#[cfg(feature = "config")]
use serde::{Deserialize, Serialize};

use crate::descriptors::{FactoryDescriptor, SetupKind};
use crate::error::{DiError, DiResult};
use crate::key::{ServiceKey, ServiceType};

// Type-erased Arc for storage
pub type AnyArc = Arc<dyn Any + Send + Sync>;

/// Downcasts a type-erased instance to a concrete type.
pub(crate) fn cast_arc<T: Send + Sync + 'static>(
    any: AnyArc,
    service: &dyn fmt::Display,
) -> DiResult<Arc<T>> {
    any.downcast::<T>().map_err(|_| DiError::TypeMismatch {
        service: service.to_string(),
        expected: std::any::type_name::<T>(),
    })
}

/// Downcasts a trait object registration. Trait objects are stored as
/// `Arc<Arc<dyn Trait>>` since `dyn Trait` itself cannot go through `dyn Any`.
pub(crate) fn cast_trait_arc<T: ?Sized + Send + Sync + 'static>(
    any: AnyArc,
    service: &dyn fmt::Display,
) -> DiResult<Arc<T>> {
    any.downcast::<Arc<T>>()
        .map(|boxed| (*boxed).clone())
        .map_err(|_| DiError::TypeMismatch {
            service: service.to_string(),
            expected: std::any::type_name::<T>(),
        })
}

/// Unique identity of a registration. Replacing a registration produces a new id,
/// so instances cached for the replaced factory are never handed out again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FactoryId(pub(crate) u64);

impl fmt::Display for FactoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Collision policy applied when a service is registered for a type that already
/// has registrations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "config", serde(rename_all = "snake_case"))]
pub enum IfAlreadyRegistered {
    /// Add another default; the latest wins single resolution
    #[default]
    Append,
    /// Fail with `DuplicateDefaultRegistration` when a default already exists
    Throw,
    /// Replace the latest default in place, keeping its position
    Replace,
    /// Discard the new registration when a default already exists
    Keep,
    /// Append unless a default with the same implementation is present
    AppendNewImplementation,
}

/// What a registration call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    Added(FactoryId),
    Replaced { old: FactoryId, new: FactoryId },
    Kept,
}

impl RegisterOutcome {
    /// Id of the registration now in effect, if the call changed the registry.
    pub fn factory_id(&self) -> Option<FactoryId> {
        match self {
            RegisterOutcome::Added(id) | RegisterOutcome::Replaced { new: id, .. } => Some(*id),
            RegisterOutcome::Kept => None,
        }
    }
}

/// A descriptor registered under a service type.
pub struct Registration {
    pub(crate) id: FactoryId,
    /// Position in registration order; inherited by replacements
    pub(crate) seq: u64,
    pub(crate) service_type: ServiceType,
    pub(crate) descriptor: FactoryDescriptor,
}

impl Registration {
    pub fn id(&self) -> FactoryId {
        self.id
    }

    pub fn service_type(&self) -> &ServiceType {
        &self.service_type
    }

    pub fn descriptor(&self) -> &FactoryDescriptor {
        &self.descriptor
    }

    pub fn service_key(&self) -> Option<&ServiceKey> {
        self.descriptor.service_key.as_ref()
    }

    pub(crate) fn is_service(&self) -> bool {
        self.descriptor.setup == SetupKind::Service
    }

    pub(crate) fn is_default_service(&self) -> bool {
        self.is_service() && self.descriptor.service_key.is_none()
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("id", &self.id)
            .field("seq", &self.seq)
            .field("service_type", &self.service_type)
            .field("descriptor", &self.descriptor)
            .finish()
    }
}

/// Service registry holding all registrations
#[derive(Clone, Default)]
pub(crate) struct Registry {
    entries: AHashMap<ServiceType, Vec<Arc<Registration>>>,
    next_id: u64,
    next_seq: u64,
    version: u64,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Bumped on every mutation that changed the registry.
    pub(crate) fn version(&self) -> u64 {
        self.version
    }

    /// Registrations for exactly `service_type`, in registration order.
    pub(crate) fn lookup(&self, service_type: &ServiceType) -> &[Arc<Registration>] {
        self.entries
            .get(service_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Every registration, ordered by registration sequence.
    pub(crate) fn iter(&self) -> impl Iterator<Item = &Arc<Registration>> {
        let mut all: Vec<&Arc<Registration>> = self.entries.values().flatten().collect();
        all.sort_by_key(|r| r.seq);
        all.into_iter()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    /// Whether a wrapper setup is registered for the open family `family<_>`.
    pub(crate) fn has_wrapper(&self, family: &str) -> bool {
        self.lookup(&ServiceType::open(family, 1))
            .iter()
            .any(|r| r.descriptor.setup == SetupKind::Wrapper)
    }

    /// Adds `descriptor` under `service_type`, applying `policy` to service
    /// registrations. Decorators and wrappers are always appended.
    pub(crate) fn register(
        &mut self,
        service_type: ServiceType,
        descriptor: FactoryDescriptor,
        policy: IfAlreadyRegistered,
    ) -> DiResult<RegisterOutcome> {
        validate(&service_type, &descriptor)?;

        if descriptor.setup != SetupKind::Service {
            let id = self.append(service_type, descriptor);
            self.version += 1;
            return Ok(RegisterOutcome::Added(id));
        }

        let existing = self.lookup(&service_type);
        let outcome = match descriptor.service_key.clone() {
            None => {
                let latest_default = existing.iter().rposition(|r| r.is_default_service());
                match (policy, latest_default) {
                    (_, None) | (IfAlreadyRegistered::Append, Some(_)) => {
                        RegisterOutcome::Added(self.append(service_type, descriptor))
                    }
                    (IfAlreadyRegistered::Throw, Some(_)) => {
                        return Err(DiError::DuplicateDefaultRegistration {
                            service_type: service_type.to_string(),
                        });
                    }
                    (IfAlreadyRegistered::Replace, Some(position)) => {
                        self.replace(service_type, position, descriptor)
                    }
                    (IfAlreadyRegistered::Keep, Some(_)) => RegisterOutcome::Kept,
                    (IfAlreadyRegistered::AppendNewImplementation, Some(_)) => {
                        let name = descriptor.implementation.name();
                        let duplicate = existing
                            .iter()
                            .any(|r| r.is_default_service() && r.descriptor.implementation.name() == name);
                        if duplicate {
                            RegisterOutcome::Kept
                        } else {
                            RegisterOutcome::Added(self.append(service_type, descriptor))
                        }
                    }
                }
            }
            Some(key) => {
                let same_key: SmallVec<[usize; 2]> = existing
                    .iter()
                    .enumerate()
                    .filter(|(_, r)| r.is_service() && r.service_key() == Some(&key))
                    .map(|(i, _)| i)
                    .collect();
                match (policy, same_key.last().copied()) {
                    (_, None) => RegisterOutcome::Added(self.append(service_type, descriptor)),
                    (IfAlreadyRegistered::Replace, Some(position)) => {
                        self.replace(service_type, position, descriptor)
                    }
                    (IfAlreadyRegistered::Keep, Some(_)) => RegisterOutcome::Kept,
                    (_, Some(_)) => {
                        // conditional registrations may share a key, the
                        // ambiguity then surfaces only when both are eligible
                        let all_conditional = same_key
                            .iter()
                            .all(|&i| existing[i].descriptor.condition.is_some());
                        if descriptor.condition.is_some() && all_conditional {
                            RegisterOutcome::Added(self.append(service_type, descriptor))
                        } else {
                            return Err(DiError::AmbiguousKeyedRegistration {
                                service: service_type.to_string(),
                                key: key.to_string(),
                            });
                        }
                    }
                }
            }
        };

        if outcome != RegisterOutcome::Kept {
            self.version += 1;
        }
        Ok(outcome)
    }

    /// Removes the service registrations for `(service_type, key)`; returns how
    /// many were removed.
    pub(crate) fn unregister(&mut self, service_type: &ServiceType, key: Option<&ServiceKey>) -> usize {
        let Some(list) = self.entries.get_mut(service_type) else {
            return 0;
        };
        let before = list.len();
        list.retain(|r| !(r.is_service() && r.service_key() == key));
        let removed = before - list.len();
        if list.is_empty() {
            self.entries.remove(service_type);
        }
        if removed > 0 {
            self.version += 1;
        }
        removed
    }

    fn next_id(&mut self) -> FactoryId {
        self.next_id += 1;
        FactoryId(self.next_id)
    }

    fn append(&mut self, service_type: ServiceType, descriptor: FactoryDescriptor) -> FactoryId {
        let id = self.next_id();
        self.next_seq += 1;
        let registration = Arc::new(Registration {
            id,
            seq: self.next_seq,
            service_type: service_type.clone(),
            descriptor,
        });
        self.entries.entry(service_type).or_default().push(registration);
        id
    }

    fn replace(
        &mut self,
        service_type: ServiceType,
        position: usize,
        descriptor: FactoryDescriptor,
    ) -> RegisterOutcome {
        let id = self.next_id();
        let list = self.entries.entry(service_type.clone()).or_default();
        let old = list[position].clone();
        list[position] = Arc::new(Registration {
            id,
            seq: old.seq,
            service_type,
            descriptor,
        });
        RegisterOutcome::Replaced { old: old.id, new: id }
    }
}

fn validate(service_type: &ServiceType, descriptor: &FactoryDescriptor) -> DiResult<()> {
    let name = descriptor.implementation.name();
    match descriptor.setup {
        SetupKind::Service if service_type.is_any() => Err(DiError::InvalidRegistration(format!(
            "service {} cannot be registered for any type",
            name
        ))),
        SetupKind::Wrapper if !matches!(service_type, ServiceType::OpenGeneric { arity: 1, .. }) => {
            Err(DiError::InvalidRegistration(format!(
                "wrapper {} must be registered on an open generic with one argument, not {}",
                name, service_type
            )))
        }
        SetupKind::Service | SetupKind::Wrapper if descriptor.use_decoratee_lifetime => {
            Err(DiError::InvalidRegistration(format!(
                "{} uses the decoratee lifetime but is not a decorator",
                name
            )))
        }
        _ => Ok(()),
    }
}
