//! Candidate selection over a registry snapshot.

use std::cell::Cell;
use std::sync::Arc;

use crate::descriptors::SetupKind;
use crate::error::{DiError, DiResult};
use crate::key::{ServiceKey, ServiceType};
use crate::registration::{Registration, Registry};
use crate::request::ResolutionRequest;
use crate::traits::GenericMatcher;

pub(crate) struct FactorySelector<'a> {
    registry: &'a Registry,
    matcher: &'a dyn GenericMatcher,
    /// Set once any registration condition has been evaluated
    consulted_conditions: Cell<bool>,
}

impl<'a> FactorySelector<'a> {
    pub(crate) fn new(registry: &'a Registry, matcher: &'a dyn GenericMatcher) -> Self {
        Self {
            registry,
            matcher,
            consulted_conditions: Cell::new(false),
        }
    }

    /// Whether a selection so far depended on a condition, and so possibly on
    /// the request chain.
    pub(crate) fn consulted_conditions(&self) -> bool {
        self.consulted_conditions.get()
    }

    pub(crate) fn condition_holds(&self, registration: &Registration, request: &ResolutionRequest) -> bool {
        match registration.descriptor.condition.as_ref() {
            Some(condition) => {
                self.consulted_conditions.set(true);
                condition(request)
            }
            None => true,
        }
    }

    /// The service registration answering a single-instance request.
    ///
    /// Registrations for the exact type outrank those on its open definition.
    pub(crate) fn single(&self, request: &ResolutionRequest) -> DiResult<Option<Arc<Registration>>> {
        let service_type = request.service_type();
        if let Some(found) = self.pick(self.registry.lookup(service_type), request, false)? {
            return Ok(Some(found));
        }
        match service_type.open_definition() {
            Some(open) => self.pick(self.registry.lookup(&open), request, true),
            None => Ok(None),
        }
    }

    fn pick(
        &self,
        candidates: &[Arc<Registration>],
        request: &ResolutionRequest,
        open: bool,
    ) -> DiResult<Option<Arc<Registration>>> {
        let mut eligible = candidates.iter().filter(|r| {
            r.is_service()
                && r.service_key() == request.service_key()
                && (!open || self.closes(r, request.service_type()))
                && self.condition_holds(r, request)
        });

        match request.service_key() {
            None => Ok(eligible.last().cloned()),
            Some(key) => {
                let first = eligible.next().cloned();
                if eligible.next().is_some() {
                    return Err(DiError::AmbiguousKeyedRegistration {
                        service: request.service_type().to_string(),
                        key: key.to_string(),
                    });
                }
                Ok(first)
            }
        }
    }

    /// Service registrations listed by a collection of `item_type`, keyed and
    /// unkeyed, closed and open, in registration order. Conditions are checked
    /// later against each item's own request.
    pub(crate) fn all(&self, item_type: &ServiceType, key: Option<&ServiceKey>) -> Vec<Arc<Registration>> {
        let key_matches = |r: &Arc<Registration>| key.is_none() || r.service_key() == key;
        let mut found: Vec<Arc<Registration>> = self
            .registry
            .lookup(item_type)
            .iter()
            .filter(|r| r.is_service() && key_matches(*r))
            .cloned()
            .collect();

        if let Some(open) = item_type.open_definition() {
            found.extend(
                self.registry
                    .lookup(&open)
                    .iter()
                    .filter(|r| r.is_service() && key_matches(*r) && self.closes(r, item_type))
                    .cloned(),
            );
        }

        found.sort_by_key(|r| r.seq);
        found
    }

    /// Decorators applying to `request`, in registration order.
    ///
    /// Unkeyed decorators apply to every key of their target; keyed ones only to
    /// their key. Hook decorators registered for any type are included for
    /// service requests only.
    pub(crate) fn decorators(&self, request: &ResolutionRequest, include_hooks: bool) -> Vec<Arc<Registration>> {
        let target = request.service_type();
        let enclosing = request.enclosing_decorators();
        let applies = |r: &&Arc<Registration>| {
            r.descriptor.setup == SetupKind::Decorator
                && (r.service_key().is_none() || r.service_key() == request.service_key())
                && !enclosing.contains(&r.id)
                && self.condition_holds(r, request)
        };

        let mut found: Vec<Arc<Registration>> =
            self.registry.lookup(target).iter().filter(applies).cloned().collect();

        if let Some(open) = target.open_definition() {
            found.extend(
                self.registry
                    .lookup(&open)
                    .iter()
                    .filter(applies)
                    .filter(|r| self.closes(r, target))
                    .cloned(),
            );
        }

        if include_hooks {
            found.extend(self.registry.lookup(&ServiceType::Any).iter().filter(applies).cloned());
        }

        found.sort_by_key(|r| r.seq);
        found
    }

    /// The latest wrapper registration for the open family `family<_>`.
    pub(crate) fn wrapper_for(&self, family: &str) -> Option<Arc<Registration>> {
        self.registry
            .lookup(&ServiceType::open(family, 1))
            .iter()
            .rev()
            .find(|r| r.descriptor.setup == SetupKind::Wrapper)
            .cloned()
    }

    /// Whether `service_type` has explicit service registrations.
    pub(crate) fn has_services(&self, service_type: &ServiceType) -> bool {
        self.registry.lookup(service_type).iter().any(|r| r.is_service())
    }

    fn closes(&self, registration: &Registration, requested: &ServiceType) -> bool {
        self.matcher
            .can_close(&registration.descriptor.implementation, &registration.service_type, requested)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptors::{FactoryDescriptor, Implementation};
    use crate::registration::{AnyArc, IfAlreadyRegistered};
    use crate::traits::StructuralMatcher;

    fn implementation(name: &str) -> Implementation {
        Implementation::new(name.to_string(), |_| Ok(Arc::new(()) as AnyArc))
    }

    fn register(registry: &mut Registry, ty: &ServiceType, descriptor: FactoryDescriptor) {
        registry
            .register(ty.clone(), descriptor, IfAlreadyRegistered::Append)
            .unwrap();
    }

    fn name(registration: &Registration) -> &str {
        registration.descriptor.implementation.name()
    }

    #[test]
    fn exact_registration_outranks_open_generic() {
        let mut registry = Registry::new();
        let closed = ServiceType::generic("S", [ServiceType::named("int")]);
        register(&mut registry, &closed, FactoryDescriptor::service(implementation("SInt")));
        register(&mut registry, &ServiceType::open("S", 1), FactoryDescriptor::service(implementation("S")));

        let selector = FactorySelector::new(&registry, &StructuralMatcher);
        let picked = selector
            .single(&ResolutionRequest::root(closed, None, true))
            .unwrap()
            .unwrap();
        assert_eq!(name(&picked), "SInt");

        let other = ServiceType::generic("S", [ServiceType::named("string")]);
        let picked = selector
            .single(&ResolutionRequest::root(other, None, true))
            .unwrap()
            .unwrap();
        assert_eq!(name(&picked), "S");
        assert!(!selector.consulted_conditions());
    }

    #[test]
    fn two_eligible_conditional_keys_are_ambiguous() {
        let mut registry = Registry::new();
        let ty = ServiceType::named("IHandler");
        register(&mut registry, &ty, FactoryDescriptor::service(implementation("A")).keyed("k").when(|_| true));
        register(&mut registry, &ty, FactoryDescriptor::service(implementation("B")).keyed("k").when(|_| true));

        let selector = FactorySelector::new(&registry, &StructuralMatcher);
        let err = selector
            .single(&ResolutionRequest::root(ty, Some("k".into()), true))
            .unwrap_err();
        assert!(matches!(err, DiError::AmbiguousKeyedRegistration { .. }));
        assert!(selector.consulted_conditions());
    }

    #[test]
    fn unkeyed_decorators_apply_to_every_key() {
        let mut registry = Registry::new();
        let ty = ServiceType::named("IHandler");
        register(&mut registry, &ty, FactoryDescriptor::decorator(implementation("Any")));
        register(&mut registry, &ty, FactoryDescriptor::decorator(implementation("Foo")).keyed("foo"));
        register(&mut registry, &ServiceType::Any, FactoryDescriptor::decorator(implementation("Hook")));

        let selector = FactorySelector::new(&registry, &StructuralMatcher);
        let bar = ResolutionRequest::root(ty.clone(), Some("bar".into()), true);
        let names: Vec<_> = selector.decorators(&bar, true).iter().map(|r| name(r).to_string()).collect();
        assert_eq!(names, ["Any", "Hook"]);

        let foo = ResolutionRequest::root(ty, Some("foo".into()), true);
        let names: Vec<_> = selector.decorators(&foo, false).iter().map(|r| name(r).to_string()).collect();
        assert_eq!(names, ["Any", "Foo"]);
    }

    #[test]
    fn collection_candidates_follow_registration_order() {
        let mut registry = Registry::new();
        let closed = ServiceType::generic("S", [ServiceType::named("int")]);
        register(&mut registry, &ServiceType::open("S", 1), FactoryDescriptor::service(implementation("Open")));
        register(&mut registry, &closed, FactoryDescriptor::service(implementation("Closed")));
        register(&mut registry, &closed, FactoryDescriptor::service(implementation("Keyed")).keyed("k"));

        let selector = FactorySelector::new(&registry, &StructuralMatcher);
        let all: Vec<_> = selector.all(&closed, None).iter().map(|r| name(r).to_string()).collect();
        assert_eq!(all, ["Open", "Closed", "Keyed"]);

        let keyed: Vec<_> = selector
            .all(&closed, Some(&"k".into()))
            .iter()
            .map(|r| name(r).to_string())
            .collect();
        assert_eq!(keyed, ["Keyed"]);
    }
}
