//! Decision oracles consumed by the engine.
//!
//! The engine never inspects implementations itself. It asks a [`MemberSelector`]
//! which parameters an implementation takes for a given closed service type, and a
//! [`GenericMatcher`] whether an open generic registration can close over a
//! requested type.

use crate::descriptors::{Implementation, Parameter};
use crate::key::ServiceType;

/// Reports the parameters of an implementation.
pub trait MemberSelector: Send + Sync {
    fn parameters(&self, implementation: &Implementation, service_type: &ServiceType) -> Vec<Parameter>;
}

/// Uses the parameters declared on the [`Implementation`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DeclaredParameters;

impl MemberSelector for DeclaredParameters {
    fn parameters(&self, implementation: &Implementation, service_type: &ServiceType) -> Vec<Parameter> {
        implementation.declared_parameters(service_type)
    }
}

/// Decides whether an open generic registration closes over a requested type.
pub trait GenericMatcher: Send + Sync {
    fn can_close(
        &self,
        implementation: &Implementation,
        open_definition: &ServiceType,
        requested: &ServiceType,
    ) -> bool;
}

/// Accepts any closing of the open definition's family and arity.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuralMatcher;

impl GenericMatcher for StructuralMatcher {
    fn can_close(
        &self,
        _implementation: &Implementation,
        open_definition: &ServiceType,
        requested: &ServiceType,
    ) -> bool {
        requested.open_definition().as_ref() == Some(open_definition)
    }
}
