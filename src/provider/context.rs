//! Resolver context for dependency injection.
//!
//! This module contains the ResolverContext type which provides
//! the interface for factory functions to resolve dependencies.

use std::sync::Arc;

use super::scope::ScopeInner;
use crate::error::{DiError, DiResult};
use crate::internal::Disposal;
use crate::key::{ServiceKey, ServiceType};
use crate::plan::Invocation;
use crate::registration::{cast_arc, cast_trait_arc, AnyArc};
use crate::request::ResolutionRequest;
use crate::traits::{Resolver, ResolverCore};

/// Context passed to factory functions.
///
/// A context carries the arguments the construction plan produced for the
/// invocation (its declared parameters, in order), the decorated instance when
/// the factory is a decorator, and resolver access to the scope the instance is
/// created in. Services resolved through the context continue the current
/// dependency chain.
///
/// # Examples
///
/// ```
/// use ferrous_ioc::{ServiceCollection, Resolver};
/// use std::sync::Arc;
///
/// struct Database { url: String }
/// struct UserService { db: Arc<Database> }
///
/// let mut services = ServiceCollection::new();
/// services.add_singleton(Database {
///     url: "postgres://localhost".to_string()
/// });
/// services.add_transient_factory::<UserService, _>(|resolver| {
///     // resolver is a ResolverContext that provides access to other services
///     UserService {
///         db: resolver.get_required::<Database>(),
///     }
/// });
/// ```
pub struct ResolverContext<'a> {
    scope: &'a Arc<ScopeInner>,
    invocation: &'a Invocation,
    request: ResolutionRequest,
    args: &'a [Option<AnyArc>],
}

impl<'a> ResolverContext<'a> {
    pub(crate) fn new(
        scope: &'a Arc<ScopeInner>,
        invocation: &'a Invocation,
        request: ResolutionRequest,
        args: &'a [Option<AnyArc>],
    ) -> Self {
        Self {
            scope,
            invocation,
            request,
            args,
        }
    }

    /// Planned argument `index`, downcast to `T`.
    pub fn arg<T: Send + Sync + 'static>(&self, index: usize) -> DiResult<Arc<T>> {
        let any = self.required_arg(index)?;
        cast_arc(any.clone(), &self.parameter_type(index))
    }

    pub fn arg_trait<T: ?Sized + Send + Sync + 'static>(&self, index: usize) -> DiResult<Arc<T>> {
        let any = self.required_arg(index)?;
        cast_trait_arc(any.clone(), &self.parameter_type(index))
    }

    /// Optional argument `index`; `Ok(None)` when nothing was registered for it.
    pub fn optional_arg<T: Send + Sync + 'static>(&self, index: usize) -> DiResult<Option<Arc<T>>> {
        self.arg_any(index)
            .map(|any| cast_arc(any.clone(), &self.parameter_type(index)))
            .transpose()
    }

    pub fn optional_arg_trait<T: ?Sized + Send + Sync + 'static>(&self, index: usize) -> DiResult<Option<Arc<T>>> {
        self.arg_any(index)
            .map(|any| cast_trait_arc(any.clone(), &self.parameter_type(index)))
            .transpose()
    }

    pub fn arg_any(&self, index: usize) -> Option<&AnyArc> {
        self.args.get(index).and_then(Option::as_ref)
    }

    pub fn arg_count(&self) -> usize {
        self.args.len()
    }

    /// The instance this decorator wraps, possibly behind `Func`/`Lazy` layers
    /// when the decorator asked for them.
    pub fn decoratee<T: Send + Sync + 'static>(&self) -> DiResult<Arc<T>> {
        cast_arc(self.decoratee_any()?.clone(), &self.invocation.service_type)
    }

    pub fn decoratee_trait<T: ?Sized + Send + Sync + 'static>(&self) -> DiResult<Arc<T>> {
        cast_trait_arc(self.decoratee_any()?.clone(), &self.invocation.service_type)
    }

    pub fn decoratee_any(&self) -> DiResult<&AnyArc> {
        self.invocation
            .decoratee
            .and_then(|index| self.arg_any(index))
            .ok_or_else(|| {
                DiError::InvalidRegistration(format!(
                    "{} is not a decorator and has no decorated instance",
                    self.invocation.display
                ))
            })
    }

    /// The service type being constructed, closed over generic arguments.
    pub fn service_type(&self) -> &ServiceType {
        &self.invocation.service_type
    }

    pub fn service_key(&self) -> Option<&ServiceKey> {
        self.invocation.service_key.as_ref()
    }

    pub fn implementation_name(&self) -> &str {
        &self.invocation.display
    }

    /// The request this invocation satisfies.
    pub fn request(&self) -> &ResolutionRequest {
        &self.request
    }

    fn required_arg(&self, index: usize) -> DiResult<&AnyArc> {
        self.arg_any(index)
            .ok_or_else(|| DiError::not_registered(self.parameter_type(index)))
    }

    fn parameter_type(&self, index: usize) -> String {
        match self.invocation.args.get(index) {
            Some(plan) => plan.label(),
            None => format!("{} argument #{}", self.invocation.display, index),
        }
    }
}

impl<'a> ResolverCore for ResolverContext<'a> {
    fn resolve(&self, service_type: &ServiceType, service_key: Option<&ServiceKey>) -> DiResult<AnyArc> {
        self.scope
            .resolve_nested(&self.request, service_type, service_key, true)?
            .ok_or_else(|| DiError::not_registered(service_type))
    }

    fn try_resolve(
        &self,
        service_type: &ServiceType,
        service_key: Option<&ServiceKey>,
    ) -> DiResult<Option<AnyArc>> {
        self.scope
            .resolve_nested(&self.request, service_type, service_key, false)
    }

    fn push_disposer(&self, service: &str, disposer: Disposal) {
        self.scope.track(service, disposer);
    }
}

impl<'a> Resolver for ResolverContext<'a> {}
