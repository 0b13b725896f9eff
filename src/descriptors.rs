//! Factory descriptors and service descriptors for introspection.

use std::fmt;
use std::sync::Arc;

use crate::error::DiResult;
use crate::key::{ServiceKey, ServiceType};
use crate::lifetime::Lifetime;
use crate::provider::ResolverContext;
use crate::registration::{AnyArc, FactoryId, Registration};
use crate::request::ResolutionRequest;
use crate::traits::Dispose;

/// Type-erased constructor of an implementation.
pub type Constructor = Arc<dyn for<'a> Fn(&ResolverContext<'a>) -> DiResult<AnyArc> + Send + Sync>;

/// Applicability predicate evaluated against the resolution request.
pub type Condition = Arc<dyn Fn(&ResolutionRequest) -> bool + Send + Sync>;

/// Disposal hook run when the owning scope closes.
pub type Disposer = Arc<dyn Fn(&AnyArc) -> anyhow::Result<()> + Send + Sync>;

/// Role of a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SetupKind {
    /// Provides an implementation of the service type
    Service,
    /// Wraps the already-resolved service
    Decorator,
    /// Adds a wrapper shape for an open generic family
    Wrapper,
}

impl fmt::Display for SetupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetupKind::Service => f.write_str("service"),
            SetupKind::Decorator => f.write_str("decorator"),
            SetupKind::Wrapper => f.write_str("wrapper"),
        }
    }
}

/// A constructor or factory parameter, as reported by the member selector.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Parameter {
    pub service_type: ServiceType,
    pub service_key: Option<ServiceKey>,
    pub required: bool,
}

impl Parameter {
    pub fn new(service_type: ServiceType) -> Self {
        Self {
            service_type,
            service_key: None,
            required: true,
        }
    }

    pub fn of<T: ?Sized + 'static>() -> Self {
        Self::new(ServiceType::of::<T>())
    }

    /// The decorated (or wrapped) service, whatever its type.
    pub fn decoratee() -> Self {
        Self::new(ServiceType::Any)
    }

    pub fn keyed(mut self, key: impl Into<ServiceKey>) -> Self {
        self.service_key = Some(key.into());
        self
    }

    /// Resolves to nothing instead of failing when the service is missing.
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

#[derive(Clone)]
enum Parameters {
    Declared(Arc<[Parameter]>),
    PerService(Arc<dyn Fn(&ServiceType) -> Vec<Parameter> + Send + Sync>),
}

/// Implementation identity: a name for diagnostics, the parameters it takes and
/// the constructor producing the instance.
///
/// # Examples
///
/// ```rust
/// use ferrous_ioc::{Implementation, Parameter, ServiceType};
/// use std::sync::Arc;
///
/// struct Repository { db: Arc<String> }
///
/// let implementation = Implementation::of::<Repository, _>(|ctx| {
///     Ok(Repository { db: ctx.arg::<String>(0)? })
/// })
/// .with_parameters([Parameter::of::<String>()]);
///
/// assert_eq!(implementation.name(), "Repository");
/// assert_eq!(implementation.declared_parameters(&ServiceType::of::<Repository>()).len(), 1);
/// ```
#[derive(Clone)]
pub struct Implementation {
    name: Arc<str>,
    generic: bool,
    parameters: Parameters,
    constructor: Constructor,
}

impl Implementation {
    /// Implementation producing a type-erased instance.
    pub fn new<F>(name: impl Into<Arc<str>>, constructor: F) -> Self
    where
        F: for<'a> Fn(&ResolverContext<'a>) -> DiResult<AnyArc> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            generic: false,
            parameters: Parameters::Declared(Arc::from(Vec::new())),
            constructor: Arc::new(constructor),
        }
    }

    /// Open generic implementation. Its display name is closed with the type
    /// arguments of the service it builds, e.g. `D1<int>`.
    pub fn generic<F>(name: impl Into<Arc<str>>, constructor: F) -> Self
    where
        F: for<'a> Fn(&ResolverContext<'a>) -> DiResult<AnyArc> + Send + Sync + 'static,
    {
        Self {
            generic: true,
            ..Self::new(name, constructor)
        }
    }

    /// Implementation of the concrete type `T`, named after it.
    pub fn of<T, F>(constructor: F) -> Self
    where
        T: Send + Sync + 'static,
        F: for<'a> Fn(&ResolverContext<'a>) -> DiResult<T> + Send + Sync + 'static,
    {
        Self::new(short_type_name(std::any::type_name::<T>()), move |ctx| {
            constructor(ctx).map(|value| Arc::new(value) as AnyArc)
        })
    }

    /// Implementation handing out a pre-built instance.
    pub fn instance<T: Send + Sync + 'static>(value: T) -> Self {
        let instance: AnyArc = Arc::new(value);
        Self::new(short_type_name(std::any::type_name::<T>()), move |_| {
            Ok(instance.clone())
        })
    }

    /// Implementation of a trait object service. The instance is stored as
    /// `Arc<Arc<T>>` and read back with the `*_trait` resolver methods.
    pub fn trait_object<T, F>(name: impl Into<Arc<str>>, constructor: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: for<'a> Fn(&ResolverContext<'a>) -> DiResult<Arc<T>> + Send + Sync + 'static,
    {
        Self::new(name, move |ctx| constructor(ctx).map(|value| Arc::new(value) as AnyArc))
    }

    pub fn with_parameters<I>(mut self, parameters: I) -> Self
    where
        I: IntoIterator<Item = Parameter>,
    {
        self.parameters = Parameters::Declared(parameters.into_iter().collect::<Vec<_>>().into());
        self
    }

    /// Parameters depending on the closed service type being built; used by
    /// open generic implementations.
    pub fn with_parameters_for<F>(mut self, parameters: F) -> Self
    where
        F: Fn(&ServiceType) -> Vec<Parameter> + Send + Sync + 'static,
    {
        self.parameters = Parameters::PerService(Arc::new(parameters));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_generic(&self) -> bool {
        self.generic
    }

    /// Name used in plans and errors when building `service_type`.
    pub fn display_name(&self, service_type: &ServiceType) -> String {
        let args = service_type.args();
        if !self.generic || args.is_empty() {
            return self.name.to_string();
        }
        let args: Vec<String> = args.iter().map(ToString::to_string).collect();
        format!("{}<{}>", self.name, args.join(", "))
    }

    pub fn declared_parameters(&self, service_type: &ServiceType) -> Vec<Parameter> {
        match &self.parameters {
            Parameters::Declared(parameters) => parameters.to_vec(),
            Parameters::PerService(parameters) => parameters(service_type),
        }
    }

    pub(crate) fn constructor(&self) -> &Constructor {
        &self.constructor
    }
}

impl fmt::Debug for Implementation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Implementation")
            .field("name", &self.name)
            .field("generic", &self.generic)
            .finish_non_exhaustive()
    }
}

/// Description of one registration: the implementation plus lifetime, setup
/// kind, key, condition and ordering. Immutable once registered.
///
/// # Examples
///
/// ```rust
/// use ferrous_ioc::{FactoryDescriptor, Implementation, Lifetime, Parameter, SetupKind};
///
/// struct Logging;
///
/// let decorator = FactoryDescriptor::decorator(
///     Implementation::of::<Logging, _>(|_| Ok(Logging)).with_parameters([Parameter::decoratee()]),
/// )
/// .with_lifetime(Lifetime::Singleton)
/// .order(-1);
///
/// assert_eq!(decorator.setup(), SetupKind::Decorator);
/// assert_eq!(decorator.order_hint(), -1);
/// ```
#[derive(Clone)]
pub struct FactoryDescriptor {
    pub(crate) implementation: Implementation,
    pub(crate) lifetime: Option<Lifetime>,
    pub(crate) setup: SetupKind,
    pub(crate) service_key: Option<ServiceKey>,
    pub(crate) condition: Option<Condition>,
    pub(crate) order: i32,
    pub(crate) use_decoratee_lifetime: bool,
    pub(crate) disposer: Option<Disposer>,
}

impl FactoryDescriptor {
    fn with_setup(implementation: Implementation, setup: SetupKind) -> Self {
        Self {
            implementation,
            lifetime: None,
            setup,
            service_key: None,
            condition: None,
            order: 0,
            use_decoratee_lifetime: false,
            disposer: None,
        }
    }

    pub fn service(implementation: Implementation) -> Self {
        Self::with_setup(implementation, SetupKind::Service)
    }

    pub fn decorator(implementation: Implementation) -> Self {
        Self::with_setup(implementation, SetupKind::Decorator)
    }

    pub fn wrapper(implementation: Implementation) -> Self {
        Self::with_setup(implementation, SetupKind::Wrapper)
    }

    /// Without an explicit lifetime the container-wide default applies.
    pub fn with_lifetime(mut self, lifetime: Lifetime) -> Self {
        self.lifetime = Some(lifetime);
        self
    }

    pub fn keyed(mut self, key: impl Into<ServiceKey>) -> Self {
        self.service_key = Some(key.into());
        self
    }

    pub fn when<F>(mut self, condition: F) -> Self
    where
        F: Fn(&ResolutionRequest) -> bool + Send + Sync + 'static,
    {
        self.condition = Some(Arc::new(condition));
        self
    }

    /// Decorator ordering: ascending, ties broken by registration order.
    pub fn order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    /// The decorator takes the lifetime of the service it decorates.
    pub fn use_decoratee_lifetime(mut self) -> Self {
        self.use_decoratee_lifetime = true;
        self
    }

    /// Decorator applying only to the registration with `key`.
    pub fn decorating_key(self, key: impl Into<ServiceKey>) -> Self {
        self.keyed(key)
    }

    /// Decorator applying only when the decorated implementation is `name`.
    pub fn decorating_implementation(self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.when(move |request| request.implementation_name() == Some(name.as_str()))
    }

    /// Disposes instances through their [`Dispose`] impl when the owning scope
    /// closes.
    pub fn disposable<T: Dispose>(self) -> Self {
        self.with_disposer(|instance| match instance.downcast_ref::<T>() {
            Some(service) => service.dispose(),
            None => Ok(()),
        })
    }

    pub fn with_disposer<F>(mut self, disposer: F) -> Self
    where
        F: Fn(&AnyArc) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.disposer = Some(Arc::new(disposer));
        self
    }

    pub fn implementation(&self) -> &Implementation {
        &self.implementation
    }

    pub fn lifetime(&self) -> Option<&Lifetime> {
        self.lifetime.as_ref()
    }

    pub fn setup(&self) -> SetupKind {
        self.setup
    }

    pub fn service_key(&self) -> Option<&ServiceKey> {
        self.service_key.as_ref()
    }

    pub fn order_hint(&self) -> i32 {
        self.order
    }

    pub fn has_condition(&self) -> bool {
        self.condition.is_some()
    }
}

impl fmt::Debug for FactoryDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactoryDescriptor")
            .field("implementation", &self.implementation.name())
            .field("lifetime", &self.lifetime)
            .field("setup", &self.setup)
            .field("service_key", &self.service_key)
            .field("conditional", &self.condition.is_some())
            .field("order", &self.order)
            .field("use_decoratee_lifetime", &self.use_decoratee_lifetime)
            .field("disposable", &self.disposer.is_some())
            .finish()
    }
}

/// Service descriptor for introspection and diagnostics
///
/// One entry per registration, as returned by
/// [`ServiceCollection::get_service_descriptors`](crate::ServiceCollection::get_service_descriptors)
/// and [`ServiceProvider::registrations`](crate::ServiceProvider::registrations).
/// The lifetime is the effective one, with the container default applied.
///
/// # Examples
///
/// ```rust
/// use ferrous_ioc::{ServiceCollection, Lifetime};
///
/// struct Database { url: String }
///
/// let mut services = ServiceCollection::new();
/// services.add_singleton(Database { url: "postgres://localhost".to_string() });
/// services.add_keyed_singleton("port", 5432u32).unwrap();
///
/// let descriptors = services.get_service_descriptors();
/// let db = descriptors.iter().find(|d| d.type_name().contains("Database")).unwrap();
/// assert_eq!(db.lifetime, Lifetime::Singleton);
/// assert!(!db.is_keyed());
///
/// let port = descriptors.iter().find(|d| d.is_keyed()).unwrap();
/// assert_eq!(port.type_name(), "u32");
/// ```
#[derive(Debug, Clone)]
pub struct ServiceDescriptor {
    pub service_type: ServiceType,
    pub service_key: Option<ServiceKey>,
    pub implementation: String,
    pub lifetime: Lifetime,
    pub setup: SetupKind,
    pub order: i32,
    pub factory_id: FactoryId,
}

impl ServiceDescriptor {
    pub fn type_name(&self) -> String {
        self.service_type.to_string()
    }

    pub fn is_keyed(&self) -> bool {
        self.service_key.is_some()
    }
}

impl ServiceDescriptor {
    pub(crate) fn describe(registration: &Registration, default_lifetime: &Lifetime) -> Self {
        let descriptor = &registration.descriptor;
        Self {
            service_type: registration.service_type.clone(),
            service_key: descriptor.service_key.clone(),
            implementation: descriptor.implementation.display_name(&registration.service_type),
            lifetime: descriptor.lifetime.clone().unwrap_or_else(|| default_lifetime.clone()),
            setup: descriptor.setup,
            order: descriptor.order,
            factory_id: registration.id,
        }
    }
}

/// Strips module paths from a Rust type name, keeping generic structure:
/// `app::db::Pool<app::Conn>` becomes `Pool<Conn>`.
pub(crate) fn short_type_name(full: &str) -> String {
    fn last_segment(path: &str) -> &str {
        path.rsplit("::").next().unwrap_or(path)
    }

    let mut out = String::with_capacity(full.len());
    let mut start = 0;
    for (i, ch) in full.char_indices() {
        if matches!(ch, '<' | '>' | ',' | ' ' | '(' | ')' | '[' | ']' | '&' | ';' | '*') {
            out.push_str(last_segment(&full[start..i]));
            out.push(ch);
            start = i + ch.len_utf8();
        }
    }
    out.push_str(last_segment(&full[start..]));
    out
}
