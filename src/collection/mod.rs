//! Registration surface: typed helpers, descriptor registration, modules and
//! container rules, frozen into a provider by `build`.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::ContainerRules;
use crate::descriptors::{short_type_name, FactoryDescriptor, Implementation, Parameter, ServiceDescriptor, SetupKind};
use crate::error::{DiError, DiResult};
use crate::key::{ServiceKey, ServiceType};
use crate::lifetime::Lifetime;
use crate::observer::{DiObserver, Observers};
use crate::provider::{ResolverContext, ServiceProvider};
use crate::registration::{AnyArc, IfAlreadyRegistered, RegisterOutcome, Registry};
use crate::traits::{DeclaredParameters, GenericMatcher, MemberSelector, StructuralMatcher};

mod module_system;

pub use module_system::ServiceModule;

/// Registrations and container rules, turned into a [`ServiceProvider`] by
/// [`build`](ServiceCollection::build).
///
/// The typed `add_*` helpers always append: registering a type twice keeps both,
/// the latest wins single resolution and both appear in collections. Use
/// [`register`](ServiceCollection::register) to pick another collision policy.
pub struct ServiceCollection {
    registry: Registry,
    rules: ContainerRules,
    observers: Observers,
    members: Arc<dyn MemberSelector>,
    generics: Arc<dyn GenericMatcher>,
}

impl fmt::Debug for ServiceCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceCollection")
            .field("registrations", &self.registry.len())
            .field("rules", &self.rules)
            .finish_non_exhaustive()
    }
}

impl ServiceCollection {
    /// Creates a new empty service collection.
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
            rules: ContainerRules::default(),
            observers: Observers::default(),
            members: Arc::new(DeclaredParameters),
            generics: Arc::new(StructuralMatcher),
        }
    }

    /// Replaces the container rules.
    pub fn with_rules(mut self, rules: ContainerRules) -> Self {
        self.rules = rules;
        self
    }

    /// Replaces the oracle choosing the parameters of an implementation.
    pub fn with_member_selector(mut self, members: Arc<dyn MemberSelector>) -> Self {
        self.members = members;
        self
    }

    /// Replaces the oracle deciding whether an open generic implementation can
    /// build a closed service type.
    pub fn with_generic_matcher(mut self, generics: Arc<dyn GenericMatcher>) -> Self {
        self.generics = generics;
        self
    }

    pub fn rules(&self) -> &ContainerRules {
        &self.rules
    }

    // ----- Concrete Type Registrations -----

    /// Registers a pre-built instance, owned by the root scope.
    ///
    /// ```rust
    /// # use ferrous_ioc::{ServiceCollection, ServiceType};
    /// struct Settings { retries: u32 }
    ///
    /// let mut services = ServiceCollection::new();
    /// services.add_singleton(Settings { retries: 3 });
    ///
    /// let provider = services.build();
    /// assert_eq!(
    ///     provider.explain(&ServiceType::of::<Settings>(), None).unwrap(),
    ///     "singleton(new Settings())"
    /// );
    /// ```
    pub fn add_singleton<T: 'static + Send + Sync>(&mut self, value: T) -> &mut Self {
        let descriptor = FactoryDescriptor::service(Implementation::instance(value)).with_lifetime(Lifetime::Singleton);
        self.append(ServiceType::of::<T>(), descriptor)
    }

    /// Registers a factory run at most once; concurrent first requests wait for
    /// the same construction.
    ///
    /// ```rust
    /// # use ferrous_ioc::{ServiceCollection, Resolver};
    /// # use std::sync::Arc;
    /// struct Pool { size: usize }
    /// struct Mailer { pool: Arc<Pool> }
    ///
    /// let mut services = ServiceCollection::new();
    /// services.add_singleton(Pool { size: 4 });
    /// services.add_singleton_factory::<Mailer, _>(|ctx| Mailer { pool: ctx.get_required::<Pool>() });
    ///
    /// let provider = services.build();
    /// assert!(Arc::ptr_eq(&provider.get_required::<Mailer>(), &provider.get_required::<Mailer>()));
    /// ```
    pub fn add_singleton_factory<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: 'static + Send + Sync,
        F: Fn(&ResolverContext) -> T + Send + Sync + 'static,
    {
        self.add_factory(Lifetime::Singleton, factory)
    }

    /// Registers a scoped factory that creates one instance per scope.
    ///
    /// Each scope gets its own instance, but within a scope the same instance
    /// is reused. Resolving a scoped service from the provider itself fails with
    /// `NoCurrentScope`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use ferrous_ioc::{ServiceCollection, Resolver};
    /// # use std::sync::Arc;
    /// struct RequestContext { request_id: String }
    ///
    /// let mut services = ServiceCollection::new();
    /// services.add_scoped_factory::<RequestContext, _>(|_| {
    ///     RequestContext { request_id: "req-123".to_string() }
    /// });
    ///
    /// let provider = services.build();
    /// assert!(provider.get::<RequestContext>().is_err());
    /// let scope = provider.create_scope();
    /// assert_eq!(scope.get_required::<RequestContext>().request_id, "req-123");
    /// ```
    pub fn add_scoped_factory<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: 'static + Send + Sync,
        F: Fn(&ResolverContext) -> T + Send + Sync + 'static,
    {
        self.add_factory(Lifetime::Scoped, factory)
    }

    /// Registers a transient factory that creates a new instance on every request.
    ///
    /// No caching is performed - the factory is called every time this service
    /// is resolved.
    pub fn add_transient_factory<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: 'static + Send + Sync,
        F: Fn(&ResolverContext) -> T + Send + Sync + 'static,
    {
        self.add_factory(Lifetime::Transient, factory)
    }

    /// Registers a factory cached in the nearest enclosing scope named `scope`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use ferrous_ioc::{ServiceCollection, Resolver};
    /// # use std::sync::Arc;
    /// struct UnitOfWork;
    ///
    /// let mut services = ServiceCollection::new();
    /// services.add_scoped_to_factory::<UnitOfWork, _>("request", |_| UnitOfWork);
    ///
    /// let provider = services.build();
    /// let request = provider.create_named_scope("request");
    /// let nested = request.create_scope();
    /// assert!(Arc::ptr_eq(
    ///     &request.get_required::<UnitOfWork>(),
    ///     &nested.get_required::<UnitOfWork>(),
    /// ));
    /// assert!(provider.create_scope().get::<UnitOfWork>().is_err());
    /// ```
    pub fn add_scoped_to_factory<T, F>(&mut self, scope: &'static str, factory: F) -> &mut Self
    where
        T: 'static + Send + Sync,
        F: Fn(&ResolverContext) -> T + Send + Sync + 'static,
    {
        self.add_factory(Lifetime::scoped_to(scope), factory)
    }

    /// Registers a factory with an explicit lifetime.
    pub fn add_factory<T, F>(&mut self, lifetime: Lifetime, factory: F) -> &mut Self
    where
        T: 'static + Send + Sync,
        F: Fn(&ResolverContext) -> T + Send + Sync + 'static,
    {
        let implementation = Implementation::of::<T, _>(move |ctx| Ok(factory(ctx)));
        let descriptor = FactoryDescriptor::service(implementation).with_lifetime(lifetime);
        self.append(ServiceType::of::<T>(), descriptor)
    }

    // ----- Keyed Registrations -----

    /// Registers a singleton resolvable only through its key.
    ///
    /// Fails with `AmbiguousKeyedRegistration` when the key is already taken for `T`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use ferrous_ioc::{ServiceCollection, Resolver};
    /// let mut services = ServiceCollection::new();
    /// services.add_keyed_singleton("primary", "postgres://primary".to_string()).unwrap();
    /// services.add_keyed_singleton("replica", "postgres://replica".to_string()).unwrap();
    ///
    /// let provider = services.build();
    /// assert_eq!(*provider.get_keyed::<String>("replica").unwrap(), "postgres://replica");
    /// assert!(provider.get::<String>().is_err());
    /// ```
    pub fn add_keyed_singleton<T: 'static + Send + Sync>(
        &mut self,
        key: impl Into<ServiceKey>,
        value: T,
    ) -> DiResult<&mut Self> {
        let descriptor = FactoryDescriptor::service(Implementation::instance(value))
            .with_lifetime(Lifetime::Singleton)
            .keyed(key);
        self.register(ServiceType::of::<T>(), descriptor, IfAlreadyRegistered::Append)?;
        Ok(self)
    }

    pub fn add_keyed_factory<T, F>(
        &mut self,
        key: impl Into<ServiceKey>,
        lifetime: Lifetime,
        factory: F,
    ) -> DiResult<&mut Self>
    where
        T: 'static + Send + Sync,
        F: Fn(&ResolverContext) -> T + Send + Sync + 'static,
    {
        let implementation = Implementation::of::<T, _>(move |ctx| Ok(factory(ctx)));
        let descriptor = FactoryDescriptor::service(implementation)
            .with_lifetime(lifetime)
            .keyed(key);
        self.register(ServiceType::of::<T>(), descriptor, IfAlreadyRegistered::Append)?;
        Ok(self)
    }

    // ----- Trait Registrations -----

    /// Registers a shared trait object.
    ///
    /// ```rust
    /// # use ferrous_ioc::{ServiceCollection, Resolver};
    /// # use std::sync::Arc;
    /// trait Clock: Send + Sync {
    ///     fn now(&self) -> u64;
    /// }
    ///
    /// struct Fixed;
    /// impl Clock for Fixed {
    ///     fn now(&self) -> u64 {
    ///         1_700_000_000
    ///     }
    /// }
    ///
    /// let mut services = ServiceCollection::new();
    /// services.add_singleton_trait::<dyn Clock>(Arc::new(Fixed));
    ///
    /// let provider = services.build();
    /// assert_eq!(provider.get_required_trait::<dyn Clock>().now(), 1_700_000_000);
    /// ```
    pub fn add_singleton_trait<T>(&mut self, value: Arc<T>) -> &mut Self
    where
        T: ?Sized + 'static + Send + Sync,
    {
        self.add_trait_implementation(value, Lifetime::Singleton)
    }

    pub fn add_singleton_trait_factory<Trait, F>(&mut self, factory: F) -> &mut Self
    where
        Trait: ?Sized + 'static + Send + Sync,
        F: Fn(&ResolverContext) -> Arc<Trait> + Send + Sync + 'static,
    {
        self.add_trait_factory(Lifetime::Singleton, factory)
    }

    pub fn add_scoped_trait_factory<Trait, F>(&mut self, factory: F) -> &mut Self
    where
        Trait: ?Sized + 'static + Send + Sync,
        F: Fn(&ResolverContext) -> Arc<Trait> + Send + Sync + 'static,
    {
        self.add_trait_factory(Lifetime::Scoped, factory)
    }

    pub fn add_transient_trait_factory<Trait, F>(&mut self, factory: F) -> &mut Self
    where
        Trait: ?Sized + 'static + Send + Sync,
        F: Fn(&ResolverContext) -> Arc<Trait> + Send + Sync + 'static,
    {
        self.add_trait_factory(Lifetime::Transient, factory)
    }

    /// Registers a pre-built trait implementation. Registering several for one
    /// trait makes them all visible to `get_all_trait`.
    pub fn add_trait_implementation<T>(&mut self, value: Arc<T>, lifetime: Lifetime) -> &mut Self
    where
        T: ?Sized + 'static + Send + Sync,
    {
        self.add_trait_factory(lifetime, move |_| value.clone())
    }

    pub fn add_trait_factory<Trait, F>(&mut self, lifetime: Lifetime, factory: F) -> &mut Self
    where
        Trait: ?Sized + 'static + Send + Sync,
        F: Fn(&ResolverContext) -> Arc<Trait> + Send + Sync + 'static,
    {
        let name = short_type_name(std::any::type_name::<Trait>());
        let implementation = Implementation::trait_object::<Trait, _>(name, move |ctx| Ok(factory(ctx)));
        let descriptor = FactoryDescriptor::service(implementation).with_lifetime(lifetime);
        self.append(ServiceType::of::<Trait>(), descriptor)
    }

    // ----- Conditional Registration (TryAdd*) -----

    /// Registers a singleton unless a default registration for `T` exists.
    /// Returns whether the registration was added.
    pub fn try_add_singleton<T: 'static + Send + Sync>(&mut self, value: T) -> bool {
        let descriptor = FactoryDescriptor::service(Implementation::instance(value)).with_lifetime(Lifetime::Singleton);
        self.try_add(ServiceType::of::<T>(), descriptor)
    }

    pub fn try_add_singleton_factory<T, F>(&mut self, factory: F) -> bool
    where
        T: 'static + Send + Sync,
        F: Fn(&ResolverContext) -> T + Send + Sync + 'static,
    {
        self.try_add_factory(Lifetime::Singleton, factory)
    }

    pub fn try_add_scoped_factory<T, F>(&mut self, factory: F) -> bool
    where
        T: 'static + Send + Sync,
        F: Fn(&ResolverContext) -> T + Send + Sync + 'static,
    {
        self.try_add_factory(Lifetime::Scoped, factory)
    }

    pub fn try_add_transient_factory<T, F>(&mut self, factory: F) -> bool
    where
        T: 'static + Send + Sync,
        F: Fn(&ResolverContext) -> T + Send + Sync + 'static,
    {
        self.try_add_factory(Lifetime::Transient, factory)
    }

    pub fn try_add_singleton_trait<T>(&mut self, value: Arc<T>) -> bool
    where
        T: ?Sized + 'static + Send + Sync,
    {
        let name = short_type_name(std::any::type_name::<T>());
        let implementation = Implementation::trait_object::<T, _>(name, move |_| Ok(value.clone()));
        let descriptor = FactoryDescriptor::service(implementation).with_lifetime(Lifetime::Singleton);
        self.try_add(ServiceType::of::<T>(), descriptor)
    }

    fn try_add_factory<T, F>(&mut self, lifetime: Lifetime, factory: F) -> bool
    where
        T: 'static + Send + Sync,
        F: Fn(&ResolverContext) -> T + Send + Sync + 'static,
    {
        let implementation = Implementation::of::<T, _>(move |ctx| Ok(factory(ctx)));
        let descriptor = FactoryDescriptor::service(implementation).with_lifetime(lifetime);
        self.try_add(ServiceType::of::<T>(), descriptor)
    }

    fn try_add(&mut self, service_type: ServiceType, descriptor: FactoryDescriptor) -> bool {
        matches!(
            self.register(service_type, descriptor, IfAlreadyRegistered::Keep),
            Ok(RegisterOutcome::Added(_))
        )
    }

    // ----- Descriptor Registrations -----

    /// Registers `descriptor` under `service_type` with an explicit collision
    /// policy.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use ferrous_ioc::{DiError, FactoryDescriptor, IfAlreadyRegistered, Implementation,
    ///                   RegisterOutcome, ServiceCollection, ServiceType};
    ///
    /// let mut services = ServiceCollection::new();
    /// let ty = ServiceType::named("IService");
    /// let first = FactoryDescriptor::service(Implementation::instance(1u8));
    /// let second = FactoryDescriptor::service(Implementation::instance(2u8));
    ///
    /// services.register(ty.clone(), first, IfAlreadyRegistered::Throw).unwrap();
    /// let err = services.register(ty, second, IfAlreadyRegistered::Throw).unwrap_err();
    /// assert!(matches!(err, DiError::DuplicateDefaultRegistration { .. }));
    /// ```
    pub fn register(
        &mut self,
        service_type: ServiceType,
        descriptor: FactoryDescriptor,
        policy: IfAlreadyRegistered,
    ) -> DiResult<RegisterOutcome> {
        let setup = descriptor.setup();
        let implementation = descriptor.implementation().name().to_string();
        let service_name = service_type.to_string();
        let outcome = self.registry.register(service_type, descriptor, policy)?;
        debug!(service = %service_name, %implementation, %setup, ?policy, ?outcome, "Registered");
        Ok(outcome)
    }

    /// Registers `descriptor` with the rules' default collision policy.
    pub fn add_service(&mut self, service_type: ServiceType, descriptor: FactoryDescriptor) -> DiResult<RegisterOutcome> {
        let policy = self.rules.default_if_already_registered;
        self.register(service_type, descriptor, policy)
    }

    /// Registers a decorator for `service_type`. An open generic type decorates
    /// every closed form; [`ServiceType::any`] decorates every service.
    pub fn add_decorator(&mut self, service_type: ServiceType, descriptor: FactoryDescriptor) -> DiResult<RegisterOutcome> {
        if descriptor.setup() != SetupKind::Decorator {
            return Err(DiError::InvalidRegistration(format!(
                "{} is registered as a decorator but was described as a {}",
                descriptor.implementation().name(),
                descriptor.setup()
            )));
        }
        self.register(service_type, descriptor, IfAlreadyRegistered::Append)
    }

    /// Registers a wrapper for the open family `family<_>`. Resolving
    /// `family<T>` then builds `T` and hands it to the wrapper's decoratee
    /// parameter.
    pub fn add_wrapper(&mut self, family: &str, descriptor: FactoryDescriptor) -> DiResult<RegisterOutcome> {
        if descriptor.setup() != SetupKind::Wrapper {
            return Err(DiError::InvalidRegistration(format!(
                "{} is registered as a wrapper but was described as a {}",
                descriptor.implementation().name(),
                descriptor.setup()
            )));
        }
        self.register(ServiceType::open(family, 1), descriptor, IfAlreadyRegistered::Append)
    }

    // ----- Decoration -----

    /// Decorates every registration of `T`. The decorator receives the decorated
    /// instance and keeps its lifetime.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use ferrous_ioc::{Resolver, ServiceCollection};
    ///
    /// struct Greeting(String);
    ///
    /// let mut services = ServiceCollection::new();
    /// services.add_singleton(Greeting("hello".to_string()));
    /// services.decorate::<Greeting, _>(|_, inner| Greeting(format!("{}, world", inner.0)));
    ///
    /// let provider = services.build();
    /// assert_eq!(provider.get_required::<Greeting>().0, "hello, world");
    /// ```
    pub fn decorate<T, F>(&mut self, decorator: F) -> &mut Self
    where
        T: 'static + Send + Sync,
        F: Fn(&ResolverContext, Arc<T>) -> T + Send + Sync + 'static,
    {
        let name = format!("Decorator<{}>", short_type_name(std::any::type_name::<T>()));
        let implementation = Implementation::new(name, move |ctx| {
            let inner = ctx.decoratee::<T>()?;
            Ok(Arc::new(decorator(ctx, inner)) as AnyArc)
        })
        .with_parameters([Parameter::decoratee()]);
        let descriptor = FactoryDescriptor::decorator(implementation).use_decoratee_lifetime();
        self.append(ServiceType::of::<T>(), descriptor)
    }

    /// Decorates every registration of a trait object. Applies to single
    /// resolution and to every item of `get_all_trait`; the decorated instance
    /// shares the decoratee's lifetime.
    ///
    /// ```
    /// use ferrous_ioc::{ServiceCollection, Resolver};
    /// use std::sync::Arc;
    ///
    /// trait Greeter: Send + Sync {
    ///     fn greet(&self) -> String;
    /// }
    ///
    /// struct Plain;
    /// impl Greeter for Plain {
    ///     fn greet(&self) -> String {
    ///         "hi".to_string()
    ///     }
    /// }
    ///
    /// struct Loud(Arc<dyn Greeter>);
    /// impl Greeter for Loud {
    ///     fn greet(&self) -> String {
    ///         self.0.greet().to_uppercase()
    ///     }
    /// }
    ///
    /// let mut services = ServiceCollection::new();
    /// services.add_singleton_trait::<dyn Greeter>(Arc::new(Plain));
    /// services.decorate_trait::<dyn Greeter, _>(|inner| Arc::new(Loud(inner)));
    ///
    /// let provider = services.build();
    /// assert_eq!(provider.get_required_trait::<dyn Greeter>().greet(), "HI");
    /// ```
    pub fn decorate_trait<T, F>(&mut self, decorator: F) -> &mut Self
    where
        T: ?Sized + 'static + Send + Sync,
        F: Fn(Arc<T>) -> Arc<T> + Send + Sync + 'static,
    {
        let name = format!("Decorator<{}>", short_type_name(std::any::type_name::<T>()));
        let implementation = Implementation::trait_object::<T, _>(name, move |ctx| {
            let inner = ctx.decoratee_trait::<T>()?;
            Ok(decorator(inner))
        })
        .with_parameters([Parameter::decoratee()]);
        let descriptor = FactoryDescriptor::decorator(implementation).use_decoratee_lifetime();
        self.append(ServiceType::of::<T>(), descriptor)
    }

    // ----- Observers -----

    /// Adds an observer notified of every root resolution of the built provider.
    pub fn add_observer(&mut self, observer: Arc<dyn DiObserver>) -> &mut Self {
        self.observers.add(observer);
        self
    }

    // ----- Service Descriptors and Introspection -----

    /// Descriptors of every registration, in registration order.
    ///
    /// ```
    /// use ferrous_ioc::{Lifetime, ServiceCollection, SetupKind};
    ///
    /// let mut services = ServiceCollection::new();
    /// services.add_singleton(42usize);
    /// services.add_scoped_factory::<String, _>(|_| "hello".to_string());
    ///
    /// let descriptors = services.get_service_descriptors();
    /// assert_eq!(descriptors[0].lifetime, Lifetime::Singleton);
    /// assert_eq!(descriptors[1].lifetime, Lifetime::Scoped);
    /// assert!(descriptors.iter().all(|d| d.setup == SetupKind::Service));
    /// ```
    pub fn get_service_descriptors(&self) -> Vec<ServiceDescriptor> {
        self.registry
            .iter()
            .map(|r| ServiceDescriptor::describe(r, &self.rules.default_lifetime))
            .collect()
    }

    /// Whether any registration exists for exactly `service_type`.
    pub fn contains(&self, service_type: &ServiceType) -> bool {
        !self.registry.lookup(service_type).is_empty()
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.len() == 0
    }

    /// Builds the service provider from the registered services.
    ///
    /// # Examples
    ///
    /// ```
    /// use ferrous_ioc::{ServiceCollection, Resolver};
    ///
    /// let mut collection = ServiceCollection::new();
    /// collection.add_singleton(42usize);
    /// collection.add_transient_factory::<String, _>(|_| "Hello".to_string());
    ///
    /// let provider = collection.build();
    /// let number = provider.get_required::<usize>();
    /// let text = provider.get_required::<String>();
    ///
    /// assert_eq!(*number, 42);
    /// assert_eq!(&*text, "Hello");
    /// ```
    pub fn build(self) -> ServiceProvider {
        debug!(registrations = self.registry.len(), "Building service provider");
        ServiceProvider::new(self.registry, self.rules, self.members, self.generics, self.observers)
    }

    /// Appends an unkeyed registration. Only descriptors that fail validation are
    /// rejected, which the typed helpers never produce.
    fn append(&mut self, service_type: ServiceType, descriptor: FactoryDescriptor) -> &mut Self {
        let service_name = service_type.to_string();
        if let Err(err) = self.register(service_type, descriptor, IfAlreadyRegistered::Append) {
            warn!(service = %service_name, "Registration rejected: {}", err);
        }
        self
    }
}

impl Default for ServiceCollection {
    fn default() -> Self {
        Self::new()
    }
}
