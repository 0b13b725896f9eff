//! Object-safe resolution core and the typed layer on top of it.

use std::sync::Arc;

use crate::error::DiResult;
use crate::key::{ServiceKey, ServiceType};
use crate::registration::{cast_arc, cast_trait_arc, AnyArc};
use crate::traits::Dispose;
use crate::wrappers::{Collection, Func, Lazy};

/// Untyped resolution by [`ServiceType`] and optional key.
///
/// Implemented by [`ServiceProvider`](crate::ServiceProvider), [`Scope`](crate::Scope)
/// and the [`ResolverContext`](crate::ResolverContext) handed to factories. Resolving
/// from a context keeps the caller's request chain, so cycles through factories
/// are still detected.
///
/// Most users should use the [`Resolver`] trait instead, which provides typed
/// methods built on top of this trait.
pub trait ResolverCore: Send + Sync {
    /// Resolves a required service; a missing registration is an error.
    fn resolve(&self, service_type: &ServiceType, service_key: Option<&ServiceKey>) -> DiResult<AnyArc>;

    /// Resolves an optional service; `Ok(None)` when nothing is registered.
    fn try_resolve(
        &self,
        service_type: &ServiceType,
        service_key: Option<&ServiceKey>,
    ) -> DiResult<Option<AnyArc>>;

    /// Resolves every eligible implementation in registration order.
    ///
    /// Never fails for zero matches; construction failures are propagated.
    fn resolve_many(&self, service_type: &ServiceType) -> DiResult<Vec<AnyArc>> {
        let collection_type = ServiceType::collection(service_type.clone());
        let any = self.resolve(&collection_type, None)?;
        let collection = cast_arc::<Collection>(any, &collection_type)?;
        Ok(collection.values().cloned().collect())
    }

    /// Registers a disposal hook with the scope this resolver belongs to.
    fn push_disposer(&self, service: &str, disposer: Box<dyn FnOnce() -> anyhow::Result<()> + Send>);
}

/// Typed resolution for every [`ResolverCore`].
///
/// Concrete types come back as `Arc<T>`, trait objects through the `*_trait`
/// variants. A type mismatch between the registration and `T` is reported as
/// `TypeMismatch` rather than a panic.
///
/// ```
/// use ferrous_ioc::{Resolver, ServiceCollection};
/// use std::sync::Arc;
///
/// trait Formatter: Send + Sync {
///     fn format(&self, n: u64) -> String;
/// }
///
/// struct Hex;
/// impl Formatter for Hex {
///     fn format(&self, n: u64) -> String {
///         format!("{:#x}", n)
///     }
/// }
///
/// let mut services = ServiceCollection::new();
/// services.add_singleton(255u64);
/// services.add_singleton_trait(Arc::new(Hex) as Arc<dyn Formatter>);
///
/// let provider = services.build();
/// let n = provider.get_required::<u64>();
/// assert_eq!(provider.get_required_trait::<dyn Formatter>().format(*n), "0xff");
/// assert!(provider.get::<u8>().is_err());
/// ```
pub trait Resolver: ResolverCore {
    fn get<T: Send + Sync + 'static>(&self) -> DiResult<Arc<T>> {
        let service_type = ServiceType::of::<T>();
        cast_arc(self.resolve(&service_type, None)?, &service_type)
    }

    fn get_keyed<T: Send + Sync + 'static>(&self, key: impl Into<ServiceKey>) -> DiResult<Arc<T>> {
        let service_type = ServiceType::of::<T>();
        cast_arc(self.resolve(&service_type, Some(&key.into()))?, &service_type)
    }

    /// Resolves a concrete service type, `Ok(None)` when it is not registered.
    fn try_get<T: Send + Sync + 'static>(&self) -> DiResult<Option<Arc<T>>> {
        let service_type = ServiceType::of::<T>();
        self.try_resolve(&service_type, None)?
            .map(|any| cast_arc(any, &service_type))
            .transpose()
    }

    /// Resolves the default registration of a trait object; the latest one
    /// wins when several exist.
    fn get_trait<T: ?Sized + Send + Sync + 'static>(&self) -> DiResult<Arc<T>> {
        let service_type = ServiceType::of::<T>();
        cast_trait_arc(self.resolve(&service_type, None)?, &service_type)
    }

    fn get_keyed_trait<T: ?Sized + Send + Sync + 'static>(
        &self,
        key: impl Into<ServiceKey>,
    ) -> DiResult<Arc<T>> {
        let service_type = ServiceType::of::<T>();
        cast_trait_arc(self.resolve(&service_type, Some(&key.into()))?, &service_type)
    }

    fn try_get_trait<T: ?Sized + Send + Sync + 'static>(&self) -> DiResult<Option<Arc<T>>> {
        let service_type = ServiceType::of::<T>();
        self.try_resolve(&service_type, None)?
            .map(|any| cast_trait_arc(any, &service_type))
            .transpose()
    }

    /// Resolves every registration of a concrete type, in registration order.
    fn get_all<T: Send + Sync + 'static>(&self) -> DiResult<Vec<Arc<T>>> {
        let service_type = ServiceType::of::<T>();
        self.resolve_many(&service_type)?
            .into_iter()
            .map(|any| cast_arc(any, &service_type))
            .collect()
    }

    /// Resolves every registration of a trait object, keyed ones included.
    ///
    /// ```
    /// use ferrous_ioc::{Lifetime, Resolver, ServiceCollection};
    /// use std::sync::Arc;
    ///
    /// trait Check: Send + Sync {
    ///     fn passes(&self, input: &str) -> bool;
    /// }
    ///
    /// struct NotEmpty;
    /// impl Check for NotEmpty {
    ///     fn passes(&self, input: &str) -> bool { !input.is_empty() }
    /// }
    ///
    /// struct Short;
    /// impl Check for Short {
    ///     fn passes(&self, input: &str) -> bool { input.len() < 8 }
    /// }
    ///
    /// let mut services = ServiceCollection::new();
    /// services.add_trait_implementation(Arc::new(NotEmpty) as Arc<dyn Check>, Lifetime::Singleton);
    /// services.add_trait_implementation(Arc::new(Short) as Arc<dyn Check>, Lifetime::Transient);
    ///
    /// let provider = services.build();
    /// let checks = provider.get_all_trait::<dyn Check>().unwrap();
    /// let results: Vec<bool> = checks.iter().map(|c| c.passes("a long input")).collect();
    /// assert_eq!(results, [true, false]);
    /// ```
    fn get_all_trait<T: ?Sized + Send + Sync + 'static>(&self) -> DiResult<Vec<Arc<T>>> {
        let service_type = ServiceType::of::<T>();
        self.resolve_many(&service_type)?
            .into_iter()
            .map(|any| cast_trait_arc(any, &service_type))
            .collect()
    }

    /// # Panics
    ///
    /// When [`get`](Self::get) fails.
    fn get_required<T: Send + Sync + 'static>(&self) -> Arc<T> {
        self.get::<T>()
            .unwrap_or_else(|e| panic!("Failed to resolve {}: {}", std::any::type_name::<T>(), e))
    }

    /// # Panics
    ///
    /// When [`get_trait`](Self::get_trait) fails.
    fn get_required_trait<T: ?Sized + Send + Sync + 'static>(&self) -> Arc<T> {
        self.get_trait::<T>()
            .unwrap_or_else(|e| panic!("Failed to resolve trait {}: {}", std::any::type_name::<T>(), e))
    }

    fn get_keyed_required<T: Send + Sync + 'static>(&self, key: impl Into<ServiceKey>) -> Arc<T> {
        let key = key.into();
        self.get_keyed::<T>(key.clone()).unwrap_or_else(|e| {
            panic!("Failed to resolve keyed {} ({}): {}", std::any::type_name::<T>(), key, e)
        })
    }

    /// Resolves a deferred factory of `T`. Every call re-runs the resolution,
    /// so lifetime caching still applies.
    ///
    /// # Examples
    ///
    /// ```
    /// use ferrous_ioc::{ServiceCollection, Resolver};
    /// use std::sync::atomic::{AtomicUsize, Ordering};
    /// use std::sync::Arc;
    ///
    /// static BUILT: AtomicUsize = AtomicUsize::new(0);
    ///
    /// struct Connection;
    ///
    /// let mut collection = ServiceCollection::new();
    /// collection.add_transient_factory::<Connection, _>(|_| {
    ///     BUILT.fetch_add(1, Ordering::SeqCst);
    ///     Connection
    /// });
    ///
    /// let provider = collection.build();
    /// let factory = provider.get_func::<Connection>().unwrap();
    /// assert_eq!(BUILT.load(Ordering::SeqCst), 0);
    ///
    /// let _a = factory.call_as::<Connection>().unwrap();
    /// let _b = factory.call_as::<Connection>().unwrap();
    /// assert_eq!(BUILT.load(Ordering::SeqCst), 2);
    /// ```
    fn get_func<T: ?Sized + 'static>(&self) -> DiResult<Arc<Func>> {
        let service_type = ServiceType::func(ServiceType::of::<T>());
        cast_arc(self.resolve(&service_type, None)?, &service_type)
    }

    /// Resolves a memoized deferred value of `T`.
    fn get_lazy<T: ?Sized + 'static>(&self) -> DiResult<Arc<Lazy>> {
        let service_type = ServiceType::lazy(ServiceType::of::<T>());
        cast_arc(self.resolve(&service_type, None)?, &service_type)
    }

    /// Resolves the collection of every implementation of `T`, keys included.
    fn get_collection<T: ?Sized + 'static>(&self) -> DiResult<Arc<Collection>> {
        let service_type = ServiceType::collection(ServiceType::of::<T>());
        cast_arc(self.resolve(&service_type, None)?, &service_type)
    }

    /// Hands `service` to the scope this resolver belongs to; its `dispose`
    /// runs when that scope closes, after anything registered later.
    ///
    /// For factories whose product is not itself the disposable part, e.g. a
    /// handle that owns a spawned connection.
    ///
    /// ```
    /// use ferrous_ioc::{Dispose, Resolver, ServiceCollection};
    /// use std::sync::atomic::{AtomicBool, Ordering};
    /// use std::sync::Arc;
    ///
    /// static CLOSED: AtomicBool = AtomicBool::new(false);
    ///
    /// struct Socket;
    /// impl Dispose for Socket {
    ///     fn dispose(&self) -> anyhow::Result<()> {
    ///         CLOSED.store(true, Ordering::SeqCst);
    ///         Ok(())
    ///     }
    /// }
    ///
    /// struct Session(u32);
    ///
    /// let mut services = ServiceCollection::new();
    /// services.add_scoped_factory::<Session, _>(|ctx| {
    ///     ctx.register_disposer(Arc::new(Socket));
    ///     Session(7)
    /// });
    ///
    /// let provider = services.build();
    /// let scope = provider.create_scope();
    /// assert_eq!(scope.get_required::<Session>().0, 7);
    /// scope.close().unwrap();
    /// assert!(CLOSED.load(Ordering::SeqCst));
    /// ```
    fn register_disposer<T: Dispose>(&self, service: Arc<T>) {
        self.push_disposer(std::any::type_name::<T>(), Box::new(move || service.dispose()));
    }
}
