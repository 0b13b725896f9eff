//! Disposal trait for resource cleanup.

/// Trait for synchronous resource disposal.
///
/// Implement this trait for services that need structured teardown (e.g., flushing caches,
/// closing connections). Disposal hooks run in reverse creation order when the owning
/// scope closes. A failing hook does not stop the others; every failure is reported
/// by [`Scope::close`](crate::Scope::close).
///
/// # Examples
///
/// ```
/// use ferrous_ioc::{Dispose, FactoryDescriptor, Implementation, Lifetime, ServiceCollection, ServiceType};
///
/// struct Cache {
///     name: String,
/// }
///
/// impl Dispose for Cache {
///     fn dispose(&self) -> anyhow::Result<()> {
///         println!("Flushing cache: {}", self.name);
///         Ok(())
///     }
/// }
///
/// let mut services = ServiceCollection::new();
/// services.add_service(
///     ServiceType::of::<Cache>(),
///     FactoryDescriptor::service(Implementation::of::<Cache, _>(|_| {
///         Ok(Cache { name: "user_cache".to_string() })
///     }))
///     .with_lifetime(Lifetime::Scoped)
///     .disposable::<Cache>(),
/// ).unwrap();
/// ```
pub trait Dispose: Send + Sync + 'static {
    /// Perform synchronous cleanup of resources.
    fn dispose(&self) -> anyhow::Result<()>;
}
