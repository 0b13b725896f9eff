//! Service module system for modular registration.
//!
//! A module groups the registrations of one component so applications can
//! compose a container from independent pieces.

use tracing::debug;

use super::ServiceCollection;
use crate::error::DiResult;

/// A group of registrations applied to a [`ServiceCollection`].
///
/// Closures taking `&mut ServiceCollection` are modules too.
///
/// # Example
///
/// ```rust
/// use ferrous_ioc::{DiResult, Resolver, ServiceCollection, ServiceModule};
///
/// #[derive(Default)]
/// struct UserConfig;
///
/// struct UserService;
/// impl UserService {
///     fn new(_config: std::sync::Arc<UserConfig>) -> Self { Self }
/// }
///
/// struct UserModule;
///
/// impl ServiceModule for UserModule {
///     fn register_services(self, services: &mut ServiceCollection) -> DiResult<()> {
///         services.add_singleton(UserConfig::default());
///         services.add_scoped_factory::<UserService, _>(|r| {
///             UserService::new(r.get_required::<UserConfig>())
///         });
///         Ok(())
///     }
/// }
///
/// # fn main() -> DiResult<()> {
/// let mut services = ServiceCollection::new();
/// services
///     .add_module(UserModule)?
///     .add_module(|services: &mut ServiceCollection| {
///         services.add_keyed_singleton("region", "eu-west".to_string())?;
///         Ok(())
///     })?;
/// let provider = services.build();
/// assert!(provider.create_scope().get::<UserService>().is_ok());
/// # Ok(())
/// # }
/// ```
pub trait ServiceModule {
    /// Registers this module's services.
    fn register_services(self, services: &mut ServiceCollection) -> DiResult<()>;

    /// Name used in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

impl<F> ServiceModule for F
where
    F: FnOnce(&mut ServiceCollection) -> DiResult<()>,
{
    fn register_services(self, services: &mut ServiceCollection) -> DiResult<()> {
        self(services)
    }

    fn name(&self) -> &str {
        "<closure>"
    }
}

impl ServiceCollection {
    /// Applies `module`. Registrations it made before failing are kept.
    pub fn add_module<M: ServiceModule>(&mut self, module: M) -> DiResult<&mut Self> {
        let name = module.name().to_string();
        let before = self.len();
        module.register_services(self)?;
        debug!(module = %name, added = self.len().saturating_sub(before), "Module registered");
        Ok(self)
    }
}
