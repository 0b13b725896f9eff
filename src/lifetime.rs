//! Service lifetime definitions.

use std::borrow::Cow;
use std::fmt;

#[cfg(feature = "config")]
use serde::{Deserialize, Serialize};

/// Service lifetimes controlling instance caching behavior.
///
/// - **Singleton**: one instance per root provider
/// - **Scoped**: one instance per (innermost) scope
/// - **ScopedTo**: one instance per nearest enclosing scope carrying the name
/// - **Transient**: a new instance on every resolution
///
/// # Examples
///
/// ```rust
/// use ferrous_ioc::{Lifetime, ServiceCollection, Resolver};
/// use std::sync::Arc;
///
/// struct RequestModel { id: u32 }
/// struct Database { url: String }
///
/// let mut services = ServiceCollection::new();
/// services.add_singleton(Database { url: "postgres://localhost".to_string() });
/// services.add_scoped_factory::<RequestModel, _>(|_| RequestModel { id: 7 });
///
/// let provider = services.build();
/// let db1 = provider.get_required::<Database>();
/// let scope = provider.create_scope();
/// let db2 = scope.get_required::<Database>();
/// assert!(Arc::ptr_eq(&db1, &db2));
///
/// let a = scope.get_required::<RequestModel>();
/// let b = scope.get_required::<RequestModel>();
/// assert!(Arc::ptr_eq(&a, &b));
/// assert_eq!(Lifetime::Singleton.lifespan(), 1000);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "config", serde(rename_all = "snake_case"))]
pub enum Lifetime {
    /// Single instance per root provider, cached until the provider closes
    Singleton,
    /// Single instance per scope, cached until the scope closes
    Scoped,
    /// Single instance per nearest enclosing scope with the given name
    ScopedTo(Cow<'static, str>),
    /// New instance per resolution, never cached
    #[default]
    Transient,
}

impl Lifetime {
    /// Relative length of life. Used to detect a long-lived service capturing a
    /// shorter-lived dependency; transients report 0 and never participate.
    pub fn lifespan(&self) -> u16 {
        match self {
            Lifetime::Singleton => 1000,
            Lifetime::Scoped | Lifetime::ScopedTo(_) => 100,
            Lifetime::Transient => 0,
        }
    }

    /// Whether instances with this lifetime are cached in a scope.
    pub fn is_cached(&self) -> bool {
        !matches!(self, Lifetime::Transient)
    }

    pub fn scoped_to(name: impl Into<Cow<'static, str>>) -> Self {
        Lifetime::ScopedTo(name.into())
    }
}

impl fmt::Display for Lifetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lifetime::Singleton => f.write_str("singleton"),
            Lifetime::Scoped => f.write_str("scoped"),
            Lifetime::ScopedTo(name) => write!(f, "scoped_to[{}]", name),
            Lifetime::Transient => f.write_str("transient"),
        }
    }
}
