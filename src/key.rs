//! Service identity types.
//!
//! A [`ServiceType`] names what is being registered or requested. Rust types are
//! identified by their `TypeId`; nominal and generic types exist so that the
//! engine can reason about open generic families, which Rust itself has no
//! runtime notion of. A [`ServiceKey`] discriminates several registrations of the
//! same type.

use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::wrappers::{COLLECTION_FAMILY, FUNC_FAMILY, LAZY_FAMILY};

/// Identity of a service type.
///
/// # Examples
///
/// ```rust
/// use ferrous_ioc::ServiceType;
///
/// let int = ServiceType::named("int");
/// let closed = ServiceType::generic("S", [int.clone()]);
///
/// assert_eq!(closed.to_string(), "S<int>");
/// assert_eq!(closed.open_definition(), Some(ServiceType::open("S", 1)));
/// assert_eq!(ServiceType::lazy(int).to_string(), "Lazy<int>");
/// ```
#[derive(Clone)]
pub enum ServiceType {
    /// Concrete Rust type; equality uses the `TypeId` only, the name is for
    /// diagnostics.
    Rust { id: TypeId, name: &'static str },
    /// Nominal type declared at runtime.
    Named(Arc<str>),
    /// Closed generic, e.g. `S<int>`.
    Generic { family: Arc<str>, args: Arc<[ServiceType]> },
    /// Open generic definition, e.g. `S<>`.
    OpenGeneric { family: Arc<str>, arity: usize },
    /// Matches any service. Used as the target of hook decorators and as the
    /// placeholder for "the decorated or wrapped type" in parameter lists.
    Any,
}

impl ServiceType {
    /// Type identity of a Rust type. Works for unsized types such as `dyn Trait`.
    #[inline]
    pub fn of<T: ?Sized + 'static>() -> Self {
        ServiceType::Rust {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn named(name: impl Into<Arc<str>>) -> Self {
        ServiceType::Named(name.into())
    }

    pub fn generic<I>(family: impl Into<Arc<str>>, args: I) -> Self
    where
        I: IntoIterator<Item = ServiceType>,
    {
        ServiceType::Generic {
            family: family.into(),
            args: args.into_iter().collect::<Vec<_>>().into(),
        }
    }

    pub fn open(family: impl Into<Arc<str>>, arity: usize) -> Self {
        ServiceType::OpenGeneric {
            family: family.into(),
            arity,
        }
    }

    pub fn any() -> Self {
        ServiceType::Any
    }

    /// `Func<inner>`: a deferred factory of `inner`.
    pub fn func(inner: ServiceType) -> Self {
        Self::generic(FUNC_FAMILY, [inner])
    }

    /// `Lazy<inner>`: a memoized deferred value of `inner`.
    pub fn lazy(inner: ServiceType) -> Self {
        Self::generic(LAZY_FAMILY, [inner])
    }

    /// `Collection<inner>`: every eligible implementation of `inner`.
    pub fn collection(inner: ServiceType) -> Self {
        Self::generic(COLLECTION_FAMILY, [inner])
    }

    pub fn is_any(&self) -> bool {
        matches!(self, ServiceType::Any)
    }

    pub fn is_open_generic(&self) -> bool {
        matches!(self, ServiceType::OpenGeneric { .. })
    }

    /// Generic family name for closed and open generics.
    pub fn family(&self) -> Option<&str> {
        match self {
            ServiceType::Generic { family, .. } | ServiceType::OpenGeneric { family, .. } => {
                Some(family)
            }
            _ => None,
        }
    }

    /// Type arguments of a closed generic; empty for everything else.
    pub fn args(&self) -> &[ServiceType] {
        match self {
            ServiceType::Generic { args, .. } => args,
            _ => &[],
        }
    }

    /// The open definition a closed generic was made from.
    pub fn open_definition(&self) -> Option<ServiceType> {
        match self {
            ServiceType::Generic { family, args } => Some(ServiceType::OpenGeneric {
                family: family.clone(),
                arity: args.len(),
            }),
            _ => None,
        }
    }

    /// Replaces every occurrence of [`ServiceType::Any`] with `with`.
    pub(crate) fn substitute_any(&self, with: &ServiceType) -> ServiceType {
        match self {
            ServiceType::Any => with.clone(),
            ServiceType::Generic { family, args } => ServiceType::Generic {
                family: family.clone(),
                args: args.iter().map(|a| a.substitute_any(with)).collect::<Vec<_>>().into(),
            },
            other => other.clone(),
        }
    }

    /// Unwraps one layer of `family<inner>`.
    pub(crate) fn unwrap_family(&self, wanted: &str) -> Option<&ServiceType> {
        match self {
            ServiceType::Generic { family, args } if &**family == wanted && args.len() == 1 => {
                args.first()
            }
            _ => None,
        }
    }
}

impl PartialEq for ServiceType {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ServiceType::Rust { id: a, .. }, ServiceType::Rust { id: b, .. }) => a == b,
            (ServiceType::Named(a), ServiceType::Named(b)) => a == b,
            (
                ServiceType::Generic { family: fa, args: aa },
                ServiceType::Generic { family: fb, args: ab },
            ) => fa == fb && aa == ab,
            (
                ServiceType::OpenGeneric { family: fa, arity: na },
                ServiceType::OpenGeneric { family: fb, arity: nb },
            ) => fa == fb && na == nb,
            (ServiceType::Any, ServiceType::Any) => true,
            _ => false,
        }
    }
}

impl Eq for ServiceType {}

// TypeId-only hash for Rust types, the name never participates
impl Hash for ServiceType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            ServiceType::Rust { id, .. } => {
                0u8.hash(state);
                id.hash(state);
            }
            ServiceType::Named(name) => {
                1u8.hash(state);
                name.hash(state);
            }
            ServiceType::Generic { family, args } => {
                2u8.hash(state);
                family.hash(state);
                args.hash(state);
            }
            ServiceType::OpenGeneric { family, arity } => {
                3u8.hash(state);
                family.hash(state);
                arity.hash(state);
            }
            ServiceType::Any => 4u8.hash(state),
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceType::Rust { name, .. } => f.write_str(name),
            ServiceType::Named(name) => f.write_str(name),
            ServiceType::Generic { family, args } => {
                write!(f, "{}<", family)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                f.write_str(">")
            }
            ServiceType::OpenGeneric { family, arity } => {
                write!(f, "{}<{}>", family, ",".repeat(arity.saturating_sub(1)))
            }
            ServiceType::Any => f.write_str("*"),
        }
    }
}

impl fmt::Debug for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServiceType({})", self)
    }
}

/// Discriminator for registrations of the same service type.
///
/// Keys compare by value: `ServiceKey::from("foo") == ServiceKey::from("foo")`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ServiceKey {
    Str(Arc<str>),
    Int(i64),
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceKey::Str(s) => write!(f, "{:?}", s),
            ServiceKey::Int(i) => write!(f, "{}", i),
        }
    }
}

impl From<&str> for ServiceKey {
    fn from(value: &str) -> Self {
        ServiceKey::Str(value.into())
    }
}

impl From<String> for ServiceKey {
    fn from(value: String) -> Self {
        ServiceKey::Str(value.into())
    }
}

impl From<i64> for ServiceKey {
    fn from(value: i64) -> Self {
        ServiceKey::Int(value)
    }
}

impl From<i32> for ServiceKey {
    fn from(value: i32) -> Self {
        ServiceKey::Int(value.into())
    }
}

/// `(service type, optional key)`: the identity used for cycle detection and
/// error reporting.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceIdentity {
    pub service_type: ServiceType,
    pub service_key: Option<ServiceKey>,
}

impl ServiceIdentity {
    pub fn new(service_type: ServiceType, service_key: Option<ServiceKey>) -> Self {
        Self {
            service_type,
            service_key,
        }
    }
}

impl fmt::Display for ServiceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.service_key {
            Some(key) => write!(f, "{} [key={}]", self.service_type, key),
            None => write!(f, "{}", self.service_type),
        }
    }
}
