//! Wrapper shapes: deferred factories, lazy values and collections.
//!
//! A request for `Func<T>`, `Lazy<T>` or `Collection<T>` with no explicit
//! registration of its own is redirected to `T` and the result is handed out in
//! the wrapper value. Other families become wrappers when a registration with
//! [`SetupKind::Wrapper`](crate::SetupKind::Wrapper) exists on their open
//! definition.

use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::error::DiResult;
use crate::key::{ServiceKey, ServiceType};
use crate::registration::{cast_arc, cast_trait_arc, AnyArc, Registry};

pub(crate) const FUNC_FAMILY: &str = "Func";
pub(crate) const LAZY_FAMILY: &str = "Lazy";
pub(crate) const COLLECTION_FAMILY: &str = "Collection";

/// Recognized wrapper shape of a requested type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WrapperShape {
    Func,
    Lazy,
    Collection,
    /// Registered wrapper family
    Custom(Arc<str>),
}

impl fmt::Display for WrapperShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WrapperShape::Func => f.write_str(FUNC_FAMILY),
            WrapperShape::Lazy => f.write_str(LAZY_FAMILY),
            WrapperShape::Collection => f.write_str(COLLECTION_FAMILY),
            WrapperShape::Custom(family) => f.write_str(family),
        }
    }
}

/// Splits `W<inner>` into its shape and inner type when `W` is a wrapper.
pub(crate) fn try_unwrap(registry: &Registry, service_type: &ServiceType) -> Option<(WrapperShape, ServiceType)> {
    let ServiceType::Generic { family, args } = service_type else {
        return None;
    };
    let [inner] = &args[..] else {
        return None;
    };
    let shape = match &**family {
        FUNC_FAMILY => WrapperShape::Func,
        LAZY_FAMILY => WrapperShape::Lazy,
        COLLECTION_FAMILY => WrapperShape::Collection,
        other if registry.has_wrapper(other) => WrapperShape::Custom(family.clone()),
        _ => return None,
    };
    Some((shape, inner.clone()))
}

type Thunk = Arc<dyn Fn() -> DiResult<AnyArc> + Send + Sync>;

/// Deferred factory. Each call resolves the inner service again from the scope
/// the factory was resolved in.
#[derive(Clone)]
pub struct Func {
    service_type: ServiceType,
    factory: Thunk,
}

impl Func {
    pub fn new<F>(service_type: ServiceType, factory: F) -> Self
    where
        F: Fn() -> DiResult<AnyArc> + Send + Sync + 'static,
    {
        Self {
            service_type,
            factory: Arc::new(factory),
        }
    }

    /// The produced service type.
    pub fn service_type(&self) -> &ServiceType {
        &self.service_type
    }

    pub fn call(&self) -> DiResult<AnyArc> {
        (self.factory)()
    }

    pub fn call_as<T: Send + Sync + 'static>(&self) -> DiResult<Arc<T>> {
        cast_arc(self.call()?, &self.service_type)
    }

    pub fn call_trait<T: ?Sized + Send + Sync + 'static>(&self) -> DiResult<Arc<T>> {
        cast_trait_arc(self.call()?, &self.service_type)
    }
}

impl fmt::Debug for Func {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Func<{}>", self.service_type)
    }
}

/// Deferred value, resolved on first access and memoized afterwards.
///
/// A failed first access leaves the value unset; the next access retries.
pub struct Lazy {
    service_type: ServiceType,
    init: Thunk,
    cell: OnceCell<AnyArc>,
}

impl Lazy {
    pub fn new<F>(service_type: ServiceType, init: F) -> Self
    where
        F: Fn() -> DiResult<AnyArc> + Send + Sync + 'static,
    {
        Self {
            service_type,
            init: Arc::new(init),
            cell: OnceCell::new(),
        }
    }

    pub fn service_type(&self) -> &ServiceType {
        &self.service_type
    }

    pub fn value(&self) -> DiResult<AnyArc> {
        self.cell.get_or_try_init(|| (self.init)()).cloned()
    }

    pub fn value_as<T: Send + Sync + 'static>(&self) -> DiResult<Arc<T>> {
        cast_arc(self.value()?, &self.service_type)
    }

    pub fn value_trait<T: ?Sized + Send + Sync + 'static>(&self) -> DiResult<Arc<T>> {
        cast_trait_arc(self.value()?, &self.service_type)
    }

    pub fn is_created(&self) -> bool {
        self.cell.get().is_some()
    }
}

impl fmt::Debug for Lazy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lazy")
            .field("service_type", &self.service_type)
            .field("created", &self.is_created())
            .finish()
    }
}

/// One element of a [`Collection`], with the key it was registered under.
#[derive(Clone)]
pub struct CollectionItem {
    pub key: Option<ServiceKey>,
    pub value: AnyArc,
}

impl fmt::Debug for CollectionItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionItem").field("key", &self.key).finish_non_exhaustive()
    }
}

/// Every eligible implementation of a service, in registration order.
///
/// Decorators registered for `Collection<T>` receive the resolved collection and
/// may return a filtered one; keyed single resolution of `T` is unaffected.
///
/// # Examples
///
/// ```rust
/// use ferrous_ioc::{Collection, CollectionItem, ServiceType};
/// use std::sync::Arc;
///
/// let items = vec![
///     CollectionItem { key: None, value: Arc::new(1u32) },
///     CollectionItem { key: Some("b".into()), value: Arc::new(2u32) },
/// ];
/// let all = Collection::new(ServiceType::of::<u32>(), items);
/// let unkeyed = all.filter(|item| item.key.is_none());
///
/// assert_eq!(all.len(), 2);
/// assert_eq!(*unkeyed.cast::<u32>().unwrap()[0], 1);
/// ```
#[derive(Debug, Clone)]
pub struct Collection {
    item_type: ServiceType,
    items: Vec<CollectionItem>,
}

impl Collection {
    pub fn new(item_type: ServiceType, items: Vec<CollectionItem>) -> Self {
        Self { item_type, items }
    }

    pub fn item_type(&self) -> &ServiceType {
        &self.item_type
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CollectionItem> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = Option<&ServiceKey>> {
        self.items.iter().map(|item| item.key.as_ref())
    }

    pub fn values(&self) -> impl Iterator<Item = &AnyArc> {
        self.items.iter().map(|item| &item.value)
    }

    pub fn filter<F>(&self, predicate: F) -> Collection
    where
        F: Fn(&CollectionItem) -> bool,
    {
        Collection {
            item_type: self.item_type.clone(),
            items: self.items.iter().filter(|item| predicate(item)).cloned().collect(),
        }
    }

    pub fn cast<T: Send + Sync + 'static>(&self) -> DiResult<Vec<Arc<T>>> {
        self.values()
            .map(|value| cast_arc(value.clone(), &self.item_type))
            .collect()
    }

    pub fn cast_trait<T: ?Sized + Send + Sync + 'static>(&self) -> DiResult<Vec<Arc<T>>> {
        self.values()
            .map(|value| cast_trait_arc(value.clone(), &self.item_type))
            .collect()
    }
}

impl<'a> IntoIterator for &'a Collection {
    type Item = &'a CollectionItem;
    type IntoIter = std::slice::Iter<'a, CollectionItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
