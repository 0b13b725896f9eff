//! Resolution requests and their ancestor chain.

use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::descriptors::SetupKind;
use crate::error::{DiError, DiResult};
use crate::key::{ServiceIdentity, ServiceKey, ServiceType};
use crate::lifetime::Lifetime;
use crate::registration::FactoryId;

/// The implementation chosen for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImplementationInfo {
    pub factory: FactoryId,
    pub name: String,
    pub lifetime: Lifetime,
    pub setup: SetupKind,
}

/// One node of the chain of requests leading to the service being built.
///
/// Conditions receive the request and may inspect the key, the parent chain and,
/// for decorators, the implementation chosen for the decorated service. Cloning is
/// cheap; parents are shared.
#[derive(Clone)]
pub struct ResolutionRequest {
    inner: Arc<RequestInner>,
}

struct RequestInner {
    service_type: ServiceType,
    service_key: Option<ServiceKey>,
    required: bool,
    parent: Option<ResolutionRequest>,
    depth: usize,
    implementation: Option<ImplementationInfo>,
}

impl ResolutionRequest {
    pub(crate) fn root(service_type: ServiceType, service_key: Option<ServiceKey>, required: bool) -> Self {
        Self {
            inner: Arc::new(RequestInner {
                service_type,
                service_key,
                required,
                parent: None,
                depth: 0,
                implementation: None,
            }),
        }
    }

    /// Request for a dependency of this one.
    ///
    /// Fails when `(service_type, key)` is already being resolved further up the
    /// chain, or when the chain grows past `max_depth`.
    pub(crate) fn child(
        &self,
        service_type: ServiceType,
        service_key: Option<ServiceKey>,
        required: bool,
        max_depth: usize,
    ) -> DiResult<Self> {
        let depth = self.inner.depth + 1;
        if depth > max_depth {
            return Err(DiError::DepthExceeded(max_depth));
        }

        let recursive = std::iter::once(self)
            .chain(self.ancestors())
            .any(|r| r.inner.service_type == service_type && r.inner.service_key == service_key);
        if recursive {
            let mut path: Vec<String> = std::iter::once(self)
                .chain(self.ancestors())
                .map(|r| r.identity().to_string())
                .collect();
            path.reverse();
            path.push(ServiceIdentity::new(service_type, service_key).to_string());
            return Err(DiError::RecursiveDependencyDetected { path });
        }

        Ok(Self {
            inner: Arc::new(RequestInner {
                service_type,
                service_key,
                required,
                parent: Some(self.clone()),
                depth,
                implementation: None,
            }),
        })
    }

    /// Same request with the chosen implementation attached.
    pub(crate) fn with_implementation(&self, implementation: ImplementationInfo) -> Self {
        Self {
            inner: Arc::new(RequestInner {
                service_type: self.inner.service_type.clone(),
                service_key: self.inner.service_key.clone(),
                required: self.inner.required,
                parent: self.inner.parent.clone(),
                depth: self.inner.depth,
                implementation: Some(implementation),
            }),
        }
    }

    /// This request moved under `live`, a request for the same service at the
    /// depth a reused plan starts from. Nodes above that depth come from `live`.
    pub(crate) fn rebased(&self, live: &ResolutionRequest) -> Self {
        let base = live.depth();
        let path: Vec<&ResolutionRequest> = std::iter::once(self)
            .chain(self.ancestors())
            .take_while(|r| r.depth() >= base)
            .collect();
        let Some(stale_base) = path.last() else {
            return self.clone();
        };
        let unchanged = match (stale_base.parent(), live.parent()) {
            (Some(stale), Some(current)) => Arc::ptr_eq(&stale.inner, &current.inner),
            (None, None) => true,
            _ => false,
        };
        if unchanged {
            return self.clone();
        }

        let mut parent = live.parent().cloned();
        for node in path.into_iter().rev() {
            let inner = RequestInner {
                service_type: node.inner.service_type.clone(),
                service_key: node.inner.service_key.clone(),
                required: node.inner.required,
                parent: parent.take(),
                depth: node.inner.depth,
                implementation: node.inner.implementation.clone(),
            };
            parent = Some(Self { inner: Arc::new(inner) });
        }
        parent.unwrap_or_else(|| self.clone())
    }

    /// Nearest consumer up the chain whose instances outlive a single
    /// resolution.
    pub(crate) fn enclosing_cached(&self) -> Option<&ImplementationInfo> {
        self.ancestors()
            .filter_map(|r| r.inner.implementation.as_ref())
            .find(|info| info.lifetime.lifespan() > 0)
    }

    /// Decorators whose own dependencies are being built further up the chain,
    /// sorted. They are not applied again below themselves.
    pub(crate) fn enclosing_decorators(&self) -> SmallVec<[FactoryId; 2]> {
        let mut found: SmallVec<[FactoryId; 2]> = self
            .ancestors()
            .filter_map(|r| r.inner.implementation.as_ref())
            .filter(|info| info.setup == SetupKind::Decorator)
            .map(|info| info.factory)
            .collect();
        found.sort_unstable();
        found.dedup();
        found
    }

    pub fn service_type(&self) -> &ServiceType {
        &self.inner.service_type
    }

    pub fn service_key(&self) -> Option<&ServiceKey> {
        self.inner.service_key.as_ref()
    }

    pub fn is_required(&self) -> bool {
        self.inner.required
    }

    pub fn parent(&self) -> Option<&ResolutionRequest> {
        self.inner.parent.as_ref()
    }

    /// 0 for a root request.
    pub fn depth(&self) -> usize {
        self.inner.depth
    }

    pub fn is_root(&self) -> bool {
        self.inner.parent.is_none()
    }

    pub fn implementation(&self) -> Option<&ImplementationInfo> {
        self.inner.implementation.as_ref()
    }

    pub fn implementation_name(&self) -> Option<&str> {
        self.inner.implementation.as_ref().map(|info| info.name.as_str())
    }

    pub fn identity(&self) -> ServiceIdentity {
        ServiceIdentity::new(self.inner.service_type.clone(), self.inner.service_key.clone())
    }

    /// Parent, grandparent and so on up to the root.
    pub fn ancestors(&self) -> impl Iterator<Item = &ResolutionRequest> {
        std::iter::successors(self.parent(), |r| r.parent())
    }
}

impl fmt::Debug for ResolutionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolutionRequest")
            .field("service", &self.identity().to_string())
            .field("required", &self.inner.required)
            .field("depth", &self.inner.depth)
            .field("implementation", &self.implementation_name())
            .finish()
    }
}
