//! # ferrous-ioc
//!
//! Dependency resolution engine that compiles every request into a construction
//! plan: which factory to call, with which dependencies, wrapped by which
//! decorators, and delivered through which wrapper shape.
//!
//! ## Features
//!
//! - **Lifetimes**: Singleton, Scoped, ScopedTo(name) and Transient, with captive dependency checks
//! - **Decorators**: ordered, conditional, keyed, open generic and hook decorators
//! - **Wrappers**: `Func<T>`, `Lazy<T>`, `Collection<T>` and user-registered wrapper families
//! - **Plan cache**: plans, including those for resolutions made inside factories, are built once per registry version and reused
//! - **Scope tree**: nested and named scopes with reverse-order disposal
//! - **Thread-safe**: single-flight creation of cached instances
//!
//! ## Quick Start
//!
//! ```rust
//! use ferrous_ioc::{Resolver, ServiceCollection};
//! use std::sync::Arc;
//!
//! struct Clock;
//! struct Scheduler {
//!     clock: Arc<Clock>,
//! }
//!
//! let mut services = ServiceCollection::new();
//! services.add_singleton(Clock);
//! services.add_transient_factory::<Scheduler, _>(|ctx| Scheduler {
//!     clock: ctx.get_required::<Clock>(),
//! });
//!
//! let provider = services.build();
//! let a = provider.get_required::<Scheduler>();
//! let b = provider.get_required::<Scheduler>();
//! assert!(!Arc::ptr_eq(&a, &b));
//! assert!(Arc::ptr_eq(&a.clock, &b.clock));
//! ```
//!
//! ## Descriptors and Plans
//!
//! The typed helpers are shortcuts over descriptors. A descriptor names its
//! implementation and parameters, so the container can plan the whole object
//! graph before creating anything:
//!
//! ```rust
//! use ferrous_ioc::{FactoryDescriptor, Implementation, Lifetime, Parameter, Resolver,
//!                   ServiceCollection, ServiceType};
//! use std::sync::Arc;
//!
//! struct Connection;
//! struct Repository { conn: Arc<Connection> }
//!
//! let mut services = ServiceCollection::new();
//! services.add_service(
//!     ServiceType::of::<Connection>(),
//!     FactoryDescriptor::service(Implementation::of::<Connection, _>(|_| Ok(Connection)))
//!         .with_lifetime(Lifetime::Singleton),
//! ).unwrap();
//! services.add_service(
//!     ServiceType::of::<Repository>(),
//!     FactoryDescriptor::service(
//!         Implementation::of::<Repository, _>(|ctx| Ok(Repository { conn: ctx.arg(0)? }))
//!             .with_parameters([Parameter::of::<Connection>()]),
//!     ),
//! ).unwrap();
//!
//! let provider = services.build();
//! assert_eq!(
//!     provider.explain(&ServiceType::of::<Repository>(), None).unwrap(),
//!     "new Repository(singleton(new Connection()))"
//! );
//! let repository = provider.get_required::<Repository>();
//! assert!(Arc::ptr_eq(&repository.conn, &provider.get_required::<Connection>()));
//! ```
//!
//! ## Scoped Services
//!
//! ```rust
//! use ferrous_ioc::{ServiceCollection, Resolver};
//! use std::sync::Arc;
//!
//! struct RequestId(u64);
//!
//! let mut services = ServiceCollection::new();
//! services.add_scoped_factory::<RequestId, _>(|_| RequestId(7));
//!
//! let provider = services.build();
//! let scope = provider.create_scope();
//! let a = scope.get_required::<RequestId>();
//! let b = scope.get_required::<RequestId>();
//! assert!(Arc::ptr_eq(&a, &b));
//! scope.close().unwrap();
//! ```

pub mod collection;
pub mod config;
pub mod descriptors;
pub mod error;
pub mod key;
pub mod lifetime;
pub mod observer;
pub mod plan;
pub mod provider;
pub mod request;
pub mod traits;
pub mod wrappers;

mod decoration;
mod internal;
mod registration;
mod selection;

pub use collection::{ServiceCollection, ServiceModule};
pub use config::ContainerRules;
pub use descriptors::{
    Condition, Constructor, Disposer, FactoryDescriptor, Implementation, Parameter, ServiceDescriptor, SetupKind,
};
pub use error::{DiError, DiResult, DisposalFailure};
pub use key::{ServiceIdentity, ServiceKey, ServiceType};
pub use lifetime::Lifetime;
pub use observer::{DiObserver, LoggingObserver, MetricsObserver};
pub use plan::{Invocation, PlanCacheStats, PlanNode, WrapPlan};
pub use provider::{ResolverContext, Scope, ServiceProvider};
pub use registration::{AnyArc, FactoryId, IfAlreadyRegistered, RegisterOutcome, Registration};
pub use request::{ImplementationInfo, ResolutionRequest};
pub use traits::{DeclaredParameters, Dispose, GenericMatcher, MemberSelector, Resolver, ResolverCore, StructuralMatcher};
pub use wrappers::{Collection, CollectionItem, Func, Lazy, WrapperShape};
