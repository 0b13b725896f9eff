//! Core traits for the resolution engine.

mod dispose;
mod oracle;
mod resolver;

pub use dispose::Dispose;
pub use oracle::{DeclaredParameters, GenericMatcher, MemberSelector, StructuralMatcher};
pub use resolver::{Resolver, ResolverCore};
