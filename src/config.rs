//! Container-wide rules.
//!
//! Rules are fixed when the provider is built. With the `config` feature they can
//! be loaded from a JSON document; missing fields keep their defaults.

#[cfg(feature = "config")]
use serde::{Deserialize, Serialize};

use crate::lifetime::Lifetime;
use crate::registration::IfAlreadyRegistered;

#[cfg(feature = "config")]
use crate::error::{DiError, DiResult};

/// Container-wide resolution rules.
///
/// # Examples
///
/// ```rust
/// use ferrous_ioc::{ContainerRules, Lifetime, ServiceCollection};
///
/// let rules = ContainerRules {
///     default_lifetime: Lifetime::Scoped,
///     ..ContainerRules::default()
/// };
/// let provider = ServiceCollection::new().with_rules(rules).build();
/// assert_eq!(provider.rules().default_lifetime, Lifetime::Scoped);
/// assert_eq!(provider.rules().max_resolution_depth, 1024);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "config", serde(default))]
pub struct ContainerRules {
    /// Lifetime of registrations that do not set one
    pub default_lifetime: Lifetime,
    /// Collision policy used by `add_service` and `register` on a provider
    pub default_if_already_registered: IfAlreadyRegistered,
    /// Fail with `CaptiveDependency` when a cached service depends on a
    /// shorter-lived one
    pub throw_if_dependency_has_shorter_lifetime: bool,
    /// Longest dependency chain before `DepthExceeded`
    pub max_resolution_depth: usize,
    /// Track disposable transients resolved straight from the provider. They
    /// are then held until the provider closes; turn this off for long-running
    /// roots and dispose such transients yourself. Disposers handed over with
    /// `register_disposer` are tracked either way.
    pub track_root_transients: bool,
}

impl Default for ContainerRules {
    fn default() -> Self {
        Self {
            default_lifetime: Lifetime::Transient,
            default_if_already_registered: IfAlreadyRegistered::Append,
            throw_if_dependency_has_shorter_lifetime: true,
            max_resolution_depth: 1024,
            track_root_transients: true,
        }
    }
}

#[cfg(feature = "config")]
impl ContainerRules {
    /// Parses rules from JSON.
    ///
    /// ```rust
    /// use ferrous_ioc::{ContainerRules, IfAlreadyRegistered, Lifetime};
    ///
    /// let rules = ContainerRules::from_json_str(
    ///     r#"{ "default_lifetime": "singleton", "default_if_already_registered": "replace" }"#,
    /// ).unwrap();
    /// assert_eq!(rules.default_lifetime, Lifetime::Singleton);
    /// assert_eq!(rules.default_if_already_registered, IfAlreadyRegistered::Replace);
    /// assert!(rules.throw_if_dependency_has_shorter_lifetime);
    /// ```
    pub fn from_json_str(json: &str) -> DiResult<Self> {
        serde_json::from_str(json).map_err(|e| DiError::InvalidConfiguration(e.to_string()))
    }

    /// Reads rules from a JSON file.
    pub fn from_json_file(path: impl AsRef<std::path::Path>) -> DiResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| DiError::InvalidConfiguration(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&content)
    }

    pub fn to_json_string(&self) -> DiResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| DiError::InvalidConfiguration(e.to_string()))
    }
}
