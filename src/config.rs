//! Build parameters for a [`Bvh`].
//!
//! [`Bvh`]: ../bvh/struct.Bvh.html

use crate::error::{BvhError, Result};
use crate::Real;

/// The default maximum number of triangles in a leaf.
pub const DEFAULT_LEAF_SIZE: usize = 4;

/// The default constant traversal cost `K` of the surface area heuristic.
pub const DEFAULT_TRAVERSAL_COST: Real = 1.0;

/// Parameters controlling how a [`Bvh`] is built.
///
/// # Examples
/// ```
/// use tribvh::config::BuildConfig;
///
/// let config = BuildConfig::default().with_leaf_size(1);
/// assert_eq!(config.leaf_size, 1);
/// assert!(config.validate().is_ok());
/// assert!(config.with_leaf_size(0).validate().is_err());
/// ```
///
/// [`Bvh`]: ../bvh/struct.Bvh.html
///
#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct BuildConfig {
    /// Nodes with at most this many triangles become leaves.
    pub leaf_size: usize,

    /// The constant `K` added to every split cost. It scales all costs equally, so it only
    /// matters when comparing costs across configurations.
    pub traversal_cost: Real,
}

impl Default for BuildConfig {
    fn default() -> BuildConfig {
        BuildConfig {
            leaf_size: DEFAULT_LEAF_SIZE,
            traversal_cost: DEFAULT_TRAVERSAL_COST,
        }
    }
}

impl BuildConfig {
    /// Returns a copy of this config with a different leaf size.
    pub fn with_leaf_size(self, leaf_size: usize) -> BuildConfig {
        BuildConfig { leaf_size, ..self }
    }

    /// Returns a copy of this config with a different traversal cost.
    pub fn with_traversal_cost(self, traversal_cost: Real) -> BuildConfig {
        BuildConfig {
            traversal_cost,
            ..self
        }
    }

    /// Checks that the parameters describe a buildable hierarchy.
    pub fn validate(&self) -> Result<()> {
        if self.leaf_size == 0 {
            return Err(BvhError::InvalidLeafSize(self.leaf_size));
        }
        if !self.traversal_cost.is_finite() || self.traversal_cost < 0.0 {
            return Err(BvhError::InvalidTraversalCost(self.traversal_cost));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::config::BuildConfig;
    use crate::error::BvhError;
    use crate::Real;

    #[test]
    fn test_default_config_is_valid() {
        let config = BuildConfig::default();
        assert_eq!(config.leaf_size, 4);
        assert_eq!(config.traversal_cost, 1.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_configs() {
        assert_eq!(
            BuildConfig::default().with_leaf_size(0).validate(),
            Err(BvhError::InvalidLeafSize(0))
        );
        assert!(BuildConfig::default()
            .with_traversal_cost(Real::NAN)
            .validate()
            .is_err());
        assert_eq!(
            BuildConfig::default().with_traversal_cost(-1.0).validate(),
            Err(BvhError::InvalidTraversalCost(-1.0))
        );
        assert!(BuildConfig::default()
            .with_traversal_cost(0.0)
            .with_leaf_size(1)
            .validate()
            .is_ok());
    }
}
