//! Invalidation configuration.
//!
//! Controls the local object/render caches and notification consumption.

use std::num::NonZeroUsize;

use serde::Deserialize;

// Default values for invalidation configuration
const DEFAULT_OBJECT_LIMIT: usize = 500;
const DEFAULT_RENDER_FRAGMENT_LIMIT: usize = 200;
const DEFAULT_CONSUME_BATCH_LIMIT: usize = 100;

/// Configuration for the invalidation and reindexing pipeline.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InvalidationConfig {
    /// Enable the local object cache.
    pub enable_object_cache: bool,
    /// Enable the local render caches (partial views, macros, transforms).
    pub enable_render_cache: bool,
    /// Maximum entity records held in the object cache.
    pub object_limit: usize,
    /// Maximum fragments held in each render cache.
    pub render_fragment_limit: usize,
    /// Maximum notifications drained per consumption pass.
    pub consume_batch_limit: usize,
}

impl Default for InvalidationConfig {
    fn default() -> Self {
        Self {
            enable_object_cache: true,
            enable_render_cache: true,
            object_limit: DEFAULT_OBJECT_LIMIT,
            render_fragment_limit: DEFAULT_RENDER_FRAGMENT_LIMIT,
            consume_batch_limit: DEFAULT_CONSUME_BATCH_LIMIT,
        }
    }
}

impl InvalidationConfig {
    /// Returns true if any local cache layer is enabled.
    pub fn is_cache_enabled(&self) -> bool {
        self.enable_object_cache || self.enable_render_cache
    }

    /// Returns the object limit as NonZeroUsize, clamping to 1 if zero.
    pub fn object_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.object_limit).unwrap_or(NonZeroUsize::MIN)
    }

    /// Returns the render fragment limit as NonZeroUsize, clamping to 1 if zero.
    pub fn render_fragment_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.render_fragment_limit).unwrap_or(NonZeroUsize::MIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = InvalidationConfig::default();
        assert!(config.enable_object_cache);
        assert!(config.enable_render_cache);
        assert_eq!(config.object_limit, 500);
        assert_eq!(config.render_fragment_limit, 200);
        assert_eq!(config.consume_batch_limit, 100);
    }

    #[test]
    fn is_cache_enabled_when_object_only() {
        let config = InvalidationConfig {
            enable_object_cache: true,
            enable_render_cache: false,
            ..Default::default()
        };
        assert!(config.is_cache_enabled());
    }

    #[test]
    fn is_cache_disabled_when_both_off() {
        let config = InvalidationConfig {
            enable_object_cache: false,
            enable_render_cache: false,
            ..Default::default()
        };
        assert!(!config.is_cache_enabled());
    }

    #[test]
    fn non_zero_clamps_to_min() {
        let config = InvalidationConfig {
            object_limit: 0,
            ..Default::default()
        };
        assert_eq!(config.object_limit_non_zero().get(), 1);
    }

    #[test]
    fn deserializes_partial_toml_shape() {
        let config: InvalidationConfig =
            serde_json::from_str(r#"{"object_limit": 50}"#).expect("valid config");
        assert_eq!(config.object_limit, 50);
        assert!(config.enable_object_cache);
    }
}
