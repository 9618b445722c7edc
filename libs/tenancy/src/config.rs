//! Configuration for the tenancy core.

use serde::Deserialize;

use crate::cache::DEFAULT_CACHE_CAPACITY;

/// Name of the per-request tenant override header.
pub const DEFAULT_TENANT_HEADER: &str = "X-Tenant-ID";

/// Tenancy configuration, deserialized from the embedding server's config
/// tree.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TenancyConfig {
    /// Header carrying an explicit per-request tenant override.
    pub header_name: String,
    /// Descriptor cache capacity before a full clear.
    pub cache_capacity: usize,
}

impl Default for TenancyConfig {
    fn default() -> Self {
        Self {
            header_name: DEFAULT_TENANT_HEADER.to_owned(),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = TenancyConfig::default();
        assert_eq!(config.header_name, "X-Tenant-ID");
        assert_eq!(config.cache_capacity, 1000);
    }

    #[test]
    fn partial_overrides_keep_defaults() {
        let config: TenancyConfig =
            serde_json::from_value(serde_json::json!({ "cache_capacity": 16 })).unwrap();
        assert_eq!(config.cache_capacity, 16);
        assert_eq!(config.header_name, "X-Tenant-ID");
    }
}
