use std::sync::Arc;

use rayon::{ThreadPool, ThreadPoolBuilder};

/// Device wide settings consulted when builders are constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Minimum leaf size used by motion blurred user geometry hierarchies.
    pub object_accel_mb_min_leaf_size: usize,
    /// Maximum leaf size used by motion blurred user geometry hierarchies.
    pub object_accel_mb_max_leaf_size: usize,
    /// Number of worker threads for a dedicated build pool. `None` builds on rayon's global pool.
    pub build_threads: Option<usize>,
    /// Forces 8-wide builders on or off. `None` enables them when the CPU supports AVX.
    pub wide_nodes: Option<bool>,
}

impl DeviceConfig {
    /// Whether builders with a branching factor of 8 should be offered.
    pub fn supports_wide_nodes(&self) -> bool {
        match self.wide_nodes {
            Some(forced) => forced,
            None => cpu_supports_avx(),
        }
    }

    /// Creates the dedicated build pool, if one was requested.
    pub fn build_thread_pool(&self) -> Option<Arc<ThreadPool>> {
        let threads = self.build_threads?;
        match ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("bvh-build-{i}"))
            .build()
        {
            Ok(pool) => Some(Arc::new(pool)),
            Err(error) => {
                log::warn!("failed to create a {threads} thread build pool, using the global pool: {error}");
                None
            }
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            object_accel_mb_min_leaf_size: 1,
            object_accel_mb_max_leaf_size: 1,
            build_threads: None,
            wide_nodes: None,
        }
    }
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
fn cpu_supports_avx() -> bool {
    is_x86_feature_detected!("avx")
}

#[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
fn cpu_supports_avx() -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wide_node_override() {
        let mut config = DeviceConfig::default();
        config.wide_nodes = Some(true);
        assert!(config.supports_wide_nodes());
        config.wide_nodes = Some(false);
        assert!(!config.supports_wide_nodes());
    }

    #[test]
    fn test_dedicated_pool() {
        let config = DeviceConfig {
            build_threads: Some(2),
            ..Default::default()
        };
        let pool = config.build_thread_pool().unwrap();
        assert_eq!(pool.install(rayon::current_num_threads), 2);
        assert!(DeviceConfig::default().build_thread_pool().is_none());
    }
}
