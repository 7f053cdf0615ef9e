//! Named builder constructors, one per leaf representation and branching factor.
//!
//! Which representations are available depends on the enabled `geometry-*` cargo features.
//! Builders with a branching factor of 8 are only registered when the device supports wide
//! nodes.

use std::collections::BTreeMap;
use std::sync::Arc;

use rayon::ThreadPool;

use crate::common::build_error::BuildError;
use crate::common::device_config::DeviceConfig;
use crate::common::scene::Scene;
use crate::geometry::primitive::Primitive;

use super::builder::Builder;
use super::bvh_builder_sah_mb::{BuilderConfig, BvhBuilderMbSah};

/// Leaf representations a builder can produce.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PrimitiveKind {
    Line4i,
    Triangle4i,
    Triangle4vMb,
    Quad4i,
    Object,
    Instance,
    Grid,
}

impl std::fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PrimitiveKind::Line4i => "Line4i",
            PrimitiveKind::Triangle4i => "Triangle4i",
            PrimitiveKind::Triangle4vMb => "Triangle4vMB",
            PrimitiveKind::Quad4i => "Quad4i",
            PrimitiveKind::Object => "Object",
            PrimitiveKind::Instance => "Instance",
            PrimitiveKind::Grid => "Grid",
        };
        write!(f, "{name}")
    }
}

/// Creates a builder over `scene`, optionally running on a dedicated pool.
pub type BuilderConstructor = fn(Arc<Scene>, &DeviceConfig, Option<Arc<ThreadPool>>) -> Box<dyn Builder>;

struct RegistryEntry {
    name: String,
    constructor: BuilderConstructor,
}

/// Builder constructors keyed by leaf representation and branching factor.
pub struct BuilderRegistry {
    entries: BTreeMap<(PrimitiveKind, usize), RegistryEntry>,
    config: DeviceConfig,
    pool: Option<Arc<ThreadPool>>,
}

impl BuilderRegistry {
    /// Registers every builder supported by `config` and the enabled features.
    pub fn new(config: DeviceConfig) -> Self {
        let mut registry = Self {
            entries: BTreeMap::new(),
            pool: config.build_thread_pool(),
            config,
        };
        registry.register_width::<4>();
        if config.supports_wide_nodes() {
            registry.register_width::<8>();
        }
        registry
    }

    fn register(&mut self, kind: PrimitiveKind, branching_factor: usize, constructor: BuilderConstructor) {
        let name = format!("BVH{branching_factor}{kind}MBSceneBuilderSAH");
        self.entries.insert((kind, branching_factor), RegistryEntry { name, constructor });
    }

    fn register_width<const N: usize>(&mut self) {
        #[cfg(feature = "geometry-curve")]
        self.register(
            PrimitiveKind::Line4i,
            N,
            mesh_builder::<crate::geometry::line4i::Line4i, N>,
        );
        #[cfg(feature = "geometry-triangle")]
        {
            self.register(
                PrimitiveKind::Triangle4i,
                N,
                mesh_builder::<crate::geometry::triangle4i::Triangle4i, N>,
            );
            self.register(
                PrimitiveKind::Triangle4vMb,
                N,
                mesh_builder::<crate::geometry::triangle4v_mb::Triangle4vMb, N>,
            );
        }
        #[cfg(feature = "geometry-quad")]
        self.register(
            PrimitiveKind::Quad4i,
            N,
            mesh_builder::<crate::geometry::quad4i::Quad4i, N>,
        );
        #[cfg(feature = "geometry-user")]
        self.register(PrimitiveKind::Object, N, object_builder::<N>);
        #[cfg(feature = "geometry-instance")]
        self.register(PrimitiveKind::Instance, N, instance_builder::<N>);
        #[cfg(feature = "geometry-grid")]
        self.register(PrimitiveKind::Grid, N, grid_builder::<N>);
    }

    /// Names of all registered builders, ordered by representation and width.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.values().map(|entry| entry.name.as_str())
    }

    pub fn contains(&self, kind: PrimitiveKind, branching_factor: usize) -> bool {
        self.entries.contains_key(&(kind, branching_factor))
    }

    pub fn create(
        &self,
        kind: PrimitiveKind,
        branching_factor: usize,
        scene: Arc<Scene>,
    ) -> Result<Box<dyn Builder>, BuildError> {
        let entry = self
            .entries
            .get(&(kind, branching_factor))
            .ok_or_else(|| BuildError::UnsupportedBuilder {
                name: format!("BVH{branching_factor}{kind}MBSceneBuilderSAH"),
            })?;
        Ok((entry.constructor)(scene, &self.config, self.pool.clone()))
    }
}

// ── Constructors ───────────────────────────────────────────────────────────

/// Meshes cost leaves in blocks of four and let the cost model pick the leaf size.
#[cfg(any(feature = "geometry-curve", feature = "geometry-triangle", feature = "geometry-quad"))]
fn mesh_builder<P: Primitive, const N: usize>(
    scene: Arc<Scene>,
    _: &DeviceConfig,
    pool: Option<Arc<ThreadPool>>,
) -> Box<dyn Builder> {
    let config = BuilderConfig::new(N, 4, 1.0, 4, usize::MAX);
    Box::new(BvhBuilderMbSah::<P>::new(scene, config).with_thread_pool(pool))
}

#[cfg(feature = "geometry-user")]
fn object_builder<const N: usize>(
    scene: Arc<Scene>,
    device: &DeviceConfig,
    pool: Option<Arc<ThreadPool>>,
) -> Box<dyn Builder> {
    let sah_block_size = if N == 8 { 8 } else { 4 };
    let config = BuilderConfig::new(
        N,
        sah_block_size,
        1.0,
        device.object_accel_mb_min_leaf_size,
        device.object_accel_mb_max_leaf_size,
    );
    Box::new(BvhBuilderMbSah::<crate::geometry::object::Object>::new(scene, config).with_thread_pool(pool))
}

#[cfg(feature = "geometry-instance")]
fn instance_builder<const N: usize>(
    scene: Arc<Scene>,
    _: &DeviceConfig,
    pool: Option<Arc<ThreadPool>>,
) -> Box<dyn Builder> {
    let sah_block_size = if N == 8 { 8 } else { 4 };
    let config = BuilderConfig::new(N, sah_block_size, 1.0, 1, 1);
    Box::new(
        BvhBuilderMbSah::<crate::geometry::instance_primitive::InstancePrimitive>::new(scene, config)
            .with_thread_pool(pool),
    )
}

#[cfg(feature = "geometry-grid")]
fn grid_builder<const N: usize>(
    scene: Arc<Scene>,
    _: &DeviceConfig,
    pool: Option<Arc<ThreadPool>>,
) -> Box<dyn Builder> {
    let config = BuilderConfig::new(N, N, 1.0, N, N);
    Box::new(super::bvh_builder_sah_mb_grid::BvhBuilderMbSahGrid::new(scene, config).with_thread_pool(pool))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(wide_nodes: bool) -> BuilderRegistry {
        BuilderRegistry::new(DeviceConfig {
            wide_nodes: Some(wide_nodes),
            ..Default::default()
        })
    }

    #[test]
    #[cfg(feature = "geometry-triangle")]
    fn test_wide_builders_follow_device_support() {
        assert!(registry(true).contains(PrimitiveKind::Triangle4i, 8));
        assert!(!registry(false).contains(PrimitiveKind::Triangle4i, 8));
        assert!(registry(false).contains(PrimitiveKind::Triangle4i, 4));
        assert!(registry(true)
            .names()
            .any(|name| name == "BVH8Triangle4iMBSceneBuilderSAH"));
    }

    #[test]
    fn test_missing_builder_is_unsupported() {
        let result = registry(false).create(PrimitiveKind::Grid, 8, Arc::new(Scene::new()));
        assert_eq!(
            result.err(),
            Some(BuildError::UnsupportedBuilder {
                name: "BVH8GridMBSceneBuilderSAH".into()
            })
        );
    }

    #[test]
    #[cfg(feature = "geometry-user")]
    fn test_object_builder_reads_device_leaf_sizes() {
        let config = DeviceConfig {
            object_accel_mb_min_leaf_size: 2,
            object_accel_mb_max_leaf_size: 3,
            wide_nodes: Some(true),
            ..Default::default()
        };
        let registry = BuilderRegistry::new(config);
        let builder = registry
            .create(PrimitiveKind::Object, 8, Arc::new(Scene::new()))
            .unwrap();
        let builder = builder
            .as_any()
            .downcast_ref::<BvhBuilderMbSah<crate::geometry::object::Object>>()
            .unwrap();
        assert_eq!(*builder.config(), BuilderConfig::new(8, 8, 1.0, 2, 3));
    }
}
