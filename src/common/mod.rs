pub mod build_error;
pub mod build_profiler;
pub mod device_config;
pub mod progress_monitor;
pub mod scene;

pub use build_error::BuildError;
pub use build_profiler::{BuildProfiler, BuildStage};
pub use device_config::DeviceConfig;
pub use progress_monitor::{ProgressFunction, ProgressMonitor};
pub use scene::Scene;
