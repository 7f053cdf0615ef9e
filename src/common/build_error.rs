use thiserror::Error;

/// Errors surfaced by a hierarchy build.
///
/// A failed build leaves the previously built hierarchy untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// The progress monitor requested the build to stop.
    #[error("build cancelled by progress monitor")]
    Cancelled,

    /// A leaf could not be formed before the recursion ran out of depth.
    #[error("depth limit reached at depth {depth}")]
    DepthLimitReached {
        /// Depth of the build record that exceeded the limit.
        depth: usize,
    },

    /// No builder is registered under the requested name or width.
    #[error("unsupported builder: {name}")]
    UnsupportedBuilder {
        /// Name of the requested builder.
        name: String,
    },
}
