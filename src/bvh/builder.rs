use std::any::Any;

use crate::common::build_error::BuildError;

/// A hierarchy builder bound to a scene.
pub trait Builder: Send {
    /// Rebuilds the hierarchy over the current scene contents. On error the previously built
    /// hierarchy is kept.
    fn build(&mut self) -> Result<(), BuildError>;

    /// Releases transient build state. Builders that keep none do nothing.
    fn clear(&mut self) {}

    /// One line summary of the builder and its last build.
    fn info(&self) -> String;

    fn as_any(&self) -> &dyn Any;
}
