//! Arena storage for built hierarchies.
//!
//! A build sizes a [`FastAllocator`] once from an estimate, hands a [`CachedAllocator`] to every
//! parallel task and finally converts it into the [`Arena`]s owned by the hierarchy.

pub mod arena;
pub mod fast_allocator;

pub use arena::{Arena, ArenaIndex};
pub use fast_allocator::{AllocatorStatistics, CachedAllocator, FastAllocator};
