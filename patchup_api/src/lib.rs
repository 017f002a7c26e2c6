//! Shared patchup data models consumed by the core engine and backend crates.

pub mod apply;
pub mod commit;
pub mod diff;

pub use apply::*;
pub use commit::*;
pub use diff::*;
