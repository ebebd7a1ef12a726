//! Extremely thin wrapper around `tracing`, centralizing the choice of
//! observability crates (and their versions) so the rest of the workspace
//! depends on a single internal crate rather than pinning `tracing` in every
//! `Cargo.toml`.

pub use tracing;
pub use tracing::{debug, error, info, trace, warn};
