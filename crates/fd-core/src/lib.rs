//! fd-core: stable foundation for fedyn.
//!
//! Contains:
//! - numeric (Real + tolerances + float helpers)
//! - ids (output/forcing function identifiers)
//! - error (shared error types)

pub mod error;
pub mod ids;
pub mod numeric;

// Re-exports: nice ergonomics for downstream crates
pub use error::{FdError, FdResult};
pub use ids::*;
pub use numeric::*;
