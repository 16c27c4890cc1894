//! Shared foundational types for the Tessera placement toolchain.
//!
//! This crate provides the block/net/cluster identifier types, grid geometry
//! (positions, Manhattan distance, centroids), deterministic seed derivation
//! for parallel work, and a thread-safe cancellation token.

#![warn(missing_docs)]

pub mod cancel;
pub mod geom;
pub mod ids;
pub mod seed;

pub use cancel::CancelToken;
pub use geom::{centroid, manhattan_distance, Position};
pub use ids::{BlockId, BlockKind, ClusterId, NetId, ParseIdError};
pub use seed::derive_seed;
