//! Device architecture models for the Tessera placement toolchain.
//!
//! This crate provides the [`Device`]: a 2D grid of typed cells with a
//! margin, a CLB cell type, I/O perimeter cells, register-fold port metadata,
//! and the single legality predicate used by every placement phase. Mock
//! board constructors are provided for tests and benchmarks.

#![warn(missing_docs)]

pub mod device;
pub mod error;
pub mod mock;

pub use device::Device;
pub use error::ArchError;
pub use mock::{mock_cgra, mock_cgra_with_mem, mock_fpga};
