//! # MiniDB Configuration Module
//!
//! Centralizes the storage kernel's compile-time constants. Interdependent
//! values live next to each other and are enforced through compile-time
//! assertions, so a page-size or header-layout change cannot silently skew a
//! derived capacity.
//!
//! ## Module Organization
//!
//! - [`constants`]: page geometry, reserved page ids, on-disk signature, and
//!   the derived bitmap capacities

pub mod constants;
pub use constants::*;
