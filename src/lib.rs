/// Generic chunk framing shared by `.msh` and `.zaabin` files
pub mod chunk;
/// ZeroEngine name hashing
pub mod crc;
/// Error definitions
pub mod error;
/// The in-memory scene model and utilities for preparing it for export
pub mod models;
/// Reading and writing `.msh` model files
pub mod msh;
/// Generic wrapper for values that may or may not match a known variant.
pub mod recognized;
/// Decompressing munged `.zaa`/`.zaabin` animation banks
pub mod zaa;
