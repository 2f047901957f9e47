//! Schema definitions for Tether
//!
//! This crate contains the plain data types shared between the process
//! supervision core and higher-level tooling that records or reports on
//! supervised children. All types here implement JSON Schema generation for
//! external consumption.

pub mod exit;
pub mod stdio;

pub use exit::*;
pub use stdio::*;
