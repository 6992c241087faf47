//! Command implementations.
//!
//! - [`dev`] - development server

pub mod dev;

pub use dev::execute as dev_execute;
