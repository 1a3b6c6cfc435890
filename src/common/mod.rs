//! Common types, traits, and utilities shared across the engine

pub mod errors;
pub mod traits;
pub mod types;
