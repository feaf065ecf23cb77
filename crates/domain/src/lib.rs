//! # PaceGate Domain
//!
//! Business domain types and models for PaceGate.
//!
//! This crate contains:
//! - Request descriptions and dispatch outcomes
//! - Usage counters and background sync task records
//! - Domain error types and Result definitions
//! - Configuration structures and constants
//!
//! ## Architecture
//! - No dependencies on other PaceGate crates
//! - Only external dependencies allowed
//! - Pure domain models and data structures

pub mod config;
pub mod constants;
pub mod errors;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
