//! Sidecar API - shared model and collaborator contracts
//!
//! This crate provides:
//! - Service instance, endpoint and catalog models
//! - Routing rule models and rule filtering
//! - The client error taxonomy shared by every remote adapter
//! - Async traits for the registry, controller, rules service, message bus
//!   and proxy data plane

pub mod error;
pub mod model;
pub mod rules;
pub mod traits;

// Re-export commonly used types
pub use error::{ClientError, Result};
pub use model::*;
pub use rules::*;
pub use traits::*;
