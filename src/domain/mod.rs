//! Domain layer for the stratagem refinement engine
//!
//! Entities, value types and the repository ports the services depend on.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult};
