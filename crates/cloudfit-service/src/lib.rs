//! cloudfit-service: the placement lifecycle façade.
//!
//! Composes the placement optimizer and the state store into the
//! operations a caller sees: place, get, replace, remove, export/import,
//! migrate and refresh.

pub mod error;
pub mod service;

pub use error::{ServiceError, ServiceResult};
pub use service::PlacementService;
