//! RentGuard API Library
//!
//! HTTP handlers, middleware and application setup for the verification
//! service.

mod api_doc;
pub mod error;
mod handlers;
mod middleware;
pub mod setup;
pub mod state;
pub mod telemetry;

pub use error::{ErrorResponse, HttpAppError, ValidatedJson};
pub use state::AppState;
