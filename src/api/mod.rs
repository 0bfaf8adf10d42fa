//! HTTP surface of the patient portal back end.
//!
//! Routes are nested under `/api/` and protected by a middleware stack:
//! Rate Limit → Session Auth → Audit → Handler.

pub mod endpoints;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod router;
pub mod server;
pub mod types;

pub use router::api_router;
pub use server::{serve_until_ctrl_c, start, ApiServer, ServerError};
pub use types::ApiContext;
