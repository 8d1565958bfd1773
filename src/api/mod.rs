//! HTTP surface of the APY service
//!
//! Routes:
//!
//! - `GET|POST /api/trpc/:procedures` batched, index-keyed envelope
//! - `GET /api/validators`, `/api/validators/:hotkey`,
//!   `/api/validators/subnet/:subnet_id`, `/api/subnets`
//! - `POST /api/admin/update-subnet`, `/api/admin/validator-identity`
//! - `GET /api/health`, `/api/status`
//!
//! Middleware, outermost first: CORS, trace, request logging, timeout.

pub mod handlers;
pub mod middleware;
pub mod server;

pub use handlers::{raw_query, AppState, IdentityUpdate, ADMIN_KEY_HEADER};
pub use middleware::logging_middleware;
pub use server::{build_router, serve};
