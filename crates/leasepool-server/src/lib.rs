//! # LeasePool Server
//!
//! HTTP front end for [`leasepool_node::LeasePool`].
//!
//! | Route | Purpose |
//! |---|---|
//! | `GET /` | Liveness text |
//! | `GET /account/request` | Lease accounts (query parameters of a `LeaseRequest`) |
//! | `POST /account/update` | Enqueue one patch or a list of patches |
//! | `POST /account/release` | Enqueue one release or a list of releases |
//! | `POST /account/seed` | Import accounts |
//! | `GET /status` | Occupancy and queue statistics |

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub use config::{Cli, ConfigError, ServerConfig};
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
