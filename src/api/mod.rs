//! API layer
//!
//! HTTP handlers for:
//! - Landing page
//! - Metrics (Prometheus)
//!
//! plus the request logging middleware and page rendering.

mod home;
pub mod metrics;
mod middleware;
mod view;

pub use home::root;
pub use metrics::metrics_router;
pub use middleware::log_requests;
pub use view::{IndexView, PageRenderer};
