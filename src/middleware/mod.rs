pub mod access_gate;
pub mod auth;
pub mod metrics;

pub use access_gate::*;
pub use auth::*;
pub use metrics::*;
