pub mod companion;
pub mod metrics;
pub mod payments;
pub mod usage_meter;

pub use companion::*;
pub use metrics::*;
pub use payments::*;
pub use usage_meter::*;
