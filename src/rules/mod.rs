//! Health metrics rules: pure functions over readings and dose logs.

pub mod adherence;
pub mod glucose;
pub mod hba1c;
pub mod risk;

pub use adherence::*;
pub use glucose::*;
pub use hba1c::*;
pub use risk::*;
