pub mod appointment;
pub mod medication;
pub mod quota;
pub mod reading;
pub mod user;

pub use appointment::*;
pub use medication::*;
pub use quota::*;
pub use reading::*;
pub use user::*;
