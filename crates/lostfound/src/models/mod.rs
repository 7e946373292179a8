//! Data models for the intake dialog

mod record;
mod session;

pub use record::*;
pub use session::*;
