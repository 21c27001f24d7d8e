mod health_check;
mod helpers;
mod subscriptions;

pub use health_check::health_check;
pub use helpers::{error_chain_fmt, see_other};
pub use subscriptions::*;
