//! Process startup: logging and lock store construction

mod logging;
mod store;

pub use logging::{LoggingGuard, init_logging};
pub use store::build_store;
