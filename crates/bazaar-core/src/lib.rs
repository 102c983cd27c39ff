pub mod catalog;
pub mod order;
pub mod tenant;

pub const CORE_VERSION: &str = env!("CARGO_PKG_VERSION");
