pub mod config;
pub mod logging;
pub mod token_conversion;

pub use config::Config;
pub use logging::init_logging;
