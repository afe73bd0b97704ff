pub mod annotations;
pub mod connection;
pub mod migrations;

pub use annotations::load_annotations;
pub use connection::{get_db_pool, DatabaseConfig};
