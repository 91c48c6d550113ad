pub mod models;
pub mod repository;

pub use models::*;
pub use repository::*;

/// Embedded schema migrations (`./migrations`, relative to the crate root).
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
