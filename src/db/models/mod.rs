//! Database models, one file per table.
//! Everything is re-exported at `crate::db::models` so callers can use
//! `use crate::db::models::*;`.

pub mod event;
pub mod notification_settings;
pub mod reminder;
pub mod user;

pub use self::event::*;
pub use self::notification_settings::*;
pub use self::reminder::*;
pub use self::user::*;
