//! Turning raw status responses into something we can act on.

pub mod minecraft;
pub mod sanitize;

pub use minecraft::{ServerInfo, parse_status_json};
pub use sanitize::sanitize_text;
