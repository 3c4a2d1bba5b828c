//! HTTP request handlers.

pub mod admin;
pub mod health;
pub mod narration;

pub use admin::*;
pub use health::*;
pub use narration::*;
