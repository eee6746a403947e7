//! Data models for the site backend.
//!
//! Field names follow the JSON shapes the site front end already consumes.

mod admin;
mod contact;
mod project;
mod service;

pub use admin::*;
pub use contact::*;
pub use project::*;
pub use service::*;
