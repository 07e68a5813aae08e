// src/db/models/mod.rs

//! Data models for build index entities

mod channel;
mod package;

pub use channel::{Channel, LOCAL_SCHEME};
pub use package::PackageRecord;
