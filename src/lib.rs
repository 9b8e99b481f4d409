//! roster-scan: group roster enumeration and gamertag detection.

pub mod config;
pub mod directory;
pub mod error;
pub mod notify;
pub mod rate_limit;
pub mod scan;
