//! Integration test modules for webui
//!
//! - round_trip: host operations reaching the page and page messages reaching the host
//! - lifecycle: teardown, helper loss, malformed traffic

pub mod lifecycle;
pub mod round_trip;
