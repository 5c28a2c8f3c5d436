//! HTTP server for fieldops

pub mod http;

pub use http::{run, AppState};
