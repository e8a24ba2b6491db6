//! hubdeck - discover and control embedded hub devices
//!
//! The binary runs the engine headless: commands arrive on stdin and events
//! leave on stdout as NDJSON.

pub mod headless;

pub use headless::runner::run_headless;
