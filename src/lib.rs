//! Background tracker that periodically samples what is on your screen, asks a language model
//! what you are doing, and keeps a consistent topic log you can later summarize from a terminal.
//!

pub mod cli;
pub mod daemon;
pub mod model;
pub mod utils;
pub mod window_api;
