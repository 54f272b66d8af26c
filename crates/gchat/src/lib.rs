#![cfg(not(test))]
//! This lib.rs is only here for testing purposes and for embedding the response pipeline.
pub mod api_client;
pub mod cli;
pub mod logging;
pub mod settings;
pub mod util;
