pub mod command;
pub mod config;
pub mod content;
pub mod error;
pub mod files;
pub mod logging;
pub mod notify;
pub mod orchestrator;
pub mod panel;
pub mod poller;
pub mod rustmaps;
pub mod seeds;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;
