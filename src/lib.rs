pub mod catalog;
pub mod cli;
pub mod config;
pub mod endpoints;
pub mod features;
pub mod logging;
pub mod media;
pub mod messages;
pub mod server;
