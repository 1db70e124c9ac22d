//! Phoenix-Eye core library: config, model gateway, session state, phases, and the web server
//! used by the CLI.

pub mod config;
pub mod init;
pub mod llm;
pub mod phases;
pub mod report;
pub mod session;
pub mod upload;
pub mod web;
