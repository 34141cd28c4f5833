//! `rulekeeper` - Manage AI coding assistant rules across your projects
//!
//! This library provides the rule file store, project discovery, encrypted
//! API-key storage, the postmortem database, the model-backed analyzer, and
//! the REST API that ties them together.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod analyzer;
pub mod cli;
pub mod config;
pub mod error;
pub mod files;
pub mod llm;
pub mod logging;
pub mod postmortem;
pub mod privacy;
pub mod projects;
pub mod rules;
pub mod secrets;
pub mod server;
pub mod workspace;

pub use analyzer::Analyzer;
pub use config::Config;
pub use error::{Error, Result};
pub use logging::init_logging;
pub use postmortem::{Postmortem, PostmortemStats, PostmortemStore};
pub use server::{build_router, AppState};
pub use workspace::Workspace;
