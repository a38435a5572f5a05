//! stave core library — identifiers, index filter, change sets, configuration.
//!
//! - [`types`] — newtypes and domain values
//! - [`error`] — [`ConfigError`]
//! - [`config`] — load / save / init of the server configuration

pub mod config;
pub mod error;
pub mod types;

pub use config::ServerConfig;
pub use error::ConfigError;
pub use types::{base_name, ChangeSet, FileId, IndexFilter, SourceExtension, SourceFile};
