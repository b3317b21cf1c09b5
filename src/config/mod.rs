//! Configuration loading and validation
//!
//! Settings come from a TOML file with three sections: `[server]` for the
//! bind address and stream caps, `[frontier]` for scheduling defaults, and
//! `[store]` for the persistence backend. Every field has a default, so an
//! empty file is a valid configuration.

mod parser;
mod types;
mod validation;

pub use parser::{compute_config_hash, load_config, load_config_with_hash};
pub use types::{Config, FrontierConfig, ServerConfig, StoreConfig};
