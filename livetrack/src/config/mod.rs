//! User configuration in `~/.livetrack/config.ini`.
//!
//! Settings structs live in [`settings`], constants in [`defaults`], INI
//! parsing in `parser` and serialization in `writer`. Values missing from the
//! file keep their defaults; CLI flags override whatever was loaded.
//!
//! # Example
//!
//! ```
//! use livetrack::config::ConfigFile;
//!
//! let config = ConfigFile::default();
//! assert_eq!(config.gate.min_distance_m, 25.0);
//! assert_eq!(config.consumer.history_limit, 200);
//! ```

pub mod defaults;
mod file;
mod parser;
pub mod settings;
mod writer;

pub use defaults::*;
pub use file::{config_directory, config_file_path, ConfigFileError};
pub use settings::{
    ConfigFile, ConsumerSettings, GateSettings, LoggingSettings, ProducerSettings,
    SessionSettings, TransportSettings,
};
pub use writer::to_config_string;
