//! CLI error handling with user-friendly messages.

use std::fmt;
use std::process;

use livetrack::config::ConfigFileError;
use livetrack::session::SessionError;
use livetrack::transport::TransportError;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Configuration error
    Config(String),
    /// Origin or endpoint could not be resolved
    Session(SessionError),
    /// Channel could not be set up
    Transport(TransportError),
    /// HTTP client for history or persistence could not be built
    Http(String),
    /// Failed to start the async runtime
    Runtime(std::io::Error),
}

impl CliError {
    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        match self {
            CliError::Session(_) => {
                eprintln!();
                eprintln!("Set the site origin with --origin or in the [session] section of");
                eprintln!("the config file (livetrack config path shows where it is).");
            }
            CliError::Transport(TransportError::InvalidUrl { .. }) => {
                eprintln!();
                eprintln!("A channel URL must start with ws:// or wss://");
            }
            _ => {}
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Session(e) => write!(f, "Invalid session: {}", e),
            CliError::Transport(e) => write!(f, "Channel error: {}", e),
            CliError::Http(msg) => write!(f, "HTTP client error: {}", msg),
            CliError::Runtime(e) => write!(f, "Failed to start runtime: {}", e),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Session(e) => Some(e),
            CliError::Transport(e) => Some(e),
            CliError::Runtime(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<SessionError> for CliError {
    fn from(e: SessionError) -> Self {
        CliError::Session(e)
    }
}

impl From<TransportError> for CliError {
    fn from(e: TransportError) -> Self {
        CliError::Transport(e)
    }
}
