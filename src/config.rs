//! Server and client configuration.
//!
//! Both binaries read the listen address from the command line, falling back
//! to the environment and then to the defaults below.
//!
//! | Flag          | Environment     | Default     |
//! |---------------|-----------------|-------------|
//! | `-H, --host`  | `SPARKKV_HOST`  | `127.0.0.1` |
//! | `-p, --port`  | `SPARKKV_PORT`  | `3000`      |

use crate::{DEFAULT_HOST, DEFAULT_PORT};
use clap::Args;

/// Network address settings.
#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct Config {
    /// Host to bind to (server) or connect to (client)
    #[arg(short = 'H', long, env = "SPARKKV_HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    /// TCP port
    #[arg(short, long, env = "SPARKKV_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl Config {
    /// Returns the address as `host:port`.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
