//! Listen settings for `rift dev`.
//!
//! Layered with figment, later layers winning: built-in defaults, the config
//! module's `port`/`host`/`open`, `RIFT_PORT`/`RIFT_HOST`, then CLI flags.

use std::net::SocketAddr;

use figment::{
    Figment,
    providers::{Env, Serialized},
};
use rift_config::ServerOptions;
use serde::{Deserialize, Serialize};

use crate::cli::DevArgs;
use crate::error::{CliError, Result};

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_HOST: &str = "localhost";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServeSettings {
    pub host: String,
    pub port: u16,
    pub open: bool,
}

impl Default for ServeSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            open: false,
        }
    }
}

/// A partial layer; unset fields leave lower layers alone.
#[derive(Debug, Default, Serialize)]
struct Layer {
    #[serde(skip_serializing_if = "Option::is_none")]
    host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    open: Option<bool>,
}

impl ServeSettings {
    /// Extract the settings for `args` over the config module's `server`
    /// options.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::Settings`] when a layer holds a value of the
    /// wrong type, e.g. a non-numeric `RIFT_PORT`.
    pub fn load(args: &DevArgs, server: &ServerOptions) -> Result<Self> {
        Ok(Self::figment(args, server).extract()?)
    }

    pub fn figment(args: &DevArgs, server: &ServerOptions) -> Figment {
        let from_config = Layer {
            host: server.host.clone(),
            port: server.port,
            open: server.open.then_some(true),
        };
        let from_cli = Layer {
            host: args.host.clone(),
            port: args.port,
            open: args.open.then_some(true),
        };

        Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Serialized::defaults(from_config))
            .merge(Env::prefixed("RIFT_").only(&["port", "host"]))
            .merge(Serialized::defaults(from_cli))
    }

    /// Resolve the host to a bindable address, preferring IPv4.
    ///
    /// # Errors
    ///
    /// Returns an error when the host does not resolve.
    pub async fn socket_addr(&self) -> Result<SocketAddr> {
        let addrs: Vec<SocketAddr> = tokio::net::lookup_host((self.host.as_str(), self.port))
            .await?
            .collect();
        addrs
            .iter()
            .find(|addr| addr.is_ipv4())
            .or_else(|| addrs.first())
            .copied()
            .ok_or_else(|| CliError::InvalidArgument(format!("host '{}' did not resolve", self.host)))
    }

    /// Browser URL for the server once bound to `port`.
    pub fn url(&self, port: u16) -> String {
        let host = match self.host.as_str() {
            "0.0.0.0" | "::" => DEFAULT_HOST,
            host => host,
        };
        format!("http://{host}:{port}/")
    }
}
