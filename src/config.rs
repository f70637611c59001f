use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::resolver::DEFAULT_FALLBACK_ROUTE;

/// Command line and environment configuration of the web server.
#[derive(Parser, Debug, Clone)]
#[command(name = "website", version, about = "Serve SPED sheets over HTTP")]
pub struct ServerConfig {
    /// Address to bind
    #[arg(long, env = "SHEETS_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "SHEETS_PORT", default_value_t = 3000)]
    pub port: u16,

    /// Directory holding stored documents and the local cache
    #[arg(long, env = "SHEETS_DATA_DIR", default_value = "database")]
    pub data_dir: PathBuf,

    /// Origin allowed to call the API from a browser
    #[arg(long, env = "SHEETS_CORS_ORIGIN", default_value = "http://localhost:3000")]
    pub cors_origin: String,

    /// Listing view a page returns to when its document cannot be loaded
    #[arg(long, env = "SHEETS_FALLBACK_ROUTE", default_value = DEFAULT_FALLBACK_ROUTE)]
    pub fallback_route: String,
}

impl ServerConfig {
    pub fn addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    pub fn documents_dir(&self) -> PathBuf {
        self.data_dir.join("documents")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir.join("cache")
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 3000,
            data_dir: PathBuf::from("database"),
            cors_origin: "http://localhost:3000".to_string(),
            fallback_route: DEFAULT_FALLBACK_ROUTE.to_string(),
        }
    }
}
