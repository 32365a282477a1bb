mod settings;

pub use settings::{
    ArchiveTarget, CaptureFormat, Settings, SettingsPatch, UploadTargets, VideoPlatformTarget,
    DEFAULT_POLL_INTERVAL_SECS,
};

use std::env;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_SOURCE_URL_TEMPLATE: &str = "https://www.twitch.tv/{name}";
pub const DEFAULT_CAPTURE_TOOL: &str = "streamlink";

/// Process-level configuration read from the environment (and `.env`)
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub data_dir: PathBuf,
    pub capture: CaptureConfig,
    pub upload: UploadConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Executable used for probing, metadata and capture
    pub tool: String,
    /// Source URL pattern, `{name}` is replaced by the source name
    pub source_url_template: String,
    pub quality: String,
    pub probe_timeout: Duration,
    pub metadata_timeout: Duration,
    /// Window between graceful terminate and forceful kill
    pub stop_grace: Duration,
}

#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub max_concurrent: usize,
    pub timeout: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            tool: DEFAULT_CAPTURE_TOOL.to_string(),
            source_url_template: DEFAULT_SOURCE_URL_TEMPLATE.to_string(),
            quality: "best".to_string(),
            probe_timeout: Duration::from_secs(10),
            metadata_timeout: Duration::from_secs(15),
            stop_grace: Duration::from_secs(3),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 2,
            timeout: Duration::from_secs(3600),
        }
    }
}

impl CaptureConfig {
    pub fn source_url(&self, source: &str) -> String {
        self.source_url_template.replace("{name}", source)
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        let capture_defaults = CaptureConfig::default();
        let upload_defaults = UploadConfig::default();

        Self {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env_or("SERVER_PORT", 8501),
            },
            data_dir: env::var("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data")),
            capture: CaptureConfig {
                tool: env::var("CAPTURE_TOOL").unwrap_or(capture_defaults.tool),
                source_url_template: env::var("SOURCE_URL_TEMPLATE")
                    .unwrap_or(capture_defaults.source_url_template),
                quality: env::var("CAPTURE_QUALITY").unwrap_or(capture_defaults.quality),
                probe_timeout: Duration::from_secs(env_or("PROBE_TIMEOUT_SECS", 10)),
                metadata_timeout: Duration::from_secs(env_or("METADATA_TIMEOUT_SECS", 15)),
                stop_grace: Duration::from_secs(env_or("STOP_GRACE_SECS", 3)),
            },
            upload: UploadConfig {
                max_concurrent: env_or("MAX_CONCURRENT_UPLOADS", upload_defaults.max_concurrent)
                    .max(1),
                timeout: Duration::from_secs(env_or("UPLOAD_TIMEOUT_SECS", 3600)),
            },
        }
    }

    pub fn bind_address(&self) -> ([u8; 4], u16) {
        let ip_addr = self.parse_host_to_ipv4();
        (ip_addr.octets(), self.server.port)
    }

    fn parse_host_to_ipv4(&self) -> Ipv4Addr {
        if let Ok(addr) = self.server.host.parse::<IpAddr>() {
            match addr {
                IpAddr::V4(ipv4) => return ipv4,
                IpAddr::V6(_) => {
                    tracing::warn!(
                        host = %self.server.host,
                        "IPv6 address provided but only IPv4 supported, using 0.0.0.0"
                    );
                    return Ipv4Addr::new(0, 0, 0, 0);
                }
            }
        }

        match self.server.host.as_str() {
            "localhost" => Ipv4Addr::new(127, 0, 0, 1),
            "" | "0.0.0.0" => Ipv4Addr::new(0, 0, 0, 0),
            _ => {
                tracing::warn!(
                    host = %self.server.host,
                    "Unable to parse host as IPv4, using 0.0.0.0"
                );
                Ipv4Addr::new(0, 0, 0, 0)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_host(host: &str, port: u16) -> Config {
        Config {
            server: ServerConfig {
                host: host.to_string(),
                port,
            },
            data_dir: PathBuf::from("data"),
            capture: CaptureConfig::default(),
            upload: UploadConfig::default(),
        }
    }

    #[test]
    fn test_parse_localhost() {
        let config = config_with_host("localhost", 8501);
        assert_eq!(config.bind_address(), ([127, 0, 0, 1], 8501));
    }

    #[test]
    fn test_parse_ipv4_address() {
        let config = config_with_host("192.168.1.1", 3000);
        assert_eq!(config.bind_address(), ([192, 168, 1, 1], 3000));
    }

    #[test]
    fn test_parse_empty_host() {
        let config = config_with_host("", 8501);
        assert_eq!(config.bind_address(), ([0, 0, 0, 0], 8501));
    }

    #[test]
    fn test_ipv6_and_hostnames_fall_back_to_all_interfaces() {
        assert_eq!(config_with_host("::1", 9000).bind_address(), ([0, 0, 0, 0], 9000));
        assert_eq!(
            config_with_host("invalid-hostname", 9000).bind_address(),
            ([0, 0, 0, 0], 9000)
        );
    }

    #[test]
    fn test_source_url_template() {
        let capture = CaptureConfig::default();
        assert_eq!(capture.source_url("alpha"), "https://www.twitch.tv/alpha");

        let custom = CaptureConfig {
            source_url_template: "https://example.test/live/{name}/index".to_string(),
            ..CaptureConfig::default()
        };
        assert_eq!(custom.source_url("beta"), "https://example.test/live/beta/index");
    }
}
