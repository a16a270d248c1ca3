//! CLI 인자 및 환경 변수 기반 설정 관리

use clap::Parser;
use std::time::Duration;

const EXAMPLES: &str = "\
Examples:
  p2p-live-share-ws-server
  p2p-live-share-ws-server -p 9000
  p2p-live-share-ws-server --port 9000 --hostname 0.0.0.0";

/// 서버 설정
#[derive(Debug, Clone, Parser)]
#[command(
    name = "p2p-live-share-ws-server",
    about = "p2p-live-share WebSocket signaling server",
    after_help = EXAMPLES
)]
pub struct Config {
    /// Port to listen on
    #[arg(
        short,
        long,
        env = "PORT",
        default_value_t = 8080,
        value_parser = clap::value_parser!(u16).range(1..)
    )]
    pub port: u16,

    /// Hostname / interface to bind
    #[arg(long, env = "HOST", default_value = "localhost")]
    pub hostname: String,

    /// Add artificial delay (ms) to message forwarding, for testing
    #[arg(long = "manual-delay", env = "MANUAL_DELAY", default_value_t = 0)]
    pub manual_delay_ms: u64,

    /// Log filter directive (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    /// `.env`를 읽은 뒤 CLI 인자와 환경 변수에서 설정 로드
    pub fn load() -> Self {
        dotenvy::dotenv().ok();
        Self::parse()
    }

    pub fn manual_delay(&self) -> Duration {
        Duration::from_millis(self.manual_delay_ms)
    }

    /// ws:// URL 표시용 주소 (IPv6는 대괄호로 감싼다)
    pub fn display_addr(&self) -> String {
        if self.hostname.contains(':') {
            format!("[{}]:{}", self.hostname, self.port)
        } else {
            format!("{}:{}", self.hostname, self.port)
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            hostname: "localhost".to_string(),
            manual_delay_ms: 0,
            log_level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_and_long_flags() {
        let config = Config::try_parse_from(["server", "-p", "9000", "--hostname", "0.0.0.0"]).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.hostname, "0.0.0.0");
        assert_eq!(config.display_addr(), "0.0.0.0:9000");

        let config = Config::try_parse_from(["server", "--manual-delay", "250"]).unwrap();
        assert_eq!(config.manual_delay(), Duration::from_millis(250));
    }

    #[test]
    fn rejects_out_of_range_port() {
        assert!(Config::try_parse_from(["server", "--port", "0"]).is_err());
        assert!(Config::try_parse_from(["server", "--port", "70000"]).is_err());
        assert!(Config::try_parse_from(["server", "--port", "abc"]).is_err());
    }

    #[test]
    fn help_is_not_a_failure() {
        let err = Config::try_parse_from(["server", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
        assert_eq!(err.exit_code(), 0);
    }

    #[test]
    fn ipv6_hosts_are_bracketed() {
        let config = Config {
            hostname: "::".to_string(),
            ..Config::default()
        };
        assert_eq!(config.display_addr(), "[::]:8080");
    }
}
