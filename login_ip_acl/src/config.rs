use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cli::Cli;
use crate::logger::LogLevel;

/// 默认配置文件名（当前目录，可选）
const DEFAULT_CONFIG_FILE: &str = "login_ip_acl";
/// 环境变量前缀，例如 LOGIN_IP_ACL__REDIS__HOST
const ENV_PREFIX: &str = "LOGIN_IP_ACL";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub redis: RedisConfig,
    pub window: WindowConfig,
    pub log: LogConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub db: i64,
    pub timeout_ms: u64,
}

impl RedisConfig {
    pub fn url(&self) -> String {
        format!("redis://{}:{}/{}", self.host, self.port, self.db)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WindowConfig {
    #[serde(default)]
    pub prefix: String,
    pub ttl_seconds: u64,
    pub default_count: i64,
}

impl WindowConfig {
    /// 非空前缀与用户名之间用 ':' 分隔
    pub fn key_prefix(&self) -> String {
        if self.prefix.is_empty() {
            String::new()
        } else {
            format!("{}:", self.prefix)
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    #[serde(default)]
    pub file: Option<PathBuf>,
    pub level: LogLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Redis,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
}

impl Config {
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        // 加载 .env 文件 (如果存在)
        let _ = dotenvy::dotenv();
        Self::build(cli)
    }

    /// 默认值 < 配置文件 < 环境变量 < 命令行
    pub fn build(cli: &Cli) -> anyhow::Result<Self> {
        let file = match &cli.config {
            Some(path) => config::File::from(path.as_path()).required(true),
            None => config::File::from(Path::new(DEFAULT_CONFIG_FILE)).required(false),
        };

        let config: Config = config::Config::builder()
            .set_default("redis.host", "localhost")?
            .set_default("redis.port", 6379_i64)?
            .set_default("redis.db", 0_i64)?
            .set_default("redis.timeout_ms", 3000_i64)?
            .set_default("window.prefix", "")?
            .set_default("window.ttl_seconds", 3600_i64)?
            .set_default("window.default_count", 1_i64)?
            .set_default("log.level", "WARNING")?
            .set_default("store.backend", "redis")?
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .set_override_option("redis.host", cli.host.clone())?
            .set_override_option("redis.port", cli.port.map(i64::from))?
            .set_override_option("redis.db", cli.db)?
            .set_override_option("redis.timeout_ms", cli.timeout_ms)?
            .set_override_option("window.prefix", cli.prefix.clone())?
            .set_override_option("window.ttl_seconds", cli.ttl)?
            .set_override_option("window.default_count", cli.default_count)?
            .set_override_option(
                "log.file",
                cli.logfile.as_ref().map(|p| p.to_string_lossy().into_owned()),
            )?
            .set_override_option("log.level", cli.loglevel.clone())?
            .set_override_option("store.backend", cli.store.clone())?
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.window.ttl_seconds == 0 {
            anyhow::bail!("window.ttl_seconds 必须大于 0");
        }
        if self.window.default_count == 0 {
            anyhow::bail!("window.default_count 不能为 0");
        }
        if self.redis.timeout_ms == 0 {
            anyhow::bail!("redis.timeout_ms 必须大于 0");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn cli(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("login_ip_acl").chain(args.iter().copied()))
    }

    #[test]
    fn test_defaults() {
        let config = Config::build(&cli(&[])).unwrap();
        assert_eq!(config.redis.url(), "redis://localhost:6379/0");
        assert_eq!(config.redis.timeout(), Duration::from_secs(3));
        assert_eq!(config.window.key_prefix(), "");
        assert_eq!(config.window.ttl_seconds, 3600);
        assert_eq!(config.window.default_count, 1);
        assert_eq!(config.log.level, LogLevel::Warning);
        assert_eq!(config.log.file, None);
        assert_eq!(config.store.backend, StoreBackend::Redis);
    }

    #[test]
    fn test_cli_overrides() {
        let config = Config::build(&cli(&[
            "-H", "10.1.1.1", "-P", "6380", "-p", "fp_loginip", "-t", "1800", "-l", "debug",
            "--store", "memory", "-f", "/tmp/acl.log",
        ]))
        .unwrap();
        assert_eq!(config.redis.url(), "redis://10.1.1.1:6380/0");
        assert_eq!(config.window.key_prefix(), "fp_loginip:");
        assert_eq!(config.window.ttl_seconds, 1800);
        assert_eq!(config.log.level, LogLevel::Debug);
        assert_eq!(config.log.file, Some(PathBuf::from("/tmp/acl.log")));
        assert_eq!(config.store.backend, StoreBackend::Memory);
    }

    #[test]
    fn test_config_file() {
        let path = std::env::temp_dir().join(format!("login_ip_acl_test_{}.toml", std::process::id()));
        std::fs::write(
            &path,
            "[window]\nprefix = \"acl\"\nttl_seconds = 60\ndefault_count = -2\n",
        )
        .unwrap();

        let config = Config::build(&cli(&["-c", path.to_str().unwrap(), "-t", "90"])).unwrap();
        assert_eq!(config.window.key_prefix(), "acl:");
        assert_eq!(config.window.default_count, -2);
        // 命令行优先于配置文件
        assert_eq!(config.window.ttl_seconds, 90);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(Config::build(&cli(&["-t", "0"])).is_err());
        assert!(Config::build(&cli(&["--default-count", "0"])).is_err());
        assert!(Config::build(&cli(&["-l", "LOUD"])).is_err());
        assert!(Config::build(&cli(&["--store", "etcd"])).is_err());
    }

    #[test]
    fn test_missing_explicit_config_file_fails() {
        assert!(Config::build(&cli(&["-c", "/nonexistent/login_ip_acl.toml"])).is_err());
    }
}
