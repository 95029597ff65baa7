use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::LogConfig;

/// 与 squid helper 惯用的日志级别名保持一致
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum LogLevel {
    Critical,
    Error,
    Warning,
    Info,
    Debug,
    NotSet,
}

impl LogLevel {
    /// 对应的 tracing 过滤指令
    pub fn directive(&self) -> &'static str {
        match self {
            LogLevel::Critical | LogLevel::Error => "error",
            LogLevel::Warning => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::NotSet => "trace",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CRITICAL" => Ok(LogLevel::Critical),
            "ERROR" => Ok(LogLevel::Error),
            "WARNING" | "WARN" => Ok(LogLevel::Warning),
            "INFO" => Ok(LogLevel::Info),
            "DEBUG" => Ok(LogLevel::Debug),
            "NOTSET" => Ok(LogLevel::NotSet),
            other => Err(format!(
                "未知的日志级别 {}，可选 CRITICAL, ERROR, WARNING, INFO, DEBUG, NOTSET",
                other
            )),
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = String;

    fn try_from(value: String) -> Result<Self, String> {
        value.parse()
    }
}

/// 每个 worker 进程写自己的日志文件：`<logfile>.<pid>`
pub fn per_process_path(logfile: &Path, pid: u32) -> PathBuf {
    let mut name = logfile.as_os_str().to_owned();
    name.push(format!(".{}", pid));
    PathBuf::from(name)
}

/// 初始化日志系统
///
/// stdout 是 squid 协议通道，日志只能写到文件或 stderr
/// （squid 会把 helper 的 stderr 转存到 cache.log）。
pub fn init_logger(config: &LogConfig) -> Result<()> {
    // 优先使用本地时区，取不到时退回 UTC
    let offset = time::UtcOffset::current_local_offset().unwrap_or(time::UtcOffset::UTC);
    let timer = tracing_subscriber::fmt::time::OffsetTime::new(
        offset,
        time::format_description::well_known::Rfc3339,
    );

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("login_ip_acl={}", config.level.directive()).into());

    let layer = match &config.file {
        Some(logfile) => {
            let path = per_process_path(logfile, std::process::id());
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            std::fs::create_dir_all(dir)
                .with_context(|| format!("无法创建日志目录 {}", dir.display()))?;
            let file_name = path
                .file_name()
                .with_context(|| format!("无效的日志文件路径 {}", path.display()))?;

            // 不滚动，单进程单文件；同步写入，helper 本身就是串行处理
            let file_appender = tracing_appender::rolling::never(dir, file_name);
            tracing_subscriber::fmt::layer()
                .with_writer(file_appender)
                .with_timer(timer)
                .with_ansi(false)
                .with_target(true)
                .boxed()
        }
        None => tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_timer(timer)
            .with_ansi(false)
            .with_target(true)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layer)
        .try_init()
        .context("日志系统初始化失败")?;

    Ok(())
}
