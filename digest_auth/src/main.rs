mod config;
mod credential;
mod error;
mod helper;

use anyhow::Context;
use clap::Parser;
use std::path::Path;
use crate::config::Args;
use crate::credential::RedisCredentialStore;
use crate::helper::DigestHelper;
use tokio::io::BufReader;
use tracing::Instrument;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // 初始化日志：stdout 留给 squid，日志写文件或 stderr
    let offset = time::UtcOffset::current_local_offset().unwrap_or(time::UtcOffset::UTC);
    let timer = tracing_subscriber::fmt::time::OffsetTime::new(
        offset,
        time::format_description::well_known::Rfc3339,
    );
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("digest_auth={}", args.level_directive()).into());
    let layer = match args.per_process_logfile(std::process::id()) {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            std::fs::create_dir_all(dir)
                .with_context(|| format!("无法创建日志目录 {}", dir.display()))?;
            let file_name = path
                .file_name()
                .with_context(|| format!("无效的日志文件路径 {}", path.display()))?;
            tracing_subscriber::fmt::layer()
                .with_writer(tracing_appender::rolling::never(dir, file_name))
                .with_timer(timer)
                .with_ansi(false)
                .boxed()
        }
        None => tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_timer(timer)
            .with_ansi(false)
            .boxed(),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init()
        .context("日志系统初始化失败")?;

    let span = tracing::info_span!("worker", pid = std::process::id());
    async move {
        let store = RedisCredentialStore::connect(&args.redis_url(), args.timeout())
            .await
            .context("redis 连接失败")?;
        let helper = DigestHelper::new(store);

        helper
            .run(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
            .await
            .context("helper 异常退出")
    }
    .instrument(span)
    .await
}
