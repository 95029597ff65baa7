mod acl;
mod cli;
mod config;
mod error;
mod helper;
mod logger;
mod metrics;
mod protocol;
mod store;
mod utils;

use crate::acl::{AccessDecider, WindowPolicy, WindowSize};
use anyhow::Context;
use clap::Parser;
use crate::cli::Cli;
use crate::config::{Config, StoreBackend};
use crate::helper::AclHelper;
use crate::store::{MemoryWindowStore, RedisWindowStore, WindowStore};
use tokio::io::BufReader;
use tracing::Instrument;

// 每个 worker 严格串行处理请求，单线程运行时即可
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 加载配置
    let config = Config::load(&cli)?;
    logger::init_logger(&config.log)?;

    let span = tracing::info_span!("worker", pid = std::process::id());
    async move {
        tracing::info!("配置加载成功");
        tracing::info!(
            "redis: {}:{}/{}, 超时 {} ms",
            config.redis.host,
            config.redis.port,
            config.redis.db,
            config.redis.timeout_ms
        );
        tracing::info!(
            "窗口: 前缀 {:?}, ttl {} 秒, 默认 count {}",
            config.window.key_prefix(),
            config.window.ttl_seconds,
            config.window.default_count
        );

        match config.store.backend {
            StoreBackend::Redis => {
                let store = RedisWindowStore::connect(&config.redis)
                    .await
                    .context("redis 连接失败")?;
                serve(store, &config).await
            }
            StoreBackend::Memory => {
                tracing::warn!("使用进程内存储，数据不会在 worker 之间共享");
                serve(MemoryWindowStore::new(), &config).await
            }
        }
    }
    .instrument(span)
    .await
}

async fn serve<S: WindowStore>(store: S, config: &Config) -> anyhow::Result<()> {
    let default_window = WindowSize::new(config.window.default_count)
        .context("window.default_count 不能为 0")?;
    let decider = AccessDecider::new(store, WindowPolicy::from(&config.window));
    let helper = AclHelper::new(decider, default_window);

    let result = helper
        .run(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
        .await;

    match metrics::METRICS.render() {
        Ok(text) => tracing::debug!("metrics:\n{}", text),
        Err(e) => tracing::warn!("metrics 导出失败: {}", e),
    }

    // 存储错误直接让进程以非零状态退出，由 squid 重新拉起 worker
    result.context("helper 异常退出")
}
