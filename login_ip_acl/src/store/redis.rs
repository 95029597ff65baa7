use std::future::Future;
use std::time::Duration;

use ::redis::aio::ConnectionManager;
use ::redis::{Cmd, FromRedisValue};
use async_trait::async_trait;

use super::{Insertion, TtlStatus, WindowStore};
use crate::config::RedisConfig;
use crate::error::StoreError;
use crate::metrics::StoreTimer;

/// 基于 Redis 有序集合的 WindowStore
///
/// 条件写入全部用单条命令完成（`ZADD NX`、`EXPIRE NX`），
/// 多个 worker 并发处理同一用户时不会出现先读后写的竞争。
#[derive(Clone)]
pub struct RedisWindowStore {
    manager: ConnectionManager,
    timeout: Duration,
}

impl RedisWindowStore {
    /// 建立连接并 PING 一次，连不上直接失败
    pub async fn connect(config: &RedisConfig) -> Result<Self, StoreError> {
        let timeout = config.timeout();
        let client = ::redis::Client::open(config.url().as_str())
            .map_err(|err| StoreError::redis("OPEN", err))?;
        let manager = bounded("CONNECT", timeout, ConnectionManager::new(client)).await?;
        let store = Self { manager, timeout };

        let pong: String = store.query("PING", &::redis::cmd("PING")).await?;
        tracing::info!("已连接 redis {}:{} ({})", config.host, config.port, pong);
        Ok(store)
    }

    async fn query<T: FromRedisValue + Send>(&self, op: &'static str, cmd: &Cmd) -> Result<T, StoreError> {
        let _timer = StoreTimer::start(op);
        let mut conn = self.manager.clone();
        bounded(op, self.timeout, cmd.query_async::<_, T>(&mut conn)).await
    }
}

/// 给一次 redis 往返加上超时
async fn bounded<T, F>(op: &'static str, timeout: Duration, fut: F) -> Result<T, StoreError>
where
    F: Future<Output = ::redis::RedisResult<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result.map_err(|err| StoreError::redis(op, err)),
        Err(_) => Err(StoreError::Timeout { op, timeout }),
    }
}

fn zadd_nx(key: &str, member: &str, score: f64) -> Cmd {
    let mut cmd = ::redis::cmd("ZADD");
    cmd.arg(key).arg("NX").arg(score).arg(member);
    cmd
}

fn expire_nx(key: &str, ttl: Duration) -> Cmd {
    let mut cmd = ::redis::cmd("EXPIRE");
    cmd.arg(key).arg(ttl.as_secs().max(1)).arg("NX");
    cmd
}

fn zrange(key: &str, start: isize, stop: isize) -> Cmd {
    let mut cmd = ::redis::cmd("ZRANGE");
    cmd.arg(key).arg(start).arg(stop);
    cmd
}

/// TTL 命令的返回值：-2 key 不存在，-1 没有过期时间
fn decode_ttl(reply: i64) -> Result<TtlStatus, StoreError> {
    match reply {
        -2 => Ok(TtlStatus::Nonexistent),
        -1 => Ok(TtlStatus::NoExpiry),
        n if n >= 0 => Ok(TtlStatus::ExpiresIn(n as u64)),
        n => Err(StoreError::Protocol {
            op: "TTL",
            detail: format!("未知的 TTL 返回值 {}", n),
        }),
    }
}

#[async_trait]
impl WindowStore for RedisWindowStore {
    async fn rank(&self, key: &str, member: &str) -> Result<Option<usize>, StoreError> {
        let mut cmd = ::redis::cmd("ZRANK");
        cmd.arg(key).arg(member);
        self.query("ZRANK", &cmd).await
    }

    async fn insert_if_absent(
        &self,
        key: &str,
        member: &str,
        score: f64,
    ) -> Result<Insertion, StoreError> {
        let added: i64 = self.query("ZADD", &zadd_nx(key, member, score)).await?;
        Ok(if added > 0 {
            Insertion::Inserted
        } else {
            Insertion::AlreadyPresent
        })
    }

    async fn ttl_status(&self, key: &str) -> Result<TtlStatus, StoreError> {
        let mut cmd = ::redis::cmd("TTL");
        cmd.arg(key);
        let reply: i64 = self.query("TTL", &cmd).await?;
        decode_ttl(reply)
    }

    async fn arm_expiry_once(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let armed: i64 = self.query("EXPIRE", &expire_nx(key, ttl)).await?;
        Ok(armed == 1)
    }

    async fn range_by_rank(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<String>, StoreError> {
        self.query("ZRANGE", &zrange(key, start, stop)).await
    }
}
