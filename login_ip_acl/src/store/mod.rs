pub mod memory;
pub mod redis;

pub use self::memory::MemoryWindowStore;
pub use self::redis::RedisWindowStore;

use std::ops::Range;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreError;

/// 条件插入的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insertion {
    Inserted,
    AlreadyPresent,
}

/// key 的过期状态，对应 Redis TTL 的 -2 / -1 / n
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlStatus {
    Nonexistent,
    NoExpiry,
    ExpiresIn(u64),
}

/// 按 score 排序、自动过期的登录 ip 集合
///
/// `insert_if_absent` 与 `arm_expiry_once` 必须是存储端的单条原子操作，
/// 多个 squid worker 会并发地对同一个 key 调用它们。
#[async_trait]
pub trait WindowStore: Send + Sync {
    /// member 按 score 升序的位置，不存在时返回 None
    async fn rank(&self, key: &str, member: &str) -> Result<Option<usize>, StoreError>;

    /// 仅当 member 不存在时插入，已存在的 member 的 score 保持不变
    async fn insert_if_absent(
        &self,
        key: &str,
        member: &str,
        score: f64,
    ) -> Result<Insertion, StoreError>;

    async fn ttl_status(&self, key: &str) -> Result<TtlStatus, StoreError>;

    /// 仅当 key 当前没有过期时间时设置，返回是否真正设置了
    async fn arm_expiry_once(&self, key: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// ZRANGE 语义：闭区间，负数下标从尾部计数
    async fn range_by_rank(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<String>, StoreError>;
}

/// 把 ZRANGE 风格的下标换算成长度为 `len` 的切片区间
pub(crate) fn resolve_range(len: usize, start: isize, stop: isize) -> Option<Range<usize>> {
    let len = isize::try_from(len).ok()?;
    let start = if start < 0 { start.saturating_add(len) } else { start }.max(0);
    let stop = if stop < 0 { stop.saturating_add(len) } else { stop };
    if len == 0 || start > stop || start >= len {
        return None;
    }
    let stop = stop.min(len - 1);
    Some(start as usize..stop as usize + 1)
}
