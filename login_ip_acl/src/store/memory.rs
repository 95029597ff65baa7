use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;

use super::{resolve_range, Insertion, TtlStatus, WindowStore};
use crate::error::StoreError;

/// 单个用户的登录 ip 有序集合
#[derive(Debug, Default)]
struct Window {
    /// (member, score)，按 (score, member) 升序
    members: Vec<(String, f64)>,
    expires_at: Option<Instant>,
}

impl Window {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }

    fn position(&self, member: &str) -> Option<usize> {
        self.members.iter().position(|(m, _)| m == member)
    }
}

/// 进程内的 WindowStore 实现，排序和过期语义与 Redis 有序集合一致
///
/// 过期采用惰性清理：每次访问 key 前先移除已过期的记录。
/// 时间取自 tokio 时钟，测试里可以用 `tokio::time::advance` 快进。
#[derive(Debug, Default)]
pub struct MemoryWindowStore {
    windows: DashMap<String, Window>,
}

impl MemoryWindowStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn purge_expired(&self, key: &str) {
        let now = Instant::now();
        if self
            .windows
            .remove_if(key, |_, window| window.is_expired(now))
            .is_some()
        {
            tracing::debug!("内存窗口 {} 已过期", key);
        }
    }

    /// 当前存活的 key 数量
    #[cfg(test)]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.windows.retain(|_, window| !window.is_expired(now));
        self.windows.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl WindowStore for MemoryWindowStore {
    async fn rank(&self, key: &str, member: &str) -> Result<Option<usize>, StoreError> {
        self.purge_expired(key);
        Ok(self.windows.get(key).and_then(|w| w.position(member)))
    }

    async fn insert_if_absent(
        &self,
        key: &str,
        member: &str,
        score: f64,
    ) -> Result<Insertion, StoreError> {
        self.purge_expired(key);
        // entry 持有分片写锁，检查和插入之间不会被其他任务插队
        let mut window = self.windows.entry(key.to_string()).or_default();
        if window.position(member).is_some() {
            return Ok(Insertion::AlreadyPresent);
        }
        let at = window
            .members
            .partition_point(|(m, s)| (*s, m.as_str()) < (score, member));
        window.members.insert(at, (member.to_string(), score));
        Ok(Insertion::Inserted)
    }

    async fn ttl_status(&self, key: &str) -> Result<TtlStatus, StoreError> {
        self.purge_expired(key);
        let status = match self.windows.get(key) {
            None => TtlStatus::Nonexistent,
            Some(window) => match window.expires_at {
                None => TtlStatus::NoExpiry,
                Some(at) => {
                    let remaining = at.saturating_duration_since(Instant::now());
                    TtlStatus::ExpiresIn(remaining.as_millis().div_ceil(1000) as u64)
                }
            },
        };
        Ok(status)
    }

    async fn arm_expiry_once(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        self.purge_expired(key);
        match self.windows.get_mut(key) {
            Some(mut window) if window.expires_at.is_none() => {
                window.expires_at = Some(Instant::now() + ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn range_by_rank(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<String>, StoreError> {
        self.purge_expired(key);
        let Some(window) = self.windows.get(key) else {
            return Ok(Vec::new());
        };
        let members = resolve_range(window.members.len(), start, stop)
            .map(|range| {
                window.members[range]
                    .iter()
                    .map(|(member, _)| member.clone())
                    .collect()
            })
            .unwrap_or_default();
        Ok(members)
    }
}
