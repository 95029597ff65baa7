use std::time::Duration;

use super::{Verdict, WindowSize};
use crate::config::WindowConfig;
use crate::error::StoreError;
use crate::metrics::METRICS;
use crate::store::{Insertion, TtlStatus, WindowStore};

/// 生成 score 的时钟，默认是当前 Unix 时间（带小数秒）
pub type Clock = Box<dyn Fn() -> f64 + Send + Sync>;

/// 窗口策略：key 前缀和窗口生存时间，启动时固定
#[derive(Debug, Clone)]
pub struct WindowPolicy {
    pub key_prefix: String,
    pub ttl: Duration,
}

impl From<&WindowConfig> for WindowPolicy {
    fn from(config: &WindowConfig) -> Self {
        Self {
            key_prefix: config.key_prefix(),
            ttl: Duration::from_secs(config.ttl_seconds),
        }
    }
}

/// 登录 ip 访问判定
///
/// 每个用户一个有序集合：member 是登录 ip，score 是该 ip 第一次出现的时间。
/// 集合在第一个 ip 写入后设置一次 ttl，之后的写入不会续期，
/// 过期后整个集合消失，下一次登录重新开始计算窗口。
pub struct AccessDecider<S> {
    store: S,
    policy: WindowPolicy,
    clock: Clock,
}

impl<S: WindowStore> AccessDecider<S> {
    pub fn new(store: S, policy: WindowPolicy) -> Self {
        Self {
            store,
            policy,
            clock: Box::new(crate::utils::unix_now),
        }
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: impl Fn() -> f64 + Send + Sync + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    #[cfg(test)]
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn key_for(&self, username: &str) -> String {
        format!("{}{}", self.policy.key_prefix, username)
    }

    /// 判定 `address` 是否属于 `username` 当前的有效 ip 窗口
    ///
    /// 新 ip 先写入再判定，所以窗口内的第一次登录总是被允许。
    pub async fn evaluate(
        &self,
        username: &str,
        address: &str,
        window: WindowSize,
    ) -> Result<Verdict, StoreError> {
        let key = self.key_for(username);

        if self.store.rank(&key, address).await?.is_none() {
            let score = (self.clock)();
            if self.store.insert_if_absent(&key, address, score).await? == Insertion::Inserted {
                tracing::debug!("{} 记录新登录 ip {} (score={})", key, address, score);
            }
            if self.store.ttl_status(&key).await? == TtlStatus::NoExpiry
                && self.store.arm_expiry_once(&key, self.policy.ttl).await?
            {
                METRICS.windows_armed.inc();
                tracing::debug!("{} 设置 ttl {} 秒", key, self.policy.ttl.as_secs());
            }
        }

        let (start, stop) = window.rank_range();
        let valid = self.store.range_by_rank(&key, start, stop).await?;
        tracing::info!("get valid iplist {:?} (count={})", valid, window);

        if valid.iter().any(|member| member == address) {
            Ok(Verdict::Allow)
        } else {
            Ok(Verdict::Deny { window: valid })
        }
    }
}
