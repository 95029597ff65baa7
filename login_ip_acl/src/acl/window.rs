use std::fmt;
use std::num::NonZeroI64;
use std::str::FromStr;

use crate::error::DecodeError;

/// 窗口大小：正数取最早登录的 N 个 ip，负数取最近登录的 |N| 个 ip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSize(NonZeroI64);

impl WindowSize {
    /// ttl 内只允许第一个登录 ip
    #[cfg(test)]
    pub const OLDEST_ONE: WindowSize = WindowSize(match NonZeroI64::new(1) {
        Some(n) => n,
        None => unreachable!(),
    });

    pub fn new(count: i64) -> Option<Self> {
        NonZeroI64::new(count).map(Self)
    }

    /// 对应 ZRANGE 的闭区间下标
    pub fn rank_range(&self) -> (isize, isize) {
        let n = self.0.get();
        if n > 0 {
            (0, clamp_isize(n - 1))
        } else {
            (clamp_isize(n), -1)
        }
    }
}

fn clamp_isize(n: i64) -> isize {
    isize::try_from(n).unwrap_or(if n < 0 { isize::MIN } else { isize::MAX })
}

impl FromStr for WindowSize {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let count: i64 = s
            .parse()
            .map_err(|_| DecodeError::InvalidCount(s.to_string()))?;
        WindowSize::new(count).ok_or(DecodeError::ZeroCount)
    }
}

impl fmt::Display for WindowSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
