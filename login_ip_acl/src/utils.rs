use chrono::Utc;

/// 当前 Unix 时间（秒，保留微秒小数），用作登录 ip 的 score
pub fn unix_now() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unix_now_is_monotonic_enough() {
        let a = unix_now();
        let b = unix_now();
        assert!(a > 1_600_000_000.0);
        assert!(b >= a);
    }
}
