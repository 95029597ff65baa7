use once_cell::sync::Lazy;
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Registry, TextEncoder};
use std::time::Instant;

pub struct Metrics {
    pub registry: Registry,
    /// 判定结果计数：allow / deny / broken
    pub decisions: IntCounterVec,
    /// 每条 redis 命令的耗时
    pub store_latency: HistogramVec,
    /// 新建（设置了 ttl）的登录窗口数
    pub windows_armed: IntCounter,
}

impl Metrics {
    fn new() -> Self {
        let registry = Registry::new();

        let decisions = IntCounterVec::new(
            prometheus::Opts::new("acl_decisions_total", "ACL decisions grouped by outcome"),
            &["outcome"],
        )
        .expect("acl_decisions_total 定义无效");
        registry
            .register(Box::new(decisions.clone()))
            .expect("acl_decisions_total 重复注册");

        let store_latency = HistogramVec::new(
            HistogramOpts::new("store_latency_seconds", "Latency of window store commands")
                .buckets(vec![0.0005, 0.001, 0.0025, 0.005, 0.01, 0.05, 0.25, 1.0]),
            &["op"],
        )
        .expect("store_latency_seconds 定义无效");
        registry
            .register(Box::new(store_latency.clone()))
            .expect("store_latency_seconds 重复注册");

        let windows_armed = IntCounter::new(
            "login_windows_armed_total",
            "Login windows whose ttl was armed by this worker",
        )
        .expect("login_windows_armed_total 定义无效");
        registry
            .register(Box::new(windows_armed.clone()))
            .expect("login_windows_armed_total 重复注册");

        Self {
            registry,
            decisions,
            store_latency,
            windows_armed,
        }
    }

    pub fn render(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        encoder.encode(&metric_families, &mut buffer).map_err(|e| e.to_string())?;
        String::from_utf8(buffer).map_err(|e| e.to_string())
    }

    pub fn record_decision(&self, outcome: &str) {
        self.decisions.with_label_values(&[outcome]).inc();
    }
}

pub static METRICS: Lazy<Metrics> = Lazy::new(Metrics::new);

/// drop 时记录一次存储命令耗时
pub struct StoreTimer {
    op: &'static str,
    start: Instant,
}

impl StoreTimer {
    pub fn start(op: &'static str) -> Self {
        Self {
            op,
            start: Instant::now(),
        }
    }
}

impl Drop for StoreTimer {
    fn drop(&mut self) {
        METRICS
            .store_latency
            .with_label_values(&[self.op])
            .observe(self.start.elapsed().as_secs_f64());
    }
}
