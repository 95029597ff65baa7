use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::acl::{AccessDecider, WindowSize};
use crate::error::HelperError;
use crate::metrics::METRICS;
use crate::protocol::{AclRequest, Response};
use crate::store::WindowStore;

/// squid external_acl helper：逐行读取请求，逐行回复
///
/// 严格串行：一行处理完（包括 redis 往返）才读下一行。
pub struct AclHelper<S> {
    decider: AccessDecider<S>,
    default_window: WindowSize,
}

impl<S: WindowStore> AclHelper<S> {
    pub fn new(decider: AccessDecider<S>, default_window: WindowSize) -> Self {
        Self {
            decider,
            default_window,
        }
    }

    /// 处理一行输入，解析错误和存储错误都以 Err 返回，由调用方区分是否致命
    pub async fn handle_line(&self, line: &str) -> Result<Response, HelperError> {
        tracing::info!("squid >> {}", line.trim_end());

        let request = AclRequest::decode(line).inspect_err(|err| {
            tracing::warn!("get a unresolved line from squid [{}]: {}", line.trim_end(), err);
            METRICS.record_decision("broken");
        })?;

        let window = request.window.unwrap_or(self.default_window);
        let verdict = self
            .decider
            .evaluate(&request.username, &request.address, window)
            .await?;

        if verdict.is_allow() {
            tracing::info!("ip {} is valid", request.address);
            METRICS.record_decision("allow");
        } else {
            tracing::info!("ip {} not in valid iplist", request.address);
            METRICS.record_decision("deny");
        }
        Ok(verdict.into_response(&request.address))
    }

    /// 主循环，读到 EOF（squid 关闭管道）时正常返回
    pub async fn run<R, W>(&self, mut reader: R, mut writer: W) -> Result<(), HelperError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut buf = Vec::with_capacity(256);
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                tracing::info!("squid 关闭了输入，helper 退出");
                return Ok(());
            }

            let line = String::from_utf8_lossy(&buf);
            let response = match self.handle_line(&line).await {
                Ok(response) => response,
                Err(err) => err.into_response()?,
            };

            writer.write_all(format!("{}\n", response).as_bytes()).await?;
            writer.flush().await?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acl::WindowPolicy;
    use crate::error::StoreError;
    use crate::store::{Insertion, MemoryWindowStore, TtlStatus};
    use async_trait::async_trait;
    use std::time::Duration;

    fn helper() -> AclHelper<MemoryWindowStore> {
        let decider = AccessDecider::new(
            MemoryWindowStore::new(),
            WindowPolicy {
                key_prefix: String::new(),
                ttl: Duration::from_secs(3600),
            },
        );
        AclHelper::new(decider, WindowSize::OLDEST_ONE)
    }

    async fn transcript<S: WindowStore>(helper: &AclHelper<S>, input: &str) -> Result<String, HelperError> {
        let mut output = Vec::new();
        helper.run(input.as_bytes(), &mut output).await?;
        Ok(String::from_utf8(output).unwrap())
    }

    #[tokio::test]
    async fn test_login_scenario() {
        let helper = helper();
        let output = transcript(
            &helper,
            "alice 10.0.0.1\nalice 10.0.0.2\nalice 10.0.0.2 -2\n",
        )
        .await
        .unwrap();

        assert_eq!(
            output,
            "OK\n\
             ERR message=\"ip 10.0.0.2 not in valid iplist [10.0.0.1]\"\n\
             OK\n"
        );
    }

    #[tokio::test]
    async fn test_malformed_lines_leave_store_untouched() {
        let helper = helper();
        let output = transcript(&helper, "\nalice\n").await.unwrap();

        assert_eq!(
            output,
            "BH message=\"get a empty line from squid\"\n\
             BH message=\"get a unresolved line from squid: missing client address\"\n"
        );
        assert!(helper.decider.store().is_empty());
        assert_eq!(
            helper.decider.store().ttl_status("alice").await.unwrap(),
            TtlStatus::Nonexistent
        );
    }

    #[tokio::test]
    async fn test_helper_keeps_serving_after_bad_line() {
        let helper = helper();
        let output = transcript(&helper, "alice 10.0.0.1 zero\nalice 10.0.0.1\n")
            .await
            .unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("BH "));
        assert_eq!(lines[1], "OK");
    }

    #[tokio::test]
    async fn test_last_line_without_newline() {
        let helper = helper();
        assert_eq!(transcript(&helper, "bob 10.0.0.9").await.unwrap(), "OK\n");
    }

    /// 模拟连不上 redis 的存储
    struct BrokenStore;

    #[async_trait]
    impl WindowStore for BrokenStore {
        async fn rank(&self, _: &str, _: &str) -> Result<Option<usize>, StoreError> {
            Err(StoreError::Timeout {
                op: "ZRANK",
                timeout: Duration::from_millis(10),
            })
        }

        async fn insert_if_absent(&self, _: &str, _: &str, _: f64) -> Result<Insertion, StoreError> {
            unreachable!("rank 已经失败")
        }

        async fn ttl_status(&self, _: &str) -> Result<TtlStatus, StoreError> {
            unreachable!("rank 已经失败")
        }

        async fn arm_expiry_once(&self, _: &str, _: Duration) -> Result<bool, StoreError> {
            unreachable!("rank 已经失败")
        }

        async fn range_by_rank(&self, _: &str, _: isize, _: isize) -> Result<Vec<String>, StoreError> {
            unreachable!("rank 已经失败")
        }
    }

    #[tokio::test]
    async fn test_store_failure_is_fatal() {
        let decider = AccessDecider::new(
            BrokenStore,
            WindowPolicy {
                key_prefix: String::new(),
                ttl: Duration::from_secs(60),
            },
        );
        let helper = AclHelper::new(decider, WindowSize::OLDEST_ONE);

        let mut output = Vec::new();
        let result = helper
            .run("\nalice 10.0.0.1\nalice 10.0.0.2\n".as_bytes(), &mut output)
            .await;

        assert!(matches!(result, Err(HelperError::Store(_))));
        // 之前的 BH 已经写出，失败的请求没有任何回复
        assert_eq!(
            String::from_utf8(output).unwrap(),
            "BH message=\"get a empty line from squid\"\n"
        );
    }
}
