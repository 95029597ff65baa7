use std::time::Duration;

use crate::protocol::Response;

/// 输入行解析失败：只影响当前请求，回复 BH 后继续处理下一行
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("get a empty line from squid")]
    EmptyLine,

    #[error("get a unresolved line from squid: missing client address")]
    MissingAddress,

    #[error("get a unresolved line from squid: invalid count {0:?}")]
    InvalidCount(String),

    #[error("get a unresolved line from squid: count must be nonzero")]
    ZeroCount,
}

impl DecodeError {
    /// 解析失败统一映射为 BH，squid 会把这次检查视为“无法判定”
    pub fn into_response(self) -> Response {
        Response::BrokenHelper {
            message: self.to_string(),
        }
    }
}

/// 存储层错误：连接、协议或超时，全部视为致命错误
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redis {op} 失败: {source}")]
    Redis {
        op: &'static str,
        #[source]
        source: redis::RedisError,
    },

    #[error("redis {op} 超时 ({timeout:?})")]
    Timeout { op: &'static str, timeout: Duration },

    #[error("redis {op} 返回了无法识别的结果: {detail}")]
    Protocol { op: &'static str, detail: String },
}

impl StoreError {
    pub fn redis(op: &'static str, source: redis::RedisError) -> Self {
        StoreError::Redis { op, source }
    }
}

/// helper 主循环的错误
#[derive(Debug, thiserror::Error)]
pub enum HelperError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("读写 squid 管道失败: {0}")]
    Io(#[from] std::io::Error),
}

impl HelperError {
    /// 致命错误必须终止 worker，由 squid 重新拉起
    pub fn is_fatal(&self) -> bool {
        !matches!(self, HelperError::Decode(_))
    }

    /// 非致命错误转换为响应行，致命错误原样交还调用方
    pub fn into_response(self) -> Result<Response, HelperError> {
        if self.is_fatal() {
            tracing::error!(error = %self, "致命错误，worker 即将退出");
            return Err(self);
        }
        match self {
            HelperError::Decode(err) => Ok(err.into_response()),
            other => Err(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_errors_are_recoverable() {
        let err = HelperError::from(DecodeError::MissingAddress);
        assert!(!err.is_fatal());

        let response = err.into_response().expect("解析错误应转换为响应");
        assert_eq!(
            response.to_string(),
            r#"BH message="get a unresolved line from squid: missing client address""#
        );
    }

    #[test]
    fn test_store_errors_are_fatal() {
        let err = HelperError::from(StoreError::Timeout {
            op: "ZRANK",
            timeout: Duration::from_millis(50),
        });
        assert!(err.is_fatal());
        assert!(matches!(
            err.into_response(),
            Err(HelperError::Store(StoreError::Timeout { op: "ZRANK", .. }))
        ));
    }

    #[test]
    fn test_io_errors_are_fatal() {
        let err = HelperError::from(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "squid went away",
        ));
        assert!(err.is_fatal());
    }
}
