use std::time::Duration;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("digest_auth: get a empty line from squid")]
    EmptyLine,

    #[error("digest_auth: get a unresolved line from squid")]
    Unresolved,
}

/// 查询 redis 失败，worker 直接退出
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
}

#[derive(Debug, thiserror::Error)]
pub enum HelperError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("读写 squid 管道失败: {0}")]
    Io(#[from] std::io::Error),
}
