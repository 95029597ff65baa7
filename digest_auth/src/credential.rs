use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::time::Duration;

use crate::error::StoreError;

/// HA1 查询接口：realm:username ==> ha1
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn ha1(&self, realm: &str, username: &str) -> Result<Option<String>, StoreError>;
}

pub fn credential_key(realm: &str, username: &str) -> String {
    format!("{}:{}", realm, username)
}

#[derive(Clone)]
pub struct RedisCredentialStore {
    manager: ConnectionManager,
    timeout: Duration,
}

impl RedisCredentialStore {
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(|source| StoreError::Redis { op: "OPEN", source })?;
        let manager = match tokio::time::timeout(timeout, ConnectionManager::new(client)).await {
            Ok(result) => result.map_err(|source| StoreError::Redis { op: "CONNECT", source })?,
            Err(_) => return Err(StoreError::Timeout { op: "CONNECT", timeout }),
        };
        let store = Self { manager, timeout };

        // 启动时 PING 一次，连不上直接失败
        let pong: String = store.query("PING", &ping()).await?;
        tracing::info!("已连接 redis {} ({})", url, pong);
        Ok(store)
    }

    async fn query<T: redis::FromRedisValue + Send>(&self, op: &'static str, cmd: &redis::Cmd) -> Result<T, StoreError> {
        let mut conn = self.manager.clone();
        match tokio::time::timeout(self.timeout, cmd.query_async::<_, T>(&mut conn)).await {
            Ok(result) => result.map_err(|source| StoreError::Redis { op, source }),
            Err(_) => Err(StoreError::Timeout { op, timeout: self.timeout }),
        }
    }
}

fn ping() -> redis::Cmd {
    redis::cmd("PING")
}

fn get_ha1(realm: &str, username: &str) -> redis::Cmd {
    let mut cmd = redis::cmd("GET");
    cmd.arg(credential_key(realm, username));
    cmd
}

#[async_trait]
impl CredentialStore for RedisCredentialStore {
    async fn ha1(&self, realm: &str, username: &str) -> Result<Option<String>, StoreError> {
        self.query("GET", &get_ha1(realm, username)).await
    }
}
