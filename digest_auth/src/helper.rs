use std::fmt;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::credential::CredentialStore;
use crate::error::{DecodeError, HelperError, StoreError};

/// squid digest 请求：`"username":"realm" [key-extras]`
#[derive(Debug, PartialEq, Eq)]
pub struct DigestRequest {
    pub username: String,
    pub realm: String,
}

impl DigestRequest {
    /// 按双引号切分，取第 2、4 段
    pub fn decode(line: &str) -> Result<Self, DecodeError> {
        let line = line.trim();
        if line.is_empty() {
            return Err(DecodeError::EmptyLine);
        }
        let mut pieces = line.split('"');
        match (pieces.nth(1), pieces.nth(1)) {
            (Some(username), Some(realm)) => Ok(Self {
                username: username.to_string(),
                realm: realm.to_string(),
            }),
            _ => Err(DecodeError::Unresolved),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Response {
    Ok { ha1: String },
    BrokenHelper { message: String },
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Ok { ha1 } => write!(f, "OK ha1=\"{}\"", ha1),
            Response::BrokenHelper { message } => write!(f, "BH message=\"{}\"", message),
        }
    }
}

pub struct DigestHelper<S> {
    store: S,
}

impl<S: CredentialStore> DigestHelper<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub async fn handle_line(&self, line: &str) -> Result<Response, StoreError> {
        tracing::info!("squid >> {}", line.trim_end());

        let request = match DigestRequest::decode(line) {
            Ok(request) => request,
            Err(err) => {
                tracing::warn!("{} [{}]", err, line.trim_end());
                return Ok(Response::BrokenHelper {
                    message: err.to_string(),
                });
            }
        };

        let ha1 = self.store.ha1(&request.realm, &request.username).await?;
        tracing::info!("redis[{}:{}] = {:?}", request.realm, request.username, ha1);

        // squid 3.5 处理 ERR 回复有问题，查不到用户时只能回 BH
        Ok(match ha1 {
            Some(ha1) => Response::Ok { ha1 },
            None => Response::BrokenHelper {
                message: "digest_auth: no such user".to_string(),
            },
        })
    }

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
            let response = self.handle_line(&line).await.inspect_err(|err| {
                tracing::error!(error = %err, "查询 redis 失败，worker 即将退出");
            })?;
            writer.write_all(format!("{}\n", response).as_bytes()).await?;
            writer.flush().await?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::time::Duration;

    struct MapStore(HashMap<String, String>);

    #[async_trait]
    impl CredentialStore for MapStore {
        async fn ha1(&self, realm: &str, username: &str) -> Result<Option<String>, StoreError> {
            Ok(self.0.get(&crate::credential::credential_key(realm, username)).cloned())
        }
    }

    struct DownStore;

    #[async_trait]
    impl CredentialStore for DownStore {
        async fn ha1(&self, _: &str, _: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Timeout {
                op: "GET",
                timeout: Duration::from_millis(5),
            })
        }
    }

    fn helper() -> DigestHelper<MapStore> {
        let mut users = HashMap::new();
        users.insert("Proxy:alice".to_string(), "8b1a9953c4611296a827abf8c47804d7".to_string());
        DigestHelper::new(MapStore(users))
    }

    #[test]
    fn test_decode() {
        assert_eq!(
            DigestRequest::decode("\"alice\":\"Proxy\" extra=1\n").unwrap(),
            DigestRequest {
                username: "alice".to_string(),
                realm: "Proxy".to_string(),
            }
        );
        assert_eq!(DigestRequest::decode(""), Err(DecodeError::EmptyLine));
        assert_eq!(DigestRequest::decode("alice Proxy"), Err(DecodeError::Unresolved));
        assert_eq!(DigestRequest::decode("\"alice\":"), Err(DecodeError::Unresolved));
    }

    #[tokio::test]
    async fn test_lookup_transcript() {
        let mut output = Vec::new();
        helper()
            .run(
                "\"alice\":\"Proxy\"\n\"bob\":\"Proxy\"\n\nalice\n".as_bytes(),
                &mut output,
            )
            .await
            .unwrap();

        assert_eq!(
            String::from_utf8(output).unwrap(),
            "OK ha1=\"8b1a9953c4611296a827abf8c47804d7\"\n\
             BH message=\"digest_auth: no such user\"\n\
             BH message=\"digest_auth: get a empty line from squid\"\n\
             BH message=\"digest_auth: get a unresolved line from squid\"\n"
        );
    }

    #[tokio::test]
    async fn test_store_failure_stops_helper() {
        let helper = DigestHelper::new(DownStore);
        let mut output = Vec::new();
        let result = helper.run("\"alice\":\"Proxy\"\n".as_bytes(), &mut output).await;
        assert!(matches!(result, Err(HelperError::Store(StoreError::Timeout { .. }))));
        assert!(output.is_empty());
    }
}
