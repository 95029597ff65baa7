//! squid external_acl 行协议
//!
//! 输入：`username ip [count]`
//! 输出：`OK` / `ERR message="..."` / `BH message="..."`

use std::fmt;

use crate::acl::WindowSize;
use crate::error::DecodeError;

/// 一次访问判定请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AclRequest {
    pub username: String,
    pub address: String,
    /// 行内未给出 count 时为 None，由调用方填入默认值
    pub window: Option<WindowSize>,
}

impl AclRequest {
    /// 解析一行输入，最多切分为三段
    pub fn decode(line: &str) -> Result<Self, DecodeError> {
        let line = line.trim();
        if line.is_empty() {
            return Err(DecodeError::EmptyLine);
        }

        let mut fields = line.splitn(3, ' ');
        let username = fields.next().unwrap_or_default();
        let address = fields
            .next()
            .filter(|addr| !addr.is_empty())
            .ok_or(DecodeError::MissingAddress)?;
        let window = fields
            .next()
            .map(|raw| raw.trim().parse::<WindowSize>())
            .transpose()?;

        Ok(Self {
            username: username.to_string(),
            address: address.to_string(),
            window,
        })
    }
}

/// 回复给 squid 的一行
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Ok,
    Err { message: String },
    BrokenHelper { message: String },
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Ok => f.write_str("OK"),
            Response::Err { message } => write!(f, "ERR message=\"{}\"", quote(message)),
            Response::BrokenHelper { message } => write!(f, "BH message=\"{}\"", quote(message)),
        }
    }
}

/// squid 的 quoted-string 只认 `\"` 和 `\\` 两种转义
fn quote(message: &str) -> String {
    let mut out = String::with_capacity(message.len());
    for c in message.chars() {
        match c {
            '"' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            '\r' | '\n' => out.push(' '),
            _ => out.push(c),
        }
    }
    out
}
