use crate::protocol::Response;

/// 判定结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    /// 拒绝时带上计算出的有效 ip 列表，便于在 squid 日志中排查
    Deny { window: Vec<String> },
}

impl Verdict {
    pub fn is_allow(&self) -> bool {
        matches!(self, Verdict::Allow)
    }

    pub fn into_response(self, address: &str) -> Response {
        match self {
            Verdict::Allow => Response::Ok,
            Verdict::Deny { window } => Response::Err {
                message: format!(
                    "ip {} not in valid iplist [{}]",
                    address,
                    window.join(", ")
                ),
            },
        }
    }
}
