use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

const DESCRIPTION: &str = "\
squid 3.4+ 的 digest 认证 helper。
从 stdin 读取 squid 的请求行，到 redis 查询用户的 HA1，再通过 stdout 回复 squid。

输入行:  \"username\":\"realm\" [key-extras]
输出行:  OK ha1=\"xxx\" | BH message=\"xxx\"
redis 中的数据:  realm:username ==> ha1";

// 命令行参数
#[derive(Parser, Debug, Clone)]
#[command(name = "digest_auth", version, about = "Digest authentication helper for squid", long_about = DESCRIPTION)]
pub struct Args {
    /// redis 主机
    #[arg(short = 'H', long, default_value = "localhost")]
    pub host: String,

    /// redis 端口
    #[arg(short, long, default_value_t = 6379)]
    pub port: u16,

    /// 单条 redis 命令超时（毫秒）
    #[arg(long, default_value_t = 3000)]
    pub timeout_ms: u64,

    /// 日志文件，实际文件名追加 .<pid>；不指定时日志写到 stderr
    #[arg(short = 'f', long)]
    pub logfile: Option<PathBuf>,

    /// 日志级别 {CRITICAL, ERROR, WARNING, INFO, DEBUG, NOTSET}
    #[arg(short = 'l', long, value_name = "LOGLEVEL", default_value = "WARNING",
          value_parser = ["CRITICAL", "ERROR", "WARNING", "INFO", "DEBUG", "NOTSET"])]
    pub loglevel: String,
}

impl Args {
    pub fn redis_url(&self) -> String {
        format!("redis://{}:{}/", self.host, self.port)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.max(1))
    }

    /// 每个 worker 进程写自己的日志文件：`<logfile>.<pid>`
    pub fn per_process_logfile(&self, pid: u32) -> Option<PathBuf> {
        self.logfile.as_ref().map(|logfile| {
            let mut name = logfile.as_os_str().to_owned();
            name.push(format!(".{}", pid));
            PathBuf::from(name)
        })
    }

    /// 对应的 tracing 过滤级别
    pub fn level_directive(&self) -> &'static str {
        match self.loglevel.as_str() {
            "CRITICAL" | "ERROR" => "error",
            "INFO" => "info",
            "DEBUG" => "debug",
            "NOTSET" => "trace",
            _ => "warn",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["digest_auth"]);
        assert_eq!(args.redis_url(), "redis://localhost:6379/");
        assert_eq!(args.level_directive(), "warn");
        assert_eq!(args.logfile, None);
    }

    #[test]
    fn test_lowercase_port_flag() {
        let args = Args::parse_from(["digest_auth", "-H", "10.0.0.5", "-p", "6380", "-l", "DEBUG"]);
        assert_eq!(args.redis_url(), "redis://10.0.0.5:6380/");
        assert_eq!(args.level_directive(), "debug");
    }

    #[test]
    fn test_per_process_logfile() {
        let args = Args::parse_from(["digest_auth", "-f", "/var/log/squid/digest.log"]);
        assert_eq!(
            args.per_process_logfile(4242),
            Some(PathBuf::from("/var/log/squid/digest.log.4242"))
        );
        assert_eq!(Args::parse_from(["digest_auth"]).per_process_logfile(1), None);
    }

    #[test]
    fn test_flag_help_text() {
        use clap::CommandFactory;
        let command = Args::command();
        let help = |id: &str| {
            command
                .get_arguments()
                .find(|arg| arg.get_id() == id)
                .and_then(|arg| arg.get_help())
                .map(|text| text.to_string())
        };
        assert_eq!(help("host").as_deref(), Some("redis 主机"));
        assert!(help("loglevel").is_some_and(|text| text.contains("CRITICAL")));
    }

    #[test]
    fn test_rejects_unknown_level() {
        assert!(Args::try_parse_from(["digest_auth", "-l", "LOUD"]).is_err());
    }
}
