use clap::Parser;
use std::path::PathBuf;

const DESCRIPTION: &str = "\
squid 3.4+ 的登录 ip 访问控制 (external ACL) helper。

以 prefix:username 为 key，把用户的登录 ip 存为 redis 有序集合，score 是该 ip 第一次登录的时间。
集合的 ttl 默认 1 小时，只在创建时设置一次。
acl 参数 count 取集合的前 N 个（正数）或后 N 个（负数）作为有效 ip：
  count=1  ttl 内同一账户只允许第一个登录 ip 访问（默认）
  count=-2 ttl 内同一账户只允许最新两个登录 ip 访问

squid.conf 示例:
  external_acl_type redis_login_ip cache=0 children-max=1 ipv4 %LOGIN %SRC /usr/local/bin/login_ip_acl -p fp_loginip -t 1800 -l DEBUG -f /var/log/squid/loginip.log
  acl in_loginip_limit external redis_login_ip 1
  http_access deny !in_loginip_limit

输入行:  username ip [count]
输出行:  OK | ERR message=\"...\" | BH message=\"...\"";

/// 命令行参数，未给出的项沿用配置文件 / 环境变量 / 默认值
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "login_ip_acl", version, about = "Login ip ACL helper for squid", long_about = DESCRIPTION)]
pub struct Cli {
    /// 配置文件路径（TOML），默认读取当前目录下的 login_ip_acl.toml（可选）
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// redis 主机，默认 localhost
    #[arg(short = 'H', long)]
    pub host: Option<String>,

    /// redis 端口，默认 6379
    #[arg(short = 'P', long)]
    pub port: Option<u16>,

    /// redis 数据库编号，默认 0
    #[arg(long)]
    pub db: Option<i64>,

    /// 单条 redis 命令的超时（毫秒），默认 3000
    #[arg(long)]
    pub timeout_ms: Option<i64>,

    /// redis key 前缀，非空时自动追加 ':'
    #[arg(short, long)]
    pub prefix: Option<String>,

    /// 每个用户 ip 集合的生存时间（秒），默认 3600
    #[arg(short, long)]
    pub ttl: Option<i64>,

    /// squid 输入行未带 count 时使用的窗口大小，默认 1
    #[arg(long, allow_negative_numbers = true)]
    pub default_count: Option<i64>,

    /// 日志文件路径，实际文件名会追加 .<pid>，避免多进程写同一文件
    #[arg(short = 'f', long)]
    pub logfile: Option<PathBuf>,

    /// 日志级别 {CRITICAL, ERROR, WARNING, INFO, DEBUG, NOTSET}，默认 WARNING
    #[arg(short = 'l', long, value_name = "LOGLEVEL")]
    pub loglevel: Option<String>,

    /// 存储后端 {redis, memory}，memory 仅用于本地演练
    #[arg(long)]
    pub store: Option<String>,
}
