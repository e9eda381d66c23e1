//! 通用工具函数模块
//!
//! 提供跨模块共享的工具函数：原生SQL的模式匹配、定时任务循环、主机地址处理

use std::future::Future;
use std::net::IpAddr;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

static FROM_TABLE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)(?:FROM|UPDATE|MERGE INTO|INSERT [a-z ]*INTO) ['`"]?([a-zA-Z0-9_]+)([ '`",)]|$)"#)
        .expect("table regex is valid")
});

// 单个 CTE 后跟 SELECT，https://dev.mysql.com/doc/refman/8.0/en/with.html
static WITH_SELECT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)with\s+[a-zA-Z0-9_]+\s+as\s*\(.*\)\s*select\s+.*")
        .expect("with-select regex is valid")
});

/// 从原生SQL中提取表名
///
/// 取 `FROM` / `UPDATE` / `MERGE INTO` / `INSERT ... INTO` 之后的第一个标识符，
/// 没有匹配时返回 `None`
pub fn get_table_from_raw_sql(sql: &str) -> Option<&str> {
    FROM_TABLE_REGEX
        .captures(sql)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// 判断原生SQL是否为 `WITH <name> AS (...) SELECT ...` 语句
///
/// 原生 WITH 语句默认走写节点，只读的 CTE 查询通过这个匹配强制走读节点
pub fn is_with_select(sql: &str) -> bool {
    WITH_SELECT_REGEX.is_match(sql)
}

/// 判断原生SQL是否为普通的只读 SELECT
///
/// 去掉首尾空白后长度超过10、以 `SELECT` 开头且不以 `FOR UPDATE` 结尾（均不区分大小写）
pub fn is_plain_select(sql: &str) -> bool {
    let sql = sql.trim();
    if sql.len() <= 10 {
        return false;
    }
    let starts_with_select = sql
        .get(..6)
        .map(|head| head.eq_ignore_ascii_case("select"))
        .unwrap_or(false);
    let ends_with_for_update = sql
        .get(sql.len() - 10..)
        .map(|tail| tail.eq_ignore_ascii_case("for update"))
        .unwrap_or(false);
    starts_with_select && !ends_with_for_update
}

/// 归一化主机名，`localhost` 与 `127.1` 视为 `127.0.0.1`
pub fn normalize_host(host: &str) -> &str {
    match host {
        "localhost" | "127.1" => "127.0.0.1",
        other => other,
    }
}

/// 是否为IP字面量（无需DNS解析即可使用）
pub fn is_ip_literal(host: &str) -> bool {
    host.parse::<IpAddr>().is_ok()
}

/// 启动一个定时任务循环
///
/// `at_once` 为真时先立即执行一次；之后每隔 `interval` 执行一次，
/// 直到 `token` 被取消。任务本身串行执行，上一次未结束时不会重入。
pub async fn start_cron_job<F, Fut>(
    token: CancellationToken,
    at_once: bool,
    interval: Duration,
    job_name: &str,
    mut job: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    tracing::info!("starting cron job: {}", job_name);
    if at_once && !token.is_cancelled() {
        job().await;
    }

    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                tracing::info!("stopping cron job: {}", job_name);
                return;
            }
            _ = ticker.tick() => job().await,
        }
    }
}

/// 以毫秒整数读写 `Duration` 的 serde 辅助模块
pub mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    /// 序列化为毫秒
    pub fn serialize<S>(value: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    /// 从毫秒反序列化
    pub fn deserialize<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_get_table_from_raw_sql() {
        assert_eq!(get_table_from_raw_sql("SELECT * FROM users WHERE id = 1"), Some("users"));
        assert_eq!(get_table_from_raw_sql("select name from `orders`"), Some("orders"));
        assert_eq!(get_table_from_raw_sql("UPDATE products SET name = 'x'"), Some("products"));
        assert_eq!(get_table_from_raw_sql("INSERT IGNORE INTO logs (a) VALUES (1)"), Some("logs"));
        assert_eq!(get_table_from_raw_sql("MERGE INTO stats USING t"), Some("stats"));
        assert_eq!(get_table_from_raw_sql("SELECT * FROM users"), Some("users"));
        assert_eq!(get_table_from_raw_sql("SELECT 1"), None);
    }

    #[test]
    fn test_is_with_select() {
        let cases = [
            ("WITH cte AS (SELECT * FROM users) SELECT * FROM cte", true),
            (
                "WITH user_stats AS (SELECT department, COUNT(*) as count FROM users GROUP BY department) SELECT * FROM user_stats",
                true,
            ),
            ("with my_cte as (select 1) select * from my_cte", true),
            ("WiTh test_cte AS (SELECT id FROM table) SELECT * FROM test_cte", true),
            ("WITH cte AS (SELECT * FROM users) UPDATE table SET col = 1", false),
            ("WITH old_users AS (SELECT id FROM users) DELETE FROM users", false),
            ("SELECT * FROM users", false),
            ("SELECT * FROM table_with_stats", false),
            ("", false),
            ("WITH AS (SELECT * FROM users) SELECT *", false),
        ];
        for (sql, want) in cases {
            assert_eq!(is_with_select(sql), want, "sql: {}", sql);
        }
    }

    #[test]
    fn test_is_plain_select() {
        assert!(is_plain_select("SELECT * FROM users"));
        assert!(is_plain_select("  select id from users  "));
        assert!(!is_plain_select("SELECT * FROM users FOR UPDATE"));
        assert!(!is_plain_select("select * from users for update"));
        assert!(!is_plain_select("SELECT 1"));
        assert!(!is_plain_select("UPDATE users SET a = 1"));
        assert!(is_plain_select("SELECT * FROM 用户表"));
    }

    #[test]
    fn test_normalize_host() {
        assert_eq!(normalize_host("localhost"), "127.0.0.1");
        assert_eq!(normalize_host("127.1"), "127.0.0.1");
        assert_eq!(normalize_host("db.internal"), "db.internal");
    }

    #[test]
    fn test_is_ip_literal() {
        assert!(is_ip_literal("10.0.0.1"));
        assert!(is_ip_literal("::1"));
        assert!(!is_ip_literal("localhost"));
        assert!(!is_ip_literal("127.1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cron_job_runs_and_stops() {
        let token = CancellationToken::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let job_counter = counter.clone();
        let handle = tokio::spawn(start_cron_job(
            token.clone(),
            true,
            Duration::from_secs(1),
            "test",
            move || {
                let job_counter = job_counter.clone();
                async move {
                    job_counter.fetch_add(1, Ordering::SeqCst);
                }
            },
        ));

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 4);

        token.cancel();
        handle.await.unwrap();
        let stopped_at = counter.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(counter.load(Ordering::SeqCst), stopped_at);
    }
}
