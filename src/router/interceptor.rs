//! 语句分类与拦截
//!
//! 查询引擎在执行每条语句之前调用 [`StatementInterceptor::before_statement`]，
//! 路由器按语句类别判断读写，再由对应的解析器替换语句的连接池。

use crate::types::{Operation, StatementKind};
use crate::utils::{is_plain_select, is_with_select};

use super::Statement;

/// 语句执行前的拦截器
pub trait StatementInterceptor: Send + Sync {
    /// 拦截器名称
    fn name(&self) -> &str;

    /// 在语句执行前调用，可替换 `stmt.conn_pool`
    fn before_statement(&self, kind: StatementKind, stmt: &mut Statement);
}

/// 判断语句的读写类型
///
/// - 创建、更新、删除总是写
/// - 查询与单行查询：有原始 SQL 时按原始 SQL 推断；否则显式写或带锁定子句时写，其余为读
/// - 原始语句：显式标记优先，其次识别 `SELECT`（不以 `for update` 结尾）与 `WITH ... AS (...) SELECT`，其余为写
pub fn classify(kind: StatementKind, stmt: &Statement) -> Operation {
    match kind {
        StatementKind::Create | StatementKind::Update | StatementKind::Delete => Operation::Write,
        StatementKind::Query | StatementKind::Row => {
            if !stmt.sql.is_empty() {
                guess(stmt)
            } else if stmt.force == Some(Operation::Write) || stmt.locking {
                Operation::Write
            } else {
                Operation::Read
            }
        }
        StatementKind::Raw => guess(stmt),
    }
}

fn guess(stmt: &Statement) -> Operation {
    match stmt.force {
        Some(op) => op,
        None if is_plain_select(&stmt.sql) || is_with_select(&stmt.sql) => Operation::Read,
        None => Operation::Write,
    }
}
