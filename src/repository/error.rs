// ==========================================
// 电动汽车充电调度系统 - 仓储层错误类型
// ==========================================
// 工具: thiserror 派生宏
// ==========================================

use thiserror::Error;

/// 仓储层错误类型
#[derive(Error, Debug)]
pub enum RepositoryError {
    // ===== 数据库错误 =====
    #[error("记录未找到: {entity} with id={id}")]
    NotFound { entity: String, id: String },

    #[error("数据库连接失败: {0}")]
    DatabaseConnectionError(String),

    #[error("数据库锁获取失败: {0}")]
    LockError(String),

    /// SQLITE_BUSY / SQLITE_LOCKED（busy_timeout 耗尽）
    #[error("数据库繁忙: {0}")]
    DatabaseBusy(String),

    #[error("数据库事务失败: {0}")]
    DatabaseTransactionError(String),

    #[error("数据库查询失败: {0}")]
    DatabaseQueryError(String),

    #[error("唯一约束违反: {0}")]
    UniqueConstraintViolation(String),

    #[error("外键约束违反: {0}")]
    ForeignKeyViolation(String),

    // ===== 数据质量错误 =====
    #[error("字段值错误 (field={field}): {message}")]
    FieldValueError { field: String, message: String },
}

// 实现 From<rusqlite::Error>
impl From<rusqlite::Error> for RepositoryError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(code, msg) => {
                let msg = msg.unwrap_or_else(|| code.to_string());
                match code.code {
                    rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked => {
                        RepositoryError::DatabaseBusy(msg)
                    }
                    _ if msg.contains("UNIQUE") => RepositoryError::UniqueConstraintViolation(msg),
                    _ if msg.contains("FOREIGN KEY") => RepositoryError::ForeignKeyViolation(msg),
                    _ => RepositoryError::DatabaseQueryError(msg),
                }
            }
            rusqlite::Error::QueryReturnedNoRows => RepositoryError::NotFound {
                entity: "Unknown".to_string(),
                id: "Unknown".to_string(),
            },
            _ => RepositoryError::DatabaseQueryError(err.to_string()),
        }
    }
}

impl RepositoryError {
    /// 是否为并发冲突（锁中毒或数据库繁忙）
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(
            self,
            RepositoryError::LockError(_) | RepositoryError::DatabaseBusy(_)
        )
    }
}

/// Result 类型别名
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// 解析数据库中的枚举字段，失败时给出字段名
pub(crate) fn parse_db_enum<T>(
    field: &str,
    raw: &str,
    parse: impl FnOnce(&str) -> Option<T>,
) -> rusqlite::Result<T> {
    parse(raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            format!("{} 字段值非法: {}", field, raw).into(),
        )
    })
}

/// 解析数据库中的时间戳字段
pub(crate) fn parse_db_ts(field: &str, raw: &str) -> rusqlite::Result<chrono::NaiveDateTime> {
    parse_db_enum(field, raw, crate::db::parse_ts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_busy_maps_to_concurrency_conflict() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            Some("database is locked".to_string()),
        );
        assert!(RepositoryError::from(err).is_concurrency_conflict());
    }

    #[test]
    fn test_unique_violation_mapping() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CONSTRAINT),
            Some("UNIQUE constraint failed: charging_request.vehicle_id".to_string()),
        );
        assert!(matches!(
            RepositoryError::from(err),
            RepositoryError::UniqueConstraintViolation(_)
        ));
    }
}
