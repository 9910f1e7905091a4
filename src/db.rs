// ==========================================
// 电动汽车充电调度系统 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为
// - 统一 busy_timeout，减少并发写入时的偶发 busy 错误
// - 内嵌建表脚本，启动时幂等执行
// ==========================================

use chrono::NaiveDateTime;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 时间戳持久化格式（定宽，字符串排序即时间排序）
pub const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

/// 初始化数据库 schema（幂等）
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;

    match read_schema_version(conn)? {
        Some(v) if v > CURRENT_SCHEMA_VERSION => {
            tracing::warn!(
                db_version = v,
                expected = CURRENT_SCHEMA_VERSION,
                "数据库 schema 版本高于当前程序，继续运行但可能存在不兼容"
            );
        }
        _ => {}
    }
    Ok(())
}

/// 格式化时间戳
pub fn format_ts(ts: &NaiveDateTime) -> String {
    ts.format(TS_FORMAT).to_string()
}

/// 解析时间戳（兼容不带小数秒的旧数据）
pub fn parse_ts(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, TS_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S"))
        .ok()
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS system_parameter (
    param_key TEXT PRIMARY KEY,
    param_value TEXT NOT NULL,
    param_type TEXT NOT NULL DEFAULT 'string',
    description TEXT NOT NULL DEFAULT '',
    is_editable INTEGER NOT NULL DEFAULT 1,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS charging_pile (
    pile_id TEXT PRIMARY KEY,
    pile_type TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'normal',
    is_working INTEGER NOT NULL DEFAULT 0,
    power_kw REAL NOT NULL,
    max_queue_size INTEGER NOT NULL,
    estimated_remaining_minutes INTEGER NOT NULL DEFAULT 0,
    total_charging_count INTEGER NOT NULL DEFAULT 0,
    total_charging_duration_hours REAL NOT NULL DEFAULT 0,
    total_charging_amount REAL NOT NULL DEFAULT 0,
    total_revenue REAL NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS charging_request (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    request_id TEXT NOT NULL UNIQUE,
    queue_number TEXT NOT NULL UNIQUE,
    user_id TEXT NOT NULL,
    vehicle_id TEXT NOT NULL,
    charging_mode TEXT NOT NULL,
    requested_amount REAL NOT NULL,
    battery_capacity REAL NOT NULL,
    current_status TEXT NOT NULL,
    queue_level TEXT NOT NULL,
    external_queue_position INTEGER,
    pile_queue_position INTEGER,
    charging_pile_id TEXT REFERENCES charging_pile(pile_id),
    current_amount REAL NOT NULL DEFAULT 0,
    estimated_wait_minutes INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    queue_entered_at TEXT NOT NULL,
    start_time TEXT,
    end_time TEXT
);

-- 每辆车最多一个活跃请求
CREATE UNIQUE INDEX IF NOT EXISTS ux_request_active_vehicle
    ON charging_request(vehicle_id)
    WHERE current_status IN ('waiting', 'charging');

CREATE INDEX IF NOT EXISTS idx_request_external
    ON charging_request(charging_mode, queue_level, external_queue_position);

CREATE INDEX IF NOT EXISTS idx_request_pile
    ON charging_request(charging_pile_id, queue_level, pile_queue_position);

CREATE TABLE IF NOT EXISTS ticket_sequence (
    charging_mode TEXT PRIMARY KEY,
    next_value INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS charging_session (
    session_id TEXT PRIMARY KEY,
    request_id TEXT NOT NULL UNIQUE REFERENCES charging_request(request_id),
    pile_id TEXT NOT NULL REFERENCES charging_pile(pile_id),
    user_id TEXT NOT NULL,
    start_time TEXT NOT NULL,
    end_time TEXT,
    charging_amount REAL NOT NULL DEFAULT 0,
    charging_duration_hours REAL NOT NULL DEFAULT 0,
    peak_hours REAL NOT NULL DEFAULT 0,
    normal_hours REAL NOT NULL DEFAULT 0,
    valley_hours REAL NOT NULL DEFAULT 0,
    peak_cost REAL NOT NULL DEFAULT 0,
    normal_cost REAL NOT NULL DEFAULT 0,
    valley_cost REAL NOT NULL DEFAULT 0,
    service_cost REAL NOT NULL DEFAULT 0,
    total_cost REAL NOT NULL DEFAULT 0,
    premature INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS notification (
    notification_id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    notification_type TEXT NOT NULL,
    message TEXT NOT NULL,
    created_at TEXT NOT NULL,
    is_read INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_notification_user
    ON notification(user_id, created_at);
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_init_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();
        assert_eq!(read_schema_version(&conn).unwrap(), Some(CURRENT_SCHEMA_VERSION));
    }

    #[test]
    fn test_timestamp_format_sorts_lexicographically() {
        let a = NaiveDate::from_ymd_opt(2026, 1, 1)
            .unwrap()
            .and_hms_micro_opt(9, 0, 0, 5)
            .unwrap();
        let b = NaiveDate::from_ymd_opt(2026, 1, 1)
            .unwrap()
            .and_hms_micro_opt(9, 0, 0, 40)
            .unwrap();
        assert!(format_ts(&a) < format_ts(&b));
        assert_eq!(parse_ts(&format_ts(&a)), Some(a));
        assert!(parse_ts("2026-01-01 09:00:00").is_some());
    }
}
