// ==========================================
// 电动汽车充电调度系统 - 通知仓储
// ==========================================

use crate::db::{format_ts, open_sqlite_connection};
use crate::domain::notification::Notification;
use crate::domain::types::NotificationType;
use crate::repository::error::{parse_db_enum, parse_db_ts, RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, Result as SqliteResult};
use std::sync::{Arc, Mutex};

pub struct NotificationRepository {
    conn: Arc<Mutex<Connection>>,
}

impl NotificationRepository {
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 用户通知（最新在前）
    pub fn list_by_user(&self, user_id: &str, unread_only: bool) -> RepositoryResult<Vec<Notification>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT notification_id, user_id, notification_type, message, created_at, is_read
            FROM notification
            WHERE user_id = ?1 AND (?2 = 0 OR is_read = 0)
            ORDER BY created_at DESC, rowid DESC
            "#,
        )?;
        let rows = stmt
            .query_map(params![user_id, unread_only as i32], map_notification_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }

    /// 标记已读（仅限本人通知）
    pub fn mark_read(&self, notification_id: &str, user_id: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            "UPDATE notification SET is_read = 1 WHERE notification_id = ?1 AND user_id = ?2",
            params![notification_id, user_id],
        )?;
        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "Notification".to_string(),
                id: notification_id.to_string(),
            });
        }
        Ok(())
    }

    pub fn insert_tx(conn: &Connection, n: &Notification) -> RepositoryResult<()> {
        conn.execute(
            r#"
            INSERT INTO notification (notification_id, user_id, notification_type, message, created_at, is_read)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                n.notification_id,
                n.user_id,
                n.notification_type.as_str(),
                n.message,
                format_ts(&n.created_at),
                n.is_read as i32,
            ],
        )?;
        Ok(())
    }
}

fn map_notification_row(row: &rusqlite::Row<'_>) -> SqliteResult<Notification> {
    let kind: String = row.get(2)?;
    let created_at: String = row.get(4)?;
    Ok(Notification {
        notification_id: row.get(0)?,
        user_id: row.get(1)?,
        notification_type: parse_db_enum("notification_type", &kind, NotificationType::from_db_str)?,
        message: row.get(3)?,
        created_at: parse_db_ts("created_at", &created_at)?,
        is_read: row.get::<_, i32>(5)? != 0,
    })
}
