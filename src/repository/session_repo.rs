// ==========================================
// 电动汽车充电调度系统 - 充电会话仓储
// ==========================================
// 会话与请求一对一 (UNIQUE request_id)
// ==========================================

use crate::db::{format_ts, open_sqlite_connection};
use crate::domain::session::{BillBreakdown, ChargingSession};
use crate::repository::error::{parse_db_ts, RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult};
use std::sync::{Arc, Mutex};

const SESSION_COLUMNS: &str = r#"
    session_id, request_id, pile_id, user_id, start_time, end_time,
    charging_amount, charging_duration_hours,
    peak_hours, normal_hours, valley_hours,
    peak_cost, normal_cost, valley_cost, service_cost, total_cost,
    premature
"#;

pub struct ChargingSessionRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ChargingSessionRepository {
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

    pub fn find_by_request(&self, request_id: &str) -> RepositoryResult<Option<ChargingSession>> {
        let conn = self.get_conn()?;
        Self::find_by_request_tx(&conn, request_id)
    }

    /// 用户的已结束会话（最新在前）
    pub fn list_finished_by_user(&self, user_id: &str) -> RepositoryResult<Vec<ChargingSession>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM charging_session WHERE user_id = ?1 AND end_time IS NOT NULL ORDER BY end_time DESC",
            SESSION_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![user_id], map_session_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }

    // ==========================================
    // 事务内操作
    // ==========================================

    pub fn insert_tx(conn: &Connection, session: &ChargingSession) -> RepositoryResult<()> {
        conn.execute(
            r#"
            INSERT INTO charging_session (session_id, request_id, pile_id, user_id, start_time)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                session.session_id,
                session.request_id,
                session.pile_id,
                session.user_id,
                format_ts(&session.start_time),
            ],
        )?;
        Ok(())
    }

    pub fn find_by_request_tx(conn: &Connection, request_id: &str) -> RepositoryResult<Option<ChargingSession>> {
        let sql = format!("SELECT {} FROM charging_session WHERE request_id = ?1", SESSION_COLUMNS);
        Ok(conn.query_row(&sql, params![request_id], map_session_row).optional()?)
    }

    /// 充电过程中同步已充电量与时长
    pub fn update_progress_tx(
        conn: &Connection,
        request_id: &str,
        amount: f64,
        duration_hours: f64,
    ) -> RepositoryResult<()> {
        conn.execute(
            r#"
            UPDATE charging_session
            SET charging_amount = ?2, charging_duration_hours = ?3
            WHERE request_id = ?1 AND end_time IS NULL
            "#,
            params![request_id, amount, duration_hours],
        )?;
        Ok(())
    }

    /// 写入结束时间与账单
    pub fn finalize_tx(conn: &Connection, session: &ChargingSession) -> RepositoryResult<()> {
        let bill = &session.bill;
        let affected = conn.execute(
            r#"
            UPDATE charging_session SET
                end_time = ?2,
                charging_amount = ?3,
                charging_duration_hours = ?4,
                peak_hours = ?5,
                normal_hours = ?6,
                valley_hours = ?7,
                peak_cost = ?8,
                normal_cost = ?9,
                valley_cost = ?10,
                service_cost = ?11,
                total_cost = ?12,
                premature = ?13
            WHERE session_id = ?1
            "#,
            params![
                session.session_id,
                session.end_time.as_ref().map(format_ts),
                session.charging_amount,
                session.charging_duration_hours,
                bill.peak_hours,
                bill.normal_hours,
                bill.valley_hours,
                bill.peak_cost,
                bill.normal_cost,
                bill.valley_cost,
                bill.service_cost,
                bill.total_cost,
                session.premature as i32,
            ],
        )?;
        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "ChargingSession".to_string(),
                id: session.session_id.clone(),
            });
        }
        Ok(())
    }
}

fn map_session_row(row: &rusqlite::Row<'_>) -> SqliteResult<ChargingSession> {
    let start_time: String = row.get(4)?;
    let end_time: Option<String> = row.get(5)?;
    Ok(ChargingSession {
        session_id: row.get(0)?,
        request_id: row.get(1)?,
        pile_id: row.get(2)?,
        user_id: row.get(3)?,
        start_time: parse_db_ts("start_time", &start_time)?,
        end_time: end_time.map(|s| parse_db_ts("end_time", &s)).transpose()?,
        charging_amount: row.get(6)?,
        charging_duration_hours: row.get(7)?,
        bill: BillBreakdown {
            peak_hours: row.get(8)?,
            normal_hours: row.get(9)?,
            valley_hours: row.get(10)?,
            peak_cost: row.get(11)?,
            normal_cost: row.get(12)?,
            valley_cost: row.get(13)?,
            service_cost: row.get(14)?,
            total_cost: row.get(15)?,
        },
        premature: row.get::<_, i32>(16)? != 0,
    })
}
