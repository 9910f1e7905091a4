// ==========================================
// 电动汽车充电调度系统 - 充电请求仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 说明: *_tx 关联函数在调用方事务内执行，
//       由调度引擎组合成单个工作单元
// ==========================================

use crate::db::{format_ts, open_sqlite_connection};
use crate::domain::request::ChargingRequest;
use crate::domain::types::{ChargingMode, QueueLevel, RequestStatus};
use crate::repository::error::{parse_db_enum, parse_db_ts, RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult};
use std::sync::{Arc, Mutex};

const REQUEST_COLUMNS: &str = r#"
    seq, request_id, queue_number, user_id, vehicle_id, charging_mode,
    requested_amount, battery_capacity, current_status, queue_level,
    external_queue_position, pile_queue_position, charging_pile_id,
    current_amount, estimated_wait_minutes, created_at, queue_entered_at,
    start_time, end_time
"#;

// ==========================================
// ChargingRequestRepository - 充电请求仓储
// ==========================================
/// 充电请求仓储
/// 职责: 管理 charging_request 表的读写与位置批量平移
pub struct ChargingRequestRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ChargingRequestRepository {
    /// 创建新的 ChargingRequestRepository 实例
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建仓储实例
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 只读查询（自带连接）
    // ==========================================

    pub fn find_by_id(&self, request_id: &str) -> RepositoryResult<Option<ChargingRequest>> {
        let conn = self.get_conn()?;
        Self::find_by_id_tx(&conn, request_id)
    }

    pub fn find_by_queue_number(&self, queue_number: &str) -> RepositoryResult<Option<ChargingRequest>> {
        let conn = self.get_conn()?;
        Self::find_by_queue_number_tx(&conn, queue_number)
    }

    /// 用户的全部请求（最新在前）
    pub fn list_by_user(&self, user_id: &str) -> RepositoryResult<Vec<ChargingRequest>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM charging_request WHERE user_id = ?1 ORDER BY created_at DESC, seq DESC",
            REQUEST_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![user_id], map_request_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn list_external(&self, mode: ChargingMode) -> RepositoryResult<Vec<ChargingRequest>> {
        let conn = self.get_conn()?;
        Self::list_external_tx(&conn, mode)
    }

    pub fn list_pile_queue(&self, pile_id: &str) -> RepositoryResult<Vec<ChargingRequest>> {
        let conn = self.get_conn()?;
        Self::list_pile_queue_tx(&conn, pile_id)
    }

    pub fn list_charging(&self) -> RepositoryResult<Vec<ChargingRequest>> {
        let conn = self.get_conn()?;
        Self::list_charging_tx(&conn, None)
    }

    // ==========================================
    // 事务内操作
    // ==========================================

    /// 插入请求，返回自增 seq
    pub fn insert_tx(conn: &Connection, req: &ChargingRequest) -> RepositoryResult<i64> {
        conn.execute(
            r#"
            INSERT INTO charging_request (
                request_id, queue_number, user_id, vehicle_id, charging_mode,
                requested_amount, battery_capacity, current_status, queue_level,
                external_queue_position, pile_queue_position, charging_pile_id,
                current_amount, estimated_wait_minutes, created_at, queue_entered_at,
                start_time, end_time
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
            "#,
            params![
                req.request_id,
                req.queue_number,
                req.user_id,
                req.vehicle_id,
                req.charging_mode.as_str(),
                req.requested_amount,
                req.battery_capacity,
                req.current_status.as_str(),
                req.queue_level.as_str(),
                req.external_queue_position,
                req.pile_queue_position,
                req.charging_pile_id,
                req.current_amount,
                req.estimated_wait_minutes,
                format_ts(&req.created_at),
                format_ts(&req.queue_entered_at),
                req.start_time.as_ref().map(format_ts),
                req.end_time.as_ref().map(format_ts),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// 写回请求的全部可变字段
    pub fn update_tx(conn: &Connection, req: &ChargingRequest) -> RepositoryResult<()> {
        let affected = conn.execute(
            r#"
            UPDATE charging_request SET
                queue_number = ?2,
                charging_mode = ?3,
                current_status = ?4,
                queue_level = ?5,
                external_queue_position = ?6,
                pile_queue_position = ?7,
                charging_pile_id = ?8,
                current_amount = ?9,
                estimated_wait_minutes = ?10,
                queue_entered_at = ?11,
                start_time = ?12,
                end_time = ?13
            WHERE request_id = ?1
            "#,
            params![
                req.request_id,
                req.queue_number,
                req.charging_mode.as_str(),
                req.current_status.as_str(),
                req.queue_level.as_str(),
                req.external_queue_position,
                req.pile_queue_position,
                req.charging_pile_id,
                req.current_amount,
                req.estimated_wait_minutes,
                format_ts(&req.queue_entered_at),
                req.start_time.as_ref().map(format_ts),
                req.end_time.as_ref().map(format_ts),
            ],
        )?;
        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "ChargingRequest".to_string(),
                id: req.request_id.clone(),
            });
        }
        Ok(())
    }

    pub fn find_by_id_tx(conn: &Connection, request_id: &str) -> RepositoryResult<Option<ChargingRequest>> {
        let sql = format!("SELECT {} FROM charging_request WHERE request_id = ?1", REQUEST_COLUMNS);
        Ok(conn.query_row(&sql, params![request_id], map_request_row).optional()?)
    }

    pub fn find_by_queue_number_tx(
        conn: &Connection,
        queue_number: &str,
    ) -> RepositoryResult<Option<ChargingRequest>> {
        let sql = format!("SELECT {} FROM charging_request WHERE queue_number = ?1", REQUEST_COLUMNS);
        Ok(conn.query_row(&sql, params![queue_number], map_request_row).optional()?)
    }

    /// 车辆当前的活跃请求（waiting / charging）
    pub fn find_active_by_vehicle_tx(
        conn: &Connection,
        vehicle_id: &str,
    ) -> RepositoryResult<Option<ChargingRequest>> {
        let sql = format!(
            "SELECT {} FROM charging_request WHERE vehicle_id = ?1 AND current_status IN ('waiting', 'charging') LIMIT 1",
            REQUEST_COLUMNS
        );
        Ok(conn.query_row(&sql, params![vehicle_id], map_request_row).optional()?)
    }

    // ===== 外部等候区 =====

    pub fn count_external_tx(conn: &Connection, mode: ChargingMode) -> RepositoryResult<i64> {
        let count = conn.query_row(
            "SELECT COUNT(*) FROM charging_request WHERE charging_mode = ?1 AND queue_level = 'external_waiting'",
            params![mode.as_str()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// 外部等候区（按位置升序）
    pub fn list_external_tx(conn: &Connection, mode: ChargingMode) -> RepositoryResult<Vec<ChargingRequest>> {
        let sql = format!(
            r#"
            SELECT {} FROM charging_request
            WHERE charging_mode = ?1 AND queue_level = 'external_waiting'
            ORDER BY external_queue_position ASC, seq ASC
            "#,
            REQUEST_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![mode.as_str()], map_request_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }

    /// 将位置 > after 的外部等候请求整体平移 delta
    pub fn shift_external_tx(
        conn: &Connection,
        mode: ChargingMode,
        after: i64,
        delta: i64,
    ) -> RepositoryResult<usize> {
        let affected = conn.execute(
            r#"
            UPDATE charging_request
            SET external_queue_position = external_queue_position + ?3
            WHERE charging_mode = ?1
              AND queue_level = 'external_waiting'
              AND external_queue_position > ?2
            "#,
            params![mode.as_str(), after, delta],
        )?;
        Ok(affected)
    }

    pub fn set_external_position_tx(conn: &Connection, request_id: &str, position: i64) -> RepositoryResult<()> {
        conn.execute(
            "UPDATE charging_request SET external_queue_position = ?2 WHERE request_id = ?1",
            params![request_id, position],
        )?;
        Ok(())
    }

    // ===== 桩队列 =====

    pub fn count_pile_queue_tx(conn: &Connection, pile_id: &str) -> RepositoryResult<i64> {
        let count = conn.query_row(
            "SELECT COUNT(*) FROM charging_request WHERE charging_pile_id = ?1 AND queue_level = 'pile_queue'",
            params![pile_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// 桩队列（按位置升序，不含充电中请求）
    pub fn list_pile_queue_tx(conn: &Connection, pile_id: &str) -> RepositoryResult<Vec<ChargingRequest>> {
        let sql = format!(
            r#"
            SELECT {} FROM charging_request
            WHERE charging_pile_id = ?1 AND queue_level = 'pile_queue'
            ORDER BY pile_queue_position ASC, seq ASC
            "#,
            REQUEST_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![pile_id], map_request_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }

    /// 将位置 > after 的桩队列请求整体平移 delta
    pub fn shift_pile_queue_tx(
        conn: &Connection,
        pile_id: &str,
        after: i64,
        delta: i64,
    ) -> RepositoryResult<usize> {
        let affected = conn.execute(
            r#"
            UPDATE charging_request
            SET pile_queue_position = pile_queue_position + ?3
            WHERE charging_pile_id = ?1
              AND queue_level = 'pile_queue'
              AND pile_queue_position > ?2
            "#,
            params![pile_id, after, delta],
        )?;
        Ok(affected)
    }

    pub fn set_pile_queue_position_tx(conn: &Connection, request_id: &str, position: i64) -> RepositoryResult<()> {
        conn.execute(
            "UPDATE charging_request SET pile_queue_position = ?2 WHERE request_id = ?1",
            params![request_id, position],
        )?;
        Ok(())
    }

    /// 某模式下所有桩队列中的请求（跨桩）
    pub fn list_pile_queued_by_mode_tx(
        conn: &Connection,
        mode: ChargingMode,
    ) -> RepositoryResult<Vec<ChargingRequest>> {
        let sql = format!(
            r#"
            SELECT {} FROM charging_request
            WHERE charging_mode = ?1 AND queue_level = 'pile_queue'
            ORDER BY charging_pile_id ASC, pile_queue_position ASC
            "#,
            REQUEST_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![mode.as_str()], map_request_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }

    // ===== 充电中 =====

    pub fn find_charging_on_pile_tx(conn: &Connection, pile_id: &str) -> RepositoryResult<Option<ChargingRequest>> {
        let sql = format!(
            "SELECT {} FROM charging_request WHERE charging_pile_id = ?1 AND queue_level = 'charging' LIMIT 1",
            REQUEST_COLUMNS
        );
        Ok(conn.query_row(&sql, params![pile_id], map_request_row).optional()?)
    }

    pub fn count_charging_on_pile_tx(conn: &Connection, pile_id: &str) -> RepositoryResult<i64> {
        let count = conn.query_row(
            "SELECT COUNT(*) FROM charging_request WHERE charging_pile_id = ?1 AND current_status = 'charging'",
            params![pile_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// 充电中请求（可按模式过滤）
    pub fn list_charging_tx(
        conn: &Connection,
        mode: Option<ChargingMode>,
    ) -> RepositoryResult<Vec<ChargingRequest>> {
        let sql = format!(
            r#"
            SELECT {} FROM charging_request
            WHERE queue_level = 'charging' AND (?1 IS NULL OR charging_mode = ?1)
            ORDER BY charging_pile_id ASC
            "#,
            REQUEST_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![mode.map(|m| m.as_str())], map_request_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }

    /// 更新预计等待时间
    pub fn update_estimate_tx(conn: &Connection, request_id: &str, minutes: i64) -> RepositoryResult<()> {
        conn.execute(
            "UPDATE charging_request SET estimated_wait_minutes = ?2 WHERE request_id = ?1",
            params![request_id, minutes],
        )?;
        Ok(())
    }

    /// 更新充电进度
    pub fn update_progress_tx(conn: &Connection, request_id: &str, current_amount: f64) -> RepositoryResult<()> {
        conn.execute(
            "UPDATE charging_request SET current_amount = ?2 WHERE request_id = ?1",
            params![request_id, current_amount],
        )?;
        Ok(())
    }
}

fn map_request_row(row: &rusqlite::Row<'_>) -> SqliteResult<ChargingRequest> {
    let mode: String = row.get(5)?;
    let status: String = row.get(8)?;
    let level: String = row.get(9)?;
    let created_at: String = row.get(15)?;
    let entered_at: String = row.get(16)?;
    let start_time: Option<String> = row.get(17)?;
    let end_time: Option<String> = row.get(18)?;

    Ok(ChargingRequest {
        seq: row.get(0)?,
        request_id: row.get(1)?,
        queue_number: row.get(2)?,
        user_id: row.get(3)?,
        vehicle_id: row.get(4)?,
        charging_mode: parse_db_enum("charging_mode", &mode, ChargingMode::from_db_str)?,
        requested_amount: row.get(6)?,
        battery_capacity: row.get(7)?,
        current_status: parse_db_enum("current_status", &status, RequestStatus::from_db_str)?,
        queue_level: parse_db_enum("queue_level", &level, QueueLevel::from_db_str)?,
        external_queue_position: row.get(10)?,
        pile_queue_position: row.get(11)?,
        charging_pile_id: row.get(12)?,
        current_amount: row.get(13)?,
        estimated_wait_minutes: row.get(14)?,
        created_at: parse_db_ts("created_at", &created_at)?,
        queue_entered_at: parse_db_ts("queue_entered_at", &entered_at)?,
        start_time: start_time.map(|s| parse_db_ts("start_time", &s)).transpose()?,
        end_time: end_time.map(|s| parse_db_ts("end_time", &s)).transpose()?,
    })
}
