// ==========================================
// 电动汽车充电调度系统 - 充电桩仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::pile::{ChargingPile, PileStatistics};
use crate::domain::types::{ChargingMode, PileStatus};
use crate::repository::error::{parse_db_enum, RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult};
use std::sync::{Arc, Mutex};

const PILE_COLUMNS: &str = r#"
    pile_id, pile_type, status, is_working, power_kw, max_queue_size,
    estimated_remaining_minutes, total_charging_count,
    total_charging_duration_hours, total_charging_amount, total_revenue
"#;

// ==========================================
// ChargingPileRepository - 充电桩仓储
// ==========================================
/// 充电桩仓储
/// 职责: 管理 charging_pile 表（状态、工作标志、剩余时间缓存、累计统计）
pub struct ChargingPileRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ChargingPileRepository {
    /// 创建新的 ChargingPileRepository 实例
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

    /// 注册充电桩（已存在则覆盖静态属性，保留状态与统计）
    pub fn register(&self, pile: &ChargingPile) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO charging_pile (pile_id, pile_type, status, is_working, power_kw, max_queue_size)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(pile_id) DO UPDATE SET
                pile_type = excluded.pile_type,
                power_kw = excluded.power_kw,
                max_queue_size = excluded.max_queue_size
            "#,
            params![
                pile.pile_id,
                pile.pile_type.as_str(),
                pile.status.as_str(),
                pile.is_working as i32,
                pile.power_kw,
                pile.max_queue_size,
            ],
        )?;
        tracing::debug!(pile_id = %pile.pile_id, pile_type = %pile.pile_type, "充电桩已注册");
        Ok(())
    }

    pub fn find_by_id(&self, pile_id: &str) -> RepositoryResult<Option<ChargingPile>> {
        let conn = self.get_conn()?;
        Self::find_by_id_tx(&conn, pile_id)
    }

    pub fn list_all(&self) -> RepositoryResult<Vec<ChargingPile>> {
        let conn = self.get_conn()?;
        Self::list_all_tx(&conn)
    }

    pub fn list_by_mode(&self, mode: ChargingMode) -> RepositoryResult<Vec<ChargingPile>> {
        let conn = self.get_conn()?;
        Self::list_by_mode_tx(&conn, mode)
    }

    // ==========================================
    // 事务内操作
    // ==========================================

    pub fn find_by_id_tx(conn: &Connection, pile_id: &str) -> RepositoryResult<Option<ChargingPile>> {
        let sql = format!("SELECT {} FROM charging_pile WHERE pile_id = ?1", PILE_COLUMNS);
        Ok(conn.query_row(&sql, params![pile_id], map_pile_row).optional()?)
    }

    pub fn list_all_tx(conn: &Connection) -> RepositoryResult<Vec<ChargingPile>> {
        let sql = format!("SELECT {} FROM charging_pile ORDER BY pile_id ASC", PILE_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], map_pile_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }

    /// 某模式下全部充电桩（按编号升序）
    pub fn list_by_mode_tx(conn: &Connection, mode: ChargingMode) -> RepositoryResult<Vec<ChargingPile>> {
        let sql = format!(
            "SELECT {} FROM charging_pile WHERE pile_type = ?1 ORDER BY pile_id ASC",
            PILE_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![mode.as_str()], map_pile_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn set_status_tx(conn: &Connection, pile_id: &str, status: PileStatus) -> RepositoryResult<()> {
        let affected = conn.execute(
            "UPDATE charging_pile SET status = ?2 WHERE pile_id = ?1",
            params![pile_id, status.as_str()],
        )?;
        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "ChargingPile".to_string(),
                id: pile_id.to_string(),
            });
        }
        Ok(())
    }

    pub fn set_working_tx(conn: &Connection, pile_id: &str, is_working: bool) -> RepositoryResult<()> {
        conn.execute(
            "UPDATE charging_pile SET is_working = ?2 WHERE pile_id = ?1",
            params![pile_id, is_working as i32],
        )?;
        Ok(())
    }

    /// 写入剩余时间缓存（分钟）
    pub fn set_remaining_minutes_tx(conn: &Connection, pile_id: &str, minutes: i64) -> RepositoryResult<()> {
        conn.execute(
            "UPDATE charging_pile SET estimated_remaining_minutes = ?2 WHERE pile_id = ?1",
            params![pile_id, minutes],
        )?;
        Ok(())
    }

    /// 会话结束后累加统计
    pub fn add_statistics_tx(
        conn: &Connection,
        pile_id: &str,
        duration_hours: f64,
        amount: f64,
        revenue: f64,
    ) -> RepositoryResult<()> {
        conn.execute(
            r#"
            UPDATE charging_pile SET
                total_charging_count = total_charging_count + 1,
                total_charging_duration_hours = total_charging_duration_hours + ?2,
                total_charging_amount = total_charging_amount + ?3,
                total_revenue = total_revenue + ?4
            WHERE pile_id = ?1
            "#,
            params![pile_id, duration_hours, amount, revenue],
        )?;
        Ok(())
    }
}

fn map_pile_row(row: &rusqlite::Row<'_>) -> SqliteResult<ChargingPile> {
    let pile_type: String = row.get(1)?;
    let status: String = row.get(2)?;
    Ok(ChargingPile {
        pile_id: row.get(0)?,
        pile_type: parse_db_enum("pile_type", &pile_type, ChargingMode::from_db_str)?,
        status: parse_db_enum("status", &status, PileStatus::from_db_str)?,
        is_working: row.get::<_, i32>(3)? != 0,
        power_kw: row.get(4)?,
        max_queue_size: row.get(5)?,
        estimated_remaining_minutes: row.get(6)?,
        statistics: PileStatistics {
            total_charging_count: row.get(7)?,
            total_charging_duration_hours: row.get(8)?,
            total_charging_amount: row.get(9)?,
            total_revenue: row.get(10)?,
        },
    })
}
