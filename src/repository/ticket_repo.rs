// ==========================================
// 电动汽车充电调度系统 - 排队号序列
// ==========================================
// 每种模式一条序列，只在准入事务内递增
// ==========================================

use crate::domain::types::ChargingMode;
use crate::repository::error::RepositoryResult;
use rusqlite::{params, Connection};

pub struct TicketSequenceRepository;

impl TicketSequenceRepository {
    /// 取出并递增模式序列，返回本次分配的序号（从 1 开始）
    pub fn next_tx(conn: &Connection, mode: ChargingMode) -> RepositoryResult<i64> {
        conn.execute(
            "INSERT OR IGNORE INTO ticket_sequence (charging_mode, next_value) VALUES (?1, 1)",
            params![mode.as_str()],
        )?;
        let value: i64 = conn.query_row(
            "SELECT next_value FROM ticket_sequence WHERE charging_mode = ?1",
            params![mode.as_str()],
            |row| row.get(0),
        )?;
        conn.execute(
            "UPDATE ticket_sequence SET next_value = next_value + 1 WHERE charging_mode = ?1",
            params![mode.as_str()],
        )?;
        Ok(value)
    }
}
