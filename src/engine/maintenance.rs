// ==========================================
// 电动汽车充电调度系统 - 队列一致性检查与修复
// ==========================================
// 检查: 外部等候区/桩队列位置连续 1..N、层级与位置字段一致、
//       每桩最多一个充电中请求且 is_working 与之一致
// 修复: 按现有位置（同位置按 seq）重新编号，校正 is_working
// ==========================================

use crate::domain::request::ChargingRequest;
use crate::domain::types::{ChargingMode, QueueLevel};
use crate::engine::context::{ScheduleContext, ScheduleRuntime};
use crate::engine::error::ScheduleResult;
use crate::repository::{ChargingPileRepository, ChargingRequestRepository};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// 一致性问题
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConsistencyIssue {
    /// 位置不连续或重复
    PositionGap {
        bucket: String,
        expected: Vec<i64>,
        actual: Vec<Option<i64>>,
    },
    /// 层级与位置字段不一致
    LevelMismatch { ticket: String, level: QueueLevel },
    /// 一个桩上有多个充电中请求
    MultipleCharging { pile_id: String, count: usize },
    /// is_working 与充电中请求不一致
    WorkingFlagMismatch { pile_id: String, is_working: bool, charging: usize },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyReport {
    pub mode: Option<ChargingMode>,
    pub issues: Vec<ConsistencyIssue>,
    /// 修复时实际改写的记录数
    pub repaired: usize,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.issues.is_empty()
    }
}

fn position_issue(
    bucket: String,
    requests: &[ChargingRequest],
    position: impl Fn(&ChargingRequest) -> Option<i64>,
) -> Option<ConsistencyIssue> {
    let actual: Vec<Option<i64>> = requests.iter().map(&position).collect();
    let expected: Vec<i64> = (1..=requests.len() as i64).collect();
    let ok = actual
        .iter()
        .zip(expected.iter())
        .all(|(a, e)| *a == Some(*e));
    if ok {
        None
    } else {
        Some(ConsistencyIssue::PositionGap {
            bucket,
            expected,
            actual,
        })
    }
}

/// 检查某模式的全部队列
pub(crate) fn check_mode(conn: &Connection, mode: ChargingMode) -> ScheduleResult<Vec<ConsistencyIssue>> {
    let mut issues = Vec::new();

    let external = ChargingRequestRepository::list_external_tx(conn, mode)?;
    for r in &external {
        if r.external_queue_position.is_none() || r.pile_queue_position.is_some() || r.charging_pile_id.is_some() {
            issues.push(ConsistencyIssue::LevelMismatch {
                ticket: r.queue_number.clone(),
                level: r.queue_level,
            });
        }
    }
    issues.extend(position_issue(format!("{}:external", mode), &external, |r| {
        r.external_queue_position
    }));

    for pile in ChargingPileRepository::list_by_mode_tx(conn, mode)? {
        let queue = ChargingRequestRepository::list_pile_queue_tx(conn, &pile.pile_id)?;
        for r in &queue {
            if r.pile_queue_position.is_none() || r.external_queue_position.is_some() {
                issues.push(ConsistencyIssue::LevelMismatch {
                    ticket: r.queue_number.clone(),
                    level: r.queue_level,
                });
            }
        }
        issues.extend(position_issue(pile.pile_id.clone(), &queue, |r| r.pile_queue_position));

        let charging = ChargingRequestRepository::count_charging_on_pile_tx(conn, &pile.pile_id)? as usize;
        if charging > 1 {
            issues.push(ConsistencyIssue::MultipleCharging {
                pile_id: pile.pile_id.clone(),
                count: charging,
            });
        }
        if pile.is_working != (charging > 0) {
            issues.push(ConsistencyIssue::WorkingFlagMismatch {
                pile_id: pile.pile_id.clone(),
                is_working: pile.is_working,
                charging,
            });
        }
    }

    for r in ChargingRequestRepository::list_charging_tx(conn, Some(mode))? {
        if r.external_queue_position.is_some() || r.pile_queue_position.is_some() {
            issues.push(ConsistencyIssue::LevelMismatch {
                ticket: r.queue_number.clone(),
                level: r.queue_level,
            });
        }
    }
    Ok(issues)
}

impl ScheduleContext<'_> {
    /// 重新编号某模式的外部等候区与各桩队列，返回改写的记录数
    pub(crate) fn repair_positions(&self, mode: ChargingMode) -> ScheduleResult<usize> {
        let mut repaired = 0;

        // list_* 已按 (position, seq) 排序，空位置排在最前
        let external = ChargingRequestRepository::list_external_tx(self.conn, mode)?;
        for (idx, r) in external.iter().enumerate() {
            let position = idx as i64 + 1;
            if r.external_queue_position != Some(position) || r.pile_queue_position.is_some() {
                let mut fixed = r.clone();
                fixed.external_queue_position = Some(position);
                fixed.pile_queue_position = None;
                fixed.charging_pile_id = None;
                ChargingRequestRepository::update_tx(self.conn, &fixed)?;
                repaired += 1;
            }
        }

        for pile in ChargingPileRepository::list_by_mode_tx(self.conn, mode)? {
            let queue = ChargingRequestRepository::list_pile_queue_tx(self.conn, &pile.pile_id)?;
            for (idx, r) in queue.iter().enumerate() {
                let position = idx as i64 + 1;
                if r.pile_queue_position != Some(position) || r.external_queue_position.is_some() {
                    let mut fixed = r.clone();
                    fixed.pile_queue_position = Some(position);
                    fixed.external_queue_position = None;
                    ChargingRequestRepository::update_tx(self.conn, &fixed)?;
                    repaired += 1;
                }
            }

            let charging = ChargingRequestRepository::count_charging_on_pile_tx(self.conn, &pile.pile_id)?;
            if pile.is_working != (charging > 0) {
                ChargingPileRepository::set_working_tx(self.conn, &pile.pile_id, charging > 0)?;
                repaired += 1;
            }
        }
        Ok(repaired)
    }
}

// ==========================================
// QueueMaintenance
// ==========================================
pub struct QueueMaintenance {
    runtime: Arc<ScheduleRuntime>,
}

impl QueueMaintenance {
    pub fn new(runtime: Arc<ScheduleRuntime>) -> Self {
        Self { runtime }
    }

    /// 只读检查
    pub fn check(&self, mode: ChargingMode) -> ScheduleResult<ConsistencyReport> {
        let issues = self.runtime.read(|conn| check_mode(conn, mode))?;
        if !issues.is_empty() {
            warn!(mode = %mode, issues = issues.len(), "队列一致性检查发现问题");
        }
        Ok(ConsistencyReport {
            mode: Some(mode),
            issues,
            repaired: 0,
        })
    }

    /// 检查并修复，返回修复前发现的问题
    pub fn repair(&self, mode: ChargingMode) -> ScheduleResult<ConsistencyReport> {
        self.runtime.run_unit("repair_queue_positions", &[mode], |ctx| {
            let issues = check_mode(ctx.conn, mode)?;
            let repaired = if issues.is_empty() {
                0
            } else {
                let n = ctx.repair_positions(mode)?;
                ctx.refresh_estimates(mode)?;
                n
            };
            info!(mode = %mode, issues = issues.len(), repaired, "队列位置修复完成");
            Ok(ConsistencyReport {
                mode: Some(mode),
                issues,
                repaired,
            })
        })
    }
}
