// ==========================================
// 电动汽车充电调度系统 - 故障/恢复协调器
// ==========================================
// 状态机: normal ⇄ fault, normal ⇄ offline（offline 在调度上等同 fault）
// 故障: 中断充电（按实际电量结算）→ 收集桩队列 → 按策略回插外部等候区
//   - priority: 暂停叫号，原等候者整体后移 k 位，故障队列占据 1..k
//   - time_order: 与原等候者合并后按创建时间统一重排
// 恢复: 同模式其他桩仍有排队时统一重新调度，然后恢复叫号并补位
// ==========================================

use crate::domain::request::ChargingRequest;
use crate::domain::types::{
    ChargingMode, DispatchStrategy, NotificationType, PileStatus, QueueLevel, RequestStatus,
};
use crate::engine::context::{ScheduleContext, ScheduleRuntime};
use crate::engine::error::{ScheduleError, ScheduleResult};
use crate::engine::scheduler::CompletionKind;
use crate::repository::{ChargingPileRepository, ChargingRequestRepository};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{error, info, instrument};

/// 故障处理结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FaultReport {
    pub pile_id: String,
    /// 被中断的充电请求排队号
    pub interrupted: Option<String>,
    /// 回插到外部等候区的请求（按回插顺序）
    pub requeued: Vec<String>,
    pub strategy: Option<DispatchStrategy>,
}

/// 恢复处理结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecoveryReport {
    pub pile_id: String,
    /// 是否执行了统一重新调度
    pub rescheduled: bool,
    /// 被拉回外部等候区的请求数
    pub pulled_back: usize,
    /// 补位转入桩队列的请求数
    pub transferred: usize,
}

// ==========================================
// 工作单元内的故障/恢复处理
// ==========================================
impl ScheduleContext<'_> {
    /// 把桩队列请求退回外部等候区（位置由调用方设置）
    fn return_to_external(&self, mut request: ChargingRequest, position: i64) -> ScheduleResult<()> {
        request.queue_level = QueueLevel::ExternalWaiting;
        request.current_status = RequestStatus::Waiting;
        request.pile_queue_position = None;
        request.charging_pile_id = None;
        request.external_queue_position = Some(position);
        request.queue_entered_at = self.now;
        ChargingRequestRepository::update_tx(self.conn, &request)?;
        Ok(())
    }

    /// 外部等候区按创建时间（同刻按 seq）重新编号
    pub(crate) fn renumber_external_by_creation(&self, mode: ChargingMode) -> ScheduleResult<()> {
        let mut bucket = ChargingRequestRepository::list_external_tx(self.conn, mode)?;
        bucket.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.seq.cmp(&b.seq)));
        for (idx, r) in bucket.iter().enumerate() {
            let position = idx as i64 + 1;
            if r.external_queue_position != Some(position) {
                ChargingRequestRepository::set_external_position_tx(self.conn, &r.request_id, position)?;
            }
        }
        Ok(())
    }

    pub(crate) fn handle_pile_fault(&mut self, pile_id: &str) -> ScheduleResult<FaultReport> {
        let pile = ChargingPileRepository::find_by_id_tx(self.conn, pile_id)?
            .ok_or_else(|| ScheduleError::not_found("ChargingPile", pile_id))?;
        let mode = pile.pile_type;
        if pile.is_available() {
            ChargingPileRepository::set_status_tx(self.conn, pile_id, PileStatus::Fault)?;
        }
        let mut report = FaultReport {
            pile_id: pile_id.to_string(),
            ..FaultReport::default()
        };

        // (a) 中断充电
        if let Some(charging) = ChargingRequestRepository::find_charging_on_pile_tx(self.conn, pile_id)? {
            report.interrupted = Some(charging.queue_number.clone());
            self.finish_session(charging, CompletionKind::Fault)?;
        }
        if pile.is_working {
            ChargingPileRepository::set_working_tx(self.conn, pile_id, false)?;
        }

        // (b) 收集桩队列
        let collected = ChargingRequestRepository::list_pile_queue_tx(self.conn, pile_id)?;
        if !collected.is_empty() {
            let strategy = self.config.fault.dispatch_strategy;
            report.strategy = Some(strategy);
            let k = collected.len() as i64;

            match strategy {
                DispatchStrategy::Priority => {
                    let guard = self.pause(mode);
                    ChargingRequestRepository::shift_external_tx(self.conn, mode, 0, k)?;
                    for (idx, r) in collected.iter().enumerate() {
                        self.return_to_external(r.clone(), idx as i64 + 1)?;
                    }
                    guard.release();
                }
                DispatchStrategy::TimeOrder => {
                    let tail = ChargingRequestRepository::count_external_tx(self.conn, mode)?;
                    for (idx, r) in collected.iter().enumerate() {
                        self.return_to_external(r.clone(), tail + idx as i64 + 1)?;
                    }
                    self.renumber_external_by_creation(mode)?;
                }
            }

            let arrangement = match strategy {
                DispatchStrategy::Priority => "优先调度",
                DispatchStrategy::TimeOrder => "按提交时间重新排队",
            };
            for r in &collected {
                report.requeued.push(r.queue_number.clone());
                self.notify(
                    &r.user_id,
                    NotificationType::PileFault,
                    format!(
                        "充电桩 {} 发生故障，您的充电请求 {} 已调回等候区{}",
                        pile_id, r.queue_number, arrangement
                    ),
                )?;
            }

            info!(
                pile_id,
                strategy = %strategy,
                requeued = k,
                "故障桩队列已回插外部等候区"
            );
        }

        self.transfer_loop(mode)?;
        self.refresh_estimates(mode)?;
        Ok(report)
    }

    pub(crate) fn handle_pile_recovery(&mut self, pile_id: &str) -> ScheduleResult<RecoveryReport> {
        let pile = ChargingPileRepository::find_by_id_tx(self.conn, pile_id)?
            .ok_or_else(|| ScheduleError::not_found("ChargingPile", pile_id))?;
        let mode = pile.pile_type;
        if !pile.is_available() {
            ChargingPileRepository::set_status_tx(self.conn, pile_id, PileStatus::Normal)?;
        }
        let mut report = RecoveryReport {
            pile_id: pile_id.to_string(),
            ..RecoveryReport::default()
        };

        let queued = ChargingRequestRepository::list_pile_queued_by_mode_tx(self.conn, mode)?;
        let siblings_busy = queued
            .iter()
            .any(|r| r.charging_pile_id.as_deref() != Some(pile_id));

        if siblings_busy && self.config.fault.recovery_reschedule_enabled {
            let guard = self.pause(mode);
            let tail = ChargingRequestRepository::count_external_tx(self.conn, mode)?;
            for (idx, r) in queued.iter().enumerate() {
                self.return_to_external(r.clone(), tail + idx as i64 + 1)?;
            }
            self.renumber_external_by_creation(mode)?;
            guard.release();

            report.rescheduled = true;
            report.pulled_back = queued.len();
            info!(pile_id, mode = %mode, pulled_back = queued.len(), "恢复后统一重新调度");
        }

        // 无论是否重新调度，都恢复叫号并补位
        self.resume(mode);
        self.promote_pile_head(pile_id)?;
        report.transferred = self.transfer_loop(mode)?;
        self.refresh_estimates(mode)?;
        Ok(report)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PileTransition {
    Fault,
    Recovery,
}

// ==========================================
// FaultCoordinator - 故障/恢复协调器
// ==========================================
pub struct FaultCoordinator {
    runtime: Arc<ScheduleRuntime>,
    /// 已处理的最后状态（按桩）
    observed: Mutex<HashMap<String, PileStatus>>,
}

impl FaultCoordinator {
    pub fn new(runtime: Arc<ScheduleRuntime>) -> Self {
        Self {
            runtime,
            observed: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_paused(&self, mode: ChargingMode) -> bool {
        self.runtime.pauses().is_paused(mode)
    }

    /// 处理充电桩故障（同步）
    #[instrument(skip(self))]
    pub fn handle_pile_fault(&self, pile_id: &str) -> ScheduleResult<FaultReport> {
        let mode = self.mode_of(pile_id)?;
        self.runtime
            .run_unit("handle_pile_fault", &[mode], |ctx| ctx.handle_pile_fault(pile_id))
    }

    /// 处理充电桩恢复（同步）
    #[instrument(skip(self))]
    pub fn handle_pile_recovery(&self, pile_id: &str) -> ScheduleResult<RecoveryReport> {
        let mode = self.mode_of(pile_id)?;
        self.runtime
            .run_unit("handle_pile_recovery", &[mode], |ctx| ctx.handle_pile_recovery(pile_id))
    }

    /// 管理端设置充电桩状态并立即执行对应处理
    pub fn set_pile_status(&self, pile_id: &str, status: PileStatus) -> ScheduleResult<()> {
        let previous = self.runtime.read(|conn| {
            let pile = ChargingPileRepository::find_by_id_tx(conn, pile_id)?
                .ok_or_else(|| ScheduleError::not_found("ChargingPile", pile_id))?;
            ChargingPileRepository::set_status_tx(conn, pile_id, status)?;
            Ok(pile.status)
        })?;
        info!(pile_id, from = %previous, to = %status, "充电桩状态已设置");
        self.observe(pile_id, status, Some(previous))
    }

    /// 对比上次处理的状态并执行故障/恢复处理
    ///
    /// # 参数
    /// - fallback_previous: 缓存中尚无该桩时作为上次状态；
    ///   两者都没有时，已故障且仍有活跃请求视为需要处理
    ///
    /// # 说明
    /// - 处理失败时不更新缓存，下次轮询重试
    /// - fault_detection_enabled=false 时只更新缓存
    pub fn observe(
        &self,
        pile_id: &str,
        status: PileStatus,
        fallback_previous: Option<PileStatus>,
    ) -> ScheduleResult<()> {
        let previous = self.last_observed(pile_id)?.or(fallback_previous);
        let detection_enabled = self.runtime.load_snapshot()?.fault.fault_detection_enabled;

        let transition = match previous {
            Some(prev) if prev.is_available() && !status.is_available() => Some(PileTransition::Fault),
            Some(prev) if !prev.is_available() && status.is_available() => Some(PileTransition::Recovery),
            None if !status.is_available() && self.has_active_requests(pile_id)? => {
                Some(PileTransition::Fault)
            }
            _ => None,
        };

        if detection_enabled {
            let outcome = match transition {
                Some(PileTransition::Fault) => self.handle_pile_fault(pile_id).map(|_| ()),
                Some(PileTransition::Recovery) => self.handle_pile_recovery(pile_id).map(|_| ()),
                None => Ok(()),
            };
            if let Err(e) = outcome {
                error!(pile_id, status = %status, error = %e, "故障/恢复处理失败，等待下次轮询重试");
                return Err(e);
            }
        }

        self.record(pile_id, status)
    }

    fn last_observed(&self, pile_id: &str) -> ScheduleResult<Option<PileStatus>> {
        let observed = self
            .observed
            .lock()
            .map_err(|e| ScheduleError::ConcurrencyConflict(e.to_string()))?;
        Ok(observed.get(pile_id).copied())
    }

    fn record(&self, pile_id: &str, status: PileStatus) -> ScheduleResult<()> {
        let mut observed = self
            .observed
            .lock()
            .map_err(|e| ScheduleError::ConcurrencyConflict(e.to_string()))?;
        observed.insert(pile_id.to_string(), status);
        Ok(())
    }

    fn has_active_requests(&self, pile_id: &str) -> ScheduleResult<bool> {
        self.runtime.read(|conn| {
            let charging = ChargingRequestRepository::count_charging_on_pile_tx(conn, pile_id)?;
            let queued = ChargingRequestRepository::count_pile_queue_tx(conn, pile_id)?;
            Ok(charging + queued > 0)
        })
    }

    fn mode_of(&self, pile_id: &str) -> ScheduleResult<ChargingMode> {
        self.runtime.read(|conn| {
            ChargingPileRepository::find_by_id_tx(conn, pile_id)?
                .map(|p| p.pile_type)
                .ok_or_else(|| ScheduleError::not_found("ChargingPile", pile_id))
        })
    }
}
