// ==========================================
// 电动汽车充电调度系统 - 队列调度器
// ==========================================
// 职责: 队列层级转移、容量准入、位置维护、充电开始/结束
// 红线: Engine 不拼 SQL，所有持久化经由 Repository
// ==========================================
// 层级: 外部等候区 → 桩队列 → 充电中 → 已结束
// 不变量（每个操作结束后成立）:
// - 每辆车最多一个 waiting/charging 请求
// - 每个 (模式, 外部等候区) 与每个桩队列的位置均为连续 1..N
// - 每个桩最多一个充电中请求，is_working 与之一致
// - queue_level 与两个位置字段一致
// ==========================================

use crate::domain::pile::ChargingPile;
use crate::domain::request::{format_queue_number, ChargingRequest, NewChargingRequest};
use crate::domain::session::ChargingSession;
use crate::domain::types::{ChargingMode, NotificationType, QueueLevel, RequestStatus};
use crate::engine::billing::{duration_hours, round_money};
use crate::engine::context::{ScheduleContext, ScheduleRuntime};
use crate::engine::directory::VehicleDirectory;
use crate::engine::error::{ScheduleError, ScheduleResult};
use crate::engine::estimator::select_best_pile;
use crate::repository::{
    ChargingPileRepository, ChargingRequestRepository, ChargingSessionRepository,
    RepositoryError, TicketSequenceRepository,
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

// ==========================================
// 结束方式
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionKind {
    /// 正常完成，按请求电量计费
    Normal,
    /// 充电桩故障中断，按实际电量计费
    Fault,
    /// 超过单次最大充电时长，按实际电量计费
    TimeLimit,
}

impl CompletionKind {
    fn is_premature(&self) -> bool {
        !matches!(self, CompletionKind::Normal)
    }
}

/// 充电进度推进结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressReport {
    pub updated: usize,
    pub completed: Vec<String>,
}

// ==========================================
// 工作单元内的调度原语
// ==========================================
impl ScheduleContext<'_> {
    /// 进入外部等候区（并立即尝试转入桩队列）
    pub(crate) fn admit(
        &mut self,
        input: &NewChargingRequest,
        vehicle_id: String,
    ) -> ScheduleResult<ChargingRequest> {
        let mode = input.charging_mode;

        if let Some(active) = ChargingRequestRepository::find_active_by_vehicle_tx(self.conn, &vehicle_id)? {
            debug!(vehicle_id = %vehicle_id, existing = %active.queue_number, "车辆已有活跃请求");
            return Err(ScheduleError::DuplicateActiveRequest { vehicle_id });
        }

        let limit = self.config.queue.external_waiting_area_size;
        let waiting = ChargingRequestRepository::count_external_tx(self.conn, mode)?;
        if waiting >= limit {
            return Err(ScheduleError::CapacityExceeded { mode, limit });
        }

        let seq = TicketSequenceRepository::next_tx(self.conn, mode)?;
        let mut request = ChargingRequest::new(input, vehicle_id, format_queue_number(mode, seq), self.now);
        request.external_queue_position = Some(waiting + 1);

        request.seq = match ChargingRequestRepository::insert_tx(self.conn, &request) {
            Ok(seq) => seq,
            Err(RepositoryError::UniqueConstraintViolation(msg)) if msg.contains("vehicle_id") => {
                return Err(ScheduleError::DuplicateActiveRequest {
                    vehicle_id: request.vehicle_id,
                })
            }
            Err(e) => return Err(e.into()),
        };

        info!(
            ticket = %request.queue_number,
            mode = %mode,
            position = waiting + 1,
            "请求进入外部等候区"
        );

        self.try_transfer(&request.request_id)?;
        self.load_request(&request.request_id)
    }

    /// 尝试把外部等候请求转入最优桩队列
    ///
    /// # 返回
    /// - false: 不在外部等候区 / 该模式暂停叫号 / 无可用桩
    pub(crate) fn try_transfer(&mut self, request_id: &str) -> ScheduleResult<bool> {
        let mut request = self.load_request(request_id)?;
        if request.queue_level != QueueLevel::ExternalWaiting {
            return Ok(false);
        }
        let mode = request.charging_mode;
        if self.is_paused(mode) {
            debug!(mode = %mode, ticket = %request.queue_number, "叫号暂停中，跳过转移");
            return Ok(false);
        }

        let loads = self.pile_loads(mode)?;
        let Some(target) = select_best_pile(&loads) else {
            return Ok(false);
        };
        let pile = target.pile.clone();
        let position = target.queue.len() as i64 + 1;

        let old_position = request.external_queue_position.unwrap_or(0);
        request.queue_level = QueueLevel::PileQueue;
        request.external_queue_position = None;
        request.pile_queue_position = Some(position);
        request.charging_pile_id = Some(pile.pile_id.clone());
        request.queue_entered_at = self.now;
        ChargingRequestRepository::update_tx(self.conn, &request)?;
        ChargingRequestRepository::shift_external_tx(self.conn, mode, old_position, -1)?;

        info!(
            ticket = %request.queue_number,
            pile_id = %pile.pile_id,
            position,
            "请求转入桩队列"
        );
        self.notify(
            &request.user_id,
            NotificationType::QueueTransfer,
            format!(
                "您的充电请求 {} 已进入充电桩 {} 的队列，排队位置 {}",
                request.queue_number, pile.pile_id, position
            ),
        )?;

        if position == 1 && !pile.is_working {
            self.start_charging(request, &pile)?;
        }
        Ok(true)
    }

    /// 桩队列首位开始充电
    pub(crate) fn start_charging(
        &mut self,
        mut request: ChargingRequest,
        pile: &ChargingPile,
    ) -> ScheduleResult<()> {
        if request.queue_level != QueueLevel::PileQueue {
            return Err(ScheduleError::transition(request.queue_level, QueueLevel::Charging));
        }
        let old_position = request.pile_queue_position.unwrap_or(0);

        request.queue_level = QueueLevel::Charging;
        request.current_status = RequestStatus::Charging;
        request.pile_queue_position = None;
        request.start_time = Some(self.now);
        request.estimated_wait_minutes = 0;
        ChargingRequestRepository::update_tx(self.conn, &request)?;
        ChargingRequestRepository::shift_pile_queue_tx(self.conn, &pile.pile_id, old_position, -1)?;
        ChargingPileRepository::set_working_tx(self.conn, &pile.pile_id, true)?;

        let session = ChargingSession::start(&request.request_id, &pile.pile_id, &request.user_id, self.now);
        ChargingSessionRepository::insert_tx(self.conn, &session)?;

        info!(ticket = %request.queue_number, pile_id = %pile.pile_id, "开始充电");
        self.notify(
            &request.user_id,
            NotificationType::ChargingStart,
            format!(
                "您的充电请求 {} 已在充电桩 {} 开始充电",
                request.queue_number, pile.pile_id
            ),
        )
    }

    /// 结束充电中的请求: 结算会话、累计桩统计、释放充电桩
    ///
    /// 不负责叫下一位，由调用方决定
    pub(crate) fn finish_session(
        &mut self,
        mut request: ChargingRequest,
        kind: CompletionKind,
    ) -> ScheduleResult<ChargingSession> {
        if request.current_status != RequestStatus::Charging {
            return Err(ScheduleError::transition(request.current_status, RequestStatus::Completed));
        }
        let pile_id = request
            .charging_pile_id
            .clone()
            .ok_or_else(|| ScheduleError::not_found("ChargingPile", "<none>"))?;
        let mut session = ChargingSessionRepository::find_by_request_tx(self.conn, &request.request_id)?
            .ok_or_else(|| ScheduleError::not_found("ChargingSession", request.request_id.clone()))?;

        let billed_amount = match kind {
            CompletionKind::Normal => request.requested_amount,
            CompletionKind::Fault | CompletionKind::TimeLimit => {
                self.charged_until_now(&request, &pile_id, session.start_time)?
            }
        };

        request.current_amount = billed_amount;
        request.current_status = RequestStatus::Completed;
        request.queue_level = QueueLevel::Completed;
        request.external_queue_position = None;
        request.pile_queue_position = None;
        request.estimated_wait_minutes = 0;
        request.end_time = Some(self.now);
        ChargingRequestRepository::update_tx(self.conn, &request)?;

        let start = session.start_time;
        session.end_time = Some(self.now);
        session.charging_amount = billed_amount;
        session.charging_duration_hours = duration_hours(start, self.now);
        session.bill = self.billing().calculate(start, self.now, billed_amount);
        session.premature = kind.is_premature();
        ChargingSessionRepository::finalize_tx(self.conn, &session)?;

        ChargingPileRepository::set_working_tx(self.conn, &pile_id, false)?;
        ChargingPileRepository::add_statistics_tx(
            self.conn,
            &pile_id,
            session.charging_duration_hours,
            session.charging_amount,
            session.bill.total_cost,
        )?;

        info!(
            ticket = %request.queue_number,
            pile_id = %pile_id,
            amount = billed_amount,
            total_cost = session.bill.total_cost,
            premature = session.premature,
            "充电结束"
        );

        let (kind_type, text) = match kind {
            CompletionKind::Fault => (
                NotificationType::PileFault,
                format!(
                    "充电桩 {} 发生故障，您的充电请求 {} 已提前结束，共充电 {:.2} kWh，费用 {:.2} 元",
                    pile_id,
                    request.queue_number,
                    billed_amount,
                    round_money(session.bill.total_cost)
                ),
            ),
            _ => (
                NotificationType::ChargingComplete,
                format!(
                    "您的充电请求 {} 已完成，共充电 {:.2} kWh，总费用 {:.2} 元",
                    request.queue_number,
                    billed_amount,
                    round_money(session.bill.total_cost)
                ),
            ),
        };
        self.notify(&request.user_id, kind_type, text)?;
        Ok(session)
    }

    /// 正常结束充电: 结算、叫下一位、重新估算、外部等候区补位
    pub(crate) fn complete_charging(
        &mut self,
        request: ChargingRequest,
        kind: CompletionKind,
    ) -> ScheduleResult<ChargingSession> {
        let mode = request.charging_mode;
        let pile_id = request.charging_pile_id.clone();
        let session = self.finish_session(request, kind)?;

        if let Some(pile_id) = pile_id {
            self.promote_pile_head(&pile_id)?;
        }
        self.refresh_estimates(mode)?;
        self.transfer_loop(mode)?;
        Ok(session)
    }

    /// 空闲且状态正常的桩: 队首开始充电
    pub(crate) fn promote_pile_head(&mut self, pile_id: &str) -> ScheduleResult<bool> {
        let pile = ChargingPileRepository::find_by_id_tx(self.conn, pile_id)?
            .ok_or_else(|| ScheduleError::not_found("ChargingPile", pile_id))?;
        if pile.is_working || !pile.is_available() {
            return Ok(false);
        }
        let head = ChargingRequestRepository::list_pile_queue_tx(self.conn, pile_id)?
            .into_iter()
            .next();
        match head {
            Some(next) => {
                self.start_charging(next, &pile)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// 按外部等候区顺序逐个转移，首次失败即停止
    pub(crate) fn transfer_loop(&mut self, mode: ChargingMode) -> ScheduleResult<usize> {
        let mut moved = 0;
        loop {
            let head = ChargingRequestRepository::list_external_tx(self.conn, mode)?
                .into_iter()
                .next();
            let Some(head) = head else { break };
            if !self.try_transfer(&head.request_id)? {
                break;
            }
            moved += 1;
        }
        if moved > 0 {
            debug!(mode = %mode, moved, "外部等候区补位完成");
        }
        Ok(moved)
    }

    /// 取消等待中的请求
    pub(crate) fn cancel(&mut self, mut request: ChargingRequest) -> ScheduleResult<ChargingRequest> {
        let mode = request.charging_mode;
        match request.queue_level {
            QueueLevel::ExternalWaiting => {
                let old = request.external_queue_position.unwrap_or(0);
                request.external_queue_position = None;
                request.queue_level = QueueLevel::Completed;
                request.current_status = RequestStatus::Cancelled;
                request.estimated_wait_minutes = 0;
                request.end_time = Some(self.now);
                ChargingRequestRepository::update_tx(self.conn, &request)?;
                ChargingRequestRepository::shift_external_tx(self.conn, mode, old, -1)?;
            }
            QueueLevel::PileQueue => {
                let old = request.pile_queue_position.unwrap_or(0);
                let pile_id = request.charging_pile_id.clone().unwrap_or_default();
                request.pile_queue_position = None;
                request.queue_level = QueueLevel::Completed;
                request.current_status = RequestStatus::Cancelled;
                request.estimated_wait_minutes = 0;
                request.end_time = Some(self.now);
                ChargingRequestRepository::update_tx(self.conn, &request)?;
                ChargingRequestRepository::shift_pile_queue_tx(self.conn, &pile_id, old, -1)?;
                // 桩队列腾出空位
                self.promote_pile_head(&pile_id)?;
                self.transfer_loop(mode)?;
            }
            QueueLevel::Charging | QueueLevel::Completed => {
                return Err(ScheduleError::transition(request.current_status, RequestStatus::Cancelled));
            }
        }
        info!(ticket = %request.queue_number, mode = %mode, "请求已取消");
        Ok(request)
    }

    /// 外部等候区内切换充电模式: 以新排队号排到新模式队尾
    pub(crate) fn change_mode(
        &mut self,
        mut request: ChargingRequest,
        new_mode: ChargingMode,
    ) -> ScheduleResult<ChargingRequest> {
        if request.queue_level != QueueLevel::ExternalWaiting {
            return Err(ScheduleError::transition(request.queue_level, "change_mode"));
        }
        let old_mode = request.charging_mode;
        if old_mode == new_mode {
            return Ok(request);
        }

        let limit = self.config.queue.external_waiting_area_size;
        let waiting = ChargingRequestRepository::count_external_tx(self.conn, new_mode)?;
        if waiting >= limit {
            return Err(ScheduleError::CapacityExceeded { mode: new_mode, limit });
        }

        let old_ticket = request.queue_number.clone();
        let old_position = request.external_queue_position.unwrap_or(0);
        let seq = TicketSequenceRepository::next_tx(self.conn, new_mode)?;

        request.charging_mode = new_mode;
        request.queue_number = format_queue_number(new_mode, seq);
        request.external_queue_position = Some(waiting + 1);
        request.queue_entered_at = self.now;
        ChargingRequestRepository::update_tx(self.conn, &request)?;
        ChargingRequestRepository::shift_external_tx(self.conn, old_mode, old_position, -1)?;

        info!(
            old_ticket = %old_ticket,
            new_ticket = %request.queue_number,
            from = %old_mode,
            to = %new_mode,
            "充电模式已变更"
        );
        self.notify(
            &request.user_id,
            NotificationType::ChargingModeChange,
            format!(
                "您的充电请求已从 {} 改为 {}，新排队号 {}",
                old_mode, new_mode, request.queue_number
            ),
        )?;

        self.try_transfer(&request.request_id)?;
        self.load_request(&request.request_id)
    }

    /// 推进某模式全部充电中请求的进度，达到目标或超时的自动结束
    /// 按已充时长与桩功率计算截至当前的实充电量（不超过请求电量）
    ///
    /// 进度只在轮询时落库，提前结束时以此为准
    fn charged_until_now(
        &self,
        request: &ChargingRequest,
        pile_id: &str,
        start: NaiveDateTime,
    ) -> ScheduleResult<f64> {
        let pile = ChargingPileRepository::find_by_id_tx(self.conn, pile_id)?
            .ok_or_else(|| ScheduleError::not_found("ChargingPile", pile_id))?;
        let charged = round_money(duration_hours(start, self.now) * pile.power_kw);
        Ok(charged
            .max(request.current_amount)
            .min(request.requested_amount))
    }

    pub(crate) fn advance_progress(&mut self, mode: ChargingMode) -> ScheduleResult<ProgressReport> {
        let mut report = ProgressReport::default();
        let max_minutes = self.config.system.max_charging_time_per_session;

        for request in ChargingRequestRepository::list_charging_tx(self.conn, Some(mode))? {
            let Some(start) = request.start_time else {
                warn!(ticket = %request.queue_number, "充电中请求缺少开始时间，跳过");
                continue;
            };
            let Some(pile_id) = request.charging_pile_id.clone() else {
                continue;
            };
            let Some(pile) = ChargingPileRepository::find_by_id_tx(self.conn, &pile_id)? else {
                continue;
            };

            let hours = duration_hours(start, self.now);
            let charged = round_money(hours * pile.power_kw).min(request.requested_amount);
            ChargingRequestRepository::update_progress_tx(self.conn, &request.request_id, charged)?;
            ChargingSessionRepository::update_progress_tx(self.conn, &request.request_id, charged, hours)?;
            report.updated += 1;

            let mut current = request;
            current.current_amount = charged;
            let ticket = current.queue_number.clone();

            if charged >= current.requested_amount {
                self.complete_charging(current, CompletionKind::Normal)?;
                report.completed.push(ticket);
            } else if max_minutes > 0 && hours * 60.0 >= max_minutes as f64 {
                warn!(ticket = %ticket, max_minutes, "超过单次最大充电时长，强制结束");
                self.complete_charging(current, CompletionKind::TimeLimit)?;
                report.completed.push(ticket);
            }
        }

        if report.updated > 0 {
            self.refresh_estimates(mode)?;
        }
        Ok(report)
    }
}

// ==========================================
// 对外回执
// ==========================================

/// 提交回执
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitReceipt {
    pub request_id: String,
    pub ticket: String,
    pub queue_level: QueueLevel,
    pub position: Option<i64>,
    pub charging_pile_id: Option<String>,
    pub estimated_wait_minutes: i64,
}

impl From<&ChargingRequest> for SubmitReceipt {
    fn from(r: &ChargingRequest) -> Self {
        Self {
            request_id: r.request_id.clone(),
            ticket: r.queue_number.clone(),
            queue_level: r.queue_level,
            position: r.current_position(),
            charging_pile_id: r.charging_pile_id.clone(),
            estimated_wait_minutes: r.estimated_wait_minutes,
        }
    }
}

// ==========================================
// QueueScheduler - 队列调度器
// ==========================================
pub struct QueueScheduler {
    runtime: Arc<ScheduleRuntime>,
    directory: Arc<dyn VehicleDirectory>,
}

impl QueueScheduler {
    pub fn new(runtime: Arc<ScheduleRuntime>, directory: Arc<dyn VehicleDirectory>) -> Self {
        Self { runtime, directory }
    }

    pub fn runtime(&self) -> &Arc<ScheduleRuntime> {
        &self.runtime
    }

    fn validate(input: &NewChargingRequest) -> ScheduleResult<()> {
        if input.user_id.trim().is_empty() {
            return Err(ScheduleError::Validation("user_id 不能为空".to_string()));
        }
        if !(input.requested_amount > 0.0) {
            return Err(ScheduleError::Validation(format!(
                "请求电量必须大于 0: {}",
                input.requested_amount
            )));
        }
        if !(input.battery_capacity > 0.0) {
            return Err(ScheduleError::Validation(format!(
                "电池容量必须大于 0: {}",
                input.battery_capacity
            )));
        }
        if input.requested_amount > input.battery_capacity {
            return Err(ScheduleError::Validation(format!(
                "请求电量 {} 超过电池容量 {}",
                input.requested_amount, input.battery_capacity
            )));
        }
        Ok(())
    }

    fn resolve_vehicle(&self, input: &NewChargingRequest) -> ScheduleResult<String> {
        match &input.vehicle_id {
            Some(vehicle_id) => {
                if self.directory.owns(&input.user_id, vehicle_id) {
                    Ok(vehicle_id.clone())
                } else {
                    Err(ScheduleError::not_found("Vehicle", vehicle_id.clone()))
                }
            }
            None => self
                .directory
                .default_vehicle(&input.user_id)
                .ok_or_else(|| ScheduleError::Validation("用户没有可用的默认车辆".to_string())),
        }
    }

    /// 提交充电请求
    #[instrument(skip(self, input), fields(user_id = %input.user_id, mode = %input.charging_mode))]
    pub fn submit(&self, input: NewChargingRequest) -> ScheduleResult<SubmitReceipt> {
        Self::validate(&input)?;
        let vehicle_id = self.resolve_vehicle(&input)?;
        let mode = input.charging_mode;

        self.runtime.run_unit("submit", &[mode], |ctx| {
            let admitted = ctx.admit(&input, vehicle_id)?;
            ctx.refresh_estimates(mode)?;
            let fresh = ctx.load_request(&admitted.request_id)?;
            Ok(SubmitReceipt::from(&fresh))
        })
    }

    /// 对外部等候请求尝试一次转移（无可用桩时为空操作）
    pub fn try_transfer(&self, ticket: &str) -> ScheduleResult<bool> {
        let mode = self.mode_of(ticket)?;
        self.runtime.run_unit("try_transfer", &[mode], |ctx| {
            let request = ctx.load_by_ticket(ticket)?;
            let moved = ctx.try_transfer(&request.request_id)?;
            ctx.refresh_estimates(mode)?;
            Ok(moved)
        })
    }

    /// 取消请求（充电中不可取消）
    #[instrument(skip(self))]
    pub fn cancel(&self, ticket: &str) -> ScheduleResult<ChargingRequest> {
        let mode = self.mode_of(ticket)?;
        self.runtime.run_unit("cancel", &[mode], |ctx| {
            let request = ctx.load_by_ticket(ticket)?;
            let cancelled = ctx.cancel(request)?;
            ctx.refresh_estimates(mode)?;
            Ok(cancelled)
        })
    }

    /// 变更充电模式（仅外部等候区）
    #[instrument(skip(self))]
    pub fn change_mode(&self, ticket: &str, new_mode: ChargingMode) -> ScheduleResult<ChargingRequest> {
        let old_mode = self.mode_of(ticket)?;
        self.runtime.run_unit("change_mode", &[old_mode, new_mode], |ctx| {
            let request = ctx.load_by_ticket(ticket)?;
            let updated = ctx.change_mode(request, new_mode)?;
            if old_mode != new_mode {
                ctx.refresh_estimates(old_mode)?;
                ctx.refresh_estimates(new_mode)?;
            }
            ctx.load_request(&updated.request_id)
        })
    }

    /// 结束充电（强制完成），返回最终账单
    #[instrument(skip(self))]
    pub fn complete(&self, ticket: &str) -> ScheduleResult<ChargingSession> {
        let mode = self.mode_of(ticket)?;
        self.runtime.run_unit("complete", &[mode], |ctx| {
            let request = ctx.load_by_ticket(ticket)?;
            ctx.complete_charging(request, CompletionKind::Normal)
        })
    }

    /// 推进充电进度（后台驱动调用）
    pub fn advance_progress(&self, mode: ChargingMode) -> ScheduleResult<ProgressReport> {
        self.runtime
            .run_unit("advance_progress", &[mode], |ctx| ctx.advance_progress(mode))
    }

    /// 重新计算某模式的估算值
    pub fn refresh_estimates(&self, mode: ChargingMode) -> ScheduleResult<()> {
        self.runtime
            .run_unit("refresh_estimates", &[mode], |ctx| ctx.refresh_estimates(mode))
    }

    /// 对某模式执行一轮补位
    pub fn drive_transfers(&self, mode: ChargingMode) -> ScheduleResult<usize> {
        self.runtime.run_unit("drive_transfers", &[mode], |ctx| {
            let moved = ctx.transfer_loop(mode)?;
            ctx.refresh_estimates(mode)?;
            Ok(moved)
        })
    }

    fn mode_of(&self, ticket: &str) -> ScheduleResult<ChargingMode> {
        self.runtime.read(|conn| {
            ChargingRequestRepository::find_by_queue_number_tx(conn, ticket)?
                .map(|r| r.charging_mode)
                .ok_or_else(|| ScheduleError::not_found("ChargingRequest", ticket))
        })
    }
}
