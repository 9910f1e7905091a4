// ==========================================
// 电动汽车充电调度系统 - 充电业务 API
// ==========================================
// 职责: 提交/取消/改模式/查询/结束充电、队列总览、通知、
//       账单查询、队列一致性维护、充电桩状态管理、参数管理
// 写操作一律经由引擎的工作单元，读操作经由 Repository
// ==========================================

use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::api::error::{ApiError, ApiResult};
use crate::config::{ConfigManager, SystemParameter};
use crate::domain::notification::Notification;
use crate::domain::pile::PileStatistics;
use crate::domain::request::{ChargingRequest, NewChargingRequest};
use crate::domain::session::ChargingSession;
use crate::domain::types::{ChargingMode, PileStatus, QueueLevel, RateBand, RequestStatus};
use crate::engine::billing::round_money;
use crate::engine::context::pile_loads;
use crate::engine::maintenance::ConsistencyReport;
use crate::engine::{FaultCoordinator, QueueMaintenance, QueueScheduler, SubmitReceipt};
use crate::repository::{
    ChargingRequestRepository, ChargingSessionRepository, NotificationRepository,
};

/// 队列总览中每个模式展示的外部等候区排队号数量
pub const OVERVIEW_HEAD_SIZE: usize = 10;

// ==========================================
// 响应 DTO
// ==========================================

/// 排队号状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketStatus {
    pub ticket: String,
    pub request_id: String,
    pub user_id: String,
    pub vehicle_id: String,
    pub charging_mode: ChargingMode,
    pub current_status: RequestStatus,
    pub queue_level: QueueLevel,
    /// 当前所在队列的位置（充电中/已结束为 None）
    pub position: Option<i64>,
    /// 前方还有多少辆车（桩队列含正在充电的车）
    pub ahead_count: i64,
    pub charging_pile_id: Option<String>,
    pub requested_amount: f64,
    pub current_amount: f64,
    pub estimated_wait_minutes: i64,
}

/// 账单明细（金额保留 2 位小数）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillDetail {
    pub ticket: String,
    pub request_id: String,
    pub session_id: String,
    pub pile_id: String,
    pub start_time: NaiveDateTime,
    pub end_time: Option<NaiveDateTime>,
    pub charging_amount: f64,
    pub charging_duration_hours: f64,
    pub rate_band: Option<RateBand>,
    pub peak_cost: f64,
    pub normal_cost: f64,
    pub valley_cost: f64,
    pub service_cost: f64,
    pub total_cost: f64,
    /// 故障或超时提前结束
    pub premature: bool,
}

impl BillDetail {
    fn new(ticket: &str, session: &ChargingSession) -> Self {
        let bill = &session.bill;
        Self {
            ticket: ticket.to_string(),
            request_id: session.request_id.clone(),
            session_id: session.session_id.clone(),
            pile_id: session.pile_id.clone(),
            start_time: session.start_time,
            end_time: session.end_time,
            charging_amount: round_money(session.charging_amount),
            charging_duration_hours: round_money(session.charging_duration_hours),
            rate_band: bill.band(),
            peak_cost: round_money(bill.peak_cost),
            normal_cost: round_money(bill.normal_cost),
            valley_cost: round_money(bill.valley_cost),
            service_cost: round_money(bill.service_cost),
            total_cost: round_money(bill.total_cost),
            premature: session.premature,
        }
    }
}

/// 外部等候区中的排队号
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitingTicket {
    pub ticket: String,
    pub position: i64,
    pub estimated_wait_minutes: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeOverview {
    pub mode: ChargingMode,
    pub external_count: usize,
    pub external_capacity: i64,
    /// 外部等候区前 OVERVIEW_HEAD_SIZE 个排队号
    pub waiting_head: Vec<WaitingTicket>,
    pub pile_queue_total: usize,
    pub charging_count: usize,
    /// 叫号暂停标志
    ///
    /// 暂停只存在于故障回插的单个工作单元内部，总览在单元之间读取，
    /// 因此这里总是 false
    pub paused: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PileOverview {
    pub pile_id: String,
    pub pile_type: ChargingMode,
    pub status: PileStatus,
    pub is_working: bool,
    pub charging_ticket: Option<String>,
    pub queue_length: usize,
    pub max_queue_size: i64,
    pub estimated_remaining_minutes: i64,
    pub statistics: PileStatistics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueOverview {
    pub modes: Vec<ModeOverview>,
    pub piles: Vec<PileOverview>,
}

// ==========================================
// ChargingApi
// ==========================================
pub struct ChargingApi {
    scheduler: Arc<QueueScheduler>,
    coordinator: Arc<FaultCoordinator>,
    maintenance: Arc<QueueMaintenance>,
    config_manager: Arc<ConfigManager>,
    request_repo: Arc<ChargingRequestRepository>,
    session_repo: Arc<ChargingSessionRepository>,
    notification_repo: Arc<NotificationRepository>,
}

impl ChargingApi {
    pub fn new(
        scheduler: Arc<QueueScheduler>,
        coordinator: Arc<FaultCoordinator>,
        maintenance: Arc<QueueMaintenance>,
        config_manager: Arc<ConfigManager>,
        request_repo: Arc<ChargingRequestRepository>,
        session_repo: Arc<ChargingSessionRepository>,
        notification_repo: Arc<NotificationRepository>,
    ) -> Self {
        Self {
            scheduler,
            coordinator,
            maintenance,
            config_manager,
            request_repo,
            session_repo,
            notification_repo,
        }
    }

    // ==========================================
    // 请求生命周期
    // ==========================================

    /// 提交充电请求
    ///
    /// # 返回
    /// - Ok(SubmitReceipt): 排队号、队列层级、位置、预计等待
    /// - Err(CapacityExceeded / DuplicateActiveRequest / ValidationError)
    pub fn submit(&self, input: NewChargingRequest) -> ApiResult<SubmitReceipt> {
        let receipt = self.scheduler.submit(input)?;
        info!(ticket = %receipt.ticket, level = %receipt.queue_level, "充电请求已受理");
        Ok(receipt)
    }

    /// 取消请求（充电中不可取消）
    pub fn cancel(&self, ticket: &str) -> ApiResult<TicketStatus> {
        let cancelled = self.scheduler.cancel(ticket)?;
        self.to_status(cancelled)
    }

    /// 变更充电模式，返回新排队号的状态
    pub fn change_mode(&self, ticket: &str, new_mode: ChargingMode) -> ApiResult<TicketStatus> {
        let updated = self.scheduler.change_mode(ticket, new_mode)?;
        self.to_status(updated)
    }

    /// 查询排队号状态
    pub fn status(&self, ticket: &str) -> ApiResult<TicketStatus> {
        let request = self.find_by_ticket(ticket)?;
        self.to_status(request)
    }

    /// 用户的全部请求（含历史）
    pub fn list_user_requests(&self, user_id: &str) -> ApiResult<Vec<TicketStatus>> {
        self.request_repo
            .list_by_user(user_id)?
            .into_iter()
            .map(|r| self.to_status(r))
            .collect()
    }

    /// 结束充电（强制完成），返回最终账单
    #[instrument(skip(self))]
    pub fn complete(&self, ticket: &str) -> ApiResult<BillDetail> {
        let session = self.scheduler.complete(ticket)?;
        let detail = BillDetail::new(ticket, &session);
        info!(ticket, total_cost = detail.total_cost, "充电已结束");
        Ok(detail)
    }

    /// 查询已结束请求的账单
    pub fn bill_detail(&self, ticket: &str) -> ApiResult<BillDetail> {
        let request = self.find_by_ticket(ticket)?;
        match self.session_repo.find_by_request(&request.request_id)? {
            Some(session) if session.is_finished() => Ok(BillDetail::new(ticket, &session)),
            _ => Err(ApiError::NotFound(format!("排队号 {} 尚无已结算的账单", ticket))),
        }
    }

    /// 用户历史账单（最新在前）
    pub fn list_bills(&self, user_id: &str) -> ApiResult<Vec<BillDetail>> {
        let sessions = self.session_repo.list_finished_by_user(user_id)?;
        let mut bills = Vec::with_capacity(sessions.len());
        for session in sessions {
            let ticket = self
                .request_repo
                .find_by_id(&session.request_id)?
                .map(|r| r.queue_number)
                .unwrap_or_default();
            bills.push(BillDetail::new(&ticket, &session));
        }
        Ok(bills)
    }

    // ==========================================
    // 队列总览
    // ==========================================

    /// 各模式外部等候区与各充电桩的当前状态
    pub fn queue_overview(&self) -> ApiResult<QueueOverview> {
        let runtime = self.scheduler.runtime();
        let snapshot = runtime.load_snapshot()?;

        let (modes, piles) = runtime.read(|conn| {
            let mut modes = Vec::new();
            let mut piles = Vec::new();
            for mode in ChargingMode::ALL {
                let external = ChargingRequestRepository::list_external_tx(conn, mode)?;
                let charging = ChargingRequestRepository::list_charging_tx(conn, Some(mode))?;
                let loads = pile_loads(conn, mode, snapshot.queue.pile_max_queue_size(mode))?;

                modes.push(ModeOverview {
                    mode,
                    external_count: external.len(),
                    external_capacity: snapshot.queue.external_waiting_area_size,
                    waiting_head: external
                        .iter()
                        .take(OVERVIEW_HEAD_SIZE)
                        .map(|r| WaitingTicket {
                            ticket: r.queue_number.clone(),
                            position: r.external_queue_position.unwrap_or_default(),
                            estimated_wait_minutes: r.estimated_wait_minutes,
                        })
                        .collect(),
                    pile_queue_total: loads.iter().map(|l| l.queue.len()).sum(),
                    charging_count: charging.len(),
                    paused: runtime.pauses().is_paused(mode),
                });

                piles.extend(loads.into_iter().map(|load| PileOverview {
                    pile_id: load.pile.pile_id.clone(),
                    pile_type: load.pile.pile_type,
                    status: load.pile.status,
                    is_working: load.pile.is_working,
                    charging_ticket: load.charging.as_ref().map(|r| r.queue_number.clone()),
                    queue_length: load.queue.len(),
                    max_queue_size: load.max_queue_size,
                    estimated_remaining_minutes: load.pile.estimated_remaining_minutes,
                    statistics: load.pile.statistics.clone(),
                }));
            }
            Ok((modes, piles))
        })?;

        Ok(QueueOverview { modes, piles })
    }

    // ==========================================
    // 通知
    // ==========================================

    pub fn list_notifications(&self, user_id: &str, unread_only: bool) -> ApiResult<Vec<Notification>> {
        Ok(self.notification_repo.list_by_user(user_id, unread_only)?)
    }

    pub fn mark_notification_read(&self, notification_id: &str, user_id: &str) -> ApiResult<()> {
        Ok(self.notification_repo.mark_read(notification_id, user_id)?)
    }

    // ==========================================
    // 维护与管理
    // ==========================================

    pub fn check_queue_consistency(&self, mode: ChargingMode) -> ApiResult<ConsistencyReport> {
        Ok(self.maintenance.check(mode)?)
    }

    pub fn repair_queue_positions(&self, mode: ChargingMode) -> ApiResult<ConsistencyReport> {
        Ok(self.maintenance.repair(mode)?)
    }

    /// 管理端设置充电桩状态（故障/恢复处理同步执行）
    #[instrument(skip(self))]
    pub fn set_pile_status(&self, pile_id: &str, status: PileStatus) -> ApiResult<()> {
        Ok(self.coordinator.set_pile_status(pile_id, status)?)
    }

    pub fn list_parameters(&self) -> ApiResult<Vec<SystemParameter>> {
        Ok(self.config_manager.list_parameters()?)
    }

    /// 更新已有参数（类型沿用原参数）
    pub fn update_parameter(&self, key: &str, value: &str) -> ApiResult<()> {
        let existing = self.config_manager.require_parameter(key)?;
        self.config_manager
            .set_parameter(key, value, existing.param_type, "")?;
        Ok(())
    }

    // ==========================================
    // 内部工具
    // ==========================================

    fn find_by_ticket(&self, ticket: &str) -> ApiResult<ChargingRequest> {
        self.request_repo
            .find_by_queue_number(ticket)?
            .ok_or_else(|| ApiError::NotFound(format!("排队号 {} 不存在", ticket)))
    }

    fn to_status(&self, request: ChargingRequest) -> ApiResult<TicketStatus> {
        let position = request.current_position();
        let ahead_count = match (request.queue_level, position) {
            (QueueLevel::ExternalWaiting, Some(p)) => p - 1,
            (QueueLevel::PileQueue, Some(p)) => {
                let charging = match &request.charging_pile_id {
                    Some(pile_id) => self.scheduler.runtime().read(|conn| {
                        Ok(ChargingRequestRepository::count_charging_on_pile_tx(conn, pile_id)?)
                    })?,
                    None => 0,
                };
                p - 1 + charging
            }
            _ => 0,
        };

        Ok(TicketStatus {
            ticket: request.queue_number,
            request_id: request.request_id,
            user_id: request.user_id,
            vehicle_id: request.vehicle_id,
            charging_mode: request.charging_mode,
            current_status: request.current_status,
            queue_level: request.queue_level,
            position,
            ahead_count,
            charging_pile_id: request.charging_pile_id,
            requested_amount: request.requested_amount,
            current_amount: round_money(request.current_amount),
            estimated_wait_minutes: request.estimated_wait_minutes,
        })
    }
}
