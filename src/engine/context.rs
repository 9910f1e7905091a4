// ==========================================
// 电动汽车充电调度系统 - 调度运行时与工作单元
// ==========================================
// ScheduleRuntime: 共享连接、参数、锁、暂停标志、时钟、事件发布
// ScheduleContext: 单个工作单元（一个 SQLite 事务）内的调度上下文
// 约束: 参数快照在取得数据库连接前加载（ConfigManager 共用同一连接）
// ==========================================

use crate::config::parameter::{FaultConfig, PricingConfig, QueueConfig, SystemConfig};
use crate::config::ConfigManager;
use crate::domain::notification::Notification;
use crate::domain::request::ChargingRequest;
use crate::domain::types::{ChargingMode, NotificationType};
use crate::engine::billing::BillingEngine;
use crate::engine::clock::Clock;
use crate::engine::error::{ScheduleError, ScheduleResult};
use crate::engine::estimator::{ceil_minutes, external_wait_minutes, PileLoad};
use crate::engine::events::OptionalEventPublisher;
use crate::engine::locks::ScheduleLocks;
use crate::engine::pause::{PauseGuard, PauseRegistry};
use crate::repository::{
    ChargingPileRepository, ChargingRequestRepository, NotificationRepository,
};
use chrono::NaiveDateTime;
use rusqlite::Connection;
use std::sync::{Arc, Mutex, MutexGuard};

// ==========================================
// ConfigSnapshot - 单次操作的参数快照
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct ConfigSnapshot {
    pub queue: QueueConfig,
    pub pricing: PricingConfig,
    pub fault: FaultConfig,
    pub system: SystemConfig,
}

// ==========================================
// ScheduleRuntime
// ==========================================
pub struct ScheduleRuntime {
    conn: Arc<Mutex<Connection>>,
    config: Arc<ConfigManager>,
    locks: ScheduleLocks,
    pauses: PauseRegistry,
    clock: Arc<dyn Clock>,
    events: OptionalEventPublisher,
}

impl ScheduleRuntime {
    pub fn new(
        conn: Arc<Mutex<Connection>>,
        config: Arc<ConfigManager>,
        clock: Arc<dyn Clock>,
        events: OptionalEventPublisher,
    ) -> Self {
        Self {
            conn,
            config,
            locks: ScheduleLocks::new(),
            pauses: PauseRegistry::new(),
            clock,
            events,
        }
    }

    pub fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }

    pub fn pauses(&self) -> &PauseRegistry {
        &self.pauses
    }

    pub fn config_manager(&self) -> &ConfigManager {
        &self.config
    }

    /// 加载参数快照（缺失或非法的参数使用默认值）
    pub fn load_snapshot(&self) -> ScheduleResult<ConfigSnapshot> {
        Ok(ConfigSnapshot {
            queue: self.config.load_queue_config()?,
            pricing: self.config.load_pricing_config()?,
            fault: self.config.load_fault_config()?,
            system: self.config.load_system_config()?,
        })
    }

    fn lock_conn(&self) -> ScheduleResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| ScheduleError::ConcurrencyConflict(format!("数据库连接锁已中毒: {}", e)))
    }

    fn pile_ids_for(&self, modes: &[ChargingMode]) -> ScheduleResult<Vec<String>> {
        let conn = self.lock_conn()?;
        let mut ids = Vec::new();
        for mode in modes {
            ids.extend(
                ChargingPileRepository::list_by_mode_tx(&conn, *mode)?
                    .into_iter()
                    .map(|p| p.pile_id),
            );
        }
        Ok(ids)
    }

    /// 只读查询（不加调度锁，不开事务）
    pub fn read<T>(&self, f: impl FnOnce(&Connection) -> ScheduleResult<T>) -> ScheduleResult<T> {
        let conn = self.lock_conn()?;
        f(&conn)
    }

    /// 执行一个工作单元
    ///
    /// # 流程
    /// 1. 按固定顺序获取模式锁与该模式全部桩锁
    /// 2. 加载参数快照
    /// 3. 开启事务并执行 f，成功提交、失败回滚
    /// 4. 提交后发布本单元产生的通知事件
    pub fn run_unit<T>(
        &self,
        operation: &'static str,
        modes: &[ChargingMode],
        f: impl FnOnce(&mut ScheduleContext<'_>) -> ScheduleResult<T>,
    ) -> ScheduleResult<T> {
        let pile_ids = self.pile_ids_for(modes)?;
        self.locks.with_locks(modes, &pile_ids, || {
            let snapshot = self.load_snapshot()?;
            let now = self.clock.now();

            let mut guard = self.lock_conn()?;
            let tx = guard.transaction()?;

            let (result, notifications) = {
                let mut ctx = ScheduleContext::new(&tx, snapshot, now, &self.pauses);
                let result = f(&mut ctx);
                (result, ctx.notifications)
            };

            match result {
                Ok(value) => {
                    tx.commit()?;
                    drop(guard);
                    tracing::debug!(operation, notifications = notifications.len(), "工作单元已提交");
                    self.events.publish_all(&notifications);
                    Ok(value)
                }
                Err(e) => {
                    // tx 在离开作用域时回滚
                    tracing::warn!(operation, error = %e, "工作单元失败，事务回滚");
                    Err(e)
                }
            }
        })
    }
}

// ==========================================
// ScheduleContext - 工作单元上下文
// ==========================================
pub struct ScheduleContext<'a> {
    pub(crate) conn: &'a Connection,
    pub(crate) config: ConfigSnapshot,
    pub(crate) now: NaiveDateTime,
    pauses: &'a PauseRegistry,
    notifications: Vec<Notification>,
}

impl<'a> ScheduleContext<'a> {
    pub(crate) fn new(
        conn: &'a Connection,
        config: ConfigSnapshot,
        now: NaiveDateTime,
        pauses: &'a PauseRegistry,
    ) -> Self {
        Self {
            conn,
            config,
            now,
            pauses,
            notifications: Vec::new(),
        }
    }

    pub(crate) fn is_paused(&self, mode: ChargingMode) -> bool {
        self.pauses.is_paused(mode)
    }

    pub(crate) fn pause(&self, mode: ChargingMode) -> PauseGuard<'a> {
        self.pauses.pause(mode)
    }

    pub(crate) fn resume(&self, mode: ChargingMode) {
        self.pauses.resume(mode);
    }

    pub(crate) fn billing(&self) -> BillingEngine {
        BillingEngine::new(self.config.pricing.clone())
    }

    /// 按 request_id 读取请求
    pub(crate) fn load_request(&self, request_id: &str) -> ScheduleResult<ChargingRequest> {
        ChargingRequestRepository::find_by_id_tx(self.conn, request_id)?
            .ok_or_else(|| ScheduleError::not_found("ChargingRequest", request_id))
    }

    /// 按排队号读取请求
    pub(crate) fn load_by_ticket(&self, ticket: &str) -> ScheduleResult<ChargingRequest> {
        ChargingRequestRepository::find_by_queue_number_tx(self.conn, ticket)?
            .ok_or_else(|| ScheduleError::not_found("ChargingRequest", ticket))
    }

    /// 某模式下各桩的负载快照（按桩编号升序）
    pub(crate) fn pile_loads(&self, mode: ChargingMode) -> ScheduleResult<Vec<PileLoad>> {
        pile_loads(self.conn, mode, self.config.queue.pile_max_queue_size(mode))
    }

    /// 写入通知（通知功能关闭时跳过）
    pub(crate) fn notify(
        &mut self,
        user_id: &str,
        notification_type: NotificationType,
        message: impl Into<String>,
    ) -> ScheduleResult<()> {
        if !self.config.system.notification_enabled {
            return Ok(());
        }
        let n = Notification::new(user_id, notification_type, message, self.now);
        NotificationRepository::insert_tx(self.conn, &n)?;
        self.notifications.push(n);
        Ok(())
    }

    /// 重新计算并写回某模式的桩剩余时间与全部等待请求的预计等待时间
    pub(crate) fn refresh_estimates(&self, mode: ChargingMode) -> ScheduleResult<()> {
        let loads = self.pile_loads(mode)?;

        for load in &loads {
            ChargingPileRepository::set_remaining_minutes_tx(
                self.conn,
                &load.pile.pile_id,
                ceil_minutes(load.remaining_minutes()),
            )?;
            if let Some(charging) = &load.charging {
                ChargingRequestRepository::update_estimate_tx(self.conn, &charging.request_id, 0)?;
            }
            for queued in &load.queue {
                let position = queued.pile_queue_position.unwrap_or(1);
                ChargingRequestRepository::update_estimate_tx(
                    self.conn,
                    &queued.request_id,
                    ceil_minutes(load.remaining_ahead_of(position)),
                )?;
            }
        }

        for waiting in ChargingRequestRepository::list_external_tx(self.conn, mode)? {
            let position = waiting.external_queue_position.unwrap_or(1);
            ChargingRequestRepository::update_estimate_tx(
                self.conn,
                &waiting.request_id,
                external_wait_minutes(&waiting, position, &loads),
            )?;
        }
        Ok(())
    }
}

/// 读取某模式的桩负载快照
pub(crate) fn pile_loads(
    conn: &Connection,
    mode: ChargingMode,
    max_queue_size: i64,
) -> ScheduleResult<Vec<PileLoad>> {
    let piles = ChargingPileRepository::list_by_mode_tx(conn, mode)?;
    let mut loads = Vec::with_capacity(piles.len());
    for pile in piles {
        let charging = ChargingRequestRepository::find_charging_on_pile_tx(conn, &pile.pile_id)?;
        let queue = ChargingRequestRepository::list_pile_queue_tx(conn, &pile.pile_id)?;
        loads.push(PileLoad {
            pile,
            charging,
            queue,
            max_queue_size,
        });
    }
    Ok(loads)
}
