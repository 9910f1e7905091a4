// ==========================================
// 电动汽车充电调度系统 - 后台进度驱动
// ==========================================
// 每个轮询周期:
// 1. 按 已充电时长 × 功率 推进充电中请求的进度，达到目标自动结束
// 2. 对比各充电桩状态与上次处理的状态，触发故障/恢复处理
// 处理失败只记录日志，不中断轮询
// ==========================================

use crate::domain::types::ChargingMode;
use crate::engine::context::ScheduleRuntime;
use crate::engine::error::ScheduleResult;
use crate::engine::fault::FaultCoordinator;
use crate::engine::scheduler::{ProgressReport, QueueScheduler};
use crate::repository::ChargingPileRepository;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// 驱动配置
#[derive(Debug, Clone, Default)]
pub struct DriverConfig {
    /// 轮询间隔（秒）；None 时读取 progress_update_interval 参数
    pub interval_secs: Option<u64>,
}

/// 单次轮询结果
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub piles_observed: usize,
    pub progress: Vec<(ChargingMode, ProgressReport)>,
    pub errors: usize,
}

impl TickReport {
    pub fn completed(&self) -> Vec<String> {
        self.progress
            .iter()
            .flat_map(|(_, p)| p.completed.iter().cloned())
            .collect()
    }
}

pub struct ProgressDriver {
    runtime: Arc<ScheduleRuntime>,
    scheduler: Arc<QueueScheduler>,
    coordinator: Arc<FaultCoordinator>,
    config: DriverConfig,
}

impl ProgressDriver {
    pub fn new(
        runtime: Arc<ScheduleRuntime>,
        scheduler: Arc<QueueScheduler>,
        coordinator: Arc<FaultCoordinator>,
        config: Option<DriverConfig>,
    ) -> Self {
        Self {
            runtime,
            scheduler,
            coordinator,
            config: config.unwrap_or_default(),
        }
    }

    fn interval(&self) -> ScheduleResult<Duration> {
        let secs = match self.config.interval_secs {
            Some(secs) => secs,
            None => self.runtime.load_snapshot()?.system.progress_update_interval_secs,
        };
        Ok(Duration::from_secs(secs.max(1)))
    }

    /// 执行一次轮询（同步）
    pub fn tick(&self) -> TickReport {
        let mut report = TickReport::default();

        // 先推进进度，再处理状态变化
        for mode in ChargingMode::ALL {
            match self.scheduler.advance_progress(mode) {
                Ok(progress) => {
                    if !progress.completed.is_empty() {
                        info!(mode = %mode, completed = ?progress.completed, "充电自动完成");
                    }
                    report.progress.push((mode, progress));
                }
                Err(e) => {
                    error!(mode = %mode, error = %e, "充电进度推进失败");
                    report.errors += 1;
                }
            }
        }

        match self
            .runtime
            .read(|conn| Ok(ChargingPileRepository::list_all_tx(conn)?))
        {
            Ok(piles) => {
                for pile in piles {
                    report.piles_observed += 1;
                    if let Err(e) = self.coordinator.observe(&pile.pile_id, pile.status, None) {
                        error!(pile_id = %pile.pile_id, error = %e, "充电桩状态处理失败");
                        report.errors += 1;
                    }
                }
            }
            Err(e) => {
                error!(error = %e, "读取充电桩列表失败");
                report.errors += 1;
            }
        }

        debug!(
            piles = report.piles_observed,
            errors = report.errors,
            "轮询完成"
        );
        report
    }

    /// 后台轮询，直到收到停止信号
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let period = match self.interval() {
            Ok(period) => period,
            Err(e) => {
                error!(error = %e, "读取轮询间隔失败，使用 30 秒");
                Duration::from_secs(30)
            }
        };
        info!(interval_secs = period.as_secs(), "启动充电进度驱动");

        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let driver = Arc::clone(&self);
                    if let Err(e) = tokio::task::spawn_blocking(move || driver.tick()).await {
                        error!(error = %e, "轮询任务异常退出");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("收到停止信号，退出充电进度驱动");
                        break;
                    }
                }
            }
        }
    }
}
