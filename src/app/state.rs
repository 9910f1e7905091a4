// ==========================================
// 电动汽车充电调度系统 - 应用状态
// ==========================================
// 职责: 初始化数据库、参数、充电桩，组装引擎与 API 实例
// ==========================================

use std::sync::{Arc, Mutex};

use crate::api::ChargingApi;
use crate::config::{config_keys, ConfigManager};
use crate::db::{init_schema, open_sqlite_connection};
use crate::domain::pile::{format_pile_id, ChargingPile};
use crate::domain::types::ChargingMode;
use crate::engine::{
    Clock, DriverConfig, FaultCoordinator, OpenVehicleDirectory, OptionalEventPublisher,
    ProgressDriver, QueueMaintenance, QueueScheduler, ScheduleRuntime, SystemClock,
    VehicleDirectory,
};
use crate::repository::{
    ChargingPileRepository, ChargingRequestRepository, ChargingSessionRepository,
    NotificationRepository,
};

/// 可替换的协作方（测试中注入手动时钟、车辆目录、事件订阅者）
pub struct AppOptions {
    pub clock: Arc<dyn Clock>,
    pub directory: Arc<dyn VehicleDirectory>,
    pub events: OptionalEventPublisher,
    pub driver: Option<DriverConfig>,
    /// 启动时按参数表登记充电桩
    pub seed_piles: bool,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            directory: Arc::new(OpenVehicleDirectory),
            events: OptionalEventPublisher::none(),
            driver: None,
            seed_piles: true,
        }
    }
}

/// 应用状态
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    pub config_manager: Arc<ConfigManager>,
    pub runtime: Arc<ScheduleRuntime>,
    pub scheduler: Arc<QueueScheduler>,
    pub coordinator: Arc<FaultCoordinator>,
    pub maintenance: Arc<QueueMaintenance>,

    /// 后台进度驱动
    pub driver: Arc<ProgressDriver>,

    /// 充电业务API
    pub charging_api: Arc<ChargingApi>,

    pub pile_repo: Arc<ChargingPileRepository>,
}

impl AppState {
    /// 使用默认协作方创建
    pub fn new(db_path: String) -> Result<Self, String> {
        Self::with_options(db_path, AppOptions::default())
    }

    /// 创建AppState
    ///
    /// # 说明
    /// 1. 打开共享连接并初始化 schema
    /// 2. 写入缺失的默认参数
    /// 3. 按参数登记充电桩（可选）
    /// 4. 组装运行时、调度器、故障协调器、维护工具、驱动与 API
    pub fn with_options(db_path: String, options: AppOptions) -> Result<Self, String> {
        tracing::info!(db_path = %db_path, "初始化AppState");

        let conn = open_sqlite_connection(&db_path)
            .map_err(|e| format!("无法打开数据库: {}", e))?;
        init_schema(&conn).map_err(|e| format!("数据库 schema 初始化失败: {}", e))?;
        let conn = Arc::new(Mutex::new(conn));

        // ==========================================
        // 参数与充电桩
        // ==========================================
        let config_manager = Arc::new(ConfigManager::from_connection(conn.clone()));
        let inserted = config_manager
            .ensure_defaults()
            .map_err(|e| format!("默认参数写入失败: {}", e))?;
        if inserted > 0 {
            tracing::info!(inserted, "已写入默认系统参数");
        }

        let pile_repo = Arc::new(ChargingPileRepository::from_connection(conn.clone()));
        if options.seed_piles {
            let count = seed_piles(&config_manager, &pile_repo)
                .map_err(|e| format!("充电桩初始化失败: {}", e))?;
            tracing::info!(count, "充电桩登记完成");
        }

        // ==========================================
        // 引擎层
        // ==========================================
        let runtime = Arc::new(ScheduleRuntime::new(
            conn.clone(),
            config_manager.clone(),
            options.clock,
            options.events,
        ));
        let scheduler = Arc::new(QueueScheduler::new(runtime.clone(), options.directory));
        let coordinator = Arc::new(FaultCoordinator::new(runtime.clone()));
        let maintenance = Arc::new(QueueMaintenance::new(runtime.clone()));
        let driver = Arc::new(ProgressDriver::new(
            runtime.clone(),
            scheduler.clone(),
            coordinator.clone(),
            options.driver,
        ));

        // ==========================================
        // API层
        // ==========================================
        let charging_api = Arc::new(ChargingApi::new(
            scheduler.clone(),
            coordinator.clone(),
            maintenance.clone(),
            config_manager.clone(),
            Arc::new(ChargingRequestRepository::from_connection(conn.clone())),
            Arc::new(ChargingSessionRepository::from_connection(conn.clone())),
            Arc::new(NotificationRepository::from_connection(conn)),
        ));

        tracing::info!("AppState初始化完成");

        Ok(Self {
            db_path,
            config_manager,
            runtime,
            scheduler,
            coordinator,
            maintenance,
            driver,
            charging_api,
            pile_repo,
        })
    }
}

/// 按参数表登记充电桩（FAST-001.. / SLOW-001..），返回登记数量
///
/// 已存在的桩只更新功率与队列容量，运行状态与统计保持不变
pub fn seed_piles(
    config_manager: &ConfigManager,
    pile_repo: &ChargingPileRepository,
) -> Result<usize, String> {
    let queue = config_manager
        .load_queue_config()
        .map_err(|e| e.to_string())?;

    let mut registered = 0;
    for mode in ChargingMode::ALL {
        let (key, default) = match mode {
            ChargingMode::Fast => (config_keys::FAST_CHARGING_PILE_NUM, 2),
            ChargingMode::Slow => (config_keys::SLOW_CHARGING_PILE_NUM, 5),
        };
        let count = config_manager
            .get_i64_or(key, default)
            .map_err(|e| e.to_string())?
            .max(0) as usize;

        for index in 1..=count {
            let pile = ChargingPile::new(
                format_pile_id(mode, index),
                mode,
                queue.charging_power(mode),
                queue.pile_max_queue_size(mode),
            );
            pile_repo.register(&pile).map_err(|e| e.to_string())?;
            registered += 1;
        }
    }
    Ok(registered)
}

/// 获取默认数据库路径
///
/// 优先读取环境变量 EV_SCHEDULER_DB_PATH，其次为用户数据目录
pub fn get_default_db_path() -> String {
    use std::path::PathBuf;

    if let Ok(path) = std::env::var("EV_SCHEDULER_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./ev_charging.db");

    if let Some(data_dir) = dirs::data_dir() {
        #[cfg(debug_assertions)]
        {
            path = data_dir.join("ev-charging-scheduler-dev");
        }

        #[cfg(not(debug_assertions))]
        {
            path = data_dir.join("ev-charging-scheduler");
        }

        std::fs::create_dir_all(&path).ok();
        path = path.join("ev_charging.db");
    }

    path.to_string_lossy().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_default_db_path() {
        let path = get_default_db_path();
        assert!(!path.is_empty());
        assert!(path.ends_with(".db"));
    }

    #[test]
    fn test_seed_piles_from_defaults() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let state = AppState::new(file.path().to_string_lossy().to_string()).unwrap();

        let piles = state.pile_repo.list_all().unwrap();
        let fast: Vec<_> = piles.iter().filter(|p| p.pile_type == ChargingMode::Fast).collect();
        assert_eq!(fast.len(), 2);
        assert_eq!(fast[0].pile_id, "FAST-001");
        assert_eq!(fast[0].power_kw, 120.0);
        assert_eq!(piles.len(), 7);

        // 重复启动不重复登记
        let again = AppState::new(state.db_path.clone()).unwrap();
        assert_eq!(again.pile_repo.list_all().unwrap().len(), 7);
    }
}
