// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 临时数据库、参数覆盖、充电桩登记、手动时钟、事件记录
// ==========================================

#![allow(dead_code)]

use std::error::Error;
use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, NaiveDateTime};
use ev_charging_scheduler::app::{AppOptions, AppState};
use ev_charging_scheduler::config::{ConfigManager, ParamType};
use ev_charging_scheduler::db::{init_schema, open_sqlite_connection};
use ev_charging_scheduler::domain::pile::{format_pile_id, ChargingPile};
use ev_charging_scheduler::domain::request::NewChargingRequest;
use ev_charging_scheduler::domain::types::ChargingMode;
use ev_charging_scheduler::engine::{
    ChargingEvent, ChargingEventPublisher, DriverConfig, ManualClock, OptionalEventPublisher,
};
use ev_charging_scheduler::repository::{ChargingPileRepository, ChargingRequestRepository};
use ev_charging_scheduler::ChargingRequest;
use tempfile::NamedTempFile;

/// 创建临时测试数据库并初始化 schema
///
/// # 返回
/// - NamedTempFile: 临时数据库文件（需要保持存活）
/// - String: 数据库文件路径
pub fn create_test_db() -> Result<(NamedTempFile, String), Box<dyn Error>> {
    let temp_file = NamedTempFile::new()?;
    let db_path = temp_file.path().to_string_lossy().to_string();

    let conn = open_sqlite_connection(&db_path)?;
    init_schema(&conn)?;

    Ok((temp_file, db_path))
}

/// 测试基准时间: 2026-03-02 09:00（峰时）
pub fn base_time() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 3, 2)
        .unwrap()
        .and_hms_opt(9, 0, 0)
        .unwrap()
}

// ==========================================
// 事件记录器
// ==========================================

#[derive(Default)]
pub struct RecordingPublisher {
    pub events: Mutex<Vec<ChargingEvent>>,
}

impl RecordingPublisher {
    pub fn snapshot(&self) -> Vec<ChargingEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ChargingEventPublisher for RecordingPublisher {
    fn publish(&self, event: ChargingEvent) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

// ==========================================
// 测试环境
// ==========================================

pub struct TestEnv {
    /// 临时数据库文件（需要保持存活）
    pub _temp_file: NamedTempFile,
    pub db_path: String,
    pub clock: Arc<ManualClock>,
    pub events: Arc<RecordingPublisher>,
    pub state: AppState,
}

impl TestEnv {
    pub fn request_repo(&self) -> ChargingRequestRepository {
        let conn = open_sqlite_connection(&self.db_path).unwrap();
        ChargingRequestRepository::from_connection(Arc::new(Mutex::new(conn)))
    }

    /// 按排队号读取请求
    pub fn request(&self, ticket: &str) -> ChargingRequest {
        self.request_repo()
            .find_by_queue_number(ticket)
            .unwrap()
            .unwrap_or_else(|| panic!("ticket {} not found", ticket))
    }

    pub fn pile(&self, pile_id: &str) -> ChargingPile {
        self.state.pile_repo.find_by_id(pile_id).unwrap().unwrap()
    }

    /// 外部等候区排队号（按位置）
    pub fn external_tickets(&self, mode: ChargingMode) -> Vec<(String, i64)> {
        self.request_repo()
            .list_external(mode)
            .unwrap()
            .into_iter()
            .map(|r| (r.queue_number, r.external_queue_position.unwrap()))
            .collect()
    }

    /// 桩队列排队号（按位置，不含充电中）
    pub fn pile_tickets(&self, pile_id: &str) -> Vec<(String, i64)> {
        self.request_repo()
            .list_pile_queue(pile_id)
            .unwrap()
            .into_iter()
            .map(|r| (r.queue_number, r.pile_queue_position.unwrap()))
            .collect()
    }

    /// 两种模式的队列均连续且一致
    pub fn assert_consistent(&self) {
        for mode in ChargingMode::ALL {
            let report = self.state.maintenance.check(mode).unwrap();
            assert!(report.is_consistent(), "{:?}", report.issues);
        }
    }
}

/// 测试环境构建器
///
/// 默认不登记任何充电桩，通过 with_piles 显式添加
pub struct TestEnvBuilder {
    params: Vec<(String, String, ParamType)>,
    piles: Vec<(ChargingMode, f64)>,
    driver: Option<DriverConfig>,
}

impl TestEnvBuilder {
    pub fn new() -> Self {
        Self {
            params: Vec::new(),
            piles: Vec::new(),
            driver: None,
        }
    }

    pub fn param(mut self, key: &str, value: &str, param_type: ParamType) -> Self {
        self.params
            .push((key.to_string(), value.to_string(), param_type));
        self
    }

    pub fn external_capacity(self, size: i64) -> Self {
        self.param("external_waiting_area_size", &size.to_string(), ParamType::Int)
    }

    pub fn pile_queue_size(self, mode: ChargingMode, size: i64) -> Self {
        let key = match mode {
            ChargingMode::Fast => "fast_pile_max_queue_size",
            ChargingMode::Slow => "slow_pile_max_queue_size",
        };
        self.param(key, &size.to_string(), ParamType::Int)
    }

    /// 登记 count 个指定功率的桩，编号接续已登记的同类桩
    pub fn with_piles(mut self, mode: ChargingMode, count: usize, power_kw: f64) -> Self {
        for _ in 0..count {
            self.piles.push((mode, power_kw));
        }
        self
    }

    pub fn driver(mut self, config: DriverConfig) -> Self {
        self.driver = Some(config);
        self
    }

    pub fn build(self) -> TestEnv {
        let (temp_file, db_path) = create_test_db().unwrap();

        {
            let conn = Arc::new(Mutex::new(open_sqlite_connection(&db_path).unwrap()));
            let config = ConfigManager::from_connection(conn.clone());
            config.ensure_defaults().unwrap();
            for (key, value, param_type) in &self.params {
                config.set_parameter(key, value, *param_type, "").unwrap();
            }

            let queue = config.load_queue_config().unwrap();
            let pile_repo = ChargingPileRepository::from_connection(conn);
            let mut counters = [0usize; 2];
            for (mode, power) in &self.piles {
                let idx = match mode {
                    ChargingMode::Fast => 0,
                    ChargingMode::Slow => 1,
                };
                counters[idx] += 1;
                let pile = ChargingPile::new(
                    format_pile_id(*mode, counters[idx]),
                    *mode,
                    *power,
                    queue.pile_max_queue_size(*mode),
                );
                pile_repo.register(&pile).unwrap();
            }
        }

        let clock = Arc::new(ManualClock::new(base_time()));
        let events = Arc::new(RecordingPublisher::default());
        let state = AppState::with_options(
            db_path.clone(),
            AppOptions {
                clock: clock.clone(),
                events: OptionalEventPublisher::with_publisher(events.clone()),
                driver: self.driver,
                seed_piles: false,
                ..AppOptions::default()
            },
        )
        .unwrap();

        TestEnv {
            _temp_file: temp_file,
            db_path,
            clock,
            events,
            state,
        }
    }
}

/// 构造提交参数（不指定车辆，使用用户默认车辆）
pub fn new_request(user_id: &str, mode: ChargingMode, amount: f64) -> NewChargingRequest {
    NewChargingRequest {
        user_id: user_id.to_string(),
        vehicle_id: None,
        charging_mode: mode,
        requested_amount: amount,
        battery_capacity: 80.0,
    }
}

pub fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-6,
        "expected {}, got {}",
        expected,
        actual
    );
}
