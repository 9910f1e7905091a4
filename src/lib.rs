// ==========================================
// 电动汽车充电调度系统 - 核心库
// ==========================================
// 两级队列: 外部等候区（每种模式共享） → 充电桩队列 → 充电中
// 技术栈: Rust + SQLite + tokio
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 调度、故障恢复、估算、计费
pub mod engine;

// 配置层 - 系统参数
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 业务接口
pub mod api;

// 应用层 - 状态组装
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{
    ChargingMode, DispatchStrategy, NotificationType, PileStatus, QueueLevel, RateBand,
    RequestStatus,
};

// 领域实体
pub use domain::{
    BillBreakdown, ChargingPile, ChargingRequest, ChargingSession, NewChargingRequest,
    Notification,
};

// 引擎
pub use engine::{
    BillingEngine, FaultCoordinator, ProgressDriver, QueueMaintenance, QueueScheduler,
    ScheduleError, ScheduleRuntime,
};

// API
pub use api::{ApiError, ChargingApi};

// ==========================================
// 版本信息
// ==========================================

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const APP_NAME: &str = "电动汽车充电调度系统";
