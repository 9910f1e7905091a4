// ==========================================
// 电动汽车充电调度系统 - 引擎层
// ==========================================
// 职责: 队列调度、故障恢复、等待估算、分时计费、后台驱动
// 红线: Engine 不拼 SQL，持久化一律经由 Repository
// ==========================================

pub mod billing;
pub mod clock;
pub mod context;
pub mod directory;
pub mod driver;
pub mod error;
pub mod estimator;
pub mod events;
pub mod fault;
pub mod locks;
pub mod maintenance;
pub mod pause;
pub mod scheduler;

// 重导出核心引擎
pub use billing::BillingEngine;
pub use clock::{Clock, ManualClock, SystemClock};
pub use context::{ConfigSnapshot, ScheduleRuntime};
pub use directory::{InMemoryVehicleDirectory, OpenVehicleDirectory, VehicleDirectory};
pub use driver::{DriverConfig, ProgressDriver, TickReport};
pub use error::{ScheduleError, ScheduleResult};
pub use events::{ChargingEvent, ChargingEventPublisher, NoOpEventPublisher, OptionalEventPublisher};
pub use fault::{FaultCoordinator, FaultReport, RecoveryReport};
pub use maintenance::{ConsistencyIssue, ConsistencyReport, QueueMaintenance};
pub use pause::PauseRegistry;
pub use scheduler::{CompletionKind, ProgressReport, QueueScheduler, SubmitReceipt};
