// ==========================================
// 电动汽车充电调度系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod notification;
pub mod pile;
pub mod request;
pub mod session;
pub mod types;

// 重导出核心类型
pub use notification::Notification;
pub use pile::{format_pile_id, ChargingPile, PileStatistics};
pub use request::{format_queue_number, ChargingRequest, NewChargingRequest};
pub use session::{BillBreakdown, ChargingSession};
pub use types::{
    ChargingMode, DispatchStrategy, NotificationType, PileStatus, QueueLevel, RateBand,
    RequestStatus,
};
