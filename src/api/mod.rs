// ==========================================
// 电动汽车充电调度系统 - API 层
// ==========================================
// 职责: 对外业务接口，统一错误码
// ==========================================

pub mod charging_api;
pub mod error;

// 重导出核心类型
pub use charging_api::{
    BillDetail, ChargingApi, ModeOverview, PileOverview, QueueOverview, TicketStatus,
    WaitingTicket,
};
pub use error::{ApiError, ApiResult, ErrorResponse};
