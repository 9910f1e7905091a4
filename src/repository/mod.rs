// ==========================================
// 电动汽车充电调度系统 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod error;
pub mod notification_repo;
pub mod pile_repo;
pub mod request_repo;
pub mod session_repo;
pub mod ticket_repo;

// 重导出核心仓储
pub use error::{RepositoryError, RepositoryResult};
pub use notification_repo::NotificationRepository;
pub use pile_repo::ChargingPileRepository;
pub use request_repo::ChargingRequestRepository;
pub use session_repo::ChargingSessionRepository;
pub use ticket_repo::TicketSequenceRepository;
