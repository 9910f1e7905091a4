// ==========================================
// 电动汽车充电调度系统 - 应用层
// ==========================================
// 职责: 组装共享状态，供二进制入口与集成测试使用
// ==========================================

pub mod state;

// 重导出
pub use state::{get_default_db_path, seed_piles, AppOptions, AppState};
