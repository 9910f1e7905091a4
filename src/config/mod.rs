// ==========================================
// 电动汽车充电调度系统 - 配置层
// ==========================================
// 职责: 系统参数管理（类型化读写 + 默认值）
// 存储: system_parameter 表
// ==========================================

pub mod config_manager;
pub mod error;
pub mod parameter;

// 重导出核心配置管理器
pub use config_manager::{config_keys, ConfigManager};
pub use error::{ConfigError, ConfigResult};
pub use parameter::{
    FaultConfig, HourWindow, ParamType, PricingConfig, QueueConfig, SystemConfig,
    SystemParameter,
};
