// ==========================================
// 电动汽车充电调度系统 - 调度引擎错误类型
// ==========================================
// 领域错误一律以类型化结果返回，不 panic
// 基础设施错误中止整个工作单元（事务回滚）
// ==========================================

use crate::config::ConfigError;
use crate::domain::types::ChargingMode;
use crate::repository::error::RepositoryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("外部等候区已满: mode={mode}, limit={limit}")]
    CapacityExceeded { mode: ChargingMode, limit: i64 },

    #[error("车辆已有进行中的充电请求: vehicle_id={vehicle_id}")]
    DuplicateActiveRequest { vehicle_id: String },

    #[error("无效的状态转换: from={from} to={to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("记录未找到: {entity} with id={id}")]
    NotFound { entity: String, id: String },

    #[error("配置缺失: {0}")]
    ConfigurationMissing(String),

    #[error("并发冲突: {0}")]
    ConcurrencyConflict(String),

    #[error("参数校验失败: {0}")]
    Validation(String),

    #[error(transparent)]
    Repository(RepositoryError),
}

impl ScheduleError {
    pub fn not_found(entity: &str, id: impl Into<String>) -> Self {
        ScheduleError::NotFound {
            entity: entity.to_string(),
            id: id.into(),
        }
    }

    pub fn transition(from: impl ToString, to: impl ToString) -> Self {
        ScheduleError::InvalidStateTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

impl From<RepositoryError> for ScheduleError {
    fn from(err: RepositoryError) -> Self {
        if err.is_concurrency_conflict() {
            return ScheduleError::ConcurrencyConflict(err.to_string());
        }
        match err {
            RepositoryError::NotFound { entity, id } => ScheduleError::NotFound { entity, id },
            other => ScheduleError::Repository(other),
        }
    }
}

impl From<rusqlite::Error> for ScheduleError {
    fn from(err: rusqlite::Error) -> Self {
        ScheduleError::from(RepositoryError::from(err))
    }
}

impl From<ConfigError> for ScheduleError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Missing { key } => ScheduleError::ConfigurationMissing(key),
            ConfigError::InvalidValue { .. } | ConfigError::NotEditable { .. } => {
                ScheduleError::Validation(err.to_string())
            }
            ConfigError::Storage(inner) => ScheduleError::from(inner),
        }
    }
}

pub type ScheduleResult<T> = Result<T, ScheduleError>;
