// ==========================================
// 电动汽车充电调度系统 - API层错误类型
// ==========================================
// 职责: 将引擎/配置/Repository 错误转换为对外的稳定错误码
// ==========================================

use crate::config::ConfigError;
use crate::engine::error::ScheduleError;
use crate::repository::error::RepositoryError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 调度业务错误
    // ==========================================
    #[error("外部等候区已满: {0}")]
    CapacityExceeded(String),

    #[error("重复的充电请求: {0}")]
    DuplicateActiveRequest(String),

    #[error("无效的状态转换: from={from} to={to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("数据验证失败: {0}")]
    ValidationError(String),

    // ==========================================
    // 配置与并发错误
    // ==========================================
    #[error("配置缺失: {0}")]
    ConfigurationMissing(String),

    #[error("并发冲突，请重试: {0}")]
    ConcurrencyConflict(String),

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("内部错误: {0}")]
    InternalError(String),
}

impl ApiError {
    /// 稳定错误码
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::CapacityExceeded(_) => "CAPACITY_EXCEEDED",
            ApiError::DuplicateActiveRequest(_) => "DUPLICATE_ACTIVE_REQUEST",
            ApiError::InvalidStateTransition { .. } => "INVALID_STATE_TRANSITION",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::ValidationError(_) => "VALIDATION_ERROR",
            ApiError::ConfigurationMissing(_) => "CONFIGURATION_MISSING",
            ApiError::ConcurrencyConflict(_) => "CONCURRENCY_CONFLICT",
            ApiError::DatabaseError(_) => "DATABASE_ERROR",
            ApiError::InternalError(_) => "INTERNAL_ERROR",
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            ApiError::InvalidStateTransition { from, to } => {
                Some(serde_json::json!({ "from": from, "to": to }))
            }
            _ => None,
        }
    }

    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            code: self.error_code().to_string(),
            message: self.to_string(),
            details: self.details(),
        }
    }

    /// 序列化为 JSON 字符串，序列化失败时退回纯文本消息
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.to_response()).unwrap_or_else(|_| self.to_string())
    }
}

/// 错误响应（返回给调用方）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

// ==========================================
// 从 ScheduleError 转换
// ==========================================
impl From<ScheduleError> for ApiError {
    fn from(err: ScheduleError) -> Self {
        match err {
            ScheduleError::CapacityExceeded { mode, limit } => {
                ApiError::CapacityExceeded(format!("mode={}, limit={}", mode, limit))
            }
            ScheduleError::DuplicateActiveRequest { vehicle_id } => {
                ApiError::DuplicateActiveRequest(format!("vehicle_id={}", vehicle_id))
            }
            ScheduleError::InvalidStateTransition { from, to } => {
                ApiError::InvalidStateTransition { from, to }
            }
            ScheduleError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            ScheduleError::ConfigurationMissing(key) => ApiError::ConfigurationMissing(key),
            ScheduleError::ConcurrencyConflict(msg) => ApiError::ConcurrencyConflict(msg),
            ScheduleError::Validation(msg) => ApiError::ValidationError(msg),
            ScheduleError::Repository(inner) => ApiError::from(inner),
        }
    }
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        if err.is_concurrency_conflict() {
            return ApiError::ConcurrencyConflict(err.to_string());
        }
        match err {
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::FieldValueError { field, message } => {
                ApiError::InternalError(format!("字段{}错误: {}", field, message))
            }
            RepositoryError::UniqueConstraintViolation(msg)
            | RepositoryError::ForeignKeyViolation(msg) => ApiError::ValidationError(msg),
            other => ApiError::DatabaseError(other.to_string()),
        }
    }
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        ApiError::from(ScheduleError::from(err))
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;
