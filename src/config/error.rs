// ==========================================
// 电动汽车充电调度系统 - 配置层错误类型
// ==========================================

use crate::repository::error::RepositoryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    /// 必需参数缺失（调用方应回落到文档化默认值）
    #[error("配置参数缺失: {key}")]
    Missing { key: String },

    #[error("配置参数值非法: {key}={value} (期望类型 {expected})")]
    InvalidValue {
        key: String,
        value: String,
        expected: String,
    },

    #[error("配置参数不可编辑: {key}")]
    NotEditable { key: String },

    #[error(transparent)]
    Storage(#[from] RepositoryError),
}

impl From<rusqlite::Error> for ConfigError {
    fn from(err: rusqlite::Error) -> Self {
        ConfigError::Storage(RepositoryError::from(err))
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;
