// ==========================================
// 电动汽车充电调度系统 - 通知
// ==========================================
// 只写不改的事件记录，调度核心不读取
// ==========================================

use crate::domain::types::NotificationType;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub notification_id: String,
    pub user_id: String,
    pub notification_type: NotificationType,
    pub message: String,
    pub created_at: NaiveDateTime,
    pub is_read: bool,
}

impl Notification {
    pub fn new(
        user_id: &str,
        notification_type: NotificationType,
        message: impl Into<String>,
        created_at: NaiveDateTime,
    ) -> Self {
        Self {
            notification_id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            notification_type,
            message: message.into(),
            created_at,
            is_read: false,
        }
    }
}
