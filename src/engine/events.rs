// ==========================================
// 电动汽车充电调度系统 - 引擎层事件发布
// ==========================================
// 职责: 定义充电事件发布 trait，实现依赖倒置
// 说明: 事件在事务提交后发布；通知表写入在事务内完成
// ==========================================

use crate::domain::notification::Notification;
use crate::domain::types::NotificationType;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::sync::Arc;

// ==========================================
// 充电事件
// ==========================================

/// 提交后对外发布的充电事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargingEvent {
    /// 接收用户
    pub user_id: String,
    pub event_type: NotificationType,
    pub message: String,
}

impl From<&Notification> for ChargingEvent {
    fn from(n: &Notification) -> Self {
        Self {
            user_id: n.user_id.clone(),
            event_type: n.notification_type,
            message: n.message.clone(),
        }
    }
}

// ==========================================
// 事件发布 Trait
// ==========================================

/// 充电事件发布者 Trait
///
/// 引擎层定义，推送通道（WebSocket / 短信网关等）实现
pub trait ChargingEventPublisher: Send + Sync {
    fn publish(&self, event: ChargingEvent) -> Result<(), Box<dyn Error + Send + Sync>>;
}

/// 空操作事件发布者
#[derive(Debug, Clone, Default)]
pub struct NoOpEventPublisher;

impl ChargingEventPublisher for NoOpEventPublisher {
    fn publish(&self, event: ChargingEvent) -> Result<(), Box<dyn Error + Send + Sync>> {
        tracing::debug!(
            user_id = %event.user_id,
            event_type = %event.event_type,
            "NoOpEventPublisher: 跳过事件发布"
        );
        Ok(())
    }
}

/// 可选的事件发布者包装
pub struct OptionalEventPublisher {
    inner: Option<Arc<dyn ChargingEventPublisher>>,
}

impl OptionalEventPublisher {
    pub fn with_publisher(publisher: Arc<dyn ChargingEventPublisher>) -> Self {
        Self {
            inner: Some(publisher),
        }
    }

    pub fn none() -> Self {
        Self { inner: None }
    }

    /// 逐条发布；发布失败只记录日志，不影响已提交的调度结果
    pub fn publish_all(&self, notifications: &[Notification]) {
        let Some(publisher) = &self.inner else {
            return;
        };
        for n in notifications {
            if let Err(e) = publisher.publish(ChargingEvent::from(n)) {
                tracing::warn!(
                    user_id = %n.user_id,
                    event_type = %n.notification_type,
                    error = %e,
                    "充电事件发布失败"
                );
            }
        }
    }

    pub fn is_configured(&self) -> bool {
        self.inner.is_some()
    }
}

impl Default for OptionalEventPublisher {
    fn default() -> Self {
        Self::none()
    }
}
