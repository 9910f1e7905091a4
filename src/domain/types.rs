// ==========================================
// 电动汽车充电调度系统 - 领域类型定义
// ==========================================
// 职责: 充电模式、请求状态、队列层级、充电桩状态等枚举
// 存储格式: 小写 snake_case (与数据库一致)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 充电模式 (Charging Mode)
// ==========================================
// 快充桩只服务快充请求，慢充桩只服务慢充请求
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargingMode {
    Fast, // 快充
    Slow, // 慢充
}

impl ChargingMode {
    /// 全部充电模式（固定顺序：快充在前）
    pub const ALL: [ChargingMode; 2] = [ChargingMode::Fast, ChargingMode::Slow];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChargingMode::Fast => "fast",
            ChargingMode::Slow => "slow",
        }
    }

    /// 从数据库字符串解析
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "fast" => Some(ChargingMode::Fast),
            "slow" | "trickle" => Some(ChargingMode::Slow),
            _ => None,
        }
    }

    /// 排队号前缀: F=快充, S=慢充
    pub fn ticket_prefix(&self) -> char {
        match self {
            ChargingMode::Fast => 'F',
            ChargingMode::Slow => 'S',
        }
    }
}

impl fmt::Display for ChargingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 请求状态 (Request Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Waiting,   // 排队中（外部等候区或桩队列）
    Charging,  // 充电中
    Completed, // 已完成
    Cancelled, // 已取消
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Waiting => "waiting",
            RequestStatus::Charging => "charging",
            RequestStatus::Completed => "completed",
            RequestStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "waiting" => Some(RequestStatus::Waiting),
            "charging" => Some(RequestStatus::Charging),
            "completed" => Some(RequestStatus::Completed),
            "cancelled" => Some(RequestStatus::Cancelled),
            _ => None,
        }
    }

    /// 是否为活跃状态（每辆车最多一个）
    pub fn is_active(&self) -> bool {
        matches!(self, RequestStatus::Waiting | RequestStatus::Charging)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 队列层级 (Queue Level)
// ==========================================
// 外部等候区 → 桩队列 → 充电中 → 已结束
// 已取消的请求同样落在 Completed 层级，两个位置字段均为空
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueLevel {
    ExternalWaiting,
    PileQueue,
    Charging,
    Completed,
}

impl QueueLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueLevel::ExternalWaiting => "external_waiting",
            QueueLevel::PileQueue => "pile_queue",
            QueueLevel::Charging => "charging",
            QueueLevel::Completed => "completed",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "external_waiting" => Some(QueueLevel::ExternalWaiting),
            "pile_queue" => Some(QueueLevel::PileQueue),
            "charging" => Some(QueueLevel::Charging),
            "completed" => Some(QueueLevel::Completed),
            _ => None,
        }
    }
}

impl fmt::Display for QueueLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 充电桩状态 (Pile Status)
// ==========================================
// offline 在调度上与 fault 等价
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PileStatus {
    Normal,  // 正常
    Fault,   // 故障
    Offline, // 离线
}

impl PileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PileStatus::Normal => "normal",
            PileStatus::Fault => "fault",
            PileStatus::Offline => "offline",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "normal" => Some(PileStatus::Normal),
            "fault" => Some(PileStatus::Fault),
            "offline" => Some(PileStatus::Offline),
            _ => None,
        }
    }

    /// 是否可参与调度
    pub fn is_available(&self) -> bool {
        matches!(self, PileStatus::Normal)
    }
}

impl fmt::Display for PileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 故障调度策略 (Dispatch Strategy)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStrategy {
    /// 优先级调度：故障队列插到外部等候区最前面
    Priority,
    /// 时间顺序调度：与原有等候者按创建时间统一排序
    TimeOrder,
}

impl DispatchStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchStrategy::Priority => "priority",
            DispatchStrategy::TimeOrder => "time_order",
        }
    }

    /// 解析策略，未知值回落到 priority
    pub fn from_str(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "time_order" | "timeorder" => DispatchStrategy::TimeOrder,
            _ => DispatchStrategy::Priority,
        }
    }
}

impl fmt::Display for DispatchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 通知类型 (Notification Type)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    ChargingStart,
    ChargingComplete,
    QueueTransfer,
    PileFault,
    ChargingModeChange,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::ChargingStart => "charging_start",
            NotificationType::ChargingComplete => "charging_complete",
            NotificationType::QueueTransfer => "queue_transfer",
            NotificationType::PileFault => "pile_fault",
            NotificationType::ChargingModeChange => "charging_mode_change",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "charging_start" => Some(NotificationType::ChargingStart),
            "charging_complete" => Some(NotificationType::ChargingComplete),
            "queue_transfer" => Some(NotificationType::QueueTransfer),
            "pile_fault" => Some(NotificationType::PileFault),
            "charging_mode_change" => Some(NotificationType::ChargingModeChange),
            _ => None,
        }
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 电价时段 (Rate Band)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateBand {
    Peak,   // 峰时
    Normal, // 平时
    Valley, // 谷时
}

impl fmt::Display for RateBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateBand::Peak => write!(f, "peak"),
            RateBand::Normal => write!(f, "normal"),
            RateBand::Valley => write!(f, "valley"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_strategy_defaults_to_priority() {
        assert_eq!(DispatchStrategy::from_str("time_order"), DispatchStrategy::TimeOrder);
        assert_eq!(DispatchStrategy::from_str("priority"), DispatchStrategy::Priority);
        assert_eq!(DispatchStrategy::from_str(""), DispatchStrategy::Priority);
        assert_eq!(DispatchStrategy::from_str("round_robin"), DispatchStrategy::Priority);
    }

    #[test]
    fn test_mode_db_round_trip() {
        for mode in ChargingMode::ALL {
            assert_eq!(ChargingMode::from_db_str(mode.as_str()), Some(mode));
        }
        assert_eq!(ChargingMode::from_db_str("trickle"), Some(ChargingMode::Slow));
        assert_eq!(ChargingMode::Fast.ticket_prefix(), 'F');
    }

    #[test]
    fn test_offline_is_not_available() {
        assert!(PileStatus::Normal.is_available());
        assert!(!PileStatus::Fault.is_available());
        assert!(!PileStatus::Offline.is_available());
    }
}
