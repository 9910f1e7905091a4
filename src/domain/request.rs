// ==========================================
// 电动汽车充电调度系统 - 充电请求领域模型
// ==========================================
// 对齐: charging_request 表
// 约束: queue_level 与两个位置字段互斥一致
// ==========================================

use crate::domain::types::{ChargingMode, QueueLevel, RequestStatus};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ==========================================
// ChargingRequest - 充电请求
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargingRequest {
    // ===== 标识 =====
    pub request_id: String,   // UUID
    pub queue_number: String, // 排队号 (F0001 / S0001)，改模式时重新发放
    pub user_id: String,
    pub vehicle_id: String,

    // ===== 充电参数 =====
    pub charging_mode: ChargingMode,
    pub requested_amount: f64, // 请求电量 (kWh)
    pub battery_capacity: f64, // 电池容量 (kWh)

    // ===== 状态与队列位置 =====
    pub current_status: RequestStatus,
    pub queue_level: QueueLevel,
    pub external_queue_position: Option<i64>, // 仅 ExternalWaiting 有效
    pub pile_queue_position: Option<i64>,     // 仅 PileQueue 有效
    pub charging_pile_id: Option<String>,

    // ===== 进度 =====
    pub current_amount: f64,        // 已充电量 (kWh)
    pub estimated_wait_minutes: i64, // 预计等待时间 (分钟)

    // ===== 时间 =====
    pub created_at: NaiveDateTime,
    pub queue_entered_at: NaiveDateTime, // 进入当前队列的时间
    pub start_time: Option<NaiveDateTime>,
    pub end_time: Option<NaiveDateTime>,

    /// 插入顺序（同一时刻创建时的稳定排序依据）
    pub seq: i64,
}

// ==========================================
// NewChargingRequest - 提交参数
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewChargingRequest {
    pub user_id: String,
    /// 为空时由 VehicleDirectory 选择用户默认车辆
    pub vehicle_id: Option<String>,
    pub charging_mode: ChargingMode,
    pub requested_amount: f64,
    pub battery_capacity: f64,
}

impl ChargingRequest {
    /// 工厂函数: 在入队前显式构造请求
    ///
    /// 新请求处于外部等候区，位置由调度器在事务内分配
    pub fn new(
        input: &NewChargingRequest,
        vehicle_id: String,
        queue_number: String,
        now: NaiveDateTime,
    ) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            queue_number,
            user_id: input.user_id.clone(),
            vehicle_id,
            charging_mode: input.charging_mode,
            requested_amount: input.requested_amount,
            battery_capacity: input.battery_capacity,
            current_status: RequestStatus::Waiting,
            queue_level: QueueLevel::ExternalWaiting,
            external_queue_position: None,
            pile_queue_position: None,
            charging_pile_id: None,
            current_amount: 0.0,
            estimated_wait_minutes: 0,
            created_at: now,
            queue_entered_at: now,
            start_time: None,
            end_time: None,
            seq: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.current_status.is_active()
    }

    /// 剩余待充电量 (kWh)
    pub fn remaining_amount(&self) -> f64 {
        (self.requested_amount - self.current_amount).max(0.0)
    }

    /// 当前层级下的有效位置
    pub fn current_position(&self) -> Option<i64> {
        match self.queue_level {
            QueueLevel::ExternalWaiting => self.external_queue_position,
            QueueLevel::PileQueue => self.pile_queue_position,
            QueueLevel::Charging | QueueLevel::Completed => None,
        }
    }
}

/// 按模式和序号生成排队号，例如 F0001
pub fn format_queue_number(mode: ChargingMode, seq: i64) -> String {
    format!("{}{:04}", mode.ticket_prefix(), seq)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_factory_starts_in_external_waiting() {
        let input = NewChargingRequest {
            user_id: "u1".to_string(),
            vehicle_id: None,
            charging_mode: ChargingMode::Slow,
            requested_amount: 20.0,
            battery_capacity: 60.0,
        };
        let req = ChargingRequest::new(&input, "v1".to_string(), "S0007".to_string(), ts());

        assert_eq!(req.queue_level, QueueLevel::ExternalWaiting);
        assert_eq!(req.current_status, RequestStatus::Waiting);
        assert_eq!(req.vehicle_id, "v1");
        assert_eq!(req.current_position(), None);
        assert!(req.is_active());
        assert_eq!(req.remaining_amount(), 20.0);
    }

    #[test]
    fn test_queue_number_format() {
        assert_eq!(format_queue_number(ChargingMode::Fast, 1), "F0001");
        assert_eq!(format_queue_number(ChargingMode::Slow, 12345), "S12345");
    }
}
