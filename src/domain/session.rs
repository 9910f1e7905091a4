// ==========================================
// 电动汽车充电调度系统 - 充电会话 / 账单
// ==========================================
// 对齐: charging_session 表
// 约束: 与请求一对一，只在开始充电时随请求一起创建
// ==========================================

use crate::domain::types::RateBand;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ==========================================
// ChargingSession - 充电会话
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargingSession {
    pub session_id: String,
    pub request_id: String,
    pub pile_id: String,
    pub user_id: String,

    pub start_time: NaiveDateTime,
    pub end_time: Option<NaiveDateTime>,

    pub charging_amount: f64,
    pub charging_duration_hours: f64,

    /// 账单明细（结束后填写）
    pub bill: BillBreakdown,

    /// 是否因故障提前结束
    pub premature: bool,
}

impl ChargingSession {
    /// 开始充电时创建会话
    pub fn start(request_id: &str, pile_id: &str, user_id: &str, start_time: NaiveDateTime) -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            request_id: request_id.to_string(),
            pile_id: pile_id.to_string(),
            user_id: user_id.to_string(),
            start_time,
            end_time: None,
            charging_amount: 0.0,
            charging_duration_hours: 0.0,
            bill: BillBreakdown::default(),
            premature: false,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.end_time.is_some()
    }
}

// ==========================================
// BillBreakdown - 分时段计费结果
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BillBreakdown {
    pub peak_hours: f64,
    pub normal_hours: f64,
    pub valley_hours: f64,

    pub peak_cost: f64,
    pub normal_cost: f64,
    pub valley_cost: f64,
    pub service_cost: f64,
    pub total_cost: f64,
}

impl BillBreakdown {
    /// 整个会话所属的电价时段（账单为空时返回 None）
    pub fn band(&self) -> Option<RateBand> {
        if self.peak_hours > 0.0 || self.peak_cost > 0.0 {
            Some(RateBand::Peak)
        } else if self.valley_hours > 0.0 || self.valley_cost > 0.0 {
            Some(RateBand::Valley)
        } else if self.normal_hours > 0.0 || self.normal_cost > 0.0 {
            Some(RateBand::Normal)
        } else {
            None
        }
    }
}
