// ==========================================
// 电动汽车充电调度系统 - 充电桩领域模型
// ==========================================
// 对齐: charging_pile 表
// 约束: is_working = true 当且仅当该桩上有一个充电中请求
// ==========================================

use crate::domain::types::{ChargingMode, PileStatus};
use serde::{Deserialize, Serialize};

// ==========================================
// ChargingPile - 充电桩
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargingPile {
    pub pile_id: String, // 例如 FAST-001
    pub pile_type: ChargingMode,
    pub status: PileStatus,
    pub is_working: bool,
    pub power_kw: f64,
    pub max_queue_size: i64,

    /// 缓存的预计剩余时间 (分钟)
    pub estimated_remaining_minutes: i64,

    // ===== 累计统计 =====
    pub statistics: PileStatistics,
}

/// 充电桩累计使用统计
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PileStatistics {
    pub total_charging_count: i64,
    pub total_charging_duration_hours: f64,
    pub total_charging_amount: f64,
    pub total_revenue: f64,
}

impl ChargingPile {
    /// 创建一个空闲的正常充电桩
    pub fn new(pile_id: impl Into<String>, pile_type: ChargingMode, power_kw: f64, max_queue_size: i64) -> Self {
        Self {
            pile_id: pile_id.into(),
            pile_type,
            status: PileStatus::Normal,
            is_working: false,
            power_kw,
            max_queue_size,
            estimated_remaining_minutes: 0,
            statistics: PileStatistics::default(),
        }
    }

    pub fn is_available(&self) -> bool {
        self.status.is_available()
    }
}

/// 按类型与序号生成桩编号，例如 FAST-001
pub fn format_pile_id(pile_type: ChargingMode, index: usize) -> String {
    let prefix = match pile_type {
        ChargingMode::Fast => "FAST",
        ChargingMode::Slow => "SLOW",
    };
    format!("{}-{:03}", prefix, index)
}
