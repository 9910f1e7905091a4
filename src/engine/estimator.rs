// ==========================================
// 电动汽车充电调度系统 - 等待时间估算
// ==========================================
// 纯函数: 只依赖充电桩与队列内容，不访问数据库
// 桩剩余时间 = 充电中请求剩余电量/功率 + 队列中各请求电量/功率（分钟）
// 外部等候估算 = min(各可用桩剩余时间[队列满则加自身充电时间]) + (位置-1)×10
// ==========================================

use crate::domain::pile::ChargingPile;
use crate::domain::request::ChargingRequest;

/// 外部等候区每前进一位的排队惩罚（分钟）
pub const QUEUE_POSITION_PENALTY_MINUTES: i64 = 10;

// ==========================================
// PileLoad - 单桩负载快照
// ==========================================
#[derive(Debug, Clone)]
pub struct PileLoad {
    pub pile: ChargingPile,
    pub charging: Option<ChargingRequest>,
    /// 桩队列（按位置升序，不含充电中请求）
    pub queue: Vec<ChargingRequest>,
    pub max_queue_size: i64,
}

impl PileLoad {
    fn minutes_for(&self, amount: f64) -> f64 {
        if self.pile.power_kw <= 0.0 {
            return 0.0;
        }
        amount / self.pile.power_kw * 60.0
    }

    pub fn is_full(&self) -> bool {
        self.queue.len() as i64 >= self.max_queue_size
    }

    pub fn is_eligible(&self) -> bool {
        self.pile.is_available()
    }

    /// 可接收新请求（状态正常且队列未满）
    pub fn accepts(&self) -> bool {
        self.is_eligible() && !self.is_full()
    }

    /// 桩变为空闲前的剩余时间（分钟，未取整）
    pub fn remaining_minutes(&self) -> f64 {
        let charging = self
            .charging
            .as_ref()
            .map(|r| self.minutes_for(r.remaining_amount()))
            .unwrap_or(0.0);
        let queued: f64 = self
            .queue
            .iter()
            .map(|r| self.minutes_for(r.requested_amount))
            .sum();
        charging + queued
    }

    /// 队列中第 position 位之前的剩余时间（分钟，未取整）
    pub fn remaining_ahead_of(&self, position: i64) -> f64 {
        let charging = self
            .charging
            .as_ref()
            .map(|r| self.minutes_for(r.remaining_amount()))
            .unwrap_or(0.0);
        let ahead: f64 = self
            .queue
            .iter()
            .filter(|r| r.pile_queue_position.map(|p| p < position).unwrap_or(false))
            .map(|r| self.minutes_for(r.requested_amount))
            .sum();
        charging + ahead
    }
}

/// 分钟取整（向上）
pub fn ceil_minutes(minutes: f64) -> i64 {
    if minutes <= 0.0 {
        0
    } else {
        minutes.ceil() as i64
    }
}

/// 选出转移目标桩: 可接收请求的桩中剩余时间最短者，相同时取编号较小者
pub fn select_best_pile(loads: &[PileLoad]) -> Option<&PileLoad> {
    loads
        .iter()
        .filter(|l| l.accepts())
        .min_by(|a, b| {
            a.remaining_minutes()
                .total_cmp(&b.remaining_minutes())
                .then_with(|| a.pile.pile_id.cmp(&b.pile.pile_id))
        })
}

/// 外部等候区请求的预计等待时间（分钟）
///
/// 没有可用桩时只计排队惩罚
pub fn external_wait_minutes(request: &ChargingRequest, position: i64, loads: &[PileLoad]) -> i64 {
    let penalty = (position - 1).max(0) * QUEUE_POSITION_PENALTY_MINUTES;
    let best = loads
        .iter()
        .filter(|l| l.is_eligible() && l.pile.pile_type == request.charging_mode)
        .map(|l| {
            let base = l.remaining_minutes();
            if l.is_full() {
                base + l.minutes_for(request.requested_amount)
            } else {
                base
            }
        })
        .min_by(|a, b| a.total_cmp(b));

    match best {
        Some(minutes) => ceil_minutes(minutes) + penalty,
        None => penalty,
    }
}
