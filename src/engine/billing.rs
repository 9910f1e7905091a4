// ==========================================
// 电动汽车充电调度系统 - 分时计费
// ==========================================
// 整个会话按开始时刻的小时归入一个时段，不做跨时段拆分
// 时段费用 = 电量 × 时段电价; 服务费 = 电量 × 服务费率
// ==========================================

use crate::config::parameter::PricingConfig;
use crate::domain::session::BillBreakdown;
use crate::domain::types::RateBand;
use chrono::{NaiveDateTime, Timelike};

pub struct BillingEngine {
    pricing: PricingConfig,
}

impl BillingEngine {
    pub fn new(pricing: PricingConfig) -> Self {
        Self { pricing }
    }

    /// 小时所属时段（峰时优先于谷时）
    pub fn band_for_hour(&self, hour: u32) -> RateBand {
        if self.pricing.peak_windows.iter().any(|w| w.contains(hour)) {
            RateBand::Peak
        } else if self.pricing.valley_windows.iter().any(|w| w.contains(hour)) {
            RateBand::Valley
        } else {
            RateBand::Normal
        }
    }

    pub fn rate_for(&self, band: RateBand) -> f64 {
        match band {
            RateBand::Peak => self.pricing.peak_rate,
            RateBand::Normal => self.pricing.normal_rate,
            RateBand::Valley => self.pricing.valley_rate,
        }
    }

    /// 计算账单
    ///
    /// # 参数
    /// - start / end: 会话起止时间
    /// - amount: 计费电量 (kWh)
    pub fn calculate(&self, start: NaiveDateTime, end: NaiveDateTime, amount: f64) -> BillBreakdown {
        let duration_hours = duration_hours(start, end);
        let amount = amount.max(0.0);
        let band = self.band_for_hour(start.hour());
        let band_cost = amount * self.rate_for(band);
        let service_cost = amount * self.pricing.service_rate;

        let mut bill = BillBreakdown {
            service_cost,
            total_cost: band_cost + service_cost,
            ..BillBreakdown::default()
        };
        match band {
            RateBand::Peak => {
                bill.peak_hours = duration_hours;
                bill.peak_cost = band_cost;
            }
            RateBand::Normal => {
                bill.normal_hours = duration_hours;
                bill.normal_cost = band_cost;
            }
            RateBand::Valley => {
                bill.valley_hours = duration_hours;
                bill.valley_cost = band_cost;
            }
        }

        tracing::debug!(
            band = %band,
            amount,
            duration_hours,
            total_cost = bill.total_cost,
            "账单已计算"
        );
        bill
    }
}

/// 会话时长（小时，不为负）
pub fn duration_hours(start: NaiveDateTime, end: NaiveDateTime) -> f64 {
    let seconds = (end - start).num_milliseconds() as f64 / 1000.0;
    (seconds / 3600.0).max(0.0)
}

/// 金额保留两位小数
pub fn round_money(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
