// ==========================================
// 电动汽车充电调度系统 - 系统参数与配置快照
// ==========================================
// 职责: 系统参数实体、类型化取值、调度/计费配置快照
// 说明: 快照在每个调度操作开始时加载一次，操作内不再读库
// ==========================================

use crate::domain::types::{ChargingMode, DispatchStrategy};
use serde::{Deserialize, Serialize};

// ==========================================
// ParamType - 参数值类型
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    Int,
    Float,
    String,
    Boolean,
    Json,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::Int => "int",
            ParamType::Float => "float",
            ParamType::String => "string",
            ParamType::Boolean => "boolean",
            ParamType::Json => "json",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "int" | "integer" => ParamType::Int,
            "float" => ParamType::Float,
            "boolean" | "bool" => ParamType::Boolean,
            "json" => ParamType::Json,
            _ => ParamType::String,
        }
    }
}

// ==========================================
// SystemParameter - 系统参数
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemParameter {
    pub param_key: String,
    pub param_value: String,
    pub param_type: ParamType,
    pub description: String,
    pub is_editable: bool,
}

impl SystemParameter {
    /// 校验参数值是否符合声明类型
    pub fn validate(&self) -> bool {
        match self.param_type {
            ParamType::Int => self.param_value.trim().parse::<i64>().is_ok(),
            ParamType::Float => self.param_value.trim().parse::<f64>().is_ok(),
            ParamType::Boolean => parse_bool(&self.param_value).is_some(),
            ParamType::Json => serde_json::from_str::<serde_json::Value>(&self.param_value).is_ok(),
            ParamType::String => true,
        }
    }
}

/// 解析布尔值（true/1/yes/on）
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

// ==========================================
// HourWindow - 小时时间窗 [start, end)
// ==========================================
// start > end 表示跨零点，例如 23:00-7:00
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourWindow {
    pub start_hour: u32,
    pub end_hour: u32,
}

impl HourWindow {
    pub fn new(start_hour: u32, end_hour: u32) -> Self {
        Self {
            start_hour: start_hour % 24,
            end_hour: end_hour % 24,
        }
    }

    pub fn contains(&self, hour: u32) -> bool {
        if self.start_hour < self.end_hour {
            self.start_hour <= hour && hour < self.end_hour
        } else if self.start_hour > self.end_hour {
            hour >= self.start_hour || hour < self.end_hour
        } else {
            false
        }
    }

    /// 解析 "8:00-11:00" 形式的时间窗
    pub fn parse_range(raw: &str) -> Option<Self> {
        let (start, end) = raw.split_once('-')?;
        Some(Self::new(parse_hour(start)?, parse_hour(end)?))
    }
}

/// 解析 "8:00" / "08:30" / "8" 中的小时部分
pub fn parse_hour(raw: &str) -> Option<u32> {
    let hour_part = raw.trim().split(':').next()?;
    let hour = hour_part.trim().parse::<u32>().ok()?;
    if hour <= 24 {
        Some(hour % 24)
    } else {
        None
    }
}

// ==========================================
// QueueConfig - 队列配置快照
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    pub external_waiting_area_size: i64,
    pub fast_pile_max_queue_size: i64,
    pub slow_pile_max_queue_size: i64,
    pub fast_charging_power: f64,
    pub slow_charging_power: f64,
    /// 当前未参与调度决策
    pub queue_position_update_interval: i64,
    /// 当前未参与调度决策
    pub shortest_wait_time_threshold: i64,
}

impl QueueConfig {
    pub fn pile_max_queue_size(&self, mode: ChargingMode) -> i64 {
        match mode {
            ChargingMode::Fast => self.fast_pile_max_queue_size,
            ChargingMode::Slow => self.slow_pile_max_queue_size,
        }
    }

    pub fn charging_power(&self, mode: ChargingMode) -> f64 {
        match mode {
            ChargingMode::Fast => self.fast_charging_power,
            ChargingMode::Slow => self.slow_charging_power,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            external_waiting_area_size: 50,
            fast_pile_max_queue_size: 3,
            slow_pile_max_queue_size: 5,
            fast_charging_power: 120.0,
            slow_charging_power: 7.0,
            queue_position_update_interval: 30,
            shortest_wait_time_threshold: 10,
        }
    }
}

// ==========================================
// PricingConfig - 计费配置快照
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingConfig {
    pub peak_rate: f64,
    pub normal_rate: f64,
    pub valley_rate: f64,
    pub service_rate: f64,
    pub peak_windows: Vec<HourWindow>,
    pub valley_windows: Vec<HourWindow>,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            peak_rate: 1.2,
            normal_rate: 0.8,
            valley_rate: 0.4,
            service_rate: 0.3,
            peak_windows: vec![HourWindow::new(8, 11)],
            valley_windows: vec![HourWindow::new(23, 7)],
        }
    }
}

// ==========================================
// FaultConfig - 故障处理配置快照
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaultConfig {
    pub dispatch_strategy: DispatchStrategy,
    pub fault_detection_enabled: bool,
    pub recovery_reschedule_enabled: bool,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            dispatch_strategy: DispatchStrategy::Priority,
            fault_detection_enabled: true,
            recovery_reschedule_enabled: true,
        }
    }
}

// ==========================================
// SystemConfig - 运行配置快照
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemConfig {
    pub notification_enabled: bool,
    /// 单次充电最大时长（分钟）
    pub max_charging_time_per_session: i64,
    /// 后台驱动轮询间隔（秒）
    pub progress_update_interval_secs: u64,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            notification_enabled: true,
            max_charging_time_per_session: 480,
            progress_update_interval_secs: 30,
        }
    }
}
