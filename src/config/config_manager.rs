// ==========================================
// 电动汽车充电调度系统 - 参数管理器
// ==========================================
// 职责: 参数加载、查询、写入；为调度/计费/故障处理提供配置快照
// 存储: system_parameter 表 (key + typed value)
// 约束: 参数缺失或非法时回落到文档化默认值，不中断调度
// ==========================================

use crate::config::error::{ConfigError, ConfigResult};
use crate::config::parameter::{
    parse_bool, parse_hour, FaultConfig, HourWindow, ParamType, PricingConfig, QueueConfig,
    SystemConfig, SystemParameter,
};
use crate::db::open_sqlite_connection;
use crate::domain::types::DispatchStrategy;
use crate::repository::error::RepositoryError;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

// ==========================================
// ConfigManager - 参数管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    pub fn new(db_path: &str) -> ConfigResult<Self> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> ConfigResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| ConfigError::Storage(RepositoryError::LockError(e.to_string())))
    }

    // ==========================================
    // 原始读写
    // ==========================================

    /// 读取单个参数
    pub fn get_parameter(&self, key: &str) -> ConfigResult<Option<SystemParameter>> {
        let conn = self.get_conn()?;
        let param = conn
            .query_row(
                r#"
                SELECT param_key, param_value, param_type, description, is_editable
                FROM system_parameter
                WHERE param_key = ?1
                "#,
                params![key],
                map_parameter_row,
            )
            .optional()?;
        Ok(param)
    }

    /// 读取必需参数（缺失时返回 Missing）
    pub fn require_parameter(&self, key: &str) -> ConfigResult<SystemParameter> {
        self.get_parameter(key)?.ok_or_else(|| ConfigError::Missing {
            key: key.to_string(),
        })
    }

    /// 列出全部参数（按 key 排序）
    pub fn list_parameters(&self) -> ConfigResult<Vec<SystemParameter>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT param_key, param_value, param_type, description, is_editable
            FROM system_parameter
            ORDER BY param_key
            "#,
        )?;
        let params = stmt
            .query_map([], map_parameter_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(params)
    }

    /// 写入参数（UPSERT），写入前按声明类型校验
    ///
    /// # 注意
    /// - 不可编辑的参数只能由 ensure_defaults 写入
    pub fn set_parameter(
        &self,
        key: &str,
        value: &str,
        param_type: ParamType,
        description: &str,
    ) -> ConfigResult<()> {
        let param = SystemParameter {
            param_key: key.to_string(),
            param_value: value.trim().to_string(),
            param_type,
            description: description.to_string(),
            is_editable: true,
        };
        if !param.validate() {
            return Err(ConfigError::InvalidValue {
                key: key.to_string(),
                value: value.to_string(),
                expected: param_type.as_str().to_string(),
            });
        }

        if let Some(existing) = self.get_parameter(key)? {
            if !existing.is_editable {
                return Err(ConfigError::NotEditable {
                    key: key.to_string(),
                });
            }
        }

        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO system_parameter (param_key, param_value, param_type, description, is_editable, updated_at)
            VALUES (?1, ?2, ?3, ?4, 1, datetime('now'))
            ON CONFLICT(param_key) DO UPDATE SET
                param_value = excluded.param_value,
                param_type = excluded.param_type,
                description = CASE WHEN excluded.description = '' THEN description ELSE excluded.description END,
                updated_at = excluded.updated_at
            "#,
            params![
                param.param_key,
                param.param_value,
                param.param_type.as_str(),
                param.description,
            ],
        )?;

        tracing::info!(param_key = key, param_value = %param.param_value, "系统参数已更新");
        Ok(())
    }

    /// 写入缺失的默认参数（已有参数不覆盖）
    ///
    /// # 返回
    /// - 新写入的参数数量
    pub fn ensure_defaults(&self) -> ConfigResult<usize> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let mut count = 0;
        for (key, value, param_type, description, editable) in defaults::PARAMETERS {
            count += tx.execute(
                r#"
                INSERT OR IGNORE INTO system_parameter (param_key, param_value, param_type, description, is_editable)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
                params![key, value, param_type.as_str(), description, *editable as i32],
            )?;
        }

        tx.commit()?;
        if count > 0 {
            tracing::info!(inserted = count, "已写入默认系统参数");
        }
        Ok(count)
    }

    /// 获取所有参数的快照（key → value）
    pub fn get_config_snapshot(&self) -> ConfigResult<HashMap<String, String>> {
        Ok(self
            .list_parameters()?
            .into_iter()
            .map(|p| (p.param_key, p.param_value))
            .collect())
    }

    // ==========================================
    // 类型化读取（带默认值）
    // ==========================================

    fn get_value(&self, key: &str) -> ConfigResult<Option<String>> {
        Ok(self.get_parameter(key)?.map(|p| p.param_value))
    }

    pub fn get_i64_or(&self, key: &str, default: i64) -> ConfigResult<i64> {
        Ok(match self.get_value(key)? {
            Some(raw) => raw.trim().parse::<i64>().unwrap_or_else(|_| {
                warn_invalid(key, &raw, "int");
                default
            }),
            None => default,
        })
    }

    pub fn get_f64_or(&self, key: &str, default: f64) -> ConfigResult<f64> {
        Ok(match self.get_value(key)? {
            Some(raw) => raw.trim().parse::<f64>().unwrap_or_else(|_| {
                warn_invalid(key, &raw, "float");
                default
            }),
            None => default,
        })
    }

    pub fn get_bool_or(&self, key: &str, default: bool) -> ConfigResult<bool> {
        Ok(match self.get_value(key)? {
            Some(raw) => parse_bool(&raw).unwrap_or_else(|| {
                warn_invalid(key, &raw, "boolean");
                default
            }),
            None => default,
        })
    }

    pub fn get_string_or(&self, key: &str, default: &str) -> ConfigResult<String> {
        Ok(self.get_value(key)?.unwrap_or_else(|| default.to_string()))
    }

    // ==========================================
    // 配置快照
    // ==========================================

    /// 队列配置
    pub fn load_queue_config(&self) -> ConfigResult<QueueConfig> {
        let d = QueueConfig::default();
        Ok(QueueConfig {
            external_waiting_area_size: self
                .get_i64_or(config_keys::EXTERNAL_WAITING_AREA_SIZE, d.external_waiting_area_size)?
                .max(0),
            fast_pile_max_queue_size: self
                .get_i64_or(config_keys::FAST_PILE_MAX_QUEUE_SIZE, d.fast_pile_max_queue_size)?
                .max(0),
            slow_pile_max_queue_size: self
                .get_i64_or(config_keys::SLOW_PILE_MAX_QUEUE_SIZE, d.slow_pile_max_queue_size)?
                .max(0),
            fast_charging_power: positive_or(
                config_keys::FAST_CHARGING_POWER,
                self.get_f64_or(config_keys::FAST_CHARGING_POWER, d.fast_charging_power)?,
                d.fast_charging_power,
            ),
            slow_charging_power: positive_or(
                config_keys::SLOW_CHARGING_POWER,
                self.get_f64_or(config_keys::SLOW_CHARGING_POWER, d.slow_charging_power)?,
                d.slow_charging_power,
            ),
            queue_position_update_interval: self.get_i64_or(
                config_keys::QUEUE_POSITION_UPDATE_INTERVAL,
                d.queue_position_update_interval,
            )?,
            shortest_wait_time_threshold: self.get_i64_or(
                config_keys::SHORTEST_WAIT_TIME_THRESHOLD,
                d.shortest_wait_time_threshold,
            )?,
        })
    }

    /// 计费配置
    pub fn load_pricing_config(&self) -> ConfigResult<PricingConfig> {
        let d = PricingConfig::default();

        let peak_start = self.get_string_or(config_keys::PEAK_HOURS_START, "8:00")?;
        let peak_end = self.get_string_or(config_keys::PEAK_HOURS_END, "11:00")?;
        let valley_start = self.get_string_or(config_keys::VALLEY_HOURS_START, "23:00")?;
        let valley_end = self.get_string_or(config_keys::VALLEY_HOURS_END, "7:00")?;

        let mut peak_windows = match (parse_hour(&peak_start), parse_hour(&peak_end)) {
            (Some(s), Some(e)) => vec![HourWindow::new(s, e)],
            _ => {
                warn_invalid(config_keys::PEAK_HOURS_START, &format!("{}-{}", peak_start, peak_end), "hh:mm");
                d.peak_windows.clone()
            }
        };

        // 额外峰时窗口: "18:00-21:00,13:00-14:00"
        let extra = self.get_string_or(config_keys::PEAK_HOURS_EXTRA, "")?;
        for part in extra.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            match HourWindow::parse_range(part) {
                Some(w) => peak_windows.push(w),
                None => warn_invalid(config_keys::PEAK_HOURS_EXTRA, part, "hh:mm-hh:mm"),
            }
        }

        let valley_windows = match (parse_hour(&valley_start), parse_hour(&valley_end)) {
            (Some(s), Some(e)) => vec![HourWindow::new(s, e)],
            _ => {
                warn_invalid(config_keys::VALLEY_HOURS_START, &format!("{}-{}", valley_start, valley_end), "hh:mm");
                d.valley_windows.clone()
            }
        };

        Ok(PricingConfig {
            peak_rate: self.get_f64_or(config_keys::PEAK_RATE, d.peak_rate)?,
            normal_rate: self.get_f64_or(config_keys::NORMAL_RATE, d.normal_rate)?,
            valley_rate: self.get_f64_or(config_keys::VALLEY_RATE, d.valley_rate)?,
            service_rate: self.get_f64_or(config_keys::SERVICE_RATE, d.service_rate)?,
            peak_windows,
            valley_windows,
        })
    }

    /// 故障处理配置
    pub fn load_fault_config(&self) -> ConfigResult<FaultConfig> {
        let d = FaultConfig::default();
        let strategy = self.get_string_or(config_keys::FAULT_DISPATCH_STRATEGY, "priority")?;
        Ok(FaultConfig {
            dispatch_strategy: DispatchStrategy::from_str(&strategy),
            fault_detection_enabled: self
                .get_bool_or(config_keys::FAULT_DETECTION_ENABLED, d.fault_detection_enabled)?,
            recovery_reschedule_enabled: self.get_bool_or(
                config_keys::RECOVERY_RESCHEDULE_ENABLED,
                d.recovery_reschedule_enabled,
            )?,
        })
    }

    /// 运行配置
    pub fn load_system_config(&self) -> ConfigResult<SystemConfig> {
        let d = SystemConfig::default();
        Ok(SystemConfig {
            notification_enabled: self
                .get_bool_or(config_keys::NOTIFICATION_ENABLED, d.notification_enabled)?,
            max_charging_time_per_session: self.get_i64_or(
                config_keys::MAX_CHARGING_TIME_PER_SESSION,
                d.max_charging_time_per_session,
            )?,
            progress_update_interval_secs: self
                .get_i64_or(
                    config_keys::PROGRESS_UPDATE_INTERVAL,
                    d.progress_update_interval_secs as i64,
                )?
                .max(1) as u64,
        })
    }
}

fn map_parameter_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SystemParameter> {
    Ok(SystemParameter {
        param_key: row.get(0)?,
        param_value: row.get(1)?,
        param_type: ParamType::from_str(&row.get::<_, String>(2)?),
        description: row.get(3)?,
        is_editable: row.get::<_, i32>(4)? != 0,
    })
}

fn warn_invalid(key: &str, raw: &str, expected: &str) {
    tracing::warn!(
        config_key = key,
        raw_value = %raw,
        expected,
        "参数格式错误，使用默认值"
    );
}

fn positive_or(key: &str, value: f64, default: f64) -> f64 {
    if value > 0.0 {
        value
    } else {
        warn_invalid(key, &value.to_string(), "positive float");
        default
    }
}

// ==========================================
// 参数键常量
// ==========================================
pub mod config_keys {
    // 充电桩
    pub const FAST_CHARGING_PILE_NUM: &str = "fast_charging_pile_num";
    pub const SLOW_CHARGING_PILE_NUM: &str = "slow_charging_pile_num";
    pub const FAST_CHARGING_POWER: &str = "fast_charging_power";
    pub const SLOW_CHARGING_POWER: &str = "slow_charging_power";

    // 队列
    pub const EXTERNAL_WAITING_AREA_SIZE: &str = "external_waiting_area_size";
    pub const FAST_PILE_MAX_QUEUE_SIZE: &str = "fast_pile_max_queue_size";
    pub const SLOW_PILE_MAX_QUEUE_SIZE: &str = "slow_pile_max_queue_size";
    pub const QUEUE_POSITION_UPDATE_INTERVAL: &str = "queue_position_update_interval";
    pub const SHORTEST_WAIT_TIME_THRESHOLD: &str = "shortest_wait_time_threshold";

    // 电价
    pub const PEAK_RATE: &str = "peak_rate";
    pub const NORMAL_RATE: &str = "normal_rate";
    pub const VALLEY_RATE: &str = "valley_rate";
    pub const SERVICE_RATE: &str = "service_rate";

    // 时段
    pub const PEAK_HOURS_START: &str = "peak_hours_start";
    pub const PEAK_HOURS_END: &str = "peak_hours_end";
    pub const PEAK_HOURS_EXTRA: &str = "peak_hours_extra";
    pub const VALLEY_HOURS_START: &str = "valley_hours_start";
    pub const VALLEY_HOURS_END: &str = "valley_hours_end";

    // 运行
    pub const MAX_CHARGING_TIME_PER_SESSION: &str = "max_charging_time_per_session";
    pub const NOTIFICATION_ENABLED: &str = "notification_enabled";
    pub const PROGRESS_UPDATE_INTERVAL: &str = "progress_update_interval";

    // 故障处理
    pub const FAULT_DISPATCH_STRATEGY: &str = "fault_dispatch_strategy";
    pub const FAULT_DETECTION_ENABLED: &str = "fault_detection_enabled";
    pub const RECOVERY_RESCHEDULE_ENABLED: &str = "recovery_reschedule_enabled";
}

// ==========================================
// 默认参数表
// ==========================================
pub mod defaults {
    use super::config_keys::*;
    use crate::config::parameter::ParamType;

    /// (key, value, type, description, is_editable)
    pub const PARAMETERS: &[(&str, &str, ParamType, &str, bool)] = &[
        (FAST_CHARGING_PILE_NUM, "2", ParamType::Int, "快充桩数量", true),
        (SLOW_CHARGING_PILE_NUM, "5", ParamType::Int, "慢充桩数量", true),
        (FAST_CHARGING_POWER, "120.0", ParamType::Float, "快充桩充电功率(kW)", true),
        (SLOW_CHARGING_POWER, "7.0", ParamType::Float, "慢充桩充电功率(kW)", true),
        (EXTERNAL_WAITING_AREA_SIZE, "50", ParamType::Int, "外部等候区最大容量(每种模式)", true),
        (FAST_PILE_MAX_QUEUE_SIZE, "3", ParamType::Int, "快充桩队列最大容量", true),
        (SLOW_PILE_MAX_QUEUE_SIZE, "5", ParamType::Int, "慢充桩队列最大容量", true),
        (QUEUE_POSITION_UPDATE_INTERVAL, "30", ParamType::Int, "队列位置更新间隔(秒)", true),
        (SHORTEST_WAIT_TIME_THRESHOLD, "10", ParamType::Int, "最短等待时间调度阈值(分钟)", true),
        (PEAK_RATE, "1.2", ParamType::Float, "峰时电价(元/kWh)", true),
        (NORMAL_RATE, "0.8", ParamType::Float, "平时电价(元/kWh)", true),
        (VALLEY_RATE, "0.4", ParamType::Float, "谷时电价(元/kWh)", true),
        (SERVICE_RATE, "0.3", ParamType::Float, "服务费率(元/kWh)", true),
        (PEAK_HOURS_START, "8:00", ParamType::String, "峰时开始时间", true),
        (PEAK_HOURS_END, "11:00", ParamType::String, "峰时结束时间", true),
        (PEAK_HOURS_EXTRA, "", ParamType::String, "额外峰时窗口(逗号分隔, 如 18:00-21:00)", true),
        (VALLEY_HOURS_START, "23:00", ParamType::String, "谷时开始时间", true),
        (VALLEY_HOURS_END, "7:00", ParamType::String, "谷时结束时间", true),
        (MAX_CHARGING_TIME_PER_SESSION, "480", ParamType::Int, "单次充电最大时长(分钟)", true),
        (NOTIFICATION_ENABLED, "true", ParamType::Boolean, "是否启用通知功能", true),
        (PROGRESS_UPDATE_INTERVAL, "30", ParamType::Int, "充电进度轮询间隔(秒)", true),
        (FAULT_DISPATCH_STRATEGY, "priority", ParamType::String, "故障调度策略(priority/time_order)", true),
        (FAULT_DETECTION_ENABLED, "true", ParamType::Boolean, "是否启用充电桩故障检测", true),
        (RECOVERY_RESCHEDULE_ENABLED, "true", ParamType::Boolean, "恢复时是否重新调度队列", true),
        ("system_version", "2.0.0", ParamType::String, "系统版本", false),
    ];
}
