// ==========================================
// 车辆归属查询
// ==========================================
// 用户/车辆管理不在本系统内，调度器只通过此 trait 做归属校验
// ==========================================

use std::collections::HashMap;
use std::sync::RwLock;

pub trait VehicleDirectory: Send + Sync {
    /// 车辆是否属于该用户
    fn owns(&self, user_id: &str, vehicle_id: &str) -> bool;

    /// 用户的默认车辆（提交时未指定车辆时使用）
    fn default_vehicle(&self, user_id: &str) -> Option<String>;
}

/// 不做归属校验的目录: 任何车辆都视为用户所有，默认车辆为 "{user_id}-default"
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenVehicleDirectory;

impl VehicleDirectory for OpenVehicleDirectory {
    fn owns(&self, _user_id: &str, _vehicle_id: &str) -> bool {
        true
    }

    fn default_vehicle(&self, user_id: &str) -> Option<String> {
        Some(format!("{}-default", user_id))
    }
}

/// 内存登记的车辆目录（每个用户第一辆登记的车为默认车辆）
#[derive(Debug, Default)]
pub struct InMemoryVehicleDirectory {
    vehicles: RwLock<HashMap<String, Vec<String>>>,
}

impl InMemoryVehicleDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, user_id: &str, vehicle_id: &str) {
        if let Ok(mut map) = self.vehicles.write() {
            let list = map.entry(user_id.to_string()).or_default();
            if !list.iter().any(|v| v == vehicle_id) {
                list.push(vehicle_id.to_string());
            }
        }
    }
}

impl VehicleDirectory for InMemoryVehicleDirectory {
    fn owns(&self, user_id: &str, vehicle_id: &str) -> bool {
        self.vehicles
            .read()
            .map(|map| {
                map.get(user_id)
                    .map(|list| list.iter().any(|v| v == vehicle_id))
                    .unwrap_or(false)
            })
            .unwrap_or(false)
    }

    fn default_vehicle(&self, user_id: &str) -> Option<String> {
        self.vehicles
            .read()
            .ok()
            .and_then(|map| map.get(user_id).and_then(|list| list.first().cloned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_directory() {
        let dir = InMemoryVehicleDirectory::new();
        assert_eq!(dir.default_vehicle("u1"), None);
        dir.register("u1", "V-1");
        dir.register("u1", "V-2");
        assert!(dir.owns("u1", "V-2"));
        assert!(!dir.owns("u2", "V-2"));
        assert_eq!(dir.default_vehicle("u1").as_deref(), Some("V-1"));
    }

    #[test]
    fn test_open_directory() {
        assert!(OpenVehicleDirectory.owns("u1", "anything"));
        assert_eq!(OpenVehicleDirectory.default_vehicle("u1").as_deref(), Some("u1-default"));
    }
}
