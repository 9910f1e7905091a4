// ==========================================
// 电动汽车充电调度系统 - 调度锁
// ==========================================
// 每种充电模式一把锁 + 每个充电桩一把锁
// 加锁顺序: 模式锁（快充→慢充）→ 桩锁（编号升序）
// ==========================================

use crate::domain::types::ChargingMode;
use crate::engine::error::{ScheduleError, ScheduleResult};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
pub struct ScheduleLocks {
    fast: Mutex<()>,
    slow: Mutex<()>,
    piles: Mutex<BTreeMap<String, Arc<Mutex<()>>>>,
}

impl ScheduleLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn mode_lock(&self, mode: ChargingMode) -> &Mutex<()> {
        match mode {
            ChargingMode::Fast => &self.fast,
            ChargingMode::Slow => &self.slow,
        }
    }

    fn pile_handles(&self, pile_ids: &[String]) -> ScheduleResult<Vec<Arc<Mutex<()>>>> {
        let mut ids: Vec<&String> = pile_ids.iter().collect();
        ids.sort();
        ids.dedup();

        let mut registry = self
            .piles
            .lock()
            .map_err(|e| ScheduleError::ConcurrencyConflict(e.to_string()))?;
        Ok(ids
            .into_iter()
            .map(|id| Arc::clone(registry.entry(id.clone()).or_default()))
            .collect())
    }

    /// 按固定顺序持有模式锁与桩锁执行 f
    pub fn with_locks<T>(
        &self,
        modes: &[ChargingMode],
        pile_ids: &[String],
        f: impl FnOnce() -> ScheduleResult<T>,
    ) -> ScheduleResult<T> {
        let mut modes = modes.to_vec();
        modes.sort();
        modes.dedup();

        let mut mode_guards: Vec<MutexGuard<'_, ()>> = Vec::with_capacity(modes.len());
        for mode in modes {
            let guard = self.mode_lock(mode).lock().map_err(|_| {
                ScheduleError::ConcurrencyConflict(format!("模式锁已中毒: {}", mode))
            })?;
            mode_guards.push(guard);
        }

        let handles = self.pile_handles(pile_ids)?;
        let mut pile_guards: Vec<MutexGuard<'_, ()>> = Vec::with_capacity(handles.len());
        for handle in &handles {
            let guard = handle
                .lock()
                .map_err(|_| ScheduleError::ConcurrencyConflict("桩锁已中毒".to_string()))?;
            pile_guards.push(guard);
        }

        let result = f();

        drop(pile_guards);
        drop(mode_guards);
        result
    }
}
