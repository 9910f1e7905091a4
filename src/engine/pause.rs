// ==========================================
// 叫号暂停标志
// ==========================================
// 故障协调器持有写权限，调度器在每次转移前读取
// 暂停与恢复在同一工作单元内完成（持有模式锁与数据库事务），
// 单元之外的读取者看不到暂停状态
// ==========================================

use crate::domain::types::ChargingMode;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
pub struct PauseRegistry {
    fast: AtomicBool,
    slow: AtomicBool,
}

impl PauseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn flag(&self, mode: ChargingMode) -> &AtomicBool {
        match mode {
            ChargingMode::Fast => &self.fast,
            ChargingMode::Slow => &self.slow,
        }
    }

    pub fn is_paused(&self, mode: ChargingMode) -> bool {
        self.flag(mode).load(Ordering::SeqCst)
    }

    pub(crate) fn resume(&self, mode: ChargingMode) {
        if self.flag(mode).swap(false, Ordering::SeqCst) {
            tracing::info!(mode = %mode, "恢复叫号");
        }
    }

    /// 暂停叫号，返回的守卫在离开作用域时自动恢复
    pub(crate) fn pause(&self, mode: ChargingMode) -> PauseGuard<'_> {
        self.flag(mode).store(true, Ordering::SeqCst);
        tracing::info!(mode = %mode, "暂停叫号");
        PauseGuard {
            registry: self,
            mode,
        }
    }
}

pub(crate) struct PauseGuard<'a> {
    registry: &'a PauseRegistry,
    mode: ChargingMode,
}

impl PauseGuard<'_> {
    pub fn release(self) {}
}

impl Drop for PauseGuard<'_> {
    fn drop(&mut self) {
        self.registry.resume(self.mode);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_resumes_on_drop() {
        let registry = PauseRegistry::new();
        {
            let _guard = registry.pause(ChargingMode::Fast);
            assert!(registry.is_paused(ChargingMode::Fast));
            assert!(!registry.is_paused(ChargingMode::Slow));
        }
        assert!(!registry.is_paused(ChargingMode::Fast));

        let guard = registry.pause(ChargingMode::Slow);
        guard.release();
        assert!(!registry.is_paused(ChargingMode::Slow));
    }
}
