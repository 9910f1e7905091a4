// ==========================================
// 时钟抽象
// ==========================================
// 调度、计费、进度推进统一从 Clock 取时间，测试可注入手动时钟
// ==========================================

use chrono::{Duration, Local, NaiveDateTime};
use std::sync::Mutex;

pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// 本地墙上时间
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// 手动推进的时钟
///
/// 每次读取后自动前进 1 微秒，保证同一测试内的时间戳严格递增
#[derive(Debug)]
pub struct ManualClock {
    current: Mutex<NaiveDateTime>,
}

impl ManualClock {
    pub fn new(start: NaiveDateTime) -> Self {
        Self {
            current: Mutex::new(start),
        }
    }

    pub fn set(&self, ts: NaiveDateTime) {
        if let Ok(mut guard) = self.current.lock() {
            *guard = ts;
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut guard) = self.current.lock() {
            *guard += by;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        match self.current.lock() {
            Ok(mut guard) => {
                let now = *guard;
                *guard += Duration::microseconds(1);
                now
            }
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_manual_clock_is_strictly_increasing() {
        let start = NaiveDate::from_ymd_opt(2026, 3, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        let clock = ManualClock::new(start);
        let a = clock.now();
        let b = clock.now();
        assert_eq!(a, start);
        assert!(b > a);

        clock.advance(Duration::minutes(30));
        assert!(clock.now() >= start + Duration::minutes(30));
    }
}
