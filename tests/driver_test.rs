// ==========================================
// 后台进度驱动测试
// ==========================================
// 覆盖: 进度推进与自动结束、单次时长上限、
//       轮询发现桩状态变化、启动时已故障桩、异步轮询与停止
// ==========================================

#[path = "test_helpers.rs"]
mod test_helpers;

#[cfg(test)]
mod driver_test {
    use std::sync::Arc;

    use chrono::Duration;
    use ev_charging_scheduler::config::ParamType;
    use ev_charging_scheduler::domain::types::{ChargingMode, PileStatus, RequestStatus};
    use ev_charging_scheduler::engine::DriverConfig;
    use ev_charging_scheduler::repository::ChargingPileRepository;
    use tokio::sync::watch;

    use crate::test_helpers::{assert_close, new_request, TestEnv, TestEnvBuilder};

    /// 绕过协调器直接改写桩状态（模拟外部桩注册表的变化）
    fn write_pile_status(env: &TestEnv, pile_id: &str, status: PileStatus) {
        env.state
            .runtime
            .read(|conn| Ok(ChargingPileRepository::set_status_tx(conn, pile_id, status)?))
            .unwrap();
    }

    #[test]
    fn test_tick_advances_progress_and_completes() {
        let env = TestEnvBuilder::new()
            .with_piles(ChargingMode::Fast, 1, 120.0)
            .build();
        env.state
            .scheduler
            .submit(new_request("u1", ChargingMode::Fast, 60.0))
            .unwrap();
        env.state
            .scheduler
            .submit(new_request("u2", ChargingMode::Fast, 30.0))
            .unwrap();

        env.clock.advance(Duration::minutes(15));
        let report = env.state.driver.tick();
        assert_eq!(report.errors, 0);
        assert_eq!(report.piles_observed, 1);
        assert!(report.completed().is_empty());
        assert_close(env.request("F0001").current_amount, 30.0);
        // 剩余 30 kWh → 15 分钟
        assert_eq!(env.request("F0002").estimated_wait_minutes, 15);

        env.clock.advance(Duration::minutes(15));
        let report = env.state.driver.tick();
        assert_eq!(report.completed(), vec!["F0001".to_string()]);

        let done = env.request("F0001");
        assert_eq!(done.current_status, RequestStatus::Completed);
        assert_close(done.current_amount, 60.0);
        assert_eq!(env.request("F0002").current_status, RequestStatus::Charging);
        env.assert_consistent();
    }

    #[test]
    fn test_tick_enforces_max_charging_time() {
        let env = TestEnvBuilder::new()
            .with_piles(ChargingMode::Slow, 1, 7.0)
            .param("max_charging_time_per_session", "60", ParamType::Int)
            .build();
        env.state
            .scheduler
            .submit(new_request("u1", ChargingMode::Slow, 50.0))
            .unwrap();

        env.clock.advance(Duration::minutes(61));
        let report = env.state.driver.tick();
        assert_eq!(report.completed(), vec!["S0001".to_string()]);

        let bill = env.state.charging_api.bill_detail("S0001").unwrap();
        assert!(bill.premature);
        // 约 1.02 小时 × 7 kW
        assert!(bill.charging_amount > 7.0 && bill.charging_amount < 7.5);
        assert!(!env.pile("SLOW-001").is_working);
    }

    #[test]
    fn test_tick_detects_fault_written_by_registry() {
        let env = TestEnvBuilder::new()
            .with_piles(ChargingMode::Fast, 1, 120.0)
            .pile_queue_size(ChargingMode::Fast, 1)
            .build();
        for user in ["u1", "u2", "u3"] {
            env.state
                .scheduler
                .submit(new_request(user, ChargingMode::Fast, 60.0))
                .unwrap();
        }

        // 首次轮询建立状态缓存
        assert_eq!(env.state.driver.tick().errors, 0);

        write_pile_status(&env, "FAST-001", PileStatus::Fault);
        let report = env.state.driver.tick();
        assert_eq!(report.errors, 0);

        assert_eq!(env.request("F0001").current_status, RequestStatus::Completed);
        assert_eq!(
            env.external_tickets(ChargingMode::Fast),
            vec![("F0002".to_string(), 1), ("F0003".to_string(), 2)]
        );

        // 状态未变化时不重复处理
        let again = env.state.driver.tick();
        assert_eq!(again.errors, 0);
        assert_eq!(env.external_tickets(ChargingMode::Fast).len(), 2);

        write_pile_status(&env, "FAST-001", PileStatus::Normal);
        env.state.driver.tick();
        assert_eq!(env.request("F0002").current_status, RequestStatus::Charging);
        assert_eq!(
            env.pile_tickets("FAST-001"),
            vec![("F0003".to_string(), 1)]
        );
        env.assert_consistent();
    }

    #[test]
    fn test_tick_fault_bills_amount_up_to_detection() {
        let env = TestEnvBuilder::new()
            .with_piles(ChargingMode::Fast, 1, 120.0)
            .build();
        env.state
            .scheduler
            .submit(new_request("u1", ChargingMode::Fast, 60.0))
            .unwrap();
        assert_eq!(env.state.driver.tick().errors, 0);

        // 上次轮询后 20 分钟桩发生故障
        env.clock.advance(Duration::minutes(20));
        write_pile_status(&env, "FAST-001", PileStatus::Fault);
        let report = env.state.driver.tick();
        assert_eq!(report.errors, 0);

        let bill = env.state.charging_api.bill_detail("F0001").unwrap();
        assert!(bill.premature);
        assert_close(bill.charging_amount, 40.0);
        assert_close(bill.total_cost, 60.0);
        assert_eq!(env.request("F0001").current_status, RequestStatus::Completed);
    }

    #[test]
    fn test_first_tick_handles_pile_already_faulted() {
        let env = TestEnvBuilder::new()
            .with_piles(ChargingMode::Fast, 1, 120.0)
            .build();
        env.state
            .scheduler
            .submit(new_request("u1", ChargingMode::Fast, 60.0))
            .unwrap();
        env.state
            .scheduler
            .submit(new_request("u2", ChargingMode::Fast, 60.0))
            .unwrap();

        // 启动前桩已故障，且仍有活跃请求
        write_pile_status(&env, "FAST-001", PileStatus::Offline);
        env.state.driver.tick();

        assert_eq!(env.request("F0001").current_status, RequestStatus::Completed);
        assert_eq!(
            env.external_tickets(ChargingMode::Fast),
            vec![("F0002".to_string(), 1)]
        );
        assert!(!env.pile("FAST-001").is_working);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_run_loop_stops_on_shutdown() {
        let env = TestEnvBuilder::new()
            .with_piles(ChargingMode::Fast, 1, 120.0)
            .driver(DriverConfig {
                interval_secs: Some(1),
            })
            .build();
        env.state
            .scheduler
            .submit(new_request("u1", ChargingMode::Fast, 60.0))
            .unwrap();
        env.clock.advance(Duration::minutes(45));

        let (tx, rx) = watch::channel(false);
        let driver = Arc::clone(&env.state.driver);
        let handle = tokio::spawn(driver.run(rx));

        // 首个周期立即触发
        let mut completed = false;
        for _ in 0..50 {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            if env.request("F0001").current_status == RequestStatus::Completed {
                completed = true;
                break;
            }
        }
        assert!(completed);

        tx.send(true).unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .expect("driver did not stop")
            .unwrap();
    }
}
