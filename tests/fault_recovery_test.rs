// ==========================================
// 故障/恢复协调器集成测试
// ==========================================
// 覆盖: 故障中断充电并提前结算、两种回插策略、
//       恢复后统一重新调度、开关参数
// ==========================================

#[path = "test_helpers.rs"]
mod test_helpers;

#[cfg(test)]
mod fault_recovery_test {
    use chrono::Duration;
    use ev_charging_scheduler::config::ParamType;
    use ev_charging_scheduler::domain::types::{
        ChargingMode, DispatchStrategy, NotificationType, PileStatus, QueueLevel, RequestStatus,
    };

    use crate::test_helpers::{assert_close, new_request, TestEnv, TestEnvBuilder};

    // ==========================================
    // 测试辅助函数
    // ==========================================

    /// 单个快充桩（队列容量 2）:
    /// F0001 充电中，F0002/F0003 在桩队列，F0004/F0005 在外部等候区
    fn loaded_single_pile(builder: TestEnvBuilder) -> TestEnv {
        let env = builder
            .with_piles(ChargingMode::Fast, 1, 120.0)
            .pile_queue_size(ChargingMode::Fast, 2)
            .build();
        for user in ["u1", "u2", "u3", "u4", "u5"] {
            env.state
                .scheduler
                .submit(new_request(user, ChargingMode::Fast, 60.0))
                .unwrap();
        }
        env
    }

    /// 在 loaded_single_pile 之前先提交一个慢充请求（无慢充桩），
    /// 之后改为快充，得到创建时间最早但排在外部等候区末尾的 F0006
    fn loaded_with_early_waiter(builder: TestEnvBuilder) -> TestEnv {
        let env = builder
            .with_piles(ChargingMode::Fast, 1, 120.0)
            .pile_queue_size(ChargingMode::Fast, 2)
            .build();
        env.state
            .scheduler
            .submit(new_request("u0", ChargingMode::Slow, 20.0))
            .unwrap();
        env.clock.advance(Duration::minutes(1));
        for user in ["u1", "u2", "u3", "u4", "u5"] {
            env.state
                .scheduler
                .submit(new_request(user, ChargingMode::Fast, 60.0))
                .unwrap();
        }
        let moved = env
            .state
            .scheduler
            .change_mode("S0001", ChargingMode::Fast)
            .unwrap();
        assert_eq!(moved.queue_number, "F0006");
        assert_eq!(moved.external_queue_position, Some(3));
        env
    }

    fn tickets(list: &[(&str, i64)]) -> Vec<(String, i64)> {
        list.iter().map(|(t, p)| (t.to_string(), *p)).collect()
    }

    // ==========================================
    // 故障: 优先级策略
    // ==========================================

    #[test]
    fn test_fault_interrupts_charging_and_requeues_at_front() {
        let env = loaded_single_pile(TestEnvBuilder::new());

        env.clock.advance(Duration::minutes(20));
        let progress = env.state.scheduler.advance_progress(ChargingMode::Fast).unwrap();
        assert_eq!(progress.updated, 1);
        assert_close(env.request("F0001").current_amount, 40.0);

        let report = env.state.coordinator.handle_pile_fault("FAST-001").unwrap();
        assert_eq!(report.interrupted.as_deref(), Some("F0001"));
        assert_eq!(report.requeued, vec!["F0002".to_string(), "F0003".to_string()]);
        assert_eq!(report.strategy, Some(DispatchStrategy::Priority));

        // 会话按实际电量提前结算
        let bill = env.state.charging_api.bill_detail("F0001").unwrap();
        assert!(bill.premature);
        assert_close(bill.charging_amount, 40.0);
        assert_close(bill.total_cost, 60.0);
        assert_eq!(env.request("F0001").current_status, RequestStatus::Completed);

        let pile = env.pile("FAST-001");
        assert_eq!(pile.status, PileStatus::Fault);
        assert!(!pile.is_working);
        assert!(env.pile_tickets("FAST-001").is_empty());

        assert_eq!(
            env.external_tickets(ChargingMode::Fast),
            tickets(&[("F0002", 1), ("F0003", 2), ("F0004", 3), ("F0005", 4)])
        );
        let requeued = env.request("F0002");
        assert_eq!(requeued.queue_level, QueueLevel::ExternalWaiting);
        assert_eq!(requeued.current_status, RequestStatus::Waiting);
        assert_eq!(requeued.charging_pile_id, None);

        assert!(!env.state.coordinator.is_paused(ChargingMode::Fast));

        let fault_users: Vec<_> = env
            .events
            .snapshot()
            .into_iter()
            .filter(|e| e.event_type == NotificationType::PileFault)
            .map(|e| e.user_id)
            .collect();
        assert_eq!(fault_users, vec!["u1", "u2", "u3"]);
        env.assert_consistent();
    }

    #[test]
    fn test_fault_between_ticks_bills_elapsed_amount() {
        let env = loaded_single_pile(TestEnvBuilder::new());

        // 20 分钟内未推进过进度
        env.clock.advance(Duration::minutes(20));
        assert_close(env.request("F0001").current_amount, 0.0);

        env.state
            .coordinator
            .set_pile_status("FAST-001", PileStatus::Fault)
            .unwrap();

        let bill = env.state.charging_api.bill_detail("F0001").unwrap();
        assert!(bill.premature);
        assert_close(bill.charging_amount, 40.0);
        assert_close(bill.peak_cost, 48.0);
        assert_close(bill.total_cost, 60.0);

        let done = env.request("F0001");
        assert_eq!(done.current_status, RequestStatus::Completed);
        assert_close(done.current_amount, 40.0);
        assert_close(env.pile("FAST-001").statistics.total_charging_amount, 40.0);

        let overview = env.state.charging_api.queue_overview().unwrap();
        assert!(overview.modes.iter().all(|m| !m.paused));
    }

    fn fault_message_for(env: &TestEnv, user: &str) -> String {
        env.events
            .snapshot()
            .into_iter()
            .find(|e| e.event_type == NotificationType::PileFault && e.user_id == user)
            .map(|e| e.message)
            .unwrap()
    }

    #[test]
    fn test_priority_strategy_ignores_creation_time() {
        let env = loaded_with_early_waiter(TestEnvBuilder::new());

        env.state
            .coordinator
            .set_pile_status("FAST-001", PileStatus::Fault)
            .unwrap();
        assert!(fault_message_for(&env, "u2").contains("优先调度"));

        assert_eq!(
            env.external_tickets(ChargingMode::Fast),
            tickets(&[
                ("F0002", 1),
                ("F0003", 2),
                ("F0004", 3),
                ("F0005", 4),
                ("F0006", 5)
            ])
        );
        env.assert_consistent();
    }

    // ==========================================
    // 故障: 时间顺序策略
    // ==========================================

    #[test]
    fn test_time_order_strategy_renumbers_by_creation_time() {
        let env = loaded_with_early_waiter(TestEnvBuilder::new().param(
            "fault_dispatch_strategy",
            "time_order",
            ParamType::String,
        ));

        let report = env.state.coordinator.handle_pile_fault("FAST-001").unwrap();
        assert_eq!(report.strategy, Some(DispatchStrategy::TimeOrder));
        let message = fault_message_for(&env, "u2");
        assert!(message.contains("按提交时间重新排队"));
        assert!(!message.contains("优先调度"));

        assert_eq!(
            env.external_tickets(ChargingMode::Fast),
            tickets(&[
                ("F0006", 1),
                ("F0002", 2),
                ("F0003", 3),
                ("F0004", 4),
                ("F0005", 5)
            ])
        );
        env.assert_consistent();
    }

    // ==========================================
    // 恢复
    // ==========================================

    #[test]
    fn test_recovery_reschedules_sibling_queues() {
        let env = TestEnvBuilder::new()
            .with_piles(ChargingMode::Fast, 2, 120.0)
            .build();
        let scheduler = &env.state.scheduler;
        let coordinator = &env.state.coordinator;

        coordinator
            .set_pile_status("FAST-002", PileStatus::Fault)
            .unwrap();
        for user in ["u1", "u2", "u3"] {
            scheduler
                .submit(new_request(user, ChargingMode::Fast, 60.0))
                .unwrap();
        }
        assert_eq!(
            env.pile_tickets("FAST-001"),
            tickets(&[("F0002", 1), ("F0003", 2)])
        );

        let report = coordinator.handle_pile_recovery("FAST-002").unwrap();
        assert!(report.rescheduled);
        assert_eq!(report.pulled_back, 2);
        assert_eq!(report.transferred, 2);

        // F0002 → 空闲的 FAST-002 直接充电；F0003 剩余时间相同取编号小的 FAST-001
        assert_eq!(env.pile("FAST-002").status, PileStatus::Normal);
        let f2 = env.request("F0002");
        assert_eq!(f2.current_status, RequestStatus::Charging);
        assert_eq!(f2.charging_pile_id.as_deref(), Some("FAST-002"));
        assert_eq!(env.pile_tickets("FAST-001"), tickets(&[("F0003", 1)]));
        assert!(env.external_tickets(ChargingMode::Fast).is_empty());
        assert!(env.pile("FAST-002").is_working);

        assert!(!coordinator.is_paused(ChargingMode::Fast));
        env.assert_consistent();
    }

    #[test]
    fn test_recovery_refills_recovered_pile() {
        let env = loaded_single_pile(TestEnvBuilder::new());
        let coordinator = &env.state.coordinator;

        coordinator
            .set_pile_status("FAST-001", PileStatus::Fault)
            .unwrap();
        assert_eq!(env.external_tickets(ChargingMode::Fast).len(), 4);

        coordinator
            .set_pile_status("FAST-001", PileStatus::Normal)
            .unwrap();

        assert_eq!(env.request("F0002").current_status, RequestStatus::Charging);
        assert_eq!(
            env.pile_tickets("FAST-001"),
            tickets(&[("F0003", 1), ("F0004", 2)])
        );
        assert_eq!(
            env.external_tickets(ChargingMode::Fast),
            tickets(&[("F0005", 1)])
        );
        env.assert_consistent();
    }

    #[test]
    fn test_recovery_without_reschedule_flag_keeps_sibling_queues() {
        let env = TestEnvBuilder::new()
            .with_piles(ChargingMode::Fast, 2, 120.0)
            .param("recovery_reschedule_enabled", "false", ParamType::Boolean)
            .build();
        let coordinator = &env.state.coordinator;

        coordinator
            .set_pile_status("FAST-002", PileStatus::Fault)
            .unwrap();
        for user in ["u1", "u2", "u3"] {
            env.state
                .scheduler
                .submit(new_request(user, ChargingMode::Fast, 60.0))
                .unwrap();
        }

        let report = coordinator.handle_pile_recovery("FAST-002").unwrap();
        assert!(!report.rescheduled);
        assert_eq!(report.pulled_back, 0);
        assert_eq!(
            env.pile_tickets("FAST-001"),
            tickets(&[("F0002", 1), ("F0003", 2)])
        );
    }

    // ==========================================
    // 开关参数
    // ==========================================

    #[test]
    fn test_fault_detection_disabled_only_records_status() {
        let env = loaded_single_pile(TestEnvBuilder::new().param(
            "fault_detection_enabled",
            "false",
            ParamType::Boolean,
        ));

        env.state
            .coordinator
            .set_pile_status("FAST-001", PileStatus::Fault)
            .unwrap();

        assert_eq!(env.pile("FAST-001").status, PileStatus::Fault);
        assert_eq!(env.request("F0001").current_status, RequestStatus::Charging);
        assert_eq!(env.pile_tickets("FAST-001").len(), 2);
    }

    #[test]
    fn test_notifications_disabled() {
        let env = TestEnvBuilder::new()
            .with_piles(ChargingMode::Fast, 1, 120.0)
            .param("notification_enabled", "false", ParamType::Boolean)
            .build();

        env.state
            .scheduler
            .submit(new_request("u1", ChargingMode::Fast, 60.0))
            .unwrap();
        env.state
            .coordinator
            .set_pile_status("FAST-001", PileStatus::Fault)
            .unwrap();

        assert!(env.events.snapshot().is_empty());
        assert!(env
            .state
            .charging_api
            .list_notifications("u1", false)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_unknown_pile_is_not_found() {
        let env = TestEnvBuilder::new().build();
        assert!(env.state.coordinator.handle_pile_fault("FAST-404").is_err());
        assert!(env
            .state
            .coordinator
            .set_pile_status("FAST-404", PileStatus::Fault)
            .is_err());
    }
}
