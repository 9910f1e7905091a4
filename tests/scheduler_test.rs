// ==========================================
// 队列调度器集成测试
// ==========================================
// 覆盖: 入队与容量、立即开始充电、位置连续性、取消、
//       改模式、结束充电计费、重复请求、参数校验
// ==========================================

#[path = "test_helpers.rs"]
mod test_helpers;

#[cfg(test)]
mod scheduler_test {
    use chrono::Duration;
    use ev_charging_scheduler::domain::types::{
        ChargingMode, NotificationType, QueueLevel, RequestStatus,
    };
    use ev_charging_scheduler::engine::ScheduleError;

    use crate::test_helpers::{assert_close, new_request, TestEnvBuilder};

    // ==========================================
    // 入队与外部等候区容量
    // ==========================================

    #[test]
    fn test_capacity_exceeded_keeps_positions_contiguous() {
        let env = TestEnvBuilder::new().external_capacity(3).build();
        let scheduler = &env.state.scheduler;

        for user in ["u1", "u2", "u3"] {
            let receipt = scheduler
                .submit(new_request(user, ChargingMode::Fast, 30.0))
                .unwrap();
            assert_eq!(receipt.queue_level, QueueLevel::ExternalWaiting);
        }

        let err = scheduler
            .submit(new_request("u4", ChargingMode::Fast, 30.0))
            .unwrap_err();
        assert!(matches!(
            err,
            ScheduleError::CapacityExceeded {
                mode: ChargingMode::Fast,
                limit: 3
            }
        ));

        assert_eq!(
            env.external_tickets(ChargingMode::Fast),
            vec![
                ("F0001".to_string(), 1),
                ("F0002".to_string(), 2),
                ("F0003".to_string(), 3)
            ]
        );
        // 无桩时只计排队惩罚
        assert_eq!(env.request("F0001").estimated_wait_minutes, 0);
        assert_eq!(env.request("F0003").estimated_wait_minutes, 20);
        env.assert_consistent();
    }

    #[test]
    fn test_capacity_is_per_mode() {
        let env = TestEnvBuilder::new().external_capacity(1).build();
        let scheduler = &env.state.scheduler;

        scheduler
            .submit(new_request("u1", ChargingMode::Fast, 30.0))
            .unwrap();
        let slow = scheduler
            .submit(new_request("u2", ChargingMode::Slow, 30.0))
            .unwrap();
        assert_eq!(slow.ticket, "S0001");
        assert_eq!(slow.position, Some(1));
    }

    #[test]
    fn test_transfer_without_pile_is_noop() {
        let env = TestEnvBuilder::new().build();
        let scheduler = &env.state.scheduler;
        scheduler
            .submit(new_request("u1", ChargingMode::Fast, 30.0))
            .unwrap();
        scheduler
            .submit(new_request("u2", ChargingMode::Fast, 30.0))
            .unwrap();

        let before = env.external_tickets(ChargingMode::Fast);
        for _ in 0..3 {
            assert!(!scheduler.try_transfer("F0001").unwrap());
        }
        assert_eq!(scheduler.drive_transfers(ChargingMode::Fast).unwrap(), 0);
        assert_eq!(env.external_tickets(ChargingMode::Fast), before);
    }

    // ==========================================
    // 立即开始充电
    // ==========================================

    #[test]
    fn test_idle_pile_starts_charging_immediately() {
        let env = TestEnvBuilder::new()
            .with_piles(ChargingMode::Fast, 1, 120.0)
            .build();

        let receipt = env
            .state
            .scheduler
            .submit(new_request("u1", ChargingMode::Fast, 60.0))
            .unwrap();

        assert_eq!(receipt.ticket, "F0001");
        assert_eq!(receipt.queue_level, QueueLevel::Charging);
        assert_eq!(receipt.charging_pile_id.as_deref(), Some("FAST-001"));
        assert_eq!(receipt.position, None);
        assert_eq!(receipt.estimated_wait_minutes, 0);

        let pile = env.pile("FAST-001");
        assert!(pile.is_working);
        assert_eq!(pile.estimated_remaining_minutes, 30);

        let request = env.request("F0001");
        assert_eq!(request.current_status, RequestStatus::Charging);
        assert!(request.start_time.is_some());

        // 事务提交后发布: 转入桩队列 + 开始充电
        let types: Vec<_> = env.events.snapshot().iter().map(|e| e.event_type).collect();
        assert_eq!(
            types,
            vec![NotificationType::QueueTransfer, NotificationType::ChargingStart]
        );
        env.assert_consistent();
    }

    #[test]
    fn test_best_pile_is_shortest_remaining_time() {
        let env = TestEnvBuilder::new()
            .with_piles(ChargingMode::Fast, 2, 120.0)
            .build();
        let scheduler = &env.state.scheduler;

        // FAST-001 剩余 30 分钟，FAST-002 剩余 10 分钟
        scheduler
            .submit(new_request("u1", ChargingMode::Fast, 60.0))
            .unwrap();
        scheduler
            .submit(new_request("u2", ChargingMode::Fast, 20.0))
            .unwrap();
        assert_eq!(env.request("F0002").charging_pile_id.as_deref(), Some("FAST-002"));

        let third = scheduler
            .submit(new_request("u3", ChargingMode::Fast, 30.0))
            .unwrap();
        assert_eq!(third.queue_level, QueueLevel::PileQueue);
        assert_eq!(third.charging_pile_id.as_deref(), Some("FAST-002"));
        assert_eq!(third.position, Some(1));
        assert_eq!(third.estimated_wait_minutes, 10);
    }

    // ==========================================
    // 取消
    // ==========================================

    #[test]
    fn test_cancel_shifts_positions_and_refills_pile_queue() {
        let env = TestEnvBuilder::new()
            .with_piles(ChargingMode::Fast, 1, 120.0)
            .pile_queue_size(ChargingMode::Fast, 2)
            .build();
        let scheduler = &env.state.scheduler;

        for user in ["u1", "u2", "u3", "u4", "u5", "u6"] {
            scheduler
                .submit(new_request(user, ChargingMode::Fast, 60.0))
                .unwrap();
        }
        assert_eq!(
            env.pile_tickets("FAST-001"),
            vec![("F0002".to_string(), 1), ("F0003".to_string(), 2)]
        );
        assert_eq!(env.request("F0002").estimated_wait_minutes, 30);
        assert_eq!(env.request("F0003").estimated_wait_minutes, 60);

        // 外部等候区中间位置取消
        let cancelled = scheduler.cancel("F0005").unwrap();
        assert_eq!(cancelled.current_status, RequestStatus::Cancelled);
        assert_eq!(cancelled.external_queue_position, None);
        assert_eq!(
            env.external_tickets(ChargingMode::Fast),
            vec![("F0004".to_string(), 1), ("F0006".to_string(), 2)]
        );

        // 桩队列取消: 后续前移，外部等候区队首补位
        scheduler.cancel("F0002").unwrap();
        assert_eq!(
            env.pile_tickets("FAST-001"),
            vec![("F0003".to_string(), 1), ("F0004".to_string(), 2)]
        );
        assert_eq!(
            env.external_tickets(ChargingMode::Fast),
            vec![("F0006".to_string(), 1)]
        );
        env.assert_consistent();
    }

    #[test]
    fn test_cancel_rejects_charging_and_finished_requests() {
        let env = TestEnvBuilder::new()
            .with_piles(ChargingMode::Fast, 1, 120.0)
            .build();
        let scheduler = &env.state.scheduler;
        scheduler
            .submit(new_request("u1", ChargingMode::Fast, 60.0))
            .unwrap();

        let err = scheduler.cancel("F0001").unwrap_err();
        assert!(matches!(err, ScheduleError::InvalidStateTransition { .. }));
        assert_eq!(env.request("F0001").current_status, RequestStatus::Charging);

        scheduler.complete("F0001").unwrap();
        let err = scheduler.cancel("F0001").unwrap_err();
        assert!(matches!(err, ScheduleError::InvalidStateTransition { .. }));

        let err = scheduler.cancel("F9999").unwrap_err();
        assert!(matches!(err, ScheduleError::NotFound { .. }));
    }

    // ==========================================
    // 改模式
    // ==========================================

    #[test]
    fn test_change_mode_issues_new_ticket_at_tail() {
        let env = TestEnvBuilder::new().build();
        let scheduler = &env.state.scheduler;
        for user in ["u1", "u2", "u3"] {
            scheduler
                .submit(new_request(user, ChargingMode::Fast, 30.0))
                .unwrap();
        }
        scheduler
            .submit(new_request("u4", ChargingMode::Slow, 10.0))
            .unwrap();

        let before = env.request("F0002");
        env.clock.advance(Duration::minutes(5));
        let updated = scheduler.change_mode("F0002", ChargingMode::Slow).unwrap();

        assert_eq!(updated.queue_number, "S0002");
        assert_eq!(updated.charging_mode, ChargingMode::Slow);
        assert_eq!(updated.external_queue_position, Some(2));
        assert_eq!(updated.created_at, before.created_at);
        assert!(updated.queue_entered_at > before.queue_entered_at);

        assert_eq!(
            env.external_tickets(ChargingMode::Fast),
            vec![("F0001".to_string(), 1), ("F0003".to_string(), 2)]
        );
        assert!(env.request_repo().find_by_queue_number("F0002").unwrap().is_none());

        let last = env.events.snapshot().pop().unwrap();
        assert_eq!(last.event_type, NotificationType::ChargingModeChange);
        assert_eq!(last.user_id, "u2");
        env.assert_consistent();
    }

    #[test]
    fn test_change_mode_same_mode_is_noop_and_charging_is_rejected() {
        let env = TestEnvBuilder::new()
            .with_piles(ChargingMode::Fast, 1, 120.0)
            .build();
        let scheduler = &env.state.scheduler;
        scheduler
            .submit(new_request("u1", ChargingMode::Fast, 60.0))
            .unwrap();
        scheduler
            .submit(new_request("u2", ChargingMode::Slow, 20.0))
            .unwrap();

        let same = scheduler.change_mode("S0001", ChargingMode::Slow).unwrap();
        assert_eq!(same.queue_number, "S0001");

        let err = scheduler
            .change_mode("F0001", ChargingMode::Slow)
            .unwrap_err();
        assert!(matches!(err, ScheduleError::InvalidStateTransition { .. }));
    }

    #[test]
    fn test_change_mode_respects_target_capacity() {
        let env = TestEnvBuilder::new().external_capacity(1).build();
        let scheduler = &env.state.scheduler;
        scheduler
            .submit(new_request("u1", ChargingMode::Fast, 30.0))
            .unwrap();
        scheduler
            .submit(new_request("u2", ChargingMode::Slow, 30.0))
            .unwrap();

        let err = scheduler
            .change_mode("F0001", ChargingMode::Slow)
            .unwrap_err();
        assert!(matches!(err, ScheduleError::CapacityExceeded { mode: ChargingMode::Slow, .. }));
        // 事务回滚，原请求不变
        assert_eq!(env.request("F0001").external_queue_position, Some(1));
    }

    // ==========================================
    // 结束充电
    // ==========================================

    #[test]
    fn test_complete_bills_requested_amount_and_promotes_next() {
        let env = TestEnvBuilder::new()
            .with_piles(ChargingMode::Fast, 1, 120.0)
            .build();
        let scheduler = &env.state.scheduler;
        scheduler
            .submit(new_request("u1", ChargingMode::Fast, 60.0))
            .unwrap();
        scheduler
            .submit(new_request("u2", ChargingMode::Fast, 30.0))
            .unwrap();

        env.clock.advance(Duration::minutes(30));
        let session = scheduler.complete("F0001").unwrap();

        assert!(session.end_time.is_some());
        assert!(!session.premature);
        assert_close(session.charging_amount, 60.0);
        assert_close(session.charging_duration_hours, 0.5);
        // 09:00 开始 → 峰时 1.2 元/kWh，服务费 0.3 元/kWh
        assert_close(session.bill.peak_cost, 72.0);
        assert_close(session.bill.normal_cost, 0.0);
        assert_close(session.bill.valley_cost, 0.0);
        assert_close(session.bill.service_cost, 18.0);
        assert_close(session.bill.total_cost, 90.0);

        let finished = env.request("F0001");
        assert_eq!(finished.current_status, RequestStatus::Completed);
        assert_eq!(finished.queue_level, QueueLevel::Completed);

        let next = env.request("F0002");
        assert_eq!(next.current_status, RequestStatus::Charging);

        let pile = env.pile("FAST-001");
        assert!(pile.is_working);
        assert_eq!(pile.statistics.total_charging_count, 1);
        assert_close(pile.statistics.total_charging_amount, 60.0);
        assert_close(pile.statistics.total_revenue, 90.0);
        env.assert_consistent();
    }

    #[test]
    fn test_complete_waiting_request_is_rejected() {
        let env = TestEnvBuilder::new().build();
        env.state
            .scheduler
            .submit(new_request("u1", ChargingMode::Fast, 30.0))
            .unwrap();
        let err = env.state.scheduler.complete("F0001").unwrap_err();
        assert!(matches!(err, ScheduleError::InvalidStateTransition { .. }));
    }

    // ==========================================
    // 重复请求与参数校验
    // ==========================================

    #[test]
    fn test_duplicate_active_request_for_same_vehicle() {
        let env = TestEnvBuilder::new().build();
        let scheduler = &env.state.scheduler;
        scheduler
            .submit(new_request("u1", ChargingMode::Fast, 30.0))
            .unwrap();

        let err = scheduler
            .submit(new_request("u1", ChargingMode::Slow, 10.0))
            .unwrap_err();
        assert!(matches!(err, ScheduleError::DuplicateActiveRequest { .. }));

        // 取消后可以再次提交
        scheduler.cancel("F0001").unwrap();
        let receipt = scheduler
            .submit(new_request("u1", ChargingMode::Slow, 10.0))
            .unwrap();
        assert_eq!(receipt.ticket, "S0001");
    }

    #[test]
    fn test_submit_validation() {
        let env = TestEnvBuilder::new().build();
        let scheduler = &env.state.scheduler;

        let mut zero = new_request("u1", ChargingMode::Fast, 0.0);
        assert!(matches!(
            scheduler.submit(zero.clone()).unwrap_err(),
            ScheduleError::Validation(_)
        ));

        zero.requested_amount = 90.0; // 电池容量 80
        assert!(matches!(
            scheduler.submit(zero).unwrap_err(),
            ScheduleError::Validation(_)
        ));

        let blank = new_request("  ", ChargingMode::Fast, 10.0);
        assert!(matches!(
            scheduler.submit(blank).unwrap_err(),
            ScheduleError::Validation(_)
        ));

        assert!(env.external_tickets(ChargingMode::Fast).is_empty());
    }

    // ==========================================
    // 并发提交
    // ==========================================

    #[test]
    fn test_concurrent_submissions_keep_queues_consistent() {
        let env = TestEnvBuilder::new()
            .with_piles(ChargingMode::Fast, 2, 120.0)
            .with_piles(ChargingMode::Slow, 1, 7.0)
            .build();

        let handles: Vec<_> = (0..12)
            .map(|i| {
                let scheduler = std::sync::Arc::clone(&env.state.scheduler);
                std::thread::spawn(move || {
                    let mode = if i % 3 == 0 {
                        ChargingMode::Slow
                    } else {
                        ChargingMode::Fast
                    };
                    scheduler.submit(new_request(&format!("c{}", i), mode, 20.0))
                })
            })
            .collect();

        let mut tickets: Vec<String> = handles
            .into_iter()
            .map(|h| h.join().unwrap().unwrap().ticket)
            .collect();
        tickets.sort();
        tickets.dedup();
        assert_eq!(tickets.len(), 12);

        assert!(env.pile("FAST-001").is_working);
        assert!(env.pile("FAST-002").is_working);
        assert!(env.pile("SLOW-001").is_working);
        env.assert_consistent();
    }
}
