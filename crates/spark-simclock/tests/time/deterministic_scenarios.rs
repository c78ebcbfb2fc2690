pub mod deterministic_scenarios {
    //! 端到端场景：以固定纪元构造时钟，逐步推进并断言每一步的投递结果。
    //!
    //! # 测试目标（Why）
    //! - 触发时刻必须等于“跨过截止时间的那次推进之后的时刻”，与推进粒度无关地满足 `触发值 >= 截止时间`；
    //! - 周期定时器在大跨度推进下只投递一次，并保持相位；
    //! - 停止后的请求按配置策略报错或被忽略。

    use std::time::{Duration, Instant};

    use spark_simclock::{SimClock, SimClockConfig, SimClockError, StoppedEnginePolicy};

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    fn clock() -> (SimClock, Instant) {
        let epoch = Instant::now();
        (SimClock::with_epoch(epoch), epoch)
    }

    #[test]
    fn one_second_timer_fires_on_tenth_hundred_ms_tick() {
        let (clock, t0) = clock();
        let (_timer, delivery) = clock.new_timer(ms(1000)).expect("register timer");

        for step in 1..=9 {
            let report = clock.tick(ms(100)).expect("tick");
            assert_eq!(report.fired, 0, "step {step} must not fire");
            assert!(!delivery.is_ready());
        }
        let report = clock.tick(ms(100)).expect("tick");
        assert_eq!(report.fired, 1);
        assert_eq!(delivery.try_recv(), Some(t0 + ms(1000)));

        clock.tick(ms(1000)).expect("tick");
        assert_eq!(delivery.try_recv(), None, "a timer delivers exactly once");
    }

    #[test]
    fn coarse_ticks_deliver_the_post_advance_time() {
        let (clock, t0) = clock();
        let (_timer, delivery) = clock.new_timer(ms(1000)).expect("register timer");

        for _ in 0..10 {
            clock.tick(ms(99)).expect("tick");
        }
        assert_eq!(delivery.try_recv(), None, "990ms is still before the deadline");
        clock.tick(ms(99)).expect("tick");
        assert_eq!(delivery.try_recv(), Some(t0 + ms(1089)));
    }

    #[test]
    fn stopped_timer_never_delivers() {
        let (clock, _) = clock();
        let (timer, delivery) = clock.new_timer(ms(100)).expect("register timer");

        assert!(timer.stop());
        assert!(!timer.stop());
        let report = clock.tick(ms(500)).expect("tick");
        assert_eq!(report.fired, 0);
        assert_eq!(report.live, 0);
        assert_eq!(delivery.try_recv(), None);
        assert!(!timer.reset(ms(100)));
    }

    #[test]
    fn stop_after_fire_keeps_delivered_value() {
        let (clock, t0) = clock();
        let (timer, delivery) = clock.new_timer(ms(100)).expect("register timer");

        clock.tick(ms(100)).expect("tick");
        assert!(!timer.stop(), "stop loses to an earlier fire");
        assert!(!timer.reset(ms(100)), "reset after firing has no effect");
        assert_eq!(delivery.try_recv(), Some(t0 + ms(100)));
    }

    #[test]
    fn reset_accumulates_on_current_deadline() {
        let (clock, t0) = clock();
        let (timer, delivery) = clock.new_timer(ms(100)).expect("register timer");

        assert!(timer.reset(ms(50)));
        assert!(timer.reset(ms(50)));
        assert_eq!(timer.deadline(), Some(t0 + ms(200)));

        clock.tick(ms(150)).expect("tick");
        assert_eq!(delivery.try_recv(), None);
        clock.tick(ms(50)).expect("tick");
        assert_eq!(delivery.try_recv(), Some(t0 + ms(200)));
    }

    #[test]
    fn independent_timers_fire_in_their_own_ticks() {
        let (clock, t0) = clock();
        let (_a, slow) = clock.new_timer(ms(300)).expect("register timer");
        let (_b, fast) = clock.new_timer(ms(100)).expect("register timer");
        let (_c, mid) = clock.new_timer(ms(200)).expect("register timer");

        let first = clock.tick(ms(150)).expect("tick");
        assert_eq!(first.fired, 1);
        assert_eq!(fast.try_recv(), Some(t0 + ms(150)));
        assert_eq!(mid.try_recv(), None);

        let second = clock.tick(ms(200)).expect("tick");
        assert_eq!(second.fired, 2);
        assert_eq!(second.live, 0);
        assert_eq!(mid.try_recv(), Some(t0 + ms(350)));
        assert_eq!(slow.try_recv(), Some(t0 + ms(350)));
    }

    #[test]
    fn ticker_delivers_once_per_interval() {
        let (clock, t0) = clock();
        let (ticker, delivery) = clock.new_ticker(ms(500)).expect("register ticker");

        for round in 1..=3u64 {
            let report = clock.tick(ms(500)).expect("tick");
            assert_eq!(report.ticked, 1);
            assert_eq!(delivery.try_recv(), Some(t0 + ms(500 * round)));
        }
        assert_eq!(ticker.next_deadline(), Some(t0 + ms(2000)));
        assert_eq!(clock.live_timers(), 1);

        assert!(ticker.stop());
        clock.tick(ms(500)).expect("tick");
        assert_eq!(delivery.try_recv(), None);
        assert_eq!(clock.live_timers(), 0);
    }

    #[test]
    fn ticker_skips_missed_periods_on_large_jump() {
        let (clock, t0) = clock();
        let (ticker, delivery) = clock.new_ticker(ms(500)).expect("register ticker");

        let report = clock.tick(ms(1500)).expect("tick");
        assert_eq!(report.ticked, 1);
        assert_eq!(report.skipped, 2);
        assert_eq!(delivery.try_recv(), Some(t0 + ms(1500)));
        assert_eq!(delivery.try_recv(), None, "missed periods are not replayed");
        assert_eq!(ticker.next_deadline(), Some(t0 + ms(2000)));

        clock.tick(ms(500)).expect("tick");
        assert_eq!(delivery.try_recv(), Some(t0 + ms(2000)));
    }

    #[test]
    fn unread_ticker_value_coalesces_later_ticks() {
        let (clock, t0) = clock();
        let (_ticker, delivery) = clock.new_ticker(ms(100)).expect("register ticker");

        clock.tick(ms(100)).expect("tick");
        let report = clock.tick(ms(100)).expect("tick");
        assert_eq!(report.ticked, 1);
        assert_eq!(report.coalesced, 1);
        assert_eq!(delivery.try_recv(), Some(t0 + ms(100)));
    }

    #[test]
    fn fail_fast_policy_rejects_use_after_stop() {
        let (clock, _) = clock();
        let (_timer, delivery) = clock.new_timer(ms(10)).expect("register timer");
        assert!(clock.stop());

        assert_eq!(
            clock.tick(ms(10)),
            Err(SimClockError::EngineStopped { operation: "tick" })
        );
        assert_eq!(
            clock.new_ticker(ms(10)).map(|_| ()),
            Err(SimClockError::EngineStopped {
                operation: "new_ticker"
            })
        );
        assert_eq!(delivery.try_recv(), None, "stop drops pending timers");
    }

    #[test]
    fn ignore_policy_from_toml_drops_use_after_stop() {
        let config = SimClockConfig::from_toml_str("stopped_engine = \"ignore\"")
            .expect("valid configuration");
        assert_eq!(config.stopped_engine, StoppedEnginePolicy::Ignore);
        let t0 = Instant::now();
        let clock = SimClock::with_config(t0, config);
        clock.stop();

        let report = clock.tick(ms(10)).expect("ignored tick");
        assert_eq!(report.now, t0);
        let (ticker, delivery) = clock.new_ticker(ms(10)).expect("ignored registration");
        assert!(!ticker.is_active());
        clock.tick(ms(10)).expect("ignored tick");
        assert_eq!(delivery.try_recv(), None);
    }

    #[test]
    fn overflowing_tick_is_rejected_without_moving_time() {
        let (clock, t0) = clock();
        clock.tick(ms(10)).expect("tick");

        assert_eq!(
            clock.tick(Duration::MAX),
            Err(SimClockError::TimeOverflow {
                delta: Duration::MAX
            })
        );
        assert_eq!(clock.now(), t0 + ms(10));
    }
}
