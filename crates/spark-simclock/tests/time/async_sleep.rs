pub mod async_sleep {
    //! 通过 `Clock` 抽象在执行器中等待虚拟时间。
    //!
    //! # 测试目标（Why）
    //! - 被测组件只依赖 `Arc<dyn Clock>`，注入虚拟时钟后其睡眠完全由测试推进决定；
    //! - 推进线程唤醒的 waker 必须让阻塞在 `block_on` 中的执行器继续前进；
    //! - 停止时钟时尚在等待的睡眠必须按策略结束，而不是永久挂起。

    use std::future::Future;
    use std::sync::Arc;
    use std::task::{Context, Poll};
    use std::thread;
    use std::time::{Duration, Instant};

    use spark_simclock::{
        Clock, SimClock, SimClockConfig, SimClockError, StoppedEnginePolicy,
    };

    /// 以注入的时钟等待 `rounds` 次，每次 `period`，返回每轮醒来的时刻。
    async fn poll_loop(clock: Arc<dyn Clock>, rounds: usize, period: Duration) -> Vec<Instant> {
        let mut woke = Vec::with_capacity(rounds);
        for _ in 0..rounds {
            clock.sleep(period).await.expect("sleep on a running clock");
            woke.push(clock.now());
        }
        woke
    }

    #[test]
    fn injected_clock_drives_async_sleeps() {
        let t0 = Instant::now();
        let sim = SimClock::with_epoch(t0);
        let clock: Arc<dyn Clock> = Arc::new(sim.clone());

        let worker = thread::spawn(move || {
            futures::executor::block_on(poll_loop(clock, 3, Duration::from_secs(1)))
        });

        // 每次推进都会在同一临界区内移除已触发的定时器，活跃数回到 1 说明下一轮睡眠已注册。
        for _ in 0..3 {
            while sim.live_timers() != 1 {
                thread::yield_now();
            }
            sim.tick(Duration::from_secs(1)).expect("tick");
        }

        let woke = worker.join().expect("worker must not panic");
        assert_eq!(
            woke,
            vec![
                t0 + Duration::from_secs(1),
                t0 + Duration::from_secs(2),
                t0 + Duration::from_secs(3),
            ]
        );
    }

    #[test]
    fn dropped_sleep_is_cancelled() {
        let sim = SimClock::new();
        let pending = Clock::sleep(&sim, Duration::from_secs(1));
        assert_eq!(sim.live_timers(), 1);
        drop(pending);

        let report = sim.tick(Duration::from_secs(1)).expect("tick");
        assert_eq!(report.fired, 0);
        assert_eq!(report.live, 0);
    }

    #[test]
    fn injected_clock_creates_timers_and_tickers() {
        let t0 = Instant::now();
        let sim = SimClock::with_epoch(t0);
        let clock: Arc<dyn Clock> = Arc::new(sim.clone());

        let (timer, timer_delivery) = clock.new_timer(Duration::from_secs(1)).expect("timer");
        let (ticker, ticker_delivery) = clock
            .new_ticker(Duration::from_millis(500))
            .expect("ticker");
        assert!(timer.reset(Duration::from_millis(500)));

        sim.tick(Duration::from_secs(1)).expect("tick");
        assert_eq!(ticker_delivery.try_recv(), Some(t0 + Duration::from_secs(1)));
        assert_eq!(timer_delivery.try_recv(), None);

        sim.tick(Duration::from_millis(500)).expect("tick");
        assert_eq!(
            timer_delivery.try_recv(),
            Some(t0 + Duration::from_millis(1500))
        );
        assert!(!timer.is_active());
        assert!(!timer.reset(Duration::from_secs(1)));

        assert!(ticker.stop());
        sim.tick(Duration::from_secs(1)).expect("tick");
        assert_eq!(ticker_delivery.try_recv(), Some(t0 + Duration::from_millis(1500)));
        assert_eq!(ticker_delivery.try_recv(), None);
        assert!(matches!(
            clock.new_ticker(Duration::ZERO),
            Err(SimClockError::ZeroInterval)
        ));
    }

    #[test]
    fn zero_sleep_resolves_on_next_tick() {
        let sim = SimClock::new();
        let mut sleep = Clock::sleep(&sim, Duration::ZERO);
        let waker = futures::task::noop_waker();
        let mut cx = Context::from_waker(&waker);

        assert!(sleep.as_mut().poll(&mut cx).is_pending());
        sim.tick(Duration::ZERO).expect("tick");
        assert_eq!(sleep.as_mut().poll(&mut cx), Poll::Ready(Ok(())));
    }

    #[test]
    fn stop_fails_pending_async_sleep() {
        let sim = SimClock::new();
        let sleep = Clock::sleep(&sim, Duration::from_secs(1));
        let waiter = thread::spawn(move || futures::executor::block_on(sleep));

        assert!(sim.stop());
        assert_eq!(
            waiter.join().expect("waiter must not panic"),
            Err(SimClockError::EngineStopped { operation: "sleep" })
        );
        assert_eq!(
            futures::executor::block_on(Clock::sleep(&sim, Duration::from_secs(1))),
            Err(SimClockError::EngineStopped { operation: "sleep" })
        );
    }

    #[test]
    fn stop_releases_pending_async_sleep_under_ignore() {
        let sim = SimClock::with_config(
            Instant::now(),
            SimClockConfig::default().with_stopped_engine(StoppedEnginePolicy::Ignore),
        );
        let sleep = Clock::sleep(&sim, Duration::from_secs(1));
        let waiter = thread::spawn(move || futures::executor::block_on(sleep));

        sim.stop();
        assert_eq!(waiter.join().expect("waiter must not panic"), Ok(()));
    }
}
