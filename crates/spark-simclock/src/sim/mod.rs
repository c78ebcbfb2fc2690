//! 虚拟时钟门面。
//!
//! # 模块定位（Why）
//! - 被测代码只看到“当前时刻、创建定时器、睡眠”三类能力，测试驱动方额外持有“推进”与“停止”；
//! - 两类调用方共享同一个 [`SimClock`]，克隆句柄即可在多线程间传递。
//!
//! # 结构概览（What）
//! - [`SimClock`]：门面与测试驱动接口；
//! - [`Timer`]/[`Ticker`]：一次性与周期定时器句柄；
//! - [`Delivery`]/[`Recv`]：触发值的只读投递端；
//! - [`TickReport`]：一次推进的结果摘要；
//! - [`StopGuard`]：离开作用域时自动停止时钟。
//!
//! # 执行逻辑（How）
//! - 所有请求都在事件循环锁内完成，注册时的截止时间基准与推进严格串行；
//! - 推进收集到的 waker 在释放事件循环锁之后才唤醒，异步等待者醒来时可以立即重新调用门面方法；
//! - 引擎停止后的请求按 [`StoppedEnginePolicy`] 处理：快速失败，或记录 `warn` 后忽略；
//!   停止时尚在等待的睡眠同样按该策略结束，不会被静默挂起。

mod event_loop;
pub(crate) mod slot;
mod ticker;
mod timer;

use std::fmt;
use std::future::{Future, ready};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use tracing::{debug, debug_span, warn};

use crate::clock::{Clock, Sleep, TimerHandle};
use crate::config::{SimClockConfig, StoppedEnginePolicy};
use crate::error::SimClockError;
use crate::sync::{Arc, Mutex, lock};

use event_loop::EventLoop;
use timer::{Schedule, TimerCore};

pub use event_loop::TickReport;
pub use slot::{Delivery, Recv};
pub use ticker::Ticker;
pub use timer::Timer;

/// 门面、定时器句柄共享的引擎状态。
pub(crate) struct ClockShared {
    pub(crate) epoch: Instant,
    pub(crate) event_loop: Mutex<EventLoop>,
    config: SimClockConfig,
}

/// 一次注册的结果；`attached == false` 表示引擎已停止且策略为忽略，定时器不会触发。
struct Registration {
    core: Arc<TimerCore>,
    delivery: Delivery,
    attached: bool,
}

/// 确定性的虚拟时钟。
///
/// # 教案式说明
/// - **意图 (Why)**：让依赖时间的代码在测试中不再依赖真实的墙钟，所有触发都由测试显式推进；
/// - **契约 (What)**：
///   - 时间只在 [`tick`](Self::tick) 中前进，且单调不减；
///   - 每个定时器至多触发一次（周期定时器每次推进至多一次），触发值为推进后的时刻，
///     因此总满足 `触发值 >= 截止时间`；
///   - 同一次推进内按注册顺序依次求值，结果可重复；
///   - [`stop`](Self::stop) 之后的请求由 [`SimClockConfig::stopped_engine`] 决定是报错还是忽略；
/// - **风险提示 (Trade-offs)**：[`sleep_blocking`](Self::sleep_blocking) 会阻塞当前线程，
///   必须由另一个线程推进时间或停止时钟，否则永远不会返回。
#[derive(Clone)]
pub struct SimClock {
    shared: Arc<ClockShared>,
}

impl fmt::Debug for SimClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimClock")
            .field("epoch", &self.shared.epoch)
            .field("config", &self.shared.config)
            .finish_non_exhaustive()
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SimClock {
    /// 以真实的当前时刻为纪元创建时钟。
    pub fn new() -> Self {
        Self::with_epoch(Instant::now())
    }

    /// 以给定时刻为纪元创建时钟。
    pub fn with_epoch(epoch: Instant) -> Self {
        Self::with_config(epoch, SimClockConfig::default())
    }

    /// 以给定纪元与配置创建时钟。
    pub fn with_config(epoch: Instant, config: SimClockConfig) -> Self {
        debug!(
            stopped_engine = ?config.stopped_engine,
            max_live_timers = ?config.max_live_timers,
            "simulated clock created"
        );
        Self {
            shared: Arc::new(ClockShared {
                epoch,
                event_loop: Mutex::new(EventLoop::new(epoch, config.max_live_timers)),
                config,
            }),
        }
    }

    pub fn config(&self) -> &SimClockConfig {
        &self.shared.config
    }

    /// 时钟纪元，即零推进量对应的时刻。
    pub fn epoch(&self) -> Instant {
        self.shared.epoch
    }

    /// 当前虚拟时刻。
    pub fn now(&self) -> Instant {
        lock(&self.shared.event_loop).now()
    }

    /// 自纪元起累计推进的虚拟时长。
    pub fn elapsed(&self) -> Duration {
        lock(&self.shared.event_loop).elapsed()
    }

    pub fn is_stopped(&self) -> bool {
        !lock(&self.shared.event_loop).is_running()
    }

    /// 当前活跃（已注册且尚未触发/停止）的定时器数量。
    pub fn live_timers(&self) -> usize {
        lock(&self.shared.event_loop).live()
    }

    /// 创建一个在 `now + duration` 到期的一次性定时器。
    ///
    /// 零时长的定时器在下一次推进（包括零推进量）时触发。
    pub fn new_timer(&self, duration: Duration) -> Result<(Timer, Delivery), SimClockError> {
        let registration = self.register(Schedule::Once, duration, "new_timer")?;
        let timer = Timer::new(registration.core, Arc::clone(&self.shared));
        Ok((timer, registration.delivery))
    }

    /// 创建一个首次在 `now + interval` 到期、此后按 `interval` 周期触发的定时器。
    pub fn new_ticker(&self, interval: Duration) -> Result<(Ticker, Delivery), SimClockError> {
        if interval.is_zero() {
            return Err(SimClockError::ZeroInterval);
        }
        let registration = self.register(Schedule::Every(interval), interval, "new_ticker")?;
        let timer = Timer::new(registration.core, Arc::clone(&self.shared));
        Ok((Ticker::new(timer, interval), registration.delivery))
    }

    /// 阻塞当前线程，直到一个时长为 `duration` 的定时器触发。
    ///
    /// # 契约说明（What）
    /// - 与 [`new_timer`](Self::new_timer) 后等待投递等价：`duration` 为零时同样要等到下一次推进
    ///   （包括零推进量）才返回；
    /// - 等待期间时钟被停止时按 [`StoppedEnginePolicy`] 结束：快速失败返回
    ///   [`SimClockError::EngineStopped`]，忽略策略返回 `Ok(())`；
    /// - 调用时引擎已停止且策略为忽略则立即返回。
    pub fn sleep_blocking(&self, duration: Duration) -> Result<(), SimClockError> {
        let registration = self.register(Schedule::Once, duration, "sleep")?;
        if !registration.attached {
            return Ok(());
        }
        match registration.delivery.wait_fired() {
            Some(_) => Ok(()),
            None => self.on_stopped("sleep"),
        }
    }

    /// 推进虚拟时间并触发所有到期的定时器。
    ///
    /// # 契约说明（What）
    /// - 返回时所有截止时间不晚于新时刻的定时器均已完成投递；
    /// - `duration` 为零时不改变时刻，但仍会触发截止时间恰为当前时刻的定时器；
    /// - 推进后的时刻无法表示时返回 [`SimClockError::TimeOverflow`]，时钟状态保持不变。
    pub fn tick(&self, duration: Duration) -> Result<TickReport, SimClockError> {
        let _span = debug_span!("sim_clock.tick", delta = ?duration).entered();
        let mut event_loop = lock(&self.shared.event_loop);
        match event_loop.tick(duration) {
            Ok((report, wakers)) => {
                drop(event_loop);
                for waker in wakers {
                    waker.wake();
                }
                Ok(report)
            }
            Err(SimClockError::EngineStopped { .. }) => {
                let now = event_loop.now();
                drop(event_loop);
                self.on_stopped("tick")?;
                Ok(TickReport {
                    now,
                    fired: 0,
                    ticked: 0,
                    coalesced: 0,
                    skipped: 0,
                    live: 0,
                })
            }
            Err(err) => Err(err),
        }
    }

    /// 停止时钟：丢弃全部活跃定时器，此后的推进与注册按配置策略处理。
    ///
    /// 返回本次调用是否完成了停止；重复调用返回 `false`。
    /// 尚在等待的睡眠（同步与异步）被唤醒并按配置策略结束；
    /// 直接阻塞在 [`Delivery::recv`] 上的线程不会被唤醒，需要有界等待时使用 [`Delivery::recv_timeout`]。
    pub fn stop(&self) -> bool {
        let wakers = lock(&self.shared.event_loop).stop();
        let Some(wakers) = wakers else {
            return false;
        };
        for waker in wakers {
            waker.wake();
        }
        true
    }

    /// 返回一个在离开作用域时停止本时钟的守卫。
    pub fn stop_on_drop(&self) -> StopGuard {
        StopGuard {
            clock: self.clone(),
        }
    }

    /// 在同一次持锁期间构造并注册定时器，截止时间以注册时的虚拟时刻为基准。
    fn register(
        &self,
        schedule: Schedule,
        delay: Duration,
        operation: &'static str,
    ) -> Result<Registration, SimClockError> {
        let mut event_loop = lock(&self.shared.event_loop);
        let (core, delivery) = event_loop.prepare(schedule, delay);
        match event_loop.add(Arc::clone(&core)) {
            Ok(()) => Ok(Registration {
                core,
                delivery,
                attached: true,
            }),
            Err(SimClockError::EngineStopped { .. }) => {
                drop(event_loop);
                self.on_stopped(operation)?;
                // 未进入活跃集合的定时器永远不会触发，标记为已停止使句柄如实反映状态。
                core.mark_stopped();
                Ok(Registration {
                    core,
                    delivery,
                    attached: false,
                })
            }
            Err(err) => Err(err),
        }
    }

    fn on_stopped(&self, operation: &'static str) -> Result<(), SimClockError> {
        match self.shared.config.stopped_engine {
            StoppedEnginePolicy::FailFast => Err(SimClockError::EngineStopped { operation }),
            StoppedEnginePolicy::Ignore => {
                warn!(operation, "simulated clock is stopped; request ignored");
                Ok(())
            }
        }
    }
}

impl Clock for SimClock {
    fn now(&self) -> Instant {
        SimClock::now(self)
    }

    /// 注册发生在调用时而非首次轮询时，截止时间以调用时刻为基准；丢弃返回的 Future 会停止对应定时器。
    fn sleep(&self, duration: Duration) -> Sleep {
        match self.register(Schedule::Once, duration, "sleep") {
            Ok(registration) if registration.attached => Box::pin(SimSleep {
                timer: Timer::new(registration.core, Arc::clone(&self.shared)),
                delivery: registration.delivery,
                clock: self.clone(),
            }),
            Ok(_) => Box::pin(ready(Ok(()))),
            Err(err) => Box::pin(ready(Err(err))),
        }
    }

    fn new_timer(
        &self,
        duration: Duration,
    ) -> Result<(Box<dyn TimerHandle>, Delivery), SimClockError> {
        let (timer, delivery) = SimClock::new_timer(self, duration)?;
        Ok((Box::new(timer), delivery))
    }

    fn new_ticker(
        &self,
        interval: Duration,
    ) -> Result<(Box<dyn TimerHandle>, Delivery), SimClockError> {
        let (ticker, delivery) = SimClock::new_ticker(self, interval)?;
        Ok((Box::new(ticker), delivery))
    }
}

/// 虚拟睡眠 Future：定时器触发时完成，时钟停止时按配置策略完成。
struct SimSleep {
    timer: Timer,
    delivery: Delivery,
    clock: SimClock,
}

impl Future for SimSleep {
    type Output = Result<(), SimClockError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.delivery.poll_fired(cx) {
            Poll::Ready(Some(_)) => Poll::Ready(Ok(())),
            Poll::Ready(None) => Poll::Ready(self.clock.on_stopped("sleep")),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for SimSleep {
    fn drop(&mut self) {
        self.timer.stop();
    }
}

/// 离开作用域时停止时钟的守卫，由 [`SimClock::stop_on_drop`] 创建。
#[derive(Debug)]
#[must_use = "dropping the guard immediately stops the clock"]
pub struct StopGuard {
    clock: SimClock,
}

impl StopGuard {
    pub fn clock(&self) -> &SimClock {
        &self.clock
    }
}

impl Drop for StopGuard {
    fn drop(&mut self) {
        self.clock.stop();
    }
}
