//! 虚拟定时器。
//!
//! # 模块定位（Why）
//! - 定时器是引擎与调用方共同持有的对象：调用方通过 [`Timer`] 句柄执行 `reset`/`stop`，
//!   引擎在推进时间时调用内部的 `fire`；
//! - 三个操作共用同一把定时器锁，`stop` 与 `fire` 的竞态由先拿到锁的一方决定，另一方退化为空操作。
//!
//! # 不变量（What）
//! - `fired_or_stopped` 只会从 `false` 变为 `true` 一次；
//! - 一旦为 `true`，`reset` 与 `fire` 均不再产生效果；
//! - 截止时间只在 `fired_or_stopped == false` 时变化。

use std::fmt;
use std::task::Waker;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use super::ClockShared;
use crate::clock::TimerHandle;
use super::slot::{Offer, SlotSender};
use crate::sync::{Arc, Mutex, lock};

pub(crate) type TimerId = u64;

/// 定时器的触发节律。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Schedule {
    Once,
    Every(Duration),
}

/// 一次 `fire` 调用的结果，由事件循环据此决定是否移出活跃集合。
#[derive(Debug)]
pub(crate) enum FireOutcome {
    /// 截止时间尚未到达。
    NotDue,
    /// 定时器已触发或已停止，本次调用无效果。
    Spent,
    /// 一次性定时器完成投递。
    Fired(Option<Waker>),
    /// 周期定时器完成一次触发并重新布防。
    Rearmed {
        waker: Option<Waker>,
        coalesced: bool,
        skipped: u64,
    },
}

impl FireOutcome {
    /// 事件循环是否应在本次推进中移除该定时器。
    pub(crate) fn evicts(&self) -> bool {
        matches!(self, FireOutcome::Spent | FireOutcome::Fired(_))
    }
}

#[derive(Debug)]
struct TimerState {
    /// 自时钟纪元起的偏移量。
    deadline: Duration,
    fired_or_stopped: bool,
}

pub(crate) struct TimerCore {
    id: TimerId,
    schedule: Schedule,
    state: Mutex<TimerState>,
    sender: SlotSender,
}

impl fmt::Debug for TimerCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerCore")
            .field("id", &self.id)
            .field("schedule", &self.schedule)
            .finish_non_exhaustive()
    }
}

impl TimerCore {
    pub(crate) fn new(
        id: TimerId,
        schedule: Schedule,
        deadline: Duration,
        sender: SlotSender,
    ) -> Self {
        Self {
            id,
            schedule,
            state: Mutex::new(TimerState {
                deadline,
                fired_or_stopped: false,
            }),
            sender,
        }
    }

    pub(crate) fn id(&self) -> TimerId {
        self.id
    }

    pub(crate) fn deadline(&self) -> Duration {
        lock(&self.state).deadline
    }

    pub(crate) fn is_active(&self) -> bool {
        !lock(&self.state).fired_or_stopped
    }

    /// 在当前截止时间上累加 `delta`。
    pub(crate) fn reset(&self, delta: Duration) -> bool {
        let mut state = lock(&self.state);
        if state.fired_or_stopped {
            return false;
        }
        state.deadline = state.deadline.saturating_add(delta);
        true
    }

    /// 标记为已停止；返回 `false` 表示此前已触发或已停止。
    pub(crate) fn mark_stopped(&self) -> bool {
        let mut state = lock(&self.state);
        if state.fired_or_stopped {
            return false;
        }
        state.fired_or_stopped = true;
        true
    }

    /// 时钟停止时由事件循环调用：终止定时器并关闭投递槽，返回睡眠等待者的 waker。
    pub(crate) fn shutdown(&self) -> Option<Waker> {
        lock(&self.state).fired_or_stopped = true;
        self.sender.close()
    }

    /// 由事件循环在推进时间后调用。
    ///
    /// # 契约说明（What）
    /// - `elapsed`：推进后的虚拟偏移量，用于与截止时间比较；
    /// - `at`：对应的绝对时刻，即投递给消费者的值；
    /// - 一次性定时器在 `elapsed >= deadline` 时标记完成并投递；
    /// - 周期定时器投递后将截止时间按整周期前移到 `elapsed` 之后的第一个相位点，错过的周期被跳过；
    ///   若上一次投递尚未被读取，本次投递被合并丢弃，但相位仍然前移。
    pub(crate) fn fire(&self, elapsed: Duration, at: Instant) -> FireOutcome {
        let mut state = lock(&self.state);
        if state.fired_or_stopped {
            return FireOutcome::Spent;
        }
        if elapsed < state.deadline {
            return FireOutcome::NotDue;
        }

        match self.schedule {
            Schedule::Once => {
                state.fired_or_stopped = true;
                match self.sender.offer(at) {
                    Offer::Accepted(waker) => {
                        trace!(timer_id = self.id, "timer fired");
                        FireOutcome::Fired(waker)
                    }
                    Offer::Full => {
                        debug_assert!(
                            false,
                            "one-shot timer {} delivered a second value",
                            self.id
                        );
                        FireOutcome::Fired(None)
                    }
                }
            }
            Schedule::Every(interval) => {
                let (next, skipped) = next_phase(state.deadline, interval, elapsed);
                state.deadline = next;
                let (waker, coalesced) = match self.sender.offer(at) {
                    Offer::Accepted(waker) => (waker, false),
                    Offer::Full => (None, true),
                };
                trace!(
                    timer_id = self.id,
                    skipped,
                    coalesced,
                    next_deadline = ?next,
                    "ticker fired"
                );
                FireOutcome::Rearmed {
                    waker,
                    coalesced,
                    skipped,
                }
            }
        }
    }
}

/// 计算周期定时器的下一个截止时间：`deadline + k * interval`，取严格大于 `elapsed` 的最小 `k`。
///
/// 返回值第二项为被跳过的周期数（`k - 1`）。调用前需保证 `deadline <= elapsed` 且 `interval` 非零。
fn next_phase(deadline: Duration, interval: Duration, elapsed: Duration) -> (Duration, u64) {
    let behind = (elapsed - deadline).as_nanos();
    let step = interval.as_nanos();
    let periods = behind / step + 1;
    let advance = step.saturating_mul(periods);
    let next = deadline.saturating_add(duration_from_nanos(advance));
    (next, u64::try_from(periods - 1).unwrap_or(u64::MAX))
}

fn duration_from_nanos(nanos: u128) -> Duration {
    const NANOS_PER_SEC: u128 = 1_000_000_000;
    match u64::try_from(nanos / NANOS_PER_SEC) {
        Ok(secs) => Duration::new(secs, (nanos % NANOS_PER_SEC) as u32),
        Err(_) => Duration::MAX,
    }
}

/// 一次性虚拟定时器句柄。
///
/// # 教案式说明
/// - **意图 (Why)**：接口刻意对齐常见的标准库/运行时定时器（`reset`/`stop`），
///   让被测代码只需替换时钟来源即可运行在虚拟时间下；
/// - **契约 (What)**：
///   - [`reset`](Self::reset) 在“当前截止时间”上累加，而非相对于当前时刻，多次调用会累计偏移；
///   - [`stop`](Self::stop) 成功后保证不会再有投递；若定时器此前已触发，已投递的值仍可从 [`Delivery`](super::Delivery) 读取；
///   - 丢弃句柄不会取消定时器，它会在到期时照常投递。
/// - **风险提示 (Trade-offs)**：`stop` 只能赢过尚未执行的 `fire`，无法撤回已经完成的投递。
pub struct Timer {
    core: Arc<TimerCore>,
    clock: Arc<ClockShared>,
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer")
            .field("id", &self.core.id())
            .field("active", &self.core.is_active())
            .finish()
    }
}

impl Timer {
    pub(crate) fn new(core: Arc<TimerCore>, clock: Arc<ClockShared>) -> Self {
        Self { core, clock }
    }

    /// 将截止时间推后 `delta`；定时器已触发或已停止时返回 `false` 且不产生效果。
    pub fn reset(&self, delta: Duration) -> bool {
        let applied = self.core.reset(delta);
        if applied {
            trace!(timer_id = self.core.id(), delta = ?delta, "timer reset");
        }
        applied
    }

    /// 停止定时器；定时器已触发或已停止时返回 `false`。
    pub fn stop(&self) -> bool {
        if !self.core.mark_stopped() {
            return false;
        }
        // 定时器锁已释放，此处再获取事件循环锁，保持“事件循环 → 定时器”的单一加锁顺序。
        let removed = lock(&self.clock.event_loop).remove(self.core.id());
        debug!(timer_id = self.core.id(), removed, "timer stopped");
        true
    }

    /// 当前截止时刻；若截止时间超出 `Instant` 的可表示范围（等价于永不到期）则返回 `None`。
    pub fn deadline(&self) -> Option<Instant> {
        self.clock.epoch.checked_add(self.core.deadline())
    }

    /// 定时器是否仍可能触发。
    pub fn is_active(&self) -> bool {
        self.core.is_active()
    }

    /// 时钟内唯一的定时器编号，按注册顺序递增；同一次推进内按该顺序求值。
    pub fn id(&self) -> u64 {
        self.core.id()
    }
}

impl TimerHandle for Timer {
    fn reset(&self, delta: Duration) -> bool {
        Timer::reset(self, delta)
    }

    fn stop(&self) -> bool {
        Timer::stop(self)
    }

    fn is_active(&self) -> bool {
        Timer::is_active(self)
    }
}
