//! 基于操作系统单调时钟的 [`Clock`] 实现。
//!
//! # 执行逻辑（How）
//! - 每个定时器占用一个后台线程：线程在条件变量上限时等待截止时间，`reset`/`stop` 修改状态后通知线程重新计算；
//! - 触发与停止在同一把锁内切换 `done`，二者恰好一方生效；
//! - 周期定时器与虚拟实现采用相同的相位策略：迟到时跳过错过的周期，下一个截止时间落在当前时刻之后的第一个相位点。
//!
//! # 风险提示（Trade-offs）
//! - 线程开销只适合低频定时；未停止的周期定时器会让其线程一直存活。

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::PoisonError;
use std::task::{Context, Poll};
use std::thread;
use std::time::{Duration, Instant};

use tracing::trace;

use crate::clock::{Clock, Sleep, TimerHandle};
use crate::error::SimClockError;
use crate::sim::slot::{self, Offer, SlotSender};
use crate::sim::{Delivery, Recv};
use crate::sync::{Arc, Condvar, Mutex, MutexGuard, lock};

/// 真实时间时钟。
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl SystemClock {
    fn spawn(&self, first: Duration, interval: Option<Duration>) -> (SystemTimer, Delivery) {
        let (sender, delivery) = slot::channel();
        let shared = Arc::new(TimerShared {
            state: Mutex::new(TimerState {
                deadline: Instant::now().checked_add(first),
                done: false,
            }),
            changed: Condvar::new(),
        });
        let worker = Arc::clone(&shared);
        thread::spawn(move || run(&worker, interval, &sender));
        (SystemTimer { shared }, delivery)
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) -> Sleep {
        let (timer, delivery) = self.spawn(duration, None);
        Box::pin(SystemSleep {
            timer,
            recv: delivery.recv_async(),
        })
    }

    fn new_timer(
        &self,
        duration: Duration,
    ) -> Result<(Box<dyn TimerHandle>, Delivery), SimClockError> {
        let (timer, delivery) = self.spawn(duration, None);
        Ok((Box::new(timer), delivery))
    }

    fn new_ticker(
        &self,
        interval: Duration,
    ) -> Result<(Box<dyn TimerHandle>, Delivery), SimClockError> {
        if interval.is_zero() {
            return Err(SimClockError::ZeroInterval);
        }
        let (timer, delivery) = self.spawn(interval, Some(interval));
        Ok((Box::new(timer), delivery))
    }
}

#[derive(Debug)]
struct TimerShared {
    state: Mutex<TimerState>,
    changed: Condvar,
}

#[derive(Debug)]
struct TimerState {
    /// `None` 表示截止时间超出 `Instant` 的可表示范围，等价于永不到期。
    deadline: Option<Instant>,
    done: bool,
}

/// 后台线程主循环。
fn run(shared: &TimerShared, interval: Option<Duration>, sender: &SlotSender) {
    let mut state = lock(&shared.state);
    loop {
        if state.done {
            return;
        }
        let Some(deadline) = state.deadline else {
            state = wait(shared, state, None);
            continue;
        };
        let now = Instant::now();
        if now < deadline {
            state = wait(shared, state, Some(deadline - now));
            continue;
        }
        match interval {
            None => state.done = true,
            Some(interval) => state.deadline = next_phase(deadline, interval, now),
        }
        drop(state);
        if let Offer::Accepted(Some(waker)) = sender.offer(now) {
            waker.wake();
        }
        trace!(periodic = interval.is_some(), "system timer fired");
        state = lock(&shared.state);
    }
}

fn wait<'a>(
    shared: &TimerShared,
    state: MutexGuard<'a, TimerState>,
    timeout: Option<Duration>,
) -> MutexGuard<'a, TimerState> {
    match timeout {
        Some(timeout) => {
            shared
                .changed
                .wait_timeout(state, timeout)
                .unwrap_or_else(PoisonError::into_inner)
                .0
        }
        None => shared
            .changed
            .wait(state)
            .unwrap_or_else(PoisonError::into_inner),
    }
}

/// `deadline + k * interval` 中严格晚于 `now` 的第一个时刻；超出可表示范围时返回 `None`。
fn next_phase(deadline: Instant, interval: Duration, now: Instant) -> Option<Instant> {
    let mut next = deadline;
    while next <= now {
        next = next.checked_add(interval)?;
    }
    Some(next)
}

/// 真实时间定时器句柄。
struct SystemTimer {
    shared: Arc<TimerShared>,
}

impl fmt::Debug for SystemTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemTimer")
            .field("active", &self.is_active())
            .finish()
    }
}

impl TimerHandle for SystemTimer {
    fn reset(&self, delta: Duration) -> bool {
        let mut state = lock(&self.shared.state);
        if state.done {
            return false;
        }
        state.deadline = state.deadline.and_then(|deadline| deadline.checked_add(delta));
        drop(state);
        self.shared.changed.notify_all();
        true
    }

    fn stop(&self) -> bool {
        let mut state = lock(&self.shared.state);
        if state.done {
            return false;
        }
        state.done = true;
        drop(state);
        self.shared.changed.notify_all();
        true
    }

    fn is_active(&self) -> bool {
        !lock(&self.shared.state).done
    }
}

/// 真实睡眠 Future；丢弃时停止后台定时器。
struct SystemSleep {
    timer: SystemTimer,
    recv: Recv,
}

impl Future for SystemSleep {
    type Output = Result<(), SimClockError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.recv).poll(cx).map(|_| Ok(()))
    }
}

impl Drop for SystemSleep {
    fn drop(&mut self) {
        self.timer.stop();
    }
}
