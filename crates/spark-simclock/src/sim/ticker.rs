//! 周期定时器。
//!
//! 相位策略：每次触发后下一个截止时间为“上一个截止时间 + 整数个周期”，而不是“观测时刻 + 周期”，
//! 因此迟到的推进不会累积漂移。一次推进跨过多个周期时只投递一次，错过的周期被跳过，
//! 下一个截止时间落在推进后时刻之后的第一个相位点。

use std::fmt;
use std::time::{Duration, Instant};

use super::timer::Timer;
use crate::clock::TimerHandle;

/// 周期定时器句柄：`Armed -> Fired -> Armed -> ...`，直到 [`stop`](Self::stop)。
///
/// 投递端容量为一；若消费者尚未读取上一次触发值，新的触发会被合并丢弃，
/// 对应 [`TickReport::coalesced`](super::TickReport::coalesced) 计数。
pub struct Ticker {
    timer: Timer,
    interval: Duration,
}

impl fmt::Debug for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ticker")
            .field("timer", &self.timer)
            .field("interval", &self.interval)
            .finish()
    }
}

impl Ticker {
    pub(crate) fn new(timer: Timer, interval: Duration) -> Self {
        Self { timer, interval }
    }

    /// 停止周期触发；已停止时返回 `false`。已投递但未读取的值保持可见。
    pub fn stop(&self) -> bool {
        self.timer.stop()
    }

    /// 将下一次触发推后 `delta`，此后的相位以新的截止时间为基准。
    pub fn reset(&self, delta: Duration) -> bool {
        self.timer.reset(delta)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_active(&self) -> bool {
        self.timer.is_active()
    }

    /// 下一次触发的截止时刻。
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timer.deadline()
    }
}

impl TimerHandle for Ticker {
    fn reset(&self, delta: Duration) -> bool {
        Ticker::reset(self, delta)
    }

    fn stop(&self) -> bool {
        Ticker::stop(self)
    }

    fn is_active(&self) -> bool {
        Ticker::is_active(self)
    }
}
