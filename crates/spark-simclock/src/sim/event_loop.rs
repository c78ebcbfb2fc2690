//! 事件循环：虚拟时间与活跃定时器集合的唯一所有者。
//!
//! # 模块定位（Why）
//! - 若推进时间与注册定时器可以并发执行，“新注册的定时器是否对本次推进可见”将取决于调度顺序；
//! - 因此 `add`/`remove`/`tick`/`stop` 全部经由同一把锁串行化：一个请求完整处理后下一个请求才开始，
//!   该锁即整个引擎的线性化点。
//!
//! # 结构概览（What）
//! - [`EventLoop`]：持有纪元、已推进偏移量、按注册顺序排列的活跃定时器与生命周期状态；
//! - [`TickReport`]：一次推进的结果摘要，返回给测试驱动方。
//!
//! # 执行逻辑（How）
//! - `tick` 先推进偏移量，再按注册顺序对每个活跃定时器调用 `fire`；触发的一次性定时器在同一次推进中移除；
//! - 异步等待者的 waker 由调用方在释放本锁之后统一唤醒，避免在临界区内执行外部代码。

use std::collections::BTreeMap;
use std::task::Waker;
use std::time::{Duration, Instant};

use tracing::debug;

use super::slot::{self, Delivery};
use super::timer::{FireOutcome, Schedule, TimerCore, TimerId};
use crate::error::SimClockError;
use crate::sync::Arc;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Lifecycle {
    Running,
    Stopped,
}

/// 一次时间推进的结果。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TickReport {
    /// 推进后的虚拟时刻。
    pub now: Instant,
    /// 本次完成投递的一次性定时器数量。
    pub fired: usize,
    /// 本次触发的周期定时器数量。
    pub ticked: usize,
    /// 因上一次投递尚未被读取而被合并丢弃的周期投递数量。
    pub coalesced: usize,
    /// 周期定时器因一次推进跨越多个周期而跳过的周期总数。
    pub skipped: u64,
    /// 推进结束后仍然活跃的定时器数量。
    pub live: usize,
}

pub(crate) struct EventLoop {
    epoch: Instant,
    elapsed: Duration,
    timers: BTreeMap<TimerId, Arc<TimerCore>>,
    lifecycle: Lifecycle,
    next_id: TimerId,
    max_live_timers: Option<usize>,
}

impl EventLoop {
    pub(crate) fn new(epoch: Instant, max_live_timers: Option<usize>) -> Self {
        Self {
            epoch,
            elapsed: Duration::ZERO,
            timers: BTreeMap::new(),
            lifecycle: Lifecycle::Running,
            next_id: 0,
            max_live_timers,
        }
    }

    /// 当前虚拟时刻；`tick` 保证 `epoch + elapsed` 始终可表示。
    pub(crate) fn now(&self) -> Instant {
        self.epoch + self.elapsed
    }

    pub(crate) fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub(crate) fn is_running(&self) -> bool {
        self.lifecycle == Lifecycle::Running
    }

    pub(crate) fn live(&self) -> usize {
        self.timers.len()
    }

    /// 以当前时刻为基准构造定时器，截止时间为 `elapsed + delay`。
    ///
    /// 构造与 [`add`](Self::add) 必须在同一次持锁期间完成，确保截止时间的基准与注册时的时间一致。
    pub(crate) fn prepare(
        &mut self,
        schedule: Schedule,
        delay: Duration,
    ) -> (Arc<TimerCore>, Delivery) {
        let id = self.next_id;
        self.next_id += 1;
        let (sender, delivery) = slot::channel();
        let deadline = self.elapsed.saturating_add(delay);
        let core = Arc::new(TimerCore::new(id, schedule, deadline, sender));
        (core, delivery)
    }

    /// 将定时器加入活跃集合。
    pub(crate) fn add(&mut self, core: Arc<TimerCore>) -> Result<(), SimClockError> {
        if !self.is_running() {
            return Err(SimClockError::EngineStopped { operation: "add" });
        }
        if let Some(limit) = self.max_live_timers {
            if self.timers.len() >= limit {
                return Err(SimClockError::TimerLimitExceeded { limit });
            }
        }
        let id = core.id();
        debug!(
            timer_id = id,
            deadline = ?core.deadline(),
            live = self.timers.len() + 1,
            "timer registered"
        );
        self.timers.insert(id, core);
        Ok(())
    }

    /// 从活跃集合移除定时器；不存在时返回 `false`。
    pub(crate) fn remove(&mut self, id: TimerId) -> bool {
        self.timers.remove(&id).is_some()
    }

    /// 推进虚拟时间并触发所有到期定时器。
    ///
    /// # 契约说明（What）
    /// - 推进量为零时同样执行一次求值，截止时间等于当前时刻的定时器会在此触发；
    /// - 推进后的时刻无法表示时返回 [`SimClockError::TimeOverflow`]，状态保持不变；
    /// - 返回的 waker 必须在释放事件循环锁之后唤醒。
    pub(crate) fn tick(
        &mut self,
        delta: Duration,
    ) -> Result<(TickReport, Vec<Waker>), SimClockError> {
        if !self.is_running() {
            return Err(SimClockError::EngineStopped { operation: "tick" });
        }
        let elapsed = self
            .elapsed
            .checked_add(delta)
            .filter(|elapsed| self.epoch.checked_add(*elapsed).is_some())
            .ok_or(SimClockError::TimeOverflow { delta })?;
        self.elapsed = elapsed;
        let now = self.now();

        let mut report = TickReport {
            now,
            fired: 0,
            ticked: 0,
            coalesced: 0,
            skipped: 0,
            live: 0,
        };
        let mut wakers = Vec::new();
        let mut evicted = Vec::new();

        for (id, core) in &self.timers {
            let outcome = core.fire(elapsed, now);
            if outcome.evicts() {
                evicted.push(*id);
            }
            match outcome {
                FireOutcome::NotDue | FireOutcome::Spent => {}
                FireOutcome::Fired(waker) => {
                    report.fired += 1;
                    wakers.extend(waker);
                }
                FireOutcome::Rearmed {
                    waker,
                    coalesced,
                    skipped,
                } => {
                    report.ticked += 1;
                    report.skipped = report.skipped.saturating_add(skipped);
                    if coalesced {
                        report.coalesced += 1;
                    }
                    wakers.extend(waker);
                }
            }
        }
        for id in evicted {
            self.timers.remove(&id);
        }
        report.live = self.timers.len();

        debug!(
            delta = ?delta,
            elapsed = ?elapsed,
            fired = report.fired,
            ticked = report.ticked,
            coalesced = report.coalesced,
            skipped = report.skipped,
            live = report.live,
            "virtual time advanced"
        );
        Ok((report, wakers))
    }

    /// 终止生命周期并清空活跃集合。
    ///
    /// 被丢弃的定时器全部失活并关闭投递槽，返回睡眠等待者的 waker，调用方须在释放本锁后唤醒；
    /// 已经停止时返回 `None`。
    pub(crate) fn stop(&mut self) -> Option<Vec<Waker>> {
        if !self.is_running() {
            return None;
        }
        self.lifecycle = Lifecycle::Stopped;
        let dropped = self.timers.len();
        let wakers = std::mem::take(&mut self.timers)
            .into_values()
            .filter_map(|core| core.shutdown())
            .collect();
        debug!(dropped, elapsed = ?self.elapsed, "simulated clock stopped");
        Some(wakers)
    }
}
