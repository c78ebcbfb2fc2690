//! 时钟抽象。
//!
//! # 模块定位（Why）
//! - 业务代码通过 [`Clock`] 读取时间、等待、创建定时器与周期定时器；生产环境注入
//!   [`SystemClock`](crate::SystemClock)，测试注入 [`SimClock`](crate::SimClock)，两者互不感知；
//! - 睡眠以装箱 Future 返回、定时器以 [`TimerHandle`] trait 对象返回，trait 保持对象安全，
//!   可以 `Arc<dyn Clock>` 形式在组件间共享。
//!
//! # 边界说明（What）
//! - 推进与停止属于测试驱动方的能力，只在 [`SimClock`](crate::SimClock) 上提供，不进入本 trait。

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};

use crate::error::SimClockError;
use crate::sim::Delivery;

/// [`Clock::sleep`] 返回的 Future。
pub type Sleep = Pin<Box<dyn Future<Output = Result<(), SimClockError>> + Send + 'static>>;

/// 与具体时钟无关的定时器句柄。
///
/// 语义与 [`Timer`](crate::Timer) 一致：`reset` 在当前截止时间上累加，
/// `stop` 成功后保证不再投递，二者对已触发或已停止的定时器返回 `false`。
pub trait TimerHandle: Send + Sync + fmt::Debug {
    fn reset(&self, delta: Duration) -> bool;

    fn stop(&self) -> bool;

    fn is_active(&self) -> bool;
}

/// 可替换的时间来源。
///
/// # 契约说明（What）
/// - `now` 单调不减；
/// - `sleep(d)` 等价于创建时长为 `d` 的定时器并等待其投递；
/// - `new_timer`/`new_ticker` 返回定时器句柄与只读投递端，周期为零时返回
///   [`SimClockError::ZeroInterval`]；
/// - 其余错误只来自虚拟时钟（例如时钟已停止），真实时钟的睡眠与定时器总是成功。
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Instant;

    fn sleep(&self, duration: Duration) -> Sleep;

    fn new_timer(
        &self,
        duration: Duration,
    ) -> Result<(Box<dyn TimerHandle>, Delivery), SimClockError>;

    fn new_ticker(
        &self,
        interval: Duration,
    ) -> Result<(Box<dyn TimerHandle>, Delivery), SimClockError>;
}
