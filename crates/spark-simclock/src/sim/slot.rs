//! 单槽投递通道：定时器触发时刻的交接点。
//!
//! # 设计动机（Why）
//! - 触发动作由引擎在推进时间的临界区内执行，绝不能因为消费者尚未读取而阻塞；
//! - 一次性定时器最多投递一次，容量为一的槽位足以保证生产端永不阻塞。
//!
//! # 契约说明（What）
//! - 生产端 [`SlotSender::offer`] 非阻塞：槽位为空时写入并返回待唤醒的 waker，已满时拒绝；
//! - 消费端 [`Delivery`] 只读，可同步等待、限时等待、轮询或以 Future 形式等待；
//! - 公开的消费端 API 从不观察关闭：[`Delivery`] 的调用方只能通过“收到值”判断触发；
//! - 时钟停止时引擎会关闭残留槽位，只有睡眠等待者通过 crate 内部的 `wait_fired`/`poll_fired`
//!   观察关闭并据此返回错误，普通定时器的消费者不受影响。

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, Waker};
use std::time::Instant;

#[cfg(not(any(loom, spark_loom)))]
use std::time::Duration;

use crate::sync::{Arc, Condvar, Mutex, MutexGuard, lock};

/// 创建一对相互绑定的生产端与消费端。
pub(crate) fn channel() -> (SlotSender, Delivery) {
    let shared = Arc::new(SlotShared {
        state: Mutex::new(SlotState {
            value: None,
            waker: None,
            closed: false,
        }),
        ready: Condvar::new(),
    });
    (
        SlotSender {
            shared: Arc::clone(&shared),
        },
        Delivery { shared },
    )
}

struct SlotShared {
    state: Mutex<SlotState>,
    ready: Condvar,
}

impl fmt::Debug for SlotShared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotShared").finish_non_exhaustive()
    }
}

#[derive(Debug)]
struct SlotState {
    value: Option<Instant>,
    waker: Option<Waker>,
    /// 时钟停止时置位，此后不会再有投递。
    closed: bool,
}

/// 写入结果。
#[derive(Debug)]
pub(crate) enum Offer {
    /// 已写入；若有异步等待者，返回其 waker，由调用方在释放引擎锁后唤醒。
    Accepted(Option<Waker>),
    /// 槽位仍有未读取的值，本次写入被丢弃。
    Full,
}

#[derive(Debug)]
pub(crate) struct SlotSender {
    shared: Arc<SlotShared>,
}

impl SlotSender {
    /// 非阻塞写入触发时刻。
    pub(crate) fn offer(&self, at: Instant) -> Offer {
        let mut state = lock(&self.shared.state);
        if state.value.is_some() {
            return Offer::Full;
        }
        state.value = Some(at);
        let waker = state.waker.take();
        drop(state);
        self.shared.ready.notify_all();
        Offer::Accepted(waker)
    }

    /// 标记槽位不会再有投递，唤醒所有同步等待者并交出异步等待者的 waker。
    pub(crate) fn close(&self) -> Option<Waker> {
        let mut state = lock(&self.shared.state);
        state.closed = true;
        let waker = state.waker.take();
        drop(state);
        self.shared.ready.notify_all();
        waker
    }
}

/// 定时器/周期定时器的只读投递端。
///
/// # 教案式说明
/// - **意图 (Why)**：以单生产者、单槽位的队列替代回调，保持“至多投递一次、永不阻塞生产端”的约束；
/// - **契约 (What)**：
///   - 克隆得到的句柄观察同一个槽位，任意一个句柄取走值后其他句柄不再看到该值；
///   - [`recv`](Self::recv) 会阻塞当前线程直到引擎推进时间使定时器触发，若定时器已被停止则永远不会返回，
///     需要有界等待时使用 [`recv_timeout`](Self::recv_timeout)；
///   - [`recv_async`](Self::recv_async) 返回 `'static` 的 Future，可交给任意执行器。
#[derive(Clone, Debug)]
pub struct Delivery {
    shared: Arc<SlotShared>,
}

impl Delivery {
    /// 若已有触发值则取走，否则立即返回 `None`。
    pub fn try_recv(&self) -> Option<Instant> {
        lock(&self.shared.state).value.take()
    }

    /// 槽位中是否有尚未读取的触发值（不取走）。
    pub fn is_ready(&self) -> bool {
        lock(&self.shared.state).value.is_some()
    }

    /// 阻塞当前线程直到收到触发值。
    pub fn recv(&self) -> Instant {
        let mut state = lock(&self.shared.state);
        loop {
            if let Some(at) = state.value.take() {
                return at;
            }
            state = self.wait(state);
        }
    }

    /// 与 [`recv`](Self::recv) 相同，但槽位被关闭时返回 `None`；供睡眠路径区分“触发”与“时钟停止”。
    pub(crate) fn wait_fired(&self) -> Option<Instant> {
        let mut state = lock(&self.shared.state);
        loop {
            if let Some(at) = state.value.take() {
                return Some(at);
            }
            if state.closed {
                return None;
            }
            state = self.wait(state);
        }
    }

    /// [`wait_fired`](Self::wait_fired) 的异步形式。
    pub(crate) fn poll_fired(&self, cx: &mut Context<'_>) -> Poll<Option<Instant>> {
        poll_slot(&self.shared, cx, true)
    }

    fn wait<'a>(&self, state: MutexGuard<'a, SlotState>) -> MutexGuard<'a, SlotState> {
        self.shared
            .ready
            .wait(state)
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// 以真实时间为上限阻塞等待触发值。
    ///
    /// 上限只用于防止测试在缺少推进时挂死，不参与虚拟时间的任何计算。
    #[cfg(not(any(loom, spark_loom)))]
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Instant> {
        let give_up = Instant::now() + timeout;
        let mut state = lock(&self.shared.state);
        loop {
            if let Some(at) = state.value.take() {
                return Some(at);
            }
            let now = Instant::now();
            if now >= give_up {
                return None;
            }
            let (next, _) = self
                .shared
                .ready
                .wait_timeout(state, give_up - now)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            state = next;
        }
    }

    /// 返回等待下一次触发值的 Future。
    pub fn recv_async(&self) -> Recv {
        Recv {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// [`Delivery::recv_async`] 返回的 Future。
#[derive(Debug)]
#[must_use = "futures do nothing unless polled"]
pub struct Recv {
    shared: Arc<SlotShared>,
}

impl Future for Recv {
    type Output = Instant;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match poll_slot(&self.shared, cx, false) {
            Poll::Ready(Some(at)) => Poll::Ready(at),
            _ => Poll::Pending,
        }
    }
}

/// 取走触发值或登记 waker；`observe_close` 为真时关闭的槽位立即返回 `Ready(None)`。
fn poll_slot(
    shared: &SlotShared,
    cx: &mut Context<'_>,
    observe_close: bool,
) -> Poll<Option<Instant>> {
    let mut state = lock(&shared.state);
    if let Some(at) = state.value.take() {
        return Poll::Ready(Some(at));
    }
    if observe_close && state.closed {
        return Poll::Ready(None);
    }
    let refresh = !state
        .waker
        .as_ref()
        .is_some_and(|existing| existing.will_wake(cx.waker()));
    if refresh {
        state.waker = Some(cx.waker().clone());
    }
    Poll::Pending
}
