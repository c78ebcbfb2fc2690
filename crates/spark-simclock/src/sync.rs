// 教案级说明：同步原语切换层。
//
// - **意图 (Why)**：定时器的 `stop`/`fire` 竞态是本 crate 的核心正确性性质，需要在 Loom 下穷举
//   调度交错；因此所有参与该竞态的锁、条件变量与引用计数都经由本模块取得。
// - **契约 (What)**：默认构建导出标准库实现；启用 `--cfg spark_loom`（或 `--cfg loom`）且打开
//   `loom-model` Feature 时导出 Loom 的同名类型，二者 API 在本 crate 使用的子集上保持一致。
// - **实现提示 (How)**：`lock` 辅助函数统一处理锁中毒：测试线程 panic 后仍允许其他线程继续
//   观察时钟状态，避免一次断言失败级联成无关的 `PoisonError`。

#[cfg(not(any(loom, spark_loom)))]
pub(crate) use std::sync::{Arc, Condvar, Mutex, MutexGuard};

#[cfg(any(loom, spark_loom))]
pub(crate) use loom::sync::{Arc, Condvar, Mutex, MutexGuard};

use std::sync::PoisonError;

/// 获取互斥锁；若持锁线程曾 panic，则直接接管内部数据。
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
