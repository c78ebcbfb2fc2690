#![deny(unsafe_code)]
#![doc = "spark-simclock: 面向确定性测试的虚拟时钟与定时器引擎。"]
#![doc = ""]
#![doc = "== 使用方式 =="]
#![doc = "1. 被测组件依赖 [`Clock`] 抽象读取时间与睡眠；生产环境注入 [`SystemClock`]。"]
#![doc = "2. 测试注入 [`SimClock`]，通过 [`SimClock::tick`] 显式推进虚拟时间，所有到期定时器在推进返回前完成投递。"]
#![doc = "3. 定时器与周期定时器可直接从 [`SimClock`] 创建，也可经由 [`Clock`] 以 [`TimerHandle`] 形式创建；触发值通过 [`Delivery`] 读取，支持非阻塞、阻塞、限时与异步四种方式。"]
#![doc = ""]
#![doc = "== 并发模型检查 =="]
#![doc = "`RUSTFLAGS=\"--cfg spark_loom\" cargo test -p spark-simclock --features loom-model --test loom_concurrency`"]

mod clock;
mod config;
mod error;
mod sim;
mod sync;
#[cfg(not(any(loom, spark_loom)))]
mod system;

pub use clock::{Clock, Sleep, TimerHandle};
pub use config::{SimClockConfig, StoppedEnginePolicy};
pub use error::{ConfigError, SimClockError};
pub use sim::{Delivery, Recv, SimClock, StopGuard, TickReport, Ticker, Timer};
#[cfg(not(any(loom, spark_loom)))]
pub use system::SystemClock;
