//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 虚拟时钟没有 I/O 或解析类的可恢复错误，唯一的失败来源是调用方误用引擎；
//! - 将这些误用集中定义为结构化错误，避免“静默丢弃请求”破坏测试对确定性的预期。
//!
//! ## 设计要求（What）
//! - 所有错误类型实现 `thiserror::Error`，可直接通过 `?` 传播到测试函数；
//! - 对已触发/已停止的定时器调用 `reset`/`stop` 不视为错误，而是返回 `false`；
//! - 内部一致性被破坏（例如一次性定时器的投递槽收到第二个值）属于程序缺陷，由 `debug_assert!` 暴露。

use std::time::Duration;

use thiserror::Error;

/// 虚拟时钟引擎的错误域。
///
/// # 教案式说明
/// - **意图 (Why)**：对已停止的引擎继续推进/注册若被静默忽略，测试会悄悄丢失一次定时器触发；
///   默认选择快速失败，使错误的生命周期管理立即暴露。
/// - **契约 (What)**：
///   - 所有变体均为 `Clone + Eq`，便于在测试中直接 `assert_eq!`；
///   - `operation` 字段记录被拒绝的门面方法名称，便于定位调用点。
/// - **设计权衡 (Trade-offs)**：配置 [`StoppedEnginePolicy::Ignore`](crate::StoppedEnginePolicy::Ignore)
///   后，`EngineStopped` 不再返回给调用方，而是以 `warn` 日志记录并忽略请求。
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum SimClockError {
    /// 引擎已停止，拒绝继续推进时间或注册定时器。
    #[error("simulated clock is stopped; `{operation}` rejected")]
    EngineStopped { operation: &'static str },

    /// 活跃定时器数量达到配置上限。
    #[error("live timer limit of {limit} reached")]
    TimerLimitExceeded { limit: usize },

    /// `Ticker` 的周期必须大于零，否则一次推进将产生无限次触发。
    #[error("ticker interval must be non-zero")]
    ZeroInterval,

    /// 推进后的虚拟时间超出 `Instant` 可表示范围。
    #[error("advancing virtual time by {delta:?} overflows the clock's range")]
    TimeOverflow { delta: Duration },
}

/// 配置加载错误。
#[derive(Debug, Error)]
pub enum ConfigError {
    /// TOML 文本无法解析或包含未知字段。
    #[error("invalid simulated clock configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// `max_live_timers = 0` 会让所有注册失败，视为配置错误。
    #[error("`max_live_timers` must be positive when set")]
    ZeroTimerLimit,
}
