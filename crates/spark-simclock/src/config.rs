//! 虚拟时钟配置。
//!
//! # 模块定位（Why）
//! - 测试套件通常以 TOML 片段描述运行环境；时钟的生命周期策略与容量上限也通过同一入口声明，
//!   避免在每个测试里手工拼装构造参数。
//!
//! # 结构概览（What）
//! - [`SimClockConfig`]：引擎级配置，所有字段均有默认值；
//! - [`StoppedEnginePolicy`]：引擎停止后收到请求时的处理策略。
//!
//! # 使用指引（How）
//! ```
//! use spark_simclock::{SimClockConfig, StoppedEnginePolicy};
//!
//! let config = SimClockConfig::from_toml_str(
//!     r#"
//!     stopped_engine = "ignore"
//!     max_live_timers = 64
//!     "#,
//! )
//! .expect("valid configuration");
//! assert_eq!(config.stopped_engine, StoppedEnginePolicy::Ignore);
//! assert_eq!(config.max_live_timers, Some(64));
//! ```

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// 引擎停止后收到推进/注册请求时的处理策略。
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoppedEnginePolicy {
    /// 返回 [`SimClockError::EngineStopped`](crate::SimClockError::EngineStopped)。
    #[default]
    FailFast,
    /// 记录 `warn` 日志后忽略请求：推进不产生任何触发，新定时器永不触发，睡眠立即返回。
    Ignore,
}

/// 虚拟时钟配置。
///
/// # 契约说明（What）
/// - `stopped_engine`：默认 [`StoppedEnginePolicy::FailFast`]；
/// - `max_live_timers`：活跃定时器上限，`None` 表示不限；设置时必须为正数；
/// - 反序列化拒绝未知字段，拼写错误的键会在加载时立即失败。
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimClockConfig {
    pub stopped_engine: StoppedEnginePolicy,
    pub max_live_timers: Option<usize>,
}

impl SimClockConfig {
    /// 从 TOML 文本解析并校验配置。
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// 设置停止后请求的处理策略。
    pub fn with_stopped_engine(mut self, policy: StoppedEnginePolicy) -> Self {
        self.stopped_engine = policy;
        self
    }

    /// 设置活跃定时器上限。
    pub fn with_max_live_timers(mut self, limit: usize) -> Self {
        self.max_live_timers = Some(limit);
        self
    }

    /// 校验字段组合是否可用。
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_live_timers == Some(0) {
            return Err(ConfigError::ZeroTimerLimit);
        }
        Ok(())
    }
}
