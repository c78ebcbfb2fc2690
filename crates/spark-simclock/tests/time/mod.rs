//! 虚拟时间集成测试入口。
//!
//! # 模块目的（Why）
//! - 汇集所有以公开门面驱动虚拟时钟的场景测试，便于统一运行与过滤；
//! - 过滤路径为 `cargo test -p spark-simclock --test time -- tests::time::*`。
//!
//! # 结构概览（What）
//! - [`tests::time::deterministic_scenarios`]：一次性定时器、周期定时器与生命周期策略的端到端场景；
//! - [`tests::time::async_sleep`]：通过 [`Clock`](spark_simclock::Clock) 抽象在执行器中等待虚拟时间。
//!
//! # 维护提示（How）
//! - 新增场景时在此处增加子模块；场景内部只使用公开 API，避免与内部结构耦合。

#![cfg(not(any(loom, spark_loom)))]

pub mod tests {
    //! 集成测试命名空间：将所有时间相关测试归档在 `tests::time` 之下，便于过滤。
    pub mod time {
        include!("deterministic_scenarios.rs");
        include!("async_sleep.rs");
    }
}
