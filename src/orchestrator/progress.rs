//! 进度上报 - 编排层
//!
//! 进度以 0-100 汇报，区间固定划分：
//! - 0-15   建会话 + 基线打分
//! - 15-85  按迭代预算均分，每轮的改写在区间起点、打分在区间中点
//! - 85-100 总结与收尾
//!
//! 同一次运行内的百分比应当单调不减（按构造保证，不在运行时强制）

use futures::future::BoxFuture;
use std::sync::Arc;
use tracing::info;

/// 注入式进度回调：接收 (消息, 可选百分比)
pub type ProgressCallback =
    Arc<dyn Fn(String, Option<u8>) -> BoxFuture<'static, ()> + Send + Sync>;

/// 建会话 + 基线区间的终点
pub const SETUP_END: u8 = 15;

/// 迭代区间的终点
pub const ITERATION_END: u8 = 85;

/// 迭代内的子步骤
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Substep {
    /// 改写（区间起点）
    Rewrite,
    /// 重新打分（区间中点）
    Score,
}

/// 进度上报器
///
/// 始终写日志；调用方注入了回调时同时转发
pub struct ProgressReporter {
    callback: Option<ProgressCallback>,
    max_iterations: usize,
}

impl ProgressReporter {
    pub fn new(callback: Option<ProgressCallback>, max_iterations: usize) -> Self {
        Self {
            callback,
            max_iterations,
        }
    }

    /// 只写日志的上报器
    pub fn log_only(max_iterations: usize) -> Self {
        Self::new(None, max_iterations)
    }

    /// 上报一条进度
    pub async fn report(&self, message: impl Into<String>, percent: Option<u8>) {
        let message = message.into();
        match percent {
            Some(p) => info!("📈 [{:>3}%] {}", p, message),
            None => info!("📈 {}", message),
        }
        if let Some(callback) = &self.callback {
            callback(message, percent).await;
        }
    }

    /// 某一轮迭代的某个子步骤对应的百分比
    pub fn iteration_percent(&self, iteration: usize, substep: Substep) -> u8 {
        iteration_percent(iteration, self.max_iterations, substep)
    }
}

/// 15-85 区间按迭代预算均分
///
/// iteration 从 1 开始计
pub fn iteration_percent(iteration: usize, max_iterations: usize, substep: Substep) -> u8 {
    let budget = max_iterations.max(1);
    let index = iteration.saturating_sub(1).min(budget - 1) as f64;
    let band = f64::from(ITERATION_END - SETUP_END) / budget as f64;
    let offset = match substep {
        Substep::Rewrite => 0.0,
        Substep::Score => band / 2.0,
    };
    let percent = f64::from(SETUP_END) + index * band + offset;
    percent.round().clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_iteration_starts_at_setup_end() {
        assert_eq!(iteration_percent(1, 3, Substep::Rewrite), SETUP_END);
    }

    #[test]
    fn test_score_substep_is_band_midpoint() {
        // 预算 1 轮：区间 15-85，中点 50
        assert_eq!(iteration_percent(1, 1, Substep::Score), 50);
    }

    #[test]
    fn test_percent_is_monotonic_within_run() {
        let budget = 4;
        let mut last = 0;
        for iteration in 1..=budget {
            for substep in [Substep::Rewrite, Substep::Score] {
                let percent = iteration_percent(iteration, budget, substep);
                assert!(percent >= last, "进度必须单调不减");
                last = percent;
            }
        }
        assert!(last < ITERATION_END + 1);
    }

    #[test]
    fn test_percent_stays_in_iteration_window() {
        for budget in [1, 2, 3, 5, 10] {
            for iteration in 1..=budget {
                for substep in [Substep::Rewrite, Substep::Score] {
                    let percent = iteration_percent(iteration, budget, substep);
                    assert!((SETUP_END..ITERATION_END).contains(&percent));
                }
            }
        }
    }

    #[test]
    fn test_out_of_budget_iteration_is_clamped() {
        // 越界的迭代编号收敛到最后一个区间，不会冲出 85
        let percent = iteration_percent(9, 2, Substep::Score);
        assert!(percent < ITERATION_END);
    }
}
