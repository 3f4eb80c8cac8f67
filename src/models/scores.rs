//! 分数模型与阈值判定
//!
//! null 表示页面上该信号不可用，不等于 0

use serde::{Deserialize, Serialize};
use tracing::warn;

/// 一次打分的结果
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Scores {
    /// AI 检测率（0-100），None 表示页面未给出该信号
    pub ai_detection_percent: Option<f64>,
    /// 抄袭率（0-100），None 表示页面未给出该信号
    pub plagiarism_percent: Option<f64>,
    /// 附加说明（部分提取、页面提示等）
    pub notes: String,
}

impl Scores {
    /// 把提取到的数值收敛到合法区间
    ///
    /// 页面偶尔会渲染 "99+%" 之类的值，越界数值收敛而不是置空
    pub fn normalized(mut self) -> Self {
        self.ai_detection_percent = self.ai_detection_percent.map(clamp_percent);
        self.plagiarism_percent = self.plagiarism_percent.map(clamp_percent);
        self
    }
}

fn clamp_percent(v: f64) -> f64 {
    if v.is_finite() {
        v.clamp(0.0, 100.0)
    } else {
        0.0
    }
}

impl std::fmt::Display for Scores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ai = self
            .ai_detection_percent
            .map(|v| format!("{:.1}%", v))
            .unwrap_or_else(|| "不可用".to_string());
        let plag = self
            .plagiarism_percent
            .map(|v| format!("{:.1}%", v))
            .unwrap_or_else(|| "不可用".to_string());
        write!(f, "AI检测率: {}, 抄袭率: {}", ai, plag)
    }
}

/// 阈值配置
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Thresholds {
    pub max_ai_percent: f64,
    pub max_plagiarism_percent: f64,
}

impl Thresholds {
    /// 判定一次打分是否达标
    ///
    /// 单个信号不可用时视为达标（缺失不阻塞完成）；但两个信号同时
    /// 不可用时明确判定为未达标，因为没有任何信号被实际验证过
    pub fn met_by(&self, scores: &Scores) -> bool {
        if scores.ai_detection_percent.is_none() && scores.plagiarism_percent.is_none() {
            warn!("⚠️ AI检测率和抄袭率均不可用，无法验证任何信号，判定为未达标");
            return false;
        }

        let ai_ok = scores
            .ai_detection_percent
            .map(|v| v <= self.max_ai_percent)
            .unwrap_or(true);
        let plag_ok = scores
            .plagiarism_percent
            .map(|v| v <= self.max_plagiarism_percent)
            .unwrap_or(true);

        ai_ok && plag_ok
    }
}

/// 单次迭代的分数快照
///
/// iteration 从 0 开始，0 表示基线打分
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationRecord {
    pub iteration: usize,
    pub scores: Scores,
    /// 当次文本长度（字符数，用于追踪改写幅度）
    pub text_chars: usize,
}

/// 一次顶层调用的最终结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationOutcome {
    pub final_text: String,
    pub ai_detection_percent: Option<f64>,
    pub plagiarism_percent: Option<f64>,
    pub iterations_used: usize,
    pub thresholds_met: bool,
    pub history: Vec<IterationRecord>,
    pub notes: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> Thresholds {
        Thresholds {
            max_ai_percent: 10.0,
            max_plagiarism_percent: 15.0,
        }
    }

    #[test]
    fn test_both_unavailable_is_not_met() {
        // 两个信号都缺失时，无论阈值配置如何都判定未达标
        let scores = Scores {
            ai_detection_percent: None,
            plagiarism_percent: None,
            notes: String::new(),
        };
        assert!(!thresholds().met_by(&scores));

        let loose = Thresholds {
            max_ai_percent: 100.0,
            max_plagiarism_percent: 100.0,
        };
        assert!(!loose.met_by(&scores));
    }

    #[test]
    fn test_single_unavailable_does_not_block() {
        let scores = Scores {
            ai_detection_percent: Some(5.0),
            plagiarism_percent: None,
            notes: String::new(),
        };
        assert!(thresholds().met_by(&scores));
    }

    #[test]
    fn test_numeric_comparison() {
        let mut scores = Scores {
            ai_detection_percent: Some(10.0),
            plagiarism_percent: Some(15.0),
            notes: String::new(),
        };
        // 等于上限算达标
        assert!(thresholds().met_by(&scores));

        scores.ai_detection_percent = Some(10.1);
        assert!(!thresholds().met_by(&scores));
    }

    #[test]
    fn test_normalized_clamps_out_of_range() {
        let scores = Scores {
            ai_detection_percent: Some(120.0),
            plagiarism_percent: Some(-3.0),
            notes: String::new(),
        }
        .normalized();
        assert_eq!(scores.ai_detection_percent, Some(100.0));
        assert_eq!(scores.plagiarism_percent, Some(0.0));
    }
}
