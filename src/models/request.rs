//! 优化请求模型
//!
//! 一次顶层调用的全部输入，从 TOML 请求文件反序列化

use serde::{Deserialize, Serialize};

use crate::error::{AppError, BusinessError};

/// 运行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// 只打分，不改写
    ScoreOnly,
    /// 打分并给出分析建议，不改写
    Analyze,
    /// 改写循环，直到达标或用完迭代预算
    Optimize,
}

impl Mode {
    /// 从字符串解析运行模式
    pub fn parse(s: &str) -> Result<Self, AppError> {
        match s.trim().to_lowercase().as_str() {
            "score_only" | "score" => Ok(Mode::ScoreOnly),
            "analyze" => Ok(Mode::Analyze),
            "optimize" => Ok(Mode::Optimize),
            other => Err(AppError::Business(BusinessError::InvalidMode {
                mode: other.to_string(),
            })),
        }
    }

    /// 模式名称（用于日志）
    pub fn name(self) -> &'static str {
        match self {
            Mode::ScoreOnly => "score_only",
            Mode::Analyze => "analyze",
            Mode::Optimize => "optimize",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// 优化请求
///
/// 除 `text` 外所有字段都有默认值
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizeRequest {
    /// 待处理文本
    pub text: String,

    /// 运行模式
    #[serde(default = "default_mode")]
    pub mode: Mode,

    /// AI 检测率上限（百分比）
    #[serde(default = "default_max_ai")]
    pub max_ai_percent: f64,

    /// 抄袭率上限（百分比）
    #[serde(default = "default_max_plagiarism")]
    pub max_plagiarism_percent: f64,

    /// 最大改写迭代次数
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// 改写语气
    #[serde(default = "default_tone")]
    pub tone: String,

    /// 领域提示（可选）
    #[serde(default)]
    pub domain_hint: Option<String>,

    /// 额外改写指令（可选）
    #[serde(default)]
    pub custom_instructions: Option<String>,
}

fn default_mode() -> Mode {
    Mode::Optimize
}

fn default_max_ai() -> f64 {
    10.0
}

fn default_max_plagiarism() -> f64 {
    15.0
}

fn default_max_iterations() -> usize {
    3
}

fn default_tone() -> String {
    "neutral".to_string()
}

impl OptimizeRequest {
    /// 校验请求
    pub fn validate(&self) -> Result<(), AppError> {
        if self.text.trim().is_empty() {
            return Err(AppError::Business(BusinessError::EmptyRequestText));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parse() {
        assert_eq!(Mode::parse("optimize").unwrap(), Mode::Optimize);
        assert_eq!(Mode::parse("score_only").unwrap(), Mode::ScoreOnly);
        assert_eq!(Mode::parse("Analyze").unwrap(), Mode::Analyze);
        assert!(Mode::parse("refactor").is_err());
    }

    #[test]
    fn test_request_defaults_from_toml() {
        let request: OptimizeRequest = toml::from_str(r#"text = "一段待检测的文本""#).unwrap();
        assert_eq!(request.mode, Mode::Optimize);
        assert_eq!(request.max_ai_percent, 10.0);
        assert_eq!(request.max_plagiarism_percent, 15.0);
        assert_eq!(request.max_iterations, 3);
        assert_eq!(request.tone, "neutral");
        assert!(request.domain_hint.is_none());
    }

    #[test]
    fn test_empty_text_is_rejected() {
        let request: OptimizeRequest = toml::from_str(r#"text = "  ""#).unwrap();
        assert!(request.validate().is_err());
    }
}
