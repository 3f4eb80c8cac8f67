//! 打分后端（Providers）
//!
//! ## 职责
//!
//! 定义打分能力接口，屏蔽两种可互换的实现：
//!
//! ### `automation` - 确定性自动化后端
//! - 按 observe / act / extract 协议逐步驱动目标应用
//! - 持有会话ID → 自动化句柄、会话ID → 调试链接两张映射
//!
//! ### `agent` - 自然语言任务后端
//! - 把整个打分流程交给自然语言执行端，解析其结构化回答
//!
//! 两者都通过同一个会话管理器创建和释放远程会话，
//! 代理 / 隐身 / 上下文语义完全一致

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use crate::config::Config;
use crate::error::{AppError, ConfigError};
use crate::models::scores::Scores;
use crate::session::SessionOptions;

pub mod agent;
pub mod automation;

pub use agent::AgentProvider;
pub use automation::AutomationProvider;

/// 会话创建结果
#[derive(Debug, Clone)]
pub struct SessionResult {
    pub session_id: String,
    /// 上下文是全新的，需要人工通过调试链接登录
    pub needs_login: bool,
    pub debug_url: Option<String>,
}

/// 打分调用选项
#[derive(Debug, Clone, Default)]
pub struct ScoreOptions {
    /// 迭代编号（0 表示基线，用于日志）
    pub iteration: usize,
}

/// 打分能力接口
///
/// 两个实现可互换，由配置选择
#[async_trait]
pub trait ScoringProvider: Send + Sync {
    /// 创建（或复用）一个可打分的会话
    async fn create_session(&self, opts: &SessionOptions) -> anyhow::Result<SessionResult>;

    /// 在指定会话里给一段文本打分
    ///
    /// 未知会话ID是调用方错误，立即失败，绝不静默跳过
    async fn score_text(
        &self,
        session_id: &str,
        text: &str,
        opts: &ScoreOptions,
    ) -> anyhow::Result<Scores>;

    /// 关闭会话（尽力而为，从不抛出）
    async fn close_session(&self, session_id: &str);
}

impl fmt::Debug for dyn ScoringProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dyn ScoringProvider")
    }
}

/// 按配置构建打分后端
pub fn create_provider(config: &Config) -> anyhow::Result<Arc<dyn ScoringProvider>> {
    match config.provider.as_str() {
        "automation" => Ok(Arc::new(AutomationProvider::new(config))),
        "agent" => Ok(Arc::new(AgentProvider::new(config))),
        other => Err(AppError::Config(ConfigError::UnknownProvider {
            provider: other.to_string(),
        })
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_provider_by_config() {
        let mut config = Config::default();
        config.provider = "automation".to_string();
        assert!(create_provider(&config).is_ok());

        config.provider = "agent".to_string();
        assert!(create_provider(&config).is_ok());

        config.provider = "magic".to_string();
        let err = create_provider(&config).unwrap_err();
        assert!(err.to_string().contains("magic"));
    }
}
