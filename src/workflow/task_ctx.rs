//! 打分任务上下文
//!
//! 封装"我正在哪个会话里跑第几轮打分"这一信息

use std::fmt::Display;

/// 打分任务上下文
///
/// 包含单次打分所需的全部上下文信息
#[derive(Debug, Clone)]
pub struct TaskCtx {
    /// 会话ID
    pub session_id: String,

    /// 迭代编号（0 表示基线打分，仅用于日志显示）
    pub iteration: usize,

    /// 会话调试链接（认证错误时透传给调用方）
    pub debug_url: Option<String>,
}

impl TaskCtx {
    /// 创建新的任务上下文
    pub fn new(session_id: String, iteration: usize, debug_url: Option<String>) -> Self {
        Self {
            session_id,
            iteration,
            debug_url,
        }
    }

    /// 会话ID的短形式（日志用）
    fn short_session(&self) -> &str {
        self.session_id.get(..8).unwrap_or(&self.session_id)
    }
}

impl Display for TaskCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[会话 {} 迭代#{}]", self.short_session(), self.iteration)
    }
}
