//! 自然语言任务后端
//!
//! 不逐步驱动页面，而是把整个打分流程描述成一条任务指令交给
//! 自然语言执行端，再从它的回答里解析出结构化分数。

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::AppError;
use crate::infrastructure::{AutomationApi, BoundSession};
use crate::models::scores::Scores;
use crate::providers::{ScoreOptions, ScoringProvider, SessionResult};
use crate::session::{SessionManager, SessionOptions};
use crate::workflow::MAX_TEXT_LEN;

/// 自然语言任务的最大步数
const AGENT_MAX_STEPS: u32 = 25;

/// 自然语言任务后端
pub struct AgentProvider {
    manager: SessionManager,
    api: AutomationApi,
    target_url: String,
    sessions: Mutex<HashMap<String, BoundSession>>,
}

impl AgentProvider {
    /// 从全局配置创建后端
    pub fn new(config: &Config) -> Self {
        Self {
            manager: SessionManager::new(config),
            api: AutomationApi::new(config),
            target_url: config.target_app_url.clone(),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// 构建一条完整的打分任务指令
    fn build_instruction(&self, text: &str) -> String {
        let text: String = text.chars().take(MAX_TEXT_LEN).collect();
        format!(
            r#"打开 {}，在里面新建一个文档，把下面的文本粘贴进去，打开原创性/AI检测面板，读出 AI 检测率和抄袭率。
最后只回答一个 JSON 对象：{{"aiDetectionPercent": 数值或null, "plagiarismPercent": 数值或null, "notes": "面板上的说明"}}。

文本：
{}"#,
            self.target_url, text
        )
    }
}

#[async_trait]
impl ScoringProvider for AgentProvider {
    async fn create_session(&self, opts: &SessionOptions) -> anyhow::Result<SessionResult> {
        let info = self.manager.get_or_create_session(opts).await?;
        let session_id = info.session_id.clone();

        if self.sessions.lock().await.contains_key(&session_id) {
            debug!("复用已绑定的自然语言会话: {}", session_id);
            return Ok(SessionResult {
                session_id,
                needs_login: info.needs_login,
                debug_url: info.debug_url,
            });
        }

        // 绑定失败时先释放刚建出来的远程会话再传播错误
        let bound = match self.api.bind(&session_id).await {
            Ok(bound) => bound,
            Err(e) => {
                warn!("⚠️ 会话 {} 绑定失败，先释放远程会话: {}", session_id, e);
                self.manager.close_session(&session_id).await;
                return Err(e.into());
            }
        };
        self.sessions.lock().await.insert(session_id.clone(), bound);

        Ok(SessionResult {
            session_id,
            needs_login: info.needs_login,
            debug_url: info.debug_url,
        })
    }

    async fn score_text(
        &self,
        session_id: &str,
        text: &str,
        opts: &ScoreOptions,
    ) -> anyhow::Result<Scores> {
        let bound = self
            .sessions
            .lock()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| AppError::unknown_session(session_id))?;

        info!(
            "[会话 {} 迭代#{}] 🤖 交给自然语言执行端打分...",
            session_id.get(..8).unwrap_or(session_id),
            opts.iteration
        );

        let instruction = self.build_instruction(text);
        let answer = bound.agent_execute(&instruction, AGENT_MAX_STEPS).await?;

        let scores = parse_agent_scores(&answer);
        info!("✓ 自然语言执行端回答解析完成: {}", scores);
        Ok(scores.normalized())
    }

    async fn close_session(&self, session_id: &str) {
        if let Some(bound) = self.sessions.lock().await.remove(session_id) {
            if let Err(e) = bound.end().await {
                warn!("⚠️ 结束自然语言会话 {} 失败 (忽略): {}", session_id, e);
            }
        }
        self.manager.close_session(session_id).await;
    }
}

/// 从自然语言回答里解析分数
///
/// 优先找 JSON 对象；找不到再用正则从文字里捞百分比
fn parse_agent_scores(answer: &str) -> Scores {
    // 尝试 JSON 对象
    if let (Some(start), Some(end)) = (answer.find('{'), answer.rfind('}')) {
        if start < end {
            if let Ok(value) = serde_json::from_str::<JsonValue>(&answer[start..=end]) {
                let ai = value.get("aiDetectionPercent").and_then(|v| v.as_f64());
                let plag = value.get("plagiarismPercent").and_then(|v| v.as_f64());
                if ai.is_some() || plag.is_some() {
                    return Scores {
                        ai_detection_percent: ai,
                        plagiarism_percent: plag,
                        notes: value
                            .get("notes")
                            .and_then(|v| v.as_str())
                            .unwrap_or_default()
                            .to_string(),
                    };
                }
            }
        }
    }

    // 正则兜底
    let ai = capture_percent(answer, r"(?i)AI[^0-9%]{0,30}(\d+(?:\.\d+)?)\s*%");
    let plag = capture_percent(answer, r"(?i)(?:plagiarism|抄袭)[^0-9%]{0,30}(\d+(?:\.\d+)?)\s*%");

    if ai.is_none() && plag.is_none() {
        warn!("⚠️ 无法从回答中解析任何分数");
    }

    Scores {
        ai_detection_percent: ai,
        plagiarism_percent: plag,
        notes: String::new(),
    }
}

fn capture_percent(text: &str, pattern: &str) -> Option<f64> {
    let re = Regex::new(pattern).ok()?;
    re.captures(text)?.get(1)?.as_str().parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_agent_scores_json_answer() {
        let answer = r#"检测完成。{"aiDetectionPercent": 23.5, "plagiarismPercent": null, "notes": "面板显示高风险"}"#;
        let scores = parse_agent_scores(answer);
        assert_eq!(scores.ai_detection_percent, Some(23.5));
        assert_eq!(scores.plagiarism_percent, None);
        assert_eq!(scores.notes, "面板显示高风险");
    }

    #[test]
    fn test_parse_agent_scores_prose_answer() {
        let answer = "检测面板显示 AI 检测率为 42%，plagiarism score is 3.5 %。";
        let scores = parse_agent_scores(answer);
        assert_eq!(scores.ai_detection_percent, Some(42.0));
        assert_eq!(scores.plagiarism_percent, Some(3.5));
    }

    #[test]
    fn test_parse_agent_scores_unparseable() {
        let scores = parse_agent_scores("页面打不开");
        assert!(scores.ai_detection_percent.is_none());
        assert!(scores.plagiarism_percent.is_none());
    }
}
