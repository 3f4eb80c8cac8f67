//! 改写服务 - 业务能力层
//!
//! 只负责"改写 / 分析 / 总结"三个 LLM 能力，不关心流程
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 支持自定义 API 端点和模型
//! - 兼容 OpenAI API 的服务

use anyhow::Result;
use async_trait::async_trait;
use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use regex::Regex;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::config::Config;
use crate::models::scores::{IterationRecord, Scores, Thresholds};

/// 改写结果
#[derive(Debug, Clone)]
pub struct RewriteOutput {
    pub rewritten_text: String,
    pub reasoning: String,
}

/// 文本润色能力
///
/// 优化循环只依赖这个接口，不关心背后是哪家模型
#[async_trait]
pub trait Refiner: Send + Sync {
    /// 改写一轮文本
    async fn rewrite(
        &self,
        original_text: &str,
        last_scores: &Scores,
        thresholds: &Thresholds,
        tone: &str,
        domain_hint: Option<&str>,
        custom_instructions: Option<&str>,
    ) -> Result<RewriteOutput>;

    /// 对基线文本和分数做只读分析
    async fn analyze(&self, text: &str, scores: &Scores, thresholds: &Thresholds)
        -> Result<String>;

    /// 对整个优化历史做最终总结
    async fn summarize(&self, history: &[IterationRecord], final_text: &str) -> Result<String>;
}

/// 改写服务
///
/// 职责：
/// - 调用 LLM API 做文本改写、基线分析、历史总结
/// - 只处理单次调用的输入输出
/// - 不出现会话ID
/// - 不关心迭代顺序
pub struct RewriteService {
    client: Client<OpenAIConfig>,
    model_name: String,
}

impl RewriteService {
    /// 创建新的改写服务
    pub fn new(config: &Config) -> Self {
        // 配置 OpenAI 客户端（兼容 OpenAI API 的服务）
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        let client = Client::with_config(openai_config);

        Self {
            client,
            model_name: config.llm_model_name.clone(),
        }
    }

    /// 通用的 LLM 调用函数
    ///
    /// 这是最基础的 LLM 调用接口，改写 / 分析 / 总结都基于此函数
    pub async fn send_to_llm(
        &self,
        user_message: &str,
        system_message: Option<&str>,
        max_tokens: u32,
    ) -> Result<String> {
        debug!("调用 LLM API，模型: {}", self.model_name);
        debug!("用户消息长度: {} 字符", user_message.len());

        // 构建消息列表
        let mut messages = Vec::new();

        if let Some(sys_msg) = system_message {
            let system_msg = ChatCompletionRequestSystemMessageArgs::default()
                .content(sys_msg)
                .build()?;
            messages.push(ChatCompletionRequestMessage::System(system_msg));
        }

        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(user_message)
            .build()?;
        messages.push(ChatCompletionRequestMessage::User(user_msg));

        // 构建请求
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(messages)
            .temperature(0.7)
            .max_tokens(max_tokens)
            .build()?;

        // 调用 API
        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!("LLM API 调用失败: {}", e);
            anyhow::anyhow!("LLM API 调用失败: {}", e)
        })?;

        debug!("LLM API 调用成功");

        // 提取响应内容
        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| anyhow::anyhow!("LLM 返回内容为空"))?;

        Ok(content.trim().to_string())
    }

}

#[async_trait]
impl Refiner for RewriteService {
    /// 改写一轮文本
    ///
    /// 以当前文本和最近一次分数为种子，产出降低检测率的新文本
    async fn rewrite(
        &self,
        original_text: &str,
        last_scores: &Scores,
        thresholds: &Thresholds,
        tone: &str,
        domain_hint: Option<&str>,
        custom_instructions: Option<&str>,
    ) -> Result<RewriteOutput> {
        let (user_message, system_message) = build_rewrite_messages(
            original_text,
            last_scores,
            thresholds,
            tone,
            domain_hint,
            custom_instructions,
        );

        let response = self
            .send_to_llm(&user_message, Some(&system_message), 4096)
            .await?;

        Ok(parse_rewrite_response(&response))
    }

    /// 对基线文本和分数做只读分析
    ///
    /// 不改变文本，返回给调用方的建议文字
    async fn analyze(
        &self,
        text: &str,
        scores: &Scores,
        thresholds: &Thresholds,
    ) -> Result<String> {
        let system_message = "你是一个写作质量分析师。根据检测分数指出文本最可能被判定为\
                              AI生成或抄袭的段落特征，并给出具体的改进建议。直接输出分析文字。";
        let user_message = format!(
            "当前检测结果：{}\n目标：AI检测率 ≤ {}%，抄袭率 ≤ {}%\n\n待分析文本：\n{}",
            scores, thresholds.max_ai_percent, thresholds.max_plagiarism_percent, text
        );

        self.send_to_llm(&user_message, Some(system_message), 1024)
            .await
    }

    /// 对整个优化历史做最终总结
    async fn summarize(&self, history: &[IterationRecord], final_text: &str) -> Result<String> {
        let mut lines = Vec::new();
        for record in history {
            let label = if record.iteration == 0 {
                "基线".to_string()
            } else {
                format!("迭代 {}", record.iteration)
            };
            lines.push(format!(
                "{}: {} (文本 {} 字符)",
                label, record.scores, record.text_chars
            ));
        }

        let system_message = "你是一个简洁的助手。用两三句话总结这次文本优化过程：\
                              分数如何变化、最终是否达标。直接输出总结文字。";
        let user_message = format!(
            "优化历史：\n{}\n\n最终文本长度：{} 字符",
            lines.join("\n"),
            final_text.chars().count()
        );

        self.send_to_llm(&user_message, Some(system_message), 512)
            .await
    }
}

/// 构建改写消息
///
/// 返回 (user_message, system_message)
fn build_rewrite_messages(
    original_text: &str,
    last_scores: &Scores,
    thresholds: &Thresholds,
    tone: &str,
    domain_hint: Option<&str>,
    custom_instructions: Option<&str>,
) -> (String, String) {
    let system_message = "你是一个专业的文本改写助手，擅长在保持原意和信息完整的前提下，\
                          让文本读起来更自然、更有人味。\
                          只返回一个 JSON 对象：{\"rewritten_text\": \"...\", \"reasoning\": \"...\"}，\
                          不要返回任何其他内容。"
        .to_string();

    let mut constraints = vec![format!(
        "目标：AI检测率降到 {}% 以下，抄袭率降到 {}% 以下",
        thresholds.max_ai_percent, thresholds.max_plagiarism_percent
    )];
    constraints.push(format!("语气：{}", tone));
    if let Some(hint) = domain_hint {
        constraints.push(format!("领域背景：{}", hint));
    }
    if let Some(extra) = custom_instructions {
        constraints.push(format!("额外要求：{}", extra));
    }

    let user_message = format!(
        r#"请改写下面的文本。

最近一次检测结果：{}

改写要求：
{}

【注意】
- 保持原文的事实、结构和大致长度
- 变化句式节奏和用词习惯，避免规整统一的表达
- 不要添加原文没有的信息

待改写文本：
{}"#,
        last_scores,
        constraints
            .iter()
            .map(|c| format!("- {}", c))
            .collect::<Vec<_>>()
            .join("\n"),
        original_text
    );

    (user_message, system_message)
}

/// 解析改写响应
///
/// 期望 JSON 对象；模型偶尔会包一层代码块或者直接给纯文本，
/// 逐级兜底，最差情况把整个响应当作改写结果
fn parse_rewrite_response(response: &str) -> RewriteOutput {
    let trimmed = response.trim();

    // 尝试直接解析 JSON
    if let Some(output) = try_parse_rewrite_json(trimmed) {
        return output;
    }

    // 尝试剥掉代码块围栏后解析
    if let Ok(fence) = Regex::new(r"(?s)```(?:json)?\s*(\{.*\})\s*```") {
        if let Some(captures) = fence.captures(trimmed) {
            let candidate = captures.get(1).map(|m| m.as_str()).unwrap_or("");
            if let Some(output) = try_parse_rewrite_json(candidate) {
                return output;
            }
        }
    }

    // 尝试截取首尾大括号之间的片段
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            if let Some(output) = try_parse_rewrite_json(&trimmed[start..=end]) {
                return output;
            }
        }
    }

    // 无法解析，整个响应按改写结果处理
    warn!("无法按 JSON 解析改写响应，按纯文本处理");
    RewriteOutput {
        rewritten_text: trimmed.to_string(),
        reasoning: String::new(),
    }
}

fn try_parse_rewrite_json(candidate: &str) -> Option<RewriteOutput> {
    let value: JsonValue = serde_json::from_str(candidate).ok()?;
    let rewritten = value.get("rewritten_text")?.as_str()?;
    if rewritten.trim().is_empty() {
        return None;
    }
    let reasoning = value
        .get("reasoning")
        .and_then(|v| v.as_str())
        .unwrap_or_default();
    Some(RewriteOutput {
        rewritten_text: rewritten.to_string(),
        reasoning: reasoning.to_string(),
    })
}
