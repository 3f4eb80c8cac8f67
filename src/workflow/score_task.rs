//! 打分任务 - 流程层
//!
//! 核心职责：定义"一次打分"的完整执行流程
//!
//! 流程顺序：
//! 1. 导航（不在目标应用时）
//! 2. 认证检查（未登录直接短路）
//! 3. 新建文档 → 4. 输入文本 → 5. 打开检测面板 → 6. 提取分数
//!
//! 每个决策点都是"观察命中走直接路径、落空走自然语言兜底"的
//! 两态结构；清理是独立入口，不在打分路径上

use anyhow::Result;
use regex::Regex;
use serde_json::{json, Value as JsonValue};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{AppError, AutomationError};
use crate::infrastructure::{BoundSession, PageDriver};
use crate::models::scores::Scores;
use crate::workflow::task_ctx::TaskCtx;

/// 短文本上限：不超过该长度走自然语言输入
pub const SHORT_TEXT_LIMIT: usize = 500;

/// 输入硬上限：超过该长度一律截断（与长短分流无关的安全界）
pub const MAX_TEXT_LEN: usize = 8000;

/// 目标应用的文档编辑面定位
const EDITOR_SELECTOR: &str = "[contenteditable=\"true\"]";

/// 打分任务
///
/// - 编排单次打分的完整流程
/// - 决定何时导航、何时兜底、何时短路
/// - 不持有任何资源（page / 会话）
/// - 只依赖基础设施能力（driver / automation）
pub struct ScoreTask {
    target_url: String,
    settle_timeout_secs: u64,
}

impl ScoreTask {
    /// 创建新的打分任务
    pub fn new(config: &Config) -> Self {
        Self {
            target_url: config.target_app_url.clone(),
            settle_timeout_secs: 30,
        }
    }

    /// 执行一次打分
    pub async fn run(
        &self,
        driver: &PageDriver,
        automation: &BoundSession,
        text: &str,
        ctx: &TaskCtx,
    ) -> Result<Scores> {
        info!("{} 开始打分，文本 {} 字符", ctx, text.chars().count());

        // ========== 步骤 1: 导航 ==========
        self.ensure_on_target(driver, ctx).await?;

        // ========== 步骤 2: 认证检查 ==========
        // 未登录是吸收态：直接短路后面的所有步骤
        self.check_authenticated(driver, automation, ctx).await?;

        // ========== 步骤 3: 新建文档 ==========
        info!("{} 📄 正在新建文档...", ctx);
        self.observe_then_act(
            automation,
            ctx,
            "找出新建文档的入口按钮，例如 New document 或加号按钮",
            "点击新建一个空白文档",
        )
        .await?;

        // ========== 步骤 4: 输入文本 ==========
        self.input_text(driver, automation, text, ctx).await?;

        // ========== 步骤 5: 打开检测面板 ==========
        info!("{} 🔍 正在打开检测面板...", ctx);
        self.observe_then_act(
            automation,
            ctx,
            "找出打开原创性/AI检测面板的入口，例如 Plagiarism 或 AI detection 按钮",
            "打开文档的原创性与AI检测面板",
        )
        .await?;

        // ========== 步骤 6: 提取分数 ==========
        let scores = self.extract_scores(automation, ctx).await?;
        info!("{} ✓ 提取完成: {}", ctx, scores);

        Ok(scores.normalized())
    }

    /// 清理本次创建的文档
    ///
    /// 独立入口，不在打分路径上；任何失败都吞掉，清理从不抛出
    pub async fn cleanup(&self, automation: &BoundSession, ctx: &TaskCtx) {
        info!("{} 🗑️ 清理本次创建的文档...", ctx);
        let result = self
            .observe_then_act(
                automation,
                ctx,
                "找出删除当前文档或把它移入回收站的入口",
                "删除当前文档，如果出现确认弹窗则确认删除",
            )
            .await;
        match result {
            Ok(()) => info!("{} ✓ 文档已清理", ctx),
            Err(e) => warn!("{} ⚠️ 清理文档失败 (忽略): {}", ctx, e),
        }
    }

    // ========== 各决策点 ==========

    /// 不在目标应用时导航过去
    async fn ensure_on_target(&self, driver: &PageDriver, ctx: &TaskCtx) -> Result<()> {
        let current = driver.current_url().await.unwrap_or_default();
        if is_on_host(&current, &self.target_url) {
            debug!("{} 已在目标应用: {}", ctx, current);
            return Ok(());
        }

        info!("{} 正在导航到目标应用...", ctx);
        driver
            .goto_settled(&self.target_url, self.settle_timeout_secs)
            .await
            .map_err(|e| {
                AppError::Automation(AutomationError::NavigationFailed {
                    url: self.target_url.clone(),
                    source: e.into(),
                })
            })?;
        Ok(())
    }

    /// 认证检查
    ///
    /// URL 命中未登录路径直接判定未登录；否则观察已登录标志，
    /// 观察为空或观察出错都按未登录处理（宁可误判也不在游客
    /// 会话上继续操作）
    async fn check_authenticated(
        &self,
        driver: &PageDriver,
        automation: &BoundSession,
        ctx: &TaskCtx,
    ) -> Result<()> {
        let url = driver.current_url().await.unwrap_or_default();
        if is_signed_out_path(&url) {
            warn!("{} ⚠️ 当前在登录/注册页面，判定未登录: {}", ctx, url);
            return Err(AppError::authentication_required(ctx.debug_url.clone()).into());
        }

        match automation
            .observe("找出表明用户已登录的元素，例如用户头像、账户菜单或文档列表")
            .await
        {
            Ok(elements) if !elements.is_empty() => {
                info!("{} ✓ 检测到已登录", ctx);
                Ok(())
            }
            Ok(_) => {
                warn!("{} ⚠️ 未发现已登录标志，判定未登录", ctx);
                Err(AppError::authentication_required(ctx.debug_url.clone()).into())
            }
            Err(e) => {
                warn!("{} ⚠️ 登录标志观察失败，按未登录处理: {}", ctx, e);
                Err(AppError::authentication_required(ctx.debug_url.clone()).into())
            }
        }
    }

    /// 观察-执行兜底助手
    ///
    /// 观察命中且元素可定位时直接按描述符执行（跳过按描述重新
    /// 定位）；观察为空、元素定位为空或执行失败时，改发自然语言
    /// 兜底指令
    async fn observe_then_act(
        &self,
        automation: &BoundSession,
        ctx: &TaskCtx,
        observe_instruction: &str,
        fallback_instruction: &str,
    ) -> Result<()> {
        match automation.observe(observe_instruction).await {
            Ok(elements) => {
                if let Some(element) = elements.iter().find(|e| e.is_actionable()) {
                    debug!("{} 观察命中: {}", ctx, element.description);
                    match automation.act_element(element).await {
                        Ok(()) => return Ok(()),
                        Err(e) => {
                            warn!("{} 直接执行失败，走自然语言兜底: {}", ctx, e);
                        }
                    }
                } else {
                    debug!("{} 观察结果为空，走自然语言兜底", ctx);
                }
            }
            Err(e) => {
                warn!("{} 观察失败，走自然语言兜底: {}", ctx, e);
            }
        }

        automation
            .act_instruction(fallback_instruction)
            .await
            .map_err(|e| {
                AppError::Automation(AutomationError::ActFailed {
                    source: Box::new(e),
                })
                .into()
            })
    }

    /// 输入文本
    ///
    /// 先套硬上限截断；短文本走自然语言输入，长文本直接写入
    /// 编辑面（自然语言路径在长文本下又慢又不可靠）
    async fn input_text(
        &self,
        driver: &PageDriver,
        automation: &BoundSession,
        text: &str,
        ctx: &TaskCtx,
    ) -> Result<()> {
        let text = truncate_for_input(text);

        if uses_direct_type(&text) {
            info!("{} ⌨️ 短文本，走自然语言输入 ({} 字符)", ctx, text.chars().count());
            automation
                .act_instruction(&format!("在文档编辑区输入以下文本：{}", text))
                .await
                .map_err(|e| {
                    AppError::Automation(AutomationError::ActFailed {
                        source: Box::new(e),
                    })
                })?;
        } else {
            info!("{} 📝 长文本，直接写入编辑面 ({} 字符)", ctx, text.chars().count());
            driver.fill_editor(EDITOR_SELECTOR, &text).await?;
        }
        Ok(())
    }

    /// 提取分数
    ///
    /// 完整 schema 提取失败时做一次降级提取；降级也失败就重新
    /// 抛出原始错误（原始错误的信息更有诊断价值）；降级成功时在
    /// notes 里注明发生了部分提取
    async fn extract_scores(&self, automation: &BoundSession, ctx: &TaskCtx) -> Result<Scores> {
        let instruction =
            "从检测面板中提取 AI 检测率和抄袭率（0-100 的百分比数值），以及面板上的说明文字";

        let primary = match automation.extract(instruction, &full_schema()).await {
            Ok(data) => return Ok(scores_from_value(&data)),
            Err(e) => e,
        };

        warn!("{} ⚠️ 完整提取失败，尝试一次降级提取: {}", ctx, primary);

        match automation
            .extract("只提取 AI 检测率（0-100 的百分比数值）", &reduced_schema())
            .await
        {
            Ok(data) => {
                let mut scores = scores_from_value(&data);
                if !scores.notes.is_empty() {
                    scores.notes.push_str("; ");
                }
                scores.notes.push_str("部分提取：完整提取失败后降级成功");
                Ok(scores)
            }
            Err(fallback) => {
                warn!("{} ⚠️ 降级提取也失败: {}", ctx, fallback);
                Err(AppError::Automation(AutomationError::ExtractFailed {
                    instruction: instruction.to_string(),
                    source: Box::new(primary),
                })
                .into())
            }
        }
    }
}

// ========== 纯函数助手 ==========

/// 超过硬上限的文本截断到上限
fn truncate_for_input(text: &str) -> String {
    let count = text.chars().count();
    if count > MAX_TEXT_LEN {
        warn!("⚠️ 文本 {} 字符超过上限，截断到 {} 字符", count, MAX_TEXT_LEN);
        text.chars().take(MAX_TEXT_LEN).collect()
    } else {
        text.to_string()
    }
}

/// 是否走自然语言输入路径
fn uses_direct_type(text: &str) -> bool {
    text.chars().count() <= SHORT_TEXT_LIMIT
}

/// URL 是否命中未登录路径（登录/注册页）
fn is_signed_out_path(url: &str) -> bool {
    match Regex::new(r"(?i)/(sign-?in|log-?in|sign-?up)([/?#]|$)") {
        Ok(re) => re.is_match(url),
        Err(_) => false,
    }
}

/// URL 是否已在目标应用的域上
fn is_on_host(url: &str, target_url: &str) -> bool {
    match host_of(target_url) {
        Some(host) => host_of(url).map(|h| h == host).unwrap_or(false),
        None => false,
    }
}

/// 从 URL 中取出主机名（不引入额外的 URL 解析依赖）
fn host_of(url: &str) -> Option<&str> {
    let rest = url.split("://").nth(1)?;
    let host = rest.split(['/', '?', '#']).next()?;
    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}

/// 完整提取 schema
fn full_schema() -> JsonValue {
    json!({
        "type": "object",
        "properties": {
            "aiDetectionPercent": { "type": ["number", "null"], "description": "AI 检测率，0-100" },
            "plagiarismPercent": { "type": ["number", "null"], "description": "抄袭率，0-100" },
            "overallScore": { "type": ["number", "null"], "description": "总体评分（如有）" },
            "notes": { "type": "string", "description": "面板上的说明文字" }
        },
        "required": ["notes"]
    })
}

/// 降级提取 schema（只要 AI 检测率）
fn reduced_schema() -> JsonValue {
    json!({
        "type": "object",
        "properties": {
            "aiDetectionPercent": { "type": ["number", "null"] },
            "notes": { "type": "string" }
        }
    })
}

/// 把提取结果转成分数
///
/// 数值字段偶尔会以 "12%" 这样的字符串出现，做一层解析兜底
fn scores_from_value(data: &JsonValue) -> Scores {
    Scores {
        ai_detection_percent: percent_from_value(data.get("aiDetectionPercent")),
        plagiarism_percent: percent_from_value(data.get("plagiarismPercent")),
        notes: data
            .get("notes")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
    }
}

fn percent_from_value(value: Option<&JsonValue>) -> Option<f64> {
    let value = value?;
    if let Some(n) = value.as_f64() {
        return Some(n);
    }
    let s = value.as_str()?;
    let re = Regex::new(r"(\d+(?:\.\d+)?)").ok()?;
    re.captures(s)?
        .get(1)?
        .as_str()
        .parse::<f64>()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_out_path_detection() {
        assert!(is_signed_out_path("https://app.example.com/signin"));
        assert!(is_signed_out_path("https://app.example.com/sign-in?next=/docs"));
        assert!(is_signed_out_path("https://app.example.com/login"));
        assert!(is_signed_out_path("https://app.example.com/signup/"));

        assert!(!is_signed_out_path("https://app.example.com/docs"));
        // 路径里恰好包含 login 字样但不是登录页
        assert!(!is_signed_out_path("https://example.com/blog/why-login-matters"));
    }

    #[test]
    fn test_host_matching() {
        assert!(is_on_host(
            "https://app.example.com/docs/123",
            "https://app.example.com"
        ));
        assert!(!is_on_host(
            "https://other.example.com/",
            "https://app.example.com"
        ));
        assert!(!is_on_host("about:blank", "https://app.example.com"));
    }

    #[test]
    fn test_type_path_boundary() {
        // 恰好 500 字符走自然语言输入
        let text_500: String = "a".repeat(500);
        assert!(uses_direct_type(&text_500));

        // 501 字符走直接填充
        let text_501: String = "a".repeat(501);
        assert!(!uses_direct_type(&text_501));
    }

    #[test]
    fn test_truncation_cap() {
        let text_9000: String = "字".repeat(9000);
        let truncated = truncate_for_input(&text_9000);
        assert_eq!(truncated.chars().count(), 8000);

        // 恰好 8000 字符不截断
        let text_8000: String = "a".repeat(8000);
        assert_eq!(truncate_for_input(&text_8000).chars().count(), 8000);
    }

    #[test]
    fn test_truncated_long_text_takes_fill_path() {
        // 截断发生在长短分流之前：9000 字符截到 8000 后仍走填充路径
        let text_9000: String = "a".repeat(9000);
        let truncated = truncate_for_input(&text_9000);
        assert!(!uses_direct_type(&truncated));
    }

    #[test]
    fn test_scores_from_numeric_value() {
        let data = json!({
            "aiDetectionPercent": 15.5,
            "plagiarismPercent": null,
            "notes": "检测完成"
        });
        let scores = scores_from_value(&data);
        assert_eq!(scores.ai_detection_percent, Some(15.5));
        assert_eq!(scores.plagiarism_percent, None);
        assert_eq!(scores.notes, "检测完成");
    }

    #[test]
    fn test_scores_from_string_percent() {
        let data = json!({
            "aiDetectionPercent": "12%",
            "plagiarismPercent": "3.5 %",
            "notes": ""
        });
        let scores = scores_from_value(&data);
        assert_eq!(scores.ai_detection_percent, Some(12.0));
        assert_eq!(scores.plagiarism_percent, Some(3.5));
    }

    #[test]
    fn test_scores_missing_fields_are_none() {
        let scores = scores_from_value(&json!({}));
        assert!(scores.ai_detection_percent.is_none());
        assert!(scores.plagiarism_percent.is_none());
        assert!(scores.notes.is_empty());
    }
}
