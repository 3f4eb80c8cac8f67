//! 页面驱动 - 基础设施层
//!
//! 持有唯一的 page 资源，只暴露页面级能力：执行 JS、导航、
//! 读取 URL、直接填充编辑器

use anyhow::Result;
use chromiumoxide::Page;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::{debug, warn};

/// 页面驱动
///
/// 职责：
/// - 持有唯一的 Page 资源
/// - 暴露 eval / goto / url / fill 能力
/// - 不认识分数和文档
/// - 不处理业务流程
pub struct PageDriver {
    page: Page,
}

impl PageDriver {
    /// 创建新的页面驱动
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    /// 获取 page 的引用（用于其他操作）
    pub fn page(&self) -> &Page {
        &self.page
    }

    /// 执行 JS 代码并返回 JSON 结果
    pub async fn eval(&self, js_code: impl Into<String>) -> Result<JsonValue> {
        let result = self.page.evaluate(js_code.into()).await?;
        let json_value = result.into_value()?;
        Ok(json_value)
    }

    /// 执行 JS 代码并反序列化为指定类型
    pub async fn eval_as<T: DeserializeOwned>(&self, js_code: impl Into<String>) -> Result<T> {
        let json_value = self.eval(js_code).await?;
        let typed_value = serde_json::from_value(json_value)?;
        Ok(typed_value)
    }

    /// 读取当前页面 URL
    pub async fn current_url(&self) -> Result<String> {
        let url = self
            .page
            .url()
            .await?
            .ok_or_else(|| anyhow::anyhow!("页面没有 URL"))?;
        Ok(url)
    }

    /// 导航并等待网络平稳
    ///
    /// 等待超时只记录不中断，慢网络不应该打断一个本来能工作的流程
    pub async fn goto_settled(&self, url: &str, settle_timeout_secs: u64) -> Result<()> {
        debug!("正在导航到: {}", url);
        self.page.goto(url).await?;

        match tokio::time::timeout(
            Duration::from_secs(settle_timeout_secs),
            self.page.wait_for_navigation(),
        )
        .await
        {
            Ok(Ok(_)) => debug!("页面导航完成，网络已平稳"),
            Ok(Err(e)) => warn!("⚠️ 等待导航完成出错 (继续执行): {}", e),
            Err(_) => warn!(
                "⚠️ 等待网络平稳超时 ({} 秒)，继续执行",
                settle_timeout_secs
            ),
        }
        Ok(())
    }

    /// 把文本直接写入 contenteditable 编辑面
    ///
    /// 长文本走自然语言输入路径既慢又不可靠，直接设置编辑器内容
    /// 并派发 input 事件让前端框架感知变更
    pub async fn fill_editor(&self, selector: &str, text: &str) -> Result<()> {
        let js_code = format!(
            r#"
            (() => {{
                try {{
                    const el = document.querySelector({selector});
                    if (!el) {{
                        return {{ ok: false, error: "editor not found" }};
                    }}
                    el.focus();
                    if (el.isContentEditable) {{
                        el.innerText = {text};
                    }} else {{
                        el.value = {text};
                    }}
                    el.dispatchEvent(new InputEvent('input', {{ bubbles: true }}));
                    return {{ ok: true }};
                }} catch (error) {{
                    return {{ ok: false, error: error.message }};
                }}
            }})()
            "#,
            selector = serde_json::to_string(selector)?,
            text = serde_json::to_string(text)?,
        );

        let result = self.eval(js_code).await?;
        if result.get("ok").and_then(|v| v.as_bool()) != Some(true) {
            let reason = result
                .get("error")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown");
            anyhow::bail!("直接填充编辑器失败: {}", reason);
        }
        Ok(())
    }
}
