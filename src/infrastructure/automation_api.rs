//! 自动化接口客户端 - 基础设施层
//!
//! 封装远程 observe / act / extract 能力。接口按会话维度工作：
//! 先把一个远程浏览器会话绑定成自动化会话，之后所有调用都发往
//! `/sessions/{id}/{method}`。每次调用都套统一的超时上限。

use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::config::Config;

/// 自动化接口错误
#[derive(Debug, Error)]
pub enum AutomationApiError {
    #[error("自动化接口请求失败: {0}")]
    Http(String),
    #[error("自动化接口返回错误 (HTTP {status}): {message}")]
    Api { status: u16, message: String },
    #[error("自动化调用超时 ({0} 秒)")]
    Timeout(u64),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// 观察到的元素描述符
///
/// observe 返回的定位结果，可以直接作为 act 的输入（跳过按描述
/// 重新定位）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservedElement {
    #[serde(default)]
    pub selector: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Vec<String>>,
}

impl ObservedElement {
    /// 元素是否可以直接执行动作
    ///
    /// 偶尔 observe 返回的元素定位为空，这种元素不能直接执行，
    /// 必须走自然语言兜底
    pub fn is_actionable(&self) -> bool {
        !self.selector.trim().is_empty()
    }
}

/// 自动化接口客户端
#[derive(Clone)]
pub struct AutomationApi {
    http: HttpClient,
    base_url: String,
    api_key: String,
    project_id: String,
    model_name: String,
    timeout_secs: u64,
}

impl AutomationApi {
    /// 从全局配置创建客户端
    pub fn new(config: &Config) -> Self {
        Self {
            http: HttpClient::new(),
            base_url: config
                .automation_api_base_url
                .trim_end_matches('/')
                .to_string(),
            api_key: config.session_api_key.clone(),
            project_id: config.session_project_id.clone(),
            model_name: config.automation_model_name.clone(),
            timeout_secs: config.task_timeout_secs,
        }
    }

    /// 把远程浏览器会话绑定为自动化会话
    pub async fn bind(
        &self,
        browser_session_id: &str,
    ) -> Result<BoundSession, AutomationApiError> {
        let payload = json!({
            "modelName": self.model_name,
            "browserbaseSessionId": browser_session_id,
        });
        let body = self.post("sessions/start", &payload).await?;
        let session_id = body
            .pointer("/data/sessionId")
            .and_then(|v| v.as_str())
            .unwrap_or(browser_session_id)
            .to_string();

        debug!("自动化会话已绑定: {}", session_id);
        Ok(BoundSession {
            api: self.clone(),
            session_id,
        })
    }

    /// 发送请求并套统一超时
    async fn post(
        &self,
        path: &str,
        payload: &JsonValue,
    ) -> Result<JsonValue, AutomationApiError> {
        let url = format!("{}/{}", self.base_url, path);
        let request = self
            .http
            .post(&url)
            .header("x-bb-api-key", &self.api_key)
            .header("x-bb-project-id", &self.project_id)
            .json(payload)
            .send();

        let response = tokio::time::timeout(Duration::from_secs(self.timeout_secs), request)
            .await
            .map_err(|_| AutomationApiError::Timeout(self.timeout_secs))?
            .map_err(|e| AutomationApiError::Http(e.to_string()))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| AutomationApiError::Http(e.to_string()))?;

        if status != 200 {
            return Err(AutomationApiError::Api {
                status,
                message: text,
            });
        }

        let body: JsonValue = serde_json::from_str(&text)?;
        if body.get("success").and_then(|v| v.as_bool()) == Some(false) {
            let message = body
                .get("message")
                .and_then(|v| v.as_str())
                .unwrap_or("未知错误")
                .to_string();
            return Err(AutomationApiError::Api { status, message });
        }
        Ok(body)
    }
}

/// 绑定到具体会话的自动化句柄
#[derive(Clone)]
pub struct BoundSession {
    api: AutomationApi,
    session_id: String,
}

impl BoundSession {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// 按自然语言描述观察页面元素
    ///
    /// 返回可能为空的元素描述符列表
    pub async fn observe(
        &self,
        instruction: &str,
    ) -> Result<Vec<ObservedElement>, AutomationApiError> {
        debug!("observe: {}", instruction);
        let payload = json!({ "instruction": instruction });
        let body = self.execute("observe", &payload).await?;
        Ok(parse_elements(&body))
    }

    /// 对已观察到的元素直接执行动作
    pub async fn act_element(&self, element: &ObservedElement) -> Result<(), AutomationApiError> {
        debug!("act(element): {}", element.description);
        let payload = serde_json::to_value(element)?;
        self.execute("act", &payload).await?;
        Ok(())
    }

    /// 按自然语言指令执行动作（兜底路径）
    pub async fn act_instruction(&self, instruction: &str) -> Result<(), AutomationApiError> {
        debug!("act(instruction): {}", instruction);
        let payload = json!({ "action": instruction });
        self.execute("act", &payload).await?;
        Ok(())
    }

    /// 按固定 schema 做结构化提取
    pub async fn extract(
        &self,
        instruction: &str,
        schema: &JsonValue,
    ) -> Result<JsonValue, AutomationApiError> {
        debug!("extract: {}", instruction);
        let payload = json!({
            "instruction": instruction,
            "schemaDefinition": schema,
        });
        let body = self.execute("extract", &payload).await?;
        Ok(extract_data(body))
    }

    /// 把一整段任务交给自然语言执行后端
    ///
    /// 返回执行结果的文本描述
    pub async fn agent_execute(
        &self,
        instruction: &str,
        max_steps: u32,
    ) -> Result<String, AutomationApiError> {
        debug!("agent: {} (最多 {} 步)", instruction, max_steps);
        let payload = json!({
            "instruction": instruction,
            "maxSteps": max_steps,
        });
        let body = self.execute("agent", &payload).await?;
        let result = body
            .pointer("/data/result")
            .or_else(|| body.get("result"))
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        Ok(result)
    }

    /// 结束自动化会话（远程浏览器会话由会话管理器单独释放）
    pub async fn end(&self) -> Result<(), AutomationApiError> {
        self.execute("end", &json!({})).await?;
        Ok(())
    }

    async fn execute(
        &self,
        method: &str,
        payload: &JsonValue,
    ) -> Result<JsonValue, AutomationApiError> {
        self.api
            .post(&format!("sessions/{}/{}", self.session_id, method), payload)
            .await
    }
}

/// 从 observe 响应中取出元素列表
///
/// 字段缺失按空列表处理（observe 允许返回空）
fn parse_elements(body: &JsonValue) -> Vec<ObservedElement> {
    let raw = body
        .pointer("/data/elements")
        .or_else(|| body.get("elements"))
        .cloned()
        .unwrap_or(JsonValue::Array(vec![]));
    serde_json::from_value(raw).unwrap_or_default()
}

/// 从 extract 响应中取出数据体
fn extract_data(body: JsonValue) -> JsonValue {
    body.pointer("/data")
        .cloned()
        .unwrap_or(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_elements_nested_and_flat() {
        let nested = json!({
            "success": true,
            "data": { "elements": [
                { "selector": "#new-doc", "description": "新建文档按钮" }
            ]}
        });
        let elements = parse_elements(&nested);
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].selector, "#new-doc");

        let flat = json!({ "elements": [] });
        assert!(parse_elements(&flat).is_empty());
    }

    #[test]
    fn test_parse_elements_missing_field_is_empty() {
        let body = json!({ "success": true });
        assert!(parse_elements(&body).is_empty());
    }

    #[test]
    fn test_extract_data_unwraps_envelope() {
        let body = json!({ "success": true, "data": { "aiDetectionPercent": 15.0 } });
        let data = extract_data(body);
        assert_eq!(data["aiDetectionPercent"], 15.0);

        // 没有信封时原样返回
        let bare = json!({ "aiDetectionPercent": 8.0 });
        assert_eq!(extract_data(bare.clone()), bare);
    }

    #[test]
    fn test_empty_selector_is_not_actionable() {
        let element = ObservedElement {
            selector: "  ".to_string(),
            description: "空定位".to_string(),
            method: None,
            arguments: None,
        };
        assert!(!element.is_actionable());

        let element = ObservedElement {
            selector: "#editor".to_string(),
            description: String::new(),
            method: None,
            arguments: None,
        };
        assert!(element.is_actionable());
    }
}
