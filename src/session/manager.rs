//! 会话管理器 - 会话层
//!
//! 持有远程浏览器会话和持久化登录上下文的生命周期：
//! 创建、探活、复用、释放。每个管理器实例最多缓存一个
//! "当前会话"和一个"当前上下文"。

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{AppError, SessionError};
use crate::session::proxy::{build_proxy_payload, ProxySettings};

/// 会话 API 的原始响应
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

/// 会话 API 传输层
///
/// 抽出传输层是为了让缓存语义可以在没有真实后端的情况下测试
#[async_trait]
pub trait SessionHttp: Send + Sync {
    async fn get_json(&self, url: &str) -> anyhow::Result<ApiResponse>;
    async fn post_json(&self, url: &str, body: &JsonValue) -> anyhow::Result<ApiResponse>;
}

/// 基于 reqwest 的默认传输层
pub struct ReqwestSessionHttp {
    client: HttpClient,
    api_key: String,
}

impl ReqwestSessionHttp {
    pub fn new(api_key: impl Into<String>) -> Self {
        let client = HttpClient::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl SessionHttp for ReqwestSessionHttp {
    async fn get_json(&self, url: &str) -> anyhow::Result<ApiResponse> {
        let response = self
            .client
            .get(url)
            .header("x-bb-api-key", &self.api_key)
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(ApiResponse { status, body })
    }

    async fn post_json(&self, url: &str, body: &JsonValue) -> anyhow::Result<ApiResponse> {
        let response = self
            .client
            .post(url)
            .header("x-bb-api-key", &self.api_key)
            .json(body)
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(ApiResponse { status, body })
    }
}

/// 会话创建选项
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// 显式指定的上下文ID（优先于缓存）
    pub context_id: Option<String>,
    /// 强制新建会话，跳过缓存探活
    pub force_new: bool,
    /// 代理配置
    pub proxy: ProxySettings,
    /// 屏蔽广告（默认开）
    pub block_ads: Option<bool>,
    /// 自动过验证码（默认开）
    pub solve_captchas: Option<bool>,
    /// 高级隐身（付费能力，默认关）
    pub advanced_stealth: Option<bool>,
}

impl SessionOptions {
    /// 从全局配置提取会话选项
    pub fn from_config(config: &Config) -> Self {
        Self {
            context_id: None,
            force_new: false,
            proxy: ProxySettings::from_config(config),
            block_ads: config.block_ads,
            solve_captchas: config.solve_captchas,
            advanced_stealth: config.advanced_stealth,
        }
    }
}

/// 会话信息
#[derive(Debug, Clone)]
pub struct SessionInfo {
    /// 会话ID（后端分配的不透明句柄）
    pub session_id: String,
    /// 持久化上下文ID
    pub context_id: Option<String>,
    /// 上下文是全新的，还没有登录态，需要人工介入
    pub needs_login: bool,
    /// 实时调试链接（尽力获取，可能不可用）
    pub debug_url: Option<String>,
    /// CDP 连接地址（复用缓存会话时为 None）
    pub connect_url: Option<String>,
}

/// 管理器实例级缓存
///
/// 每个实例最多缓存一个当前会话和一个当前上下文
#[derive(Debug, Default)]
struct SessionCache {
    session_id: Option<String>,
    context_id: Option<String>,
}

/// 会话管理器
pub struct SessionManager {
    http: Arc<dyn SessionHttp>,
    base_url: String,
    project_id: String,
    cache: Mutex<SessionCache>,
}

impl SessionManager {
    /// 从全局配置创建会话管理器
    pub fn new(config: &Config) -> Self {
        let http = Arc::new(ReqwestSessionHttp::new(&config.session_api_key));
        Self::with_transport(http, &config.session_api_base_url, &config.session_project_id)
    }

    /// 使用指定传输层创建（测试用）
    pub fn with_transport(
        http: Arc<dyn SessionHttp>,
        base_url: impl Into<String>,
        project_id: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            project_id: project_id.into(),
            cache: Mutex::new(SessionCache::default()),
        }
    }

    /// 获取或创建会话
    ///
    /// 缓存会话仍在运行且未要求强制新建时直接复用（不产生新的
    /// 计费会话）；否则解析上下文（显式 > 缓存 > 自动新建）、构建
    /// 代理 payload、创建新会话并缓存
    ///
    /// 整个"检查-创建"序列持有实例锁，同一管理器上的并发调用
    /// 不会各自创建会话
    pub async fn get_or_create_session(&self, opts: &SessionOptions) -> anyhow::Result<SessionInfo> {
        let mut cache = self.cache.lock().await;

        // 优先复用缓存会话
        if !opts.force_new {
            if let Some(cached_id) = cache.session_id.clone() {
                let detail = self.fetch_session_detail(&cached_id).await;
                if detail.as_ref().map(is_running).unwrap_or(false) {
                    info!("♻️ 复用运行中的会话: {}", cached_id);
                    let connect_url = detail
                        .as_ref()
                        .and_then(|d| d.get("connectUrl"))
                        .and_then(|v| v.as_str())
                        .map(|s| s.to_string());
                    let debug_url = self.get_debug_url(&cached_id).await;
                    return Ok(SessionInfo {
                        session_id: cached_id,
                        context_id: cache.context_id.clone(),
                        needs_login: false,
                        debug_url,
                        connect_url,
                    });
                }
                debug!("缓存会话 {} 已不在运行，准备新建", cached_id);
            }
        }

        // 解析上下文：显式指定 > 实例缓存 > 自动新建
        let mut needs_login = false;
        let context_id = if let Some(explicit) = &opts.context_id {
            debug!("使用显式指定的上下文: {}", explicit);
            Some(explicit.clone())
        } else if let Some(cached) = &cache.context_id {
            debug!("使用缓存的上下文: {}", cached);
            Some(cached.clone())
        } else {
            let id = self.request_new_context().await?;
            info!("✓ 已自动创建新上下文: {} (尚无登录态)", id);
            // 只有自动新建的上下文才需要人工登录
            needs_login = true;
            Some(id)
        };

        // 创建会话
        let payload = self.build_create_payload(opts, context_id.as_deref())?;
        let url = format!("{}/sessions", self.base_url);
        let response = self.http.post_json(&url, &payload).await.map_err(|e| {
            AppError::Session(SessionError::CreateFailed { source: e.into() })
        })?;

        if response.status != 200 && response.status != 201 {
            return Err(AppError::Session(SessionError::CreateFailed {
                source: format!("HTTP {}: {}", response.status, response.body).into(),
            })
            .into());
        }

        let body: JsonValue = serde_json::from_str(&response.body)?;
        let session_id = body
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                AppError::Session(SessionError::CreateFailed {
                    source: "响应缺少会话ID".into(),
                })
            })?
            .to_string();
        let connect_url = body
            .get("connectUrl")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        cache.session_id = Some(session_id.clone());
        cache.context_id = context_id.clone();
        drop(cache);

        // 调试链接尽力获取，失败不影响会话创建
        let debug_url = self.get_debug_url(&session_id).await;

        info!("✓ 会话创建成功: {}", session_id);
        if let Some(url) = &debug_url {
            info!("🔗 实时调试链接: {}", url);
        }

        Ok(SessionInfo {
            session_id,
            context_id,
            needs_login,
            debug_url,
            connect_url,
        })
    }

    /// 查询会话是否仍在运行
    ///
    /// 任何查询错误都视为不活跃（向关闭方向收敛，不抛出）
    pub async fn is_session_active(&self, session_id: &str) -> bool {
        self.fetch_session_detail(session_id)
            .await
            .map(|detail| is_running(&detail))
            .unwrap_or(false)
    }

    /// 拉取会话详情，任何失败都返回 None
    async fn fetch_session_detail(&self, session_id: &str) -> Option<JsonValue> {
        let url = format!("{}/sessions/{}", self.base_url, session_id);
        match self.http.get_json(&url).await {
            Ok(response) if response.status == 200 => {
                serde_json::from_str::<JsonValue>(&response.body).ok()
            }
            Ok(response) => {
                debug!("会话 {} 状态查询返回 HTTP {}", session_id, response.status);
                None
            }
            Err(e) => {
                debug!("会话 {} 状态查询失败: {}", session_id, e);
                None
            }
        }
    }

    /// 关闭会话
    ///
    /// 向后端请求释放；只有ID与缓存一致时才清除缓存（别处传来的
    /// 陈旧ID不会污染缓存）；后端错误只记录不传播
    pub async fn close_session(&self, session_id: &str) {
        info!("正在释放会话: {}", session_id);

        let url = format!("{}/sessions/{}", self.base_url, session_id);
        let payload = json!({
            "projectId": self.project_id,
            "status": "REQUEST_RELEASE",
        });

        match self.http.post_json(&url, &payload).await {
            Ok(response) if response.status == 200 => {
                info!("✓ 会话已释放: {}", session_id);
            }
            Ok(response) => {
                warn!(
                    "⚠️ 释放会话 {} 返回 HTTP {} (忽略): {}",
                    session_id, response.status, response.body
                );
            }
            Err(e) => {
                warn!("⚠️ 释放会话 {} 失败 (忽略): {}", session_id, e);
            }
        }

        let mut cache = self.cache.lock().await;
        if cache.session_id.as_deref() == Some(session_id) {
            cache.session_id = None;
        }
    }

    /// 创建并缓存新的持久化上下文
    pub async fn create_context(&self) -> anyhow::Result<String> {
        let id = self.request_new_context().await?;
        let mut cache = self.cache.lock().await;
        cache.context_id = Some(id.clone());
        Ok(id)
    }

    /// 获取会话的实时调试链接
    ///
    /// 任何失败都返回 None，从不抛出
    pub async fn get_debug_url(&self, session_id: &str) -> Option<String> {
        let url = format!("{}/sessions/{}/debug", self.base_url, session_id);
        let response = match self.http.get_json(&url).await {
            Ok(r) if r.status == 200 => r,
            Ok(r) => {
                debug!("获取调试链接返回 HTTP {}", r.status);
                return None;
            }
            Err(e) => {
                debug!("获取调试链接失败: {}", e);
                return None;
            }
        };

        let body: JsonValue = serde_json::from_str(&response.body).ok()?;
        body.get("debuggerFullscreenUrl")
            .or_else(|| body.get("debuggerUrl"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    }

    // ========== 内部方法 ==========

    async fn request_new_context(&self) -> anyhow::Result<String> {
        let url = format!("{}/contexts", self.base_url);
        let payload = json!({ "projectId": self.project_id });

        let response = self.http.post_json(&url, &payload).await.map_err(|e| {
            AppError::Session(SessionError::ContextCreateFailed { source: e.into() })
        })?;

        if response.status != 200 && response.status != 201 {
            return Err(AppError::Session(SessionError::ContextCreateFailed {
                source: format!("HTTP {}: {}", response.status, response.body).into(),
            })
            .into());
        }

        let body: JsonValue = serde_json::from_str(&response.body)?;
        let id = body
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                AppError::Session(SessionError::ContextCreateFailed {
                    source: "响应缺少上下文ID".into(),
                })
            })?
            .to_string();
        Ok(id)
    }

    /// 构建会话创建 payload
    ///
    /// 隐身默认值在这里统一落地：屏蔽广告和自动过验证码默认开，
    /// 高级隐身是付费能力默认关
    fn build_create_payload(
        &self,
        opts: &SessionOptions,
        context_id: Option<&str>,
    ) -> anyhow::Result<JsonValue> {
        let mut browser_settings = json!({
            "blockAds": opts.block_ads.unwrap_or(true),
            "solveCaptchas": opts.solve_captchas.unwrap_or(true),
            "viewport": { "width": 1280, "height": 800 },
        });
        if opts.advanced_stealth.unwrap_or(false) {
            browser_settings["advancedStealth"] = json!(true);
        }
        if let Some(context_id) = context_id {
            browser_settings["context"] = json!({ "id": context_id, "persist": true });
        }

        let mut payload = json!({
            "projectId": self.project_id,
            "browserSettings": browser_settings,
        });
        if let Some(proxies) = build_proxy_payload(&opts.proxy)? {
            payload["proxies"] = proxies;
        }
        Ok(payload)
    }
}

fn is_running(detail: &JsonValue) -> bool {
    detail
        .get("status")
        .and_then(|s| s.as_str())
        .map(|s| s.eq_ignore_ascii_case("RUNNING"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    /// 按顺序吐出预置响应并记录请求的模拟传输层
    struct MockHttp {
        responses: StdMutex<VecDeque<anyhow::Result<ApiResponse>>>,
        requests: StdMutex<Vec<(String, String)>>,
    }

    impl MockHttp {
        fn new(responses: Vec<anyhow::Result<ApiResponse>>) -> Arc<Self> {
            Arc::new(Self {
                responses: StdMutex::new(responses.into()),
                requests: StdMutex::new(Vec::new()),
            })
        }

        fn ok(status: u16, body: &str) -> anyhow::Result<ApiResponse> {
            Ok(ApiResponse {
                status,
                body: body.to_string(),
            })
        }

        fn recorded(&self) -> Vec<(String, String)> {
            self.requests.lock().unwrap().clone()
        }

        fn next(&self, method: &str, url: &str) -> anyhow::Result<ApiResponse> {
            self.requests
                .lock()
                .unwrap()
                .push((method.to_string(), url.to_string()));
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(anyhow::anyhow!("没有预置响应")))
        }
    }

    #[async_trait]
    impl SessionHttp for MockHttp {
        async fn get_json(&self, url: &str) -> anyhow::Result<ApiResponse> {
            self.next("GET", url)
        }

        async fn post_json(&self, url: &str, _body: &JsonValue) -> anyhow::Result<ApiResponse> {
            self.next("POST", url)
        }
    }

    fn manager_with(http: Arc<MockHttp>) -> SessionManager {
        SessionManager::with_transport(http, "https://sessions.test/v1", "proj-1")
    }

    async fn seed_cache(manager: &SessionManager, session: Option<&str>, context: Option<&str>) {
        let mut cache = manager.cache.lock().await;
        cache.session_id = session.map(|s| s.to_string());
        cache.context_id = context.map(|s| s.to_string());
    }

    #[tokio::test]
    async fn test_running_cached_session_is_reused_without_create() {
        let http = MockHttp::new(vec![
            // 探活
            MockHttp::ok(200, r#"{"status":"RUNNING"}"#),
            // 调试链接
            MockHttp::ok(200, r#"{"debuggerFullscreenUrl":"https://debug.test/s1"}"#),
        ]);
        let manager = manager_with(http.clone());
        seed_cache(&manager, Some("s1"), Some("ctx1")).await;

        let info = manager
            .get_or_create_session(&SessionOptions::default())
            .await
            .unwrap();

        assert_eq!(info.session_id, "s1");
        assert_eq!(info.context_id.as_deref(), Some("ctx1"));
        assert!(!info.needs_login);
        assert_eq!(info.debug_url.as_deref(), Some("https://debug.test/s1"));

        // 不应出现 POST /sessions（没有新的计费会话）
        let requests = http.recorded();
        assert!(requests.iter().all(|(method, url)| {
            !(method == "POST" && url.ends_with("/sessions"))
        }));
    }

    #[tokio::test]
    async fn test_dead_cached_session_triggers_create() {
        let http = MockHttp::new(vec![
            // 探活：已停止
            MockHttp::ok(200, r#"{"status":"COMPLETED"}"#),
            // 创建会话
            MockHttp::ok(200, r#"{"id":"s2","connectUrl":"wss://connect.test/s2"}"#),
            // 调试链接
            MockHttp::ok(200, r#"{"debuggerFullscreenUrl":"https://debug.test/s2"}"#),
        ]);
        let manager = manager_with(http.clone());
        seed_cache(&manager, Some("s1"), Some("ctx1")).await;

        let info = manager
            .get_or_create_session(&SessionOptions::default())
            .await
            .unwrap();

        assert_eq!(info.session_id, "s2");
        // 复用了缓存上下文，不需要登录
        assert_eq!(info.context_id.as_deref(), Some("ctx1"));
        assert!(!info.needs_login);
        assert_eq!(info.connect_url.as_deref(), Some("wss://connect.test/s2"));

        let cache = manager.cache.lock().await;
        assert_eq!(cache.session_id.as_deref(), Some("s2"));
    }

    #[tokio::test]
    async fn test_fresh_manager_auto_creates_context_and_flags_login() {
        let http = MockHttp::new(vec![
            // 创建上下文
            MockHttp::ok(201, r#"{"id":"ctx-new"}"#),
            // 创建会话
            MockHttp::ok(201, r#"{"id":"s1","connectUrl":"wss://connect.test/s1"}"#),
            // 调试链接获取失败：优雅降级
            MockHttp::ok(500, "internal"),
        ]);
        let manager = manager_with(http.clone());

        let info = manager
            .get_or_create_session(&SessionOptions::default())
            .await
            .unwrap();

        // 自动新建的上下文没有登录态
        assert!(info.needs_login);
        assert_eq!(info.context_id.as_deref(), Some("ctx-new"));
        // 调试链接失败不影响会话创建
        assert!(info.debug_url.is_none());
    }

    #[tokio::test]
    async fn test_explicit_context_skips_auto_create() {
        let http = MockHttp::new(vec![
            MockHttp::ok(200, r#"{"id":"s1"}"#),
            MockHttp::ok(200, r#"{"debuggerFullscreenUrl":"https://debug.test/s1"}"#),
        ]);
        let manager = manager_with(http.clone());

        let opts = SessionOptions {
            context_id: Some("ctx-mine".to_string()),
            ..Default::default()
        };
        let info = manager.get_or_create_session(&opts).await.unwrap();

        assert!(!info.needs_login);
        assert_eq!(info.context_id.as_deref(), Some("ctx-mine"));
        // 没有上下文创建请求
        let requests = http.recorded();
        assert!(requests
            .iter()
            .all(|(_, url)| !url.ends_with("/contexts")));
    }

    #[tokio::test]
    async fn test_is_session_active_fails_closed() {
        // 传输层错误 → 不活跃，不抛出
        let http = MockHttp::new(vec![Err(anyhow::anyhow!("连接被拒绝"))]);
        let manager = manager_with(http);
        assert!(!manager.is_session_active("s1").await);

        // 非 200 → 不活跃
        let http = MockHttp::new(vec![MockHttp::ok(404, "not found")]);
        let manager = manager_with(http);
        assert!(!manager.is_session_active("s1").await);
    }

    #[tokio::test]
    async fn test_close_mismatched_id_leaves_cache() {
        let http = MockHttp::new(vec![MockHttp::ok(200, "{}")]);
        let manager = manager_with(http);
        seed_cache(&manager, Some("s1"), Some("ctx1")).await;

        manager.close_session("s-other").await;

        let cache = manager.cache.lock().await;
        assert_eq!(cache.session_id.as_deref(), Some("s1"));
    }

    #[tokio::test]
    async fn test_close_cached_id_clears_even_when_release_fails() {
        let http = MockHttp::new(vec![Err(anyhow::anyhow!("后端不可达"))]);
        let manager = manager_with(http);
        seed_cache(&manager, Some("s1"), Some("ctx1")).await;

        manager.close_session("s1").await;

        let cache = manager.cache.lock().await;
        assert!(cache.session_id.is_none());
        // 上下文是跨会话的，不随会话关闭清除
        assert_eq!(cache.context_id.as_deref(), Some("ctx1"));
    }

    #[tokio::test]
    async fn test_proxy_misconfiguration_fails_session_create() {
        let http = MockHttp::new(vec![
            // 上下文创建成功，之后代理构建失败
            MockHttp::ok(201, r#"{"id":"ctx-new"}"#),
        ]);
        let manager = manager_with(http);

        let opts = SessionOptions {
            proxy: ProxySettings {
                kind: Some(crate::session::proxy::ProxyKind::External),
                ..Default::default()
            },
            ..Default::default()
        };
        let err = manager.get_or_create_session(&opts).await.unwrap_err();
        assert!(err.to_string().contains("server"));
    }
}
