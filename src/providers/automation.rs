//! 确定性自动化后端
//!
//! 持有远程会话的本地句柄（CDP 页面驱动 + 自动化会话），把每次
//! 打分委托给流程层的 `ScoreTask`。会话创建失败时必须先释放已经
//! 建出来的远程会话再传播错误，不留下计费孤儿。

use async_trait::async_trait;
use chromiumoxide::Browser;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::browser::connect_to_session;
use crate::config::Config;
use crate::error::AppError;
use crate::infrastructure::{AutomationApi, BoundSession, PageDriver};
use crate::models::scores::Scores;
use crate::providers::{ScoreOptions, ScoringProvider, SessionResult};
use crate::session::{SessionInfo, SessionManager, SessionOptions};
use crate::workflow::{ScoreTask, TaskCtx};

/// 一个会话的本地句柄
///
/// Browser 只是为了维持 CDP 连接存活
struct TaskHandle {
    _browser: Browser,
    driver: PageDriver,
    automation: BoundSession,
}

/// 确定性自动化后端
pub struct AutomationProvider {
    manager: SessionManager,
    api: AutomationApi,
    task: ScoreTask,
    handles: Mutex<HashMap<String, Arc<TaskHandle>>>,
    debug_urls: Mutex<HashMap<String, String>>,
}

impl AutomationProvider {
    /// 从全局配置创建后端
    pub fn new(config: &Config) -> Self {
        Self {
            manager: SessionManager::new(config),
            api: AutomationApi::new(config),
            task: ScoreTask::new(config),
            handles: Mutex::new(HashMap::new()),
            debug_urls: Mutex::new(HashMap::new()),
        }
    }

    /// 初始化会话句柄：CDP 连接 + 自动化会话绑定
    async fn init_handle(&self, info: &SessionInfo) -> anyhow::Result<TaskHandle> {
        let connect_url = info
            .connect_url
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("会话 {} 缺少 CDP 连接地址", info.session_id))?;

        let (browser, page) = connect_to_session(connect_url).await?;
        let automation = self.api.bind(&info.session_id).await?;

        Ok(TaskHandle {
            _browser: browser,
            driver: PageDriver::new(page),
            automation,
        })
    }
}

#[async_trait]
impl ScoringProvider for AutomationProvider {
    async fn create_session(&self, opts: &SessionOptions) -> anyhow::Result<SessionResult> {
        let info = self.manager.get_or_create_session(opts).await?;
        let session_id = info.session_id.clone();

        // 复用场景：句柄已经在映射里，直接返回
        if self.handles.lock().await.contains_key(&session_id) {
            debug!("复用已有的会话句柄: {}", session_id);
            return Ok(SessionResult {
                session_id,
                needs_login: info.needs_login,
                debug_url: info.debug_url,
            });
        }

        // 句柄初始化失败时必须释放刚建出来的远程会话再传播错误
        let handle = match self.init_handle(&info).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!(
                    "⚠️ 会话 {} 句柄初始化失败，先释放远程会话: {}",
                    session_id, e
                );
                self.manager.close_session(&session_id).await;
                return Err(e);
            }
        };

        self.handles
            .lock()
            .await
            .insert(session_id.clone(), Arc::new(handle));
        if let Some(url) = &info.debug_url {
            self.debug_urls
                .lock()
                .await
                .insert(session_id.clone(), url.clone());
        }

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
        // 未知会话ID是调用方错误，立即失败
        let handle = self
            .handles
            .lock()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| AppError::unknown_session(session_id))?;

        let debug_url = self.debug_urls.lock().await.get(session_id).cloned();
        let ctx = TaskCtx::new(session_id.to_string(), opts.iteration, debug_url);

        self.task
            .run(&handle.driver, &handle.automation, text, &ctx)
            .await
    }

    async fn close_session(&self, session_id: &str) {
        let handle = self.handles.lock().await.remove(session_id);
        let debug_url = self.debug_urls.lock().await.remove(session_id);

        if let Some(handle) = handle {
            // 尽力清理本次创建的文档，再结束自动化会话
            let ctx = TaskCtx::new(session_id.to_string(), 0, debug_url);
            self.task.cleanup(&handle.automation, &ctx).await;

            if let Err(e) = handle.automation.end().await {
                warn!("⚠️ 结束自动化会话 {} 失败 (忽略): {}", session_id, e);
            }
        } else {
            debug!("会话 {} 没有本地句柄，跳过句柄清理", session_id);
        }

        self.manager.close_session(session_id).await;
        info!("✓ 会话 {} 的本地状态已清理", session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_score_text_on_unknown_session_fails_fast() {
        let provider = AutomationProvider::new(&Config::default());

        let err = provider
            .score_text("sess-nonexistent", "文本", &ScoreOptions::default())
            .await
            .unwrap_err();

        let app_err = err.downcast_ref::<AppError>().expect("应该是 AppError");
        assert!(app_err.to_string().contains("sess-nonexistent"));
    }
}
