use anyhow::Result;
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::error::{AppError, SessionError};

/// 通过 CDP 连接到远程会话并获取首个页面
///
/// 远程会话创建后自带一个初始页面；没有任何页面说明会话环境
/// 有缺陷，直接报错，不重试
pub async fn connect_to_session(connect_url: &str) -> Result<(Browser, Page)> {
    info!("正在连接到远程会话...");
    debug!("CDP 连接地址: {}", connect_url);

    let (browser, mut handler) = Browser::connect(connect_url).await.map_err(|e| {
        error!("连接远程会话失败: {}", e);
        AppError::Session(SessionError::ConnectFailed {
            source: Box::new(e),
        })
    })?;
    debug!("远程会话连接成功");

    // 在后台处理浏览器事件
    tokio::spawn(async move {
        while let Some(h) = handler.next().await {
            if h.is_err() {
                break;
            }
        }
    });

    // 添加短暂延迟以等待浏览器状态同步
    sleep(tokio::time::Duration::from_millis(300)).await;

    let pages = browser.pages().await?;
    debug!("获取到 {} 个页面", pages.len());

    let page = pages
        .into_iter()
        .next()
        .ok_or(AppError::Session(SessionError::NoPageAvailable))?;

    info!("✓ 已取得远程会话的首个页面");

    Ok((browser, page))
}
