use crate::models::request::OptimizeRequest;
use anyhow::{Context, Result};
use std::path::Path;
use tokio::fs;

/// 从 TOML 文件加载优化请求
pub async fn load_request(path: &Path) -> Result<OptimizeRequest> {
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("无法读取请求文件: {}", path.display()))?;

    let request: OptimizeRequest = toml::from_str(&content)
        .with_context(|| format!("无法解析请求文件: {}", path.display()))?;

    request.validate()?;

    tracing::info!(
        "已加载请求: 模式 {}, 文本 {} 字符",
        request.mode,
        request.text.chars().count()
    );

    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::request::Mode;

    #[tokio::test]
    async fn test_load_request_roundtrip() {
        let dir = std::env::temp_dir().join("ai_score_rewrite_test_loader");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("request.toml");
        std::fs::write(
            &path,
            r#"
text = "这是一段等待优化的文本"
mode = "score_only"
max_ai_percent = 20.0
"#,
        )
        .unwrap();

        let request = load_request(&path).await.unwrap();
        assert_eq!(request.mode, Mode::ScoreOnly);
        assert_eq!(request.max_ai_percent, 20.0);
        // 未显式给出的字段走默认值
        assert_eq!(request.max_iterations, 3);
    }

    #[tokio::test]
    async fn test_load_request_missing_file() {
        let result = load_request(Path::new("/nonexistent/request.toml")).await;
        assert!(result.is_err());
    }
}
