use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use ai_score_rewrite::config::Config;
use ai_score_rewrite::error::AppError;
use ai_score_rewrite::models::load_request;
use ai_score_rewrite::orchestrator::{Optimizer, ProgressReporter};
use ai_score_rewrite::providers::create_provider;
use ai_score_rewrite::services::RewriteService;
use ai_score_rewrite::session::SessionOptions;
use ai_score_rewrite::utils::logging;

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置
    let config = Config::from_env();

    // 初始化日志
    logging::init(config.verbose_logging);
    logging::init_log_file(&config.output_log_file)?;

    // 请求文件路径：命令行参数优先于配置
    let request_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| config.request_file.clone());
    let request = load_request(Path::new(&request_path)).await?;

    // 组装优化器并运行
    let provider = create_provider(&config)?;
    let refiner = Arc::new(RewriteService::new(&config));
    let optimizer = Optimizer::new(provider, refiner, SessionOptions::from_config(&config));

    let progress = ProgressReporter::log_only(request.max_iterations);
    let outcome = match optimizer.run(&request, &progress).await {
        Ok(outcome) => outcome,
        Err(e) => {
            // 认证错误需要人工介入，把调试链接单独提示出来
            if let Some(app_err) = e.downcast_ref::<AppError>() {
                if app_err.is_authentication_required() {
                    eprintln!(
                        "需要先手动登录目标应用，完成后重试。调试链接: {}",
                        app_err.login_debug_url().unwrap_or("(不可用)")
                    );
                }
            }
            return Err(e);
        }
    };

    // 结果以 JSON 输出
    println!("{}", serde_json::to_string_pretty(&outcome)?);

    Ok(())
}
