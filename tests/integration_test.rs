use std::sync::Arc;

use ai_score_rewrite::config::Config;
use ai_score_rewrite::models::{Mode, OptimizeRequest};
use ai_score_rewrite::orchestrator::{Optimizer, ProgressReporter};
use ai_score_rewrite::providers::{create_provider, ScoreOptions};
use ai_score_rewrite::services::RewriteService;
use ai_score_rewrite::session::{SessionManager, SessionOptions};
use ai_score_rewrite::utils::logging;

#[tokio::test]
#[ignore] // 默认忽略，需要真实的会话后端：cargo test -- --ignored
async fn test_session_create_and_close() {
    logging::init(true);

    let config = Config::from_env();
    let manager = SessionManager::new(&config);

    let info = manager
        .get_or_create_session(&SessionOptions::from_config(&config))
        .await
        .expect("创建会话失败");

    assert!(!info.session_id.is_empty());
    assert!(manager.is_session_active(&info.session_id).await);

    manager.close_session(&info.session_id).await;
}

#[tokio::test]
#[ignore]
async fn test_session_reuse_returns_same_id() {
    logging::init(true);

    let config = Config::from_env();
    let manager = SessionManager::new(&config);
    let opts = SessionOptions::from_config(&config);

    let first = manager
        .get_or_create_session(&opts)
        .await
        .expect("创建会话失败");
    let second = manager
        .get_or_create_session(&opts)
        .await
        .expect("复用会话失败");

    // 第二次调用应当复用运行中的会话，不产生新的计费会话
    assert_eq!(first.session_id, second.session_id);

    manager.close_session(&first.session_id).await;
}

#[tokio::test]
#[ignore]
async fn test_score_single_text() {
    logging::init(true);

    let config = Config::from_env();
    let provider = create_provider(&config).expect("构建后端失败");

    let session = provider
        .create_session(&SessionOptions::from_config(&config))
        .await
        .expect("创建会话失败");

    if session.needs_login {
        println!("⚠️ 需要先手动登录: {:?}", session.debug_url);
    }

    let scores = provider
        .score_text(
            &session.session_id,
            "这是一段用于连通性验证的测试文本，检查打分链路是否完整。",
            &ScoreOptions::default(),
        )
        .await;

    provider.close_session(&session.session_id).await;

    let scores = scores.expect("打分失败");
    println!("打分结果: {}", scores);
}

#[tokio::test]
#[ignore]
async fn test_full_optimize_run() {
    logging::init(true);

    let config = Config::from_env();
    let provider = create_provider(&config).expect("构建后端失败");
    let refiner = Arc::new(RewriteService::new(&config));
    let optimizer = Optimizer::new(provider, refiner, SessionOptions::from_config(&config));

    let request = OptimizeRequest {
        text: "人工智能技术在近年来取得了长足的发展，在各个领域都有广泛的应用。\
               它不仅提高了生产效率，也改变了人们的生活方式。"
            .to_string(),
        mode: Mode::Optimize,
        max_ai_percent: 30.0,
        max_plagiarism_percent: 30.0,
        max_iterations: 2,
        tone: "neutral".to_string(),
        domain_hint: None,
        custom_instructions: None,
    };

    let progress = ProgressReporter::log_only(request.max_iterations);
    let outcome = optimizer
        .run(&request, &progress)
        .await
        .expect("优化运行失败");

    println!(
        "最终: AI={:?} 抄袭={:?} 迭代={} 达标={}",
        outcome.ai_detection_percent,
        outcome.plagiarism_percent,
        outcome.iterations_used,
        outcome.thresholds_met
    );
    assert!(!outcome.history.is_empty());
}
