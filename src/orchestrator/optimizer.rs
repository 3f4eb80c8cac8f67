//! 优化循环 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个应用的入口，负责一次顶层调用的完整编排。
//!
//! ## 核心功能
//!
//! 1. **会话纪律**：建会话 → 跑主体 → 释放会话，释放在每条退出
//!    路径上都保证执行，释放失败只记录不传播
//! 2. **基线打分**：三种模式都先做一次基线（迭代 0）并记入历史
//! 3. **迭代循环**：optimize 模式下交替执行改写和重打分，达标
//!    即停，否则跑满预算
//! 4. **阈值判定**：单个信号缺失视为达标，两个同时缺失判未达标
//! 5. **进度上报**：0-15 / 15-85 / 85-100 三段式

use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::models::request::{Mode, OptimizeRequest};
use crate::models::scores::{IterationRecord, OptimizationOutcome, Scores, Thresholds};
use crate::orchestrator::progress::{ProgressReporter, Substep, SETUP_END};
use crate::providers::{ScoreOptions, ScoringProvider, SessionResult};
use crate::services::Refiner;
use crate::session::SessionOptions;
use crate::utils::logging::truncate_text;

/// 优化器
///
/// - 顶层编排：不处理单次打分的细节
/// - 向下委托：打分给 provider，改写给 refiner
/// - 无共享状态：每次顶层调用自带全部上下文
pub struct Optimizer {
    provider: Arc<dyn ScoringProvider>,
    refiner: Arc<dyn Refiner>,
    session_opts: SessionOptions,
}

impl Optimizer {
    /// 创建新的优化器
    pub fn new(
        provider: Arc<dyn ScoringProvider>,
        refiner: Arc<dyn Refiner>,
        session_opts: SessionOptions,
    ) -> Self {
        Self {
            provider,
            refiner,
            session_opts,
        }
    }

    /// 执行一次顶层调用
    ///
    /// 会话释放在成功、报错、提前达标三种退出路径上都会执行；
    /// 已经算出的结果不会被释放失败吞掉
    pub async fn run(
        &self,
        request: &OptimizeRequest,
        progress: &ProgressReporter,
    ) -> Result<OptimizationOutcome> {
        request.validate()?;

        log_run_start(request);
        progress.report("正在创建打分会话...", Some(2)).await;

        let session = self
            .provider
            .create_session(&self.session_opts)
            .await?;

        if session.needs_login {
            warn!(
                "⚠️ 上下文是全新的，还没有登录态；请先通过调试链接完成登录: {}",
                session.debug_url.as_deref().unwrap_or("(调试链接不可用)")
            );
        }

        // 建会话之后的一切都在 body 里跑，保证会话总能被释放
        let result = self.run_body(request, &session, progress).await;

        self.provider.close_session(&session.session_id).await;

        match &result {
            Ok(outcome) => log_run_complete(outcome),
            Err(e) => error!("❌ 本次调用以错误结束: {}", e),
        }
        result
    }

    /// 主体流程（会话已就绪）
    async fn run_body(
        &self,
        request: &OptimizeRequest,
        session: &SessionResult,
        progress: &ProgressReporter,
    ) -> Result<OptimizationOutcome> {
        let thresholds = Thresholds {
            max_ai_percent: request.max_ai_percent,
            max_plagiarism_percent: request.max_plagiarism_percent,
        };

        let mut current_text = request.text.clone();
        let mut history: Vec<IterationRecord> = Vec::new();

        // ========== 基线打分（迭代 0，三种模式共同起点） ==========
        progress.report("正在做基线打分...", Some(8)).await;
        let baseline = self
            .provider
            .score_text(
                &session.session_id,
                &current_text,
                &ScoreOptions { iteration: 0 },
            )
            .await?;
        info!("📊 基线: {}", baseline);
        push_record(&mut history, 0, &baseline, &current_text);
        progress
            .report(format!("基线完成: {}", baseline), Some(SETUP_END))
            .await;

        let mut last_scores = baseline;
        let mut thresholds_met = thresholds.met_by(&last_scores);
        let mut iterations_used = 0;
        let mut notes = last_scores.notes.clone();

        match request.mode {
            Mode::ScoreOnly => {
                // 只评估阈值，直接收尾
            }
            Mode::Analyze => {
                // 只读分析：不改变 current_text
                progress.report("正在分析基线文本...", Some(50)).await;
                let analysis = self
                    .refiner
                    .analyze(&current_text, &last_scores, &thresholds)
                    .await?;
                notes = merge_notes(&notes, &analysis);
            }
            Mode::Optimize => {
                if thresholds_met {
                    info!("✅ 基线已达标，无需改写");
                } else {
                    for iteration in 1..=request.max_iterations {
                        log_iteration_start(iteration, request.max_iterations);

                        // --- 改写 ---
                        progress
                            .report(
                                format!(
                                    "迭代 {}/{}：正在改写...",
                                    iteration, request.max_iterations
                                ),
                                Some(progress.iteration_percent(iteration, Substep::Rewrite)),
                            )
                            .await;
                        let rewrite = self
                            .refiner
                            .rewrite(
                                &current_text,
                                &last_scores,
                                &thresholds,
                                &request.tone,
                                request.domain_hint.as_deref(),
                                request.custom_instructions.as_deref(),
                            )
                            .await?;
                        current_text = rewrite.rewritten_text;
                        if !rewrite.reasoning.is_empty() {
                            debug!("改写思路: {}", rewrite.reasoning);
                        }

                        // --- 重新打分（同一个会话） ---
                        progress
                            .report(
                                format!(
                                    "迭代 {}/{}：正在重新打分...",
                                    iteration, request.max_iterations
                                ),
                                Some(progress.iteration_percent(iteration, Substep::Score)),
                            )
                            .await;
                        let scores = self
                            .provider
                            .score_text(
                                &session.session_id,
                                &current_text,
                                &ScoreOptions { iteration },
                            )
                            .await?;
                        info!("📊 迭代 {}: {}", iteration, scores);

                        push_record(&mut history, iteration, &scores, &current_text);
                        iterations_used = iteration;
                        last_scores = scores;

                        thresholds_met = thresholds.met_by(&last_scores);
                        if thresholds_met {
                            info!("✅ 第 {} 轮后达标，提前结束", iteration);
                            break;
                        }
                    }
                }

                // 最终总结（达标或用尽预算都做）
                progress.report("正在生成总结...", Some(88)).await;
                match self.refiner.summarize(&history, &current_text).await {
                    Ok(summary) => notes = merge_notes(&notes, &summary),
                    Err(e) => warn!("⚠️ 生成总结失败 (忽略): {}", e),
                }
            }
        }

        progress.report("完成", Some(100)).await;

        Ok(OptimizationOutcome {
            ai_detection_percent: last_scores.ai_detection_percent,
            plagiarism_percent: last_scores.plagiarism_percent,
            final_text: current_text,
            iterations_used,
            thresholds_met,
            history,
            notes,
        })
    }
}

fn push_record(history: &mut Vec<IterationRecord>, iteration: usize, scores: &Scores, text: &str) {
    history.push(IterationRecord {
        iteration,
        scores: scores.clone(),
        text_chars: text.chars().count(),
    });
}

fn merge_notes(existing: &str, addition: &str) -> String {
    match (existing.trim().is_empty(), addition.trim().is_empty()) {
        (true, true) => String::new(),
        (true, false) => addition.trim().to_string(),
        (false, true) => existing.trim().to_string(),
        (false, false) => format!("{}\n{}", existing.trim(), addition.trim()),
    }
}

// ========== 日志辅助函数 ==========

fn log_run_start(request: &OptimizeRequest) {
    info!("{}", "=".repeat(60));
    info!("🚀 开始处理 - 模式: {}", request.mode);
    info!(
        "🎯 阈值: AI ≤ {}%, 抄袭 ≤ {}%, 迭代预算 {}",
        request.max_ai_percent, request.max_plagiarism_percent, request.max_iterations
    );
    info!("📝 文本预览: {}", truncate_text(&request.text, 80));
    info!("{}", "=".repeat(60));
}

fn log_iteration_start(iteration: usize, total: usize) {
    info!("\n{}", "─".repeat(40));
    info!("🔄 迭代 {}/{}", iteration, total);
    info!("{}", "─".repeat(40));
}

fn log_run_complete(outcome: &OptimizationOutcome) {
    info!("\n{}", "=".repeat(60));
    info!(
        "{} 处理完成: 用了 {} 轮改写, {}",
        if outcome.thresholds_met { "✅" } else { "⚠️" },
        outcome.iterations_used,
        if outcome.thresholds_met {
            "已达标"
        } else {
            "未达标"
        }
    );
    info!("{}", "=".repeat(60));
}
