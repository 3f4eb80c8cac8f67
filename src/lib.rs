//! # AI Score Rewrite
//!
//! 一个驱动网页端检测应用给文本打分、并用 LLM 迭代改写到达标的
//! Rust 应用程序
//!
//! ## 架构设计
//!
//! 本系统采用分层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源，只暴露能力
//! - `PageDriver` - 唯一的 page owner，提供 eval / goto / fill 能力
//! - `AutomationApi` - 远程 observe / act / extract 接口客户端
//!
//! ### ② 会话层（Session）
//! - `session/` - 远程会话的生命周期与代理配置
//! - `SessionManager` - 创建 / 探活 / 复用 / 释放，实例级缓存
//! - `build_proxy_payload` - 声明式代理配置的纯函数翻译
//!
//! ### ③ 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，不关心流程
//! - `RewriteService` - 改写 / 分析 / 总结能力
//!
//! ### ④ 流程层（Workflow）
//! - `workflow/` - 定义"一次打分"的完整流程
//! - `TaskCtx` - 上下文封装（会话 + 迭代编号）
//! - `ScoreTask` - 流程编排（导航 → 认证 → 建文档 → 输入 → 提取）
//!
//! ### ⑤ 编排层（Orchestration）
//! - `orchestrator/optimizer` - 优化循环，管理会话纪律和阈值收敛
//! - `orchestrator/progress` - 三段式进度上报
//!
//! ### 打分后端（Providers）
//! - `providers/` - 能力接口 + 两个可互换实现（确定性自动化 /
//!   自然语言任务）
//!
//! ## 模块结构

pub mod browser;
pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod providers;
pub mod services;
pub mod session;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult};
pub use infrastructure::PageDriver;
pub use models::{Mode, OptimizationOutcome, OptimizeRequest, Scores, Thresholds};
pub use orchestrator::{Optimizer, ProgressReporter};
pub use providers::{create_provider, ScoringProvider};
pub use session::{SessionManager, SessionOptions};
pub use workflow::{ScoreTask, TaskCtx};
