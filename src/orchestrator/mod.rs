//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责一次顶层调用的完整编排，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `optimizer` - 优化循环
//! - 管理会话生命周期（创建、保证释放）
//! - 基线打分（迭代 0）与三种模式分派
//! - 改写 → 重打分的迭代循环与阈值收敛判定
//! - 输出最终结果（含完整历史）
//!
//! ### `progress` - 进度上报
//! - 注入式回调 + 日志双通道
//! - 0-15 / 15-85 / 85-100 三段式百分比计算
//!
//! ## 层次关系
//!
//! ```text
//! orchestrator::Optimizer (一次顶层调用)
//!     ↓
//! providers (能力接口：建会话 / 打分 / 关会话)
//!     ↓
//! workflow::ScoreTask (单次打分流程)
//!     ↓
//! services / session (能力层：改写 / 会话生命周期)
//!     ↓
//! infrastructure (基础设施：页面驱动 / 自动化接口)
//! ```
//!
//! ## 设计原则
//!
//! 1. **单一职责**：optimizer 管循环，progress 管上报
//! 2. **资源纪律**：会话释放在每条退出路径上都执行
//! 3. **向下依赖**：编排层 → providers → workflow → services/infrastructure
//! 4. **无业务细节**：不认识 observe / act / extract

pub mod optimizer;
pub mod progress;

pub use optimizer::Optimizer;
pub use progress::{ProgressCallback, ProgressReporter, Substep};
