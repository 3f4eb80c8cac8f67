pub mod score_task;
pub mod task_ctx;

pub use score_task::{ScoreTask, MAX_TEXT_LEN, SHORT_TEXT_LIMIT};
pub use task_ctx::TaskCtx;
