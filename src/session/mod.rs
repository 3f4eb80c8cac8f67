//! 会话层（Session Layer）
//!
//! ## 职责
//!
//! 本层负责远程浏览器会话的完整生命周期。
//!
//! ### `manager` - 会话管理器
//! - 创建 / 探活 / 复用 / 释放远程会话
//! - 解析持久化登录上下文（显式 > 缓存 > 自动新建）
//! - 实例级缓存（最多一个当前会话 + 一个当前上下文）
//! - 尽力获取实时调试链接
//!
//! ### `proxy` - 代理配置构建
//! - 声明式配置 → 会话创建 payload 的纯函数翻译
//! - IPRoyal 风格的会话粘性密码构建（幂等）

pub mod manager;
pub mod proxy;

pub use manager::{SessionHttp, SessionInfo, SessionManager, SessionOptions};
pub use proxy::{build_iproyal_password, build_proxy_payload, ProxyKind, ProxySettings};
