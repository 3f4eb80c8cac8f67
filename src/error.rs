use std::fmt;

/// 应用程序错误类型
#[derive(Debug)]
pub enum AppError {
    /// 会话相关错误
    Session(SessionError),
    /// 浏览器自动化错误
    Automation(AutomationError),
    /// LLM 服务错误
    Llm(LlmError),
    /// 配置错误
    Config(ConfigError),
    /// 业务逻辑错误
    Business(BusinessError),
    /// 其他错误（用于包装第三方库错误）
    Other(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Session(e) => write!(f, "会话错误: {}", e),
            AppError::Automation(e) => write!(f, "自动化错误: {}", e),
            AppError::Llm(e) => write!(f, "LLM错误: {}", e),
            AppError::Config(e) => write!(f, "配置错误: {}", e),
            AppError::Business(e) => write!(f, "业务错误: {}", e),
            AppError::Other(msg) => write!(f, "错误: {}", msg),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Session(e) => Some(e),
            AppError::Automation(e) => Some(e),
            AppError::Llm(e) => Some(e),
            AppError::Config(e) => Some(e),
            AppError::Business(e) => Some(e),
            AppError::Other(_) => None,
        }
    }
}

/// 会话相关错误
#[derive(Debug)]
pub enum SessionError {
    /// 创建远程会话失败
    CreateFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 查询会话状态失败
    StatusQueryFailed {
        session_id: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 释放会话失败
    ReleaseFailed {
        session_id: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 创建持久化上下文失败
    ContextCreateFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 连接到远程会话失败
    ConnectFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 浏览器上下文中没有可用页面
    NoPageAvailable,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::CreateFailed { source } => {
                write!(f, "创建远程会话失败: {}", source)
            }
            SessionError::StatusQueryFailed { session_id, source } => {
                write!(f, "查询会话 {} 状态失败: {}", session_id, source)
            }
            SessionError::ReleaseFailed { session_id, source } => {
                write!(f, "释放会话 {} 失败: {}", session_id, source)
            }
            SessionError::ContextCreateFailed { source } => {
                write!(f, "创建持久化上下文失败: {}", source)
            }
            SessionError::ConnectFailed { source } => {
                write!(f, "连接到远程会话失败: {}", source)
            }
            SessionError::NoPageAvailable => {
                write!(f, "浏览器上下文中没有可用页面")
            }
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::CreateFailed { source }
            | SessionError::StatusQueryFailed { source, .. }
            | SessionError::ReleaseFailed { source, .. }
            | SessionError::ContextCreateFailed { source }
            | SessionError::ConnectFailed { source } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            SessionError::NoPageAvailable => None,
        }
    }
}

/// 浏览器自动化错误
#[derive(Debug)]
pub enum AutomationError {
    /// 需要人工登录
    ///
    /// 携带会话的调试链接（如果可用），调用方可以通过该链接手动完成登录
    AuthenticationRequired {
        debug_url: Option<String>,
    },
    /// 导航失败
    NavigationFailed {
        url: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 元素观察失败
    ObserveFailed {
        instruction: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 动作执行失败
    ActFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 结构化提取失败
    ExtractFailed {
        instruction: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 未知会话ID（调用方错误）
    UnknownSession {
        session_id: String,
    },
}

impl fmt::Display for AutomationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AutomationError::AuthenticationRequired { debug_url } => match debug_url {
                Some(url) => write!(f, "目标应用未登录，请通过调试链接手动登录: {}", url),
                None => write!(f, "目标应用未登录，且调试链接不可用"),
            },
            AutomationError::NavigationFailed { url, source } => {
                write!(f, "导航到 {} 失败: {}", url, source)
            }
            AutomationError::ObserveFailed {
                instruction,
                source,
            } => {
                write!(f, "元素观察失败 ({}): {}", instruction, source)
            }
            AutomationError::ActFailed { source } => {
                write!(f, "动作执行失败: {}", source)
            }
            AutomationError::ExtractFailed {
                instruction,
                source,
            } => {
                write!(f, "结构化提取失败 ({}): {}", instruction, source)
            }
            AutomationError::UnknownSession { session_id } => {
                write!(f, "未知会话ID: {} (调用方必须先创建会话)", session_id)
            }
        }
    }
}

impl std::error::Error for AutomationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AutomationError::NavigationFailed { source, .. }
            | AutomationError::ObserveFailed { source, .. }
            | AutomationError::ActFailed { source }
            | AutomationError::ExtractFailed { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

/// LLM 服务错误
#[derive(Debug)]
pub enum LlmError {
    /// API 调用失败
    ApiCallFailed {
        model: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 返回内容为空
    EmptyContent {
        model: String,
    },
    /// 响应解析失败
    ResponseParseFailed {
        response: String,
    },
}

impl fmt::Display for LlmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmError::ApiCallFailed { model, source } => {
                write!(f, "LLM API调用失败 (模型: {}): {}", model, source)
            }
            LlmError::EmptyContent { model } => {
                write!(f, "LLM返回内容为空 (模型: {})", model)
            }
            LlmError::ResponseParseFailed { response } => {
                write!(f, "无法解析LLM响应: {}", response)
            }
        }
    }
}

impl std::error::Error for LlmError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LlmError::ApiCallFailed { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

/// 配置错误
#[derive(Debug)]
pub enum ConfigError {
    /// 外部代理缺少 server 地址
    ///
    /// 调用方显式要求了外部代理但没有提供服务器地址，这是代理构建
    /// 唯一允许大声失败的情况
    ProxyServerMissing,
    /// 未知的后端类型
    UnknownProvider {
        provider: String,
    },
    /// 环境变量解析失败
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ProxyServerMissing => {
                write!(f, "外部代理配置缺少 server 地址")
            }
            ConfigError::UnknownProvider { provider } => {
                write!(f, "未知的后端类型: {}", provider)
            }
            ConfigError::EnvVarParseFailed {
                var_name,
                value,
                expected_type,
            } => {
                write!(
                    f,
                    "环境变量 {} 解析失败: 值 '{}' 无法转换为 {}",
                    var_name, value, expected_type
                )
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// 业务逻辑错误
#[derive(Debug)]
pub enum BusinessError {
    /// 请求文本为空
    EmptyRequestText,
    /// 未知的运行模式
    InvalidMode {
        mode: String,
    },
}

impl fmt::Display for BusinessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusinessError::EmptyRequestText => write!(f, "请求文本不能为空"),
            BusinessError::InvalidMode { mode } => {
                write!(f, "无法解析运行模式: {}", mode)
            }
        }
    }
}

impl std::error::Error for BusinessError {}

// ========== 从常见错误类型转换 ==========
// 注意：不需要手动实现 From<AppError> for anyhow::Error，
// 因为 anyhow 已经为所有实现了 std::error::Error 的类型提供了自动实现

impl From<chromiumoxide::error::CdpError> for AppError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        AppError::Automation(AutomationError::ActFailed {
            source: Box::new(err),
        })
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Other(format!("JSON解析失败: {}", err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Other(format!("IO错误: {}", err))
    }
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建"需要登录"错误
    pub fn authentication_required(debug_url: Option<String>) -> Self {
        AppError::Automation(AutomationError::AuthenticationRequired { debug_url })
    }

    /// 创建会话创建失败错误
    pub fn session_create_failed(
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Session(SessionError::CreateFailed {
            source: Box::new(source),
        })
    }

    /// 创建未知会话错误
    pub fn unknown_session(session_id: impl Into<String>) -> Self {
        AppError::Automation(AutomationError::UnknownSession {
            session_id: session_id.into(),
        })
    }

    /// 创建LLM API调用错误
    pub fn llm_api_failed(
        model: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Llm(LlmError::ApiCallFailed {
            model: model.into(),
            source: Box::new(source),
        })
    }

    /// 是否是"需要登录"错误
    pub fn is_authentication_required(&self) -> bool {
        matches!(
            self,
            AppError::Automation(AutomationError::AuthenticationRequired { .. })
        )
    }

    /// 提取"需要登录"错误携带的调试链接
    pub fn login_debug_url(&self) -> Option<&str> {
        match self {
            AppError::Automation(AutomationError::AuthenticationRequired {
                debug_url: Some(url),
            }) => Some(url.as_str()),
            _ => None,
        }
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authentication_required_is_distinguished() {
        let err = AppError::authentication_required(Some("https://debug.example/s1".to_string()));
        assert!(err.is_authentication_required());
        assert_eq!(err.login_debug_url(), Some("https://debug.example/s1"));

        let err = AppError::authentication_required(None);
        assert!(err.is_authentication_required());
        assert_eq!(err.login_debug_url(), None);
    }

    #[test]
    fn test_authentication_required_survives_anyhow() {
        // 认证错误经过 anyhow 包装后仍然可以被识别
        let err: anyhow::Error = AppError::authentication_required(None).into();
        let app_err = err.downcast_ref::<AppError>().expect("应该能还原 AppError");
        assert!(app_err.is_authentication_required());
    }

    #[test]
    fn test_unknown_session_message_names_id() {
        let err = AppError::unknown_session("sess-404");
        assert!(err.to_string().contains("sess-404"));
    }
}
