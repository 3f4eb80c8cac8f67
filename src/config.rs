/// 程序配置文件
#[derive(Clone, Debug)]
pub struct Config {
    /// 打分后端类型（automation / agent）
    pub provider: String,
    /// 请求文件路径（TOML）
    pub request_file: String,
    /// 目标应用地址
    pub target_app_url: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 输出日志文件
    pub output_log_file: String,
    // --- 远程会话 API 配置 ---
    pub session_api_base_url: String,
    pub session_api_key: String,
    pub session_project_id: String,
    // --- 自动化 API 配置 ---
    pub automation_api_base_url: String,
    pub automation_model_name: String,
    /// 单次自动化调用的最大时长（秒）
    pub task_timeout_secs: u64,
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    // --- 代理配置 ---
    pub proxy_enabled: Option<bool>,
    pub proxy_type: Option<String>,
    pub proxy_server: Option<String>,
    pub proxy_username: Option<String>,
    pub proxy_password: Option<String>,
    pub proxy_country: Option<String>,
    pub proxy_session_id: Option<String>,
    pub proxy_session_lifetime: Option<String>,
    // --- 隐身配置 ---
    pub block_ads: Option<bool>,
    pub solve_captchas: Option<bool>,
    pub advanced_stealth: Option<bool>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: "automation".to_string(),
            request_file: "request.toml".to_string(),
            target_app_url: "https://app.grammarly.com".to_string(),
            verbose_logging: false,
            output_log_file: "output.txt".to_string(),
            session_api_base_url: "https://api.browserbase.com/v1".to_string(),
            session_api_key: String::new(),
            session_project_id: String::new(),
            automation_api_base_url: "http://localhost:3106/api/v1".to_string(),
            automation_model_name: "gpt-4o".to_string(),
            task_timeout_secs: 120,
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.openai.com/v1".to_string(),
            llm_model_name: "gpt-4o".to_string(),
            proxy_enabled: None,
            proxy_type: None,
            proxy_server: None,
            proxy_username: None,
            proxy_password: None,
            proxy_country: None,
            proxy_session_id: None,
            proxy_session_lifetime: None,
            block_ads: None,
            solve_captchas: None,
            advanced_stealth: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            provider: std::env::var("SCORE_PROVIDER").unwrap_or(default.provider),
            request_file: std::env::var("REQUEST_FILE").unwrap_or(default.request_file),
            target_app_url: std::env::var("TARGET_APP_URL").unwrap_or(default.target_app_url),
            verbose_logging: std::env::var("VERBOSE_LOGGING").ok().and_then(|v| v.parse().ok()).unwrap_or(default.verbose_logging),
            output_log_file: std::env::var("OUTPUT_LOG_FILE").unwrap_or(default.output_log_file),
            session_api_base_url: std::env::var("SESSION_API_BASE_URL").unwrap_or(default.session_api_base_url),
            session_api_key: std::env::var("SESSION_API_KEY").unwrap_or(default.session_api_key),
            session_project_id: std::env::var("SESSION_PROJECT_ID").unwrap_or(default.session_project_id),
            automation_api_base_url: std::env::var("AUTOMATION_API_BASE_URL").unwrap_or(default.automation_api_base_url),
            automation_model_name: std::env::var("AUTOMATION_MODEL_NAME").unwrap_or(default.automation_model_name),
            task_timeout_secs: std::env::var("TASK_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.task_timeout_secs),
            llm_api_key: std::env::var("LLM_API_KEY").unwrap_or(default.llm_api_key),
            llm_api_base_url: std::env::var("LLM_API_BASE_URL").unwrap_or(default.llm_api_base_url),
            llm_model_name: std::env::var("LLM_MODEL_NAME").unwrap_or(default.llm_model_name),
            proxy_enabled: std::env::var("PROXY_ENABLED").ok().and_then(|v| v.parse().ok()),
            proxy_type: std::env::var("PROXY_TYPE").ok(),
            proxy_server: std::env::var("PROXY_SERVER").ok(),
            proxy_username: std::env::var("PROXY_USERNAME").ok(),
            proxy_password: std::env::var("PROXY_PASSWORD").ok(),
            proxy_country: std::env::var("PROXY_COUNTRY").ok(),
            proxy_session_id: std::env::var("PROXY_SESSION_ID").ok(),
            proxy_session_lifetime: std::env::var("PROXY_SESSION_LIFETIME").ok(),
            block_ads: std::env::var("BLOCK_ADS").ok().and_then(|v| v.parse().ok()),
            solve_captchas: std::env::var("SOLVE_CAPTCHAS").ok().and_then(|v| v.parse().ok()),
            advanced_stealth: std::env::var("ADVANCED_STEALTH").ok().and_then(|v| v.parse().ok()),
        }
    }
}
