//! 代理配置构建 - 会话层
//!
//! 把声明式的代理配置翻译成会话创建接口消费的 payload，
//! 纯函数，无状态

use phf::phf_map;
use serde_json::{json, Value as JsonValue};
use tracing::warn;

use crate::error::{AppError, ConfigError};

/// 代理类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyKind {
    /// 平台内置代理（只支持地理位置选择）
    Browserbase,
    /// 自带代理（BYOP：服务器地址 + 可选凭据）
    External,
}

impl ProxyKind {
    /// 从配置字符串解析代理类型
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "browserbase" => Some(ProxyKind::Browserbase),
            "external" => Some(ProxyKind::External),
            _ => None,
        }
    }
}

/// 声明式代理配置
///
/// 是否启用是推导出来的，不单独存储：
/// - 外部代理：server 存在且开关不为 false 时启用
/// - 内置代理：country 存在且开关不为 false 时启用
#[derive(Debug, Clone, Default)]
pub struct ProxySettings {
    pub enabled: Option<bool>,
    pub kind: Option<ProxyKind>,
    pub server: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub country: Option<String>,
    pub session_id: Option<String>,
    pub session_lifetime: Option<String>,
}

impl ProxySettings {
    /// 从全局配置提取代理配置
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self {
            enabled: config.proxy_enabled,
            kind: config.proxy_type.as_deref().and_then(ProxyKind::parse),
            server: config.proxy_server.clone(),
            username: config.proxy_username.clone(),
            password: config.proxy_password.clone(),
            country: config.proxy_country.clone(),
            session_id: config.proxy_session_id.clone(),
            session_lifetime: config.proxy_session_lifetime.clone(),
        }
    }
}

/// 支持地理位置选择的国家代码表
static SUPPORTED_COUNTRIES: phf::Map<&'static str, &'static str> = phf_map! {
    "us" => "United States",
    "gb" => "United Kingdom",
    "ca" => "Canada",
    "au" => "Australia",
    "de" => "Germany",
    "fr" => "France",
    "es" => "Spain",
    "it" => "Italy",
    "nl" => "Netherlands",
    "se" => "Sweden",
    "no" => "Norway",
    "fi" => "Finland",
    "dk" => "Denmark",
    "pl" => "Poland",
    "pt" => "Portugal",
    "ie" => "Ireland",
    "ch" => "Switzerland",
    "at" => "Austria",
    "be" => "Belgium",
    "jp" => "Japan",
    "kr" => "South Korea",
    "sg" => "Singapore",
    "hk" => "Hong Kong",
    "in" => "India",
    "br" => "Brazil",
    "mx" => "Mexico",
    "cn" => "China",
    "tw" => "Taiwan",
};

/// 构建会话创建接口消费的代理 payload
///
/// # 返回
/// - `None`：代理未启用
/// - `Bool(true)`：启用了代理但没有指定类型和国家（通用代理标记）
/// - 单元素数组：external 或 browserbase 形状
///
/// 只有一种情况允许大声失败：调用方显式要求外部代理却没有给出
/// server 地址
pub fn build_proxy_payload(settings: &ProxySettings) -> Result<Option<JsonValue>, AppError> {
    // 显式关闭优先于一切
    if settings.enabled == Some(false) {
        return Ok(None);
    }

    match settings.kind {
        Some(ProxyKind::External) => {
            let server = settings
                .server
                .as_deref()
                .ok_or(AppError::Config(ConfigError::ProxyServerMissing))?;

            let mut entry = json!({
                "type": "external",
                "server": server,
            });
            if let Some(username) = &settings.username {
                entry["username"] = json!(username);
            }
            if let Some(password) = &settings.password {
                let sticky = build_iproyal_password(
                    password,
                    settings.country.as_deref(),
                    settings.session_id.as_deref(),
                    settings.session_lifetime.as_deref(),
                );
                entry["password"] = json!(sticky);
            }
            Ok(Some(json!([entry])))
        }
        Some(ProxyKind::Browserbase) | None => {
            if let Some(country) = &settings.country {
                let code = country.trim().to_lowercase();
                if !SUPPORTED_COUNTRIES.contains_key(code.as_str()) {
                    warn!("⚠️ 未知的国家代码: {}，仍按原样传递", country);
                }
                Ok(Some(json!([{
                    "type": "browserbase",
                    "geolocation": { "country": code.to_uppercase() },
                }])))
            } else if settings.enabled == Some(true) || settings.kind.is_some() {
                // 启用了代理但没有类型和国家，使用通用代理标记
                Ok(Some(JsonValue::Bool(true)))
            } else {
                Ok(None)
            }
        }
    }
}

/// 构建 IPRoyal 风格的会话粘性密码
///
/// 把国家、会话、存活期参数按固定分隔符格式嵌入密码字符串：
/// `password_country-<cc>_session-<id>_lifetime-<ttl>`
///
/// 幂等：密码里已经带任一参数标记时原样返回，重复构建结果不变
pub fn build_iproyal_password(
    password: &str,
    country: Option<&str>,
    session: Option<&str>,
    lifetime: Option<&str>,
) -> String {
    if password.contains("_country-")
        || password.contains("_session-")
        || password.contains("_lifetime-")
    {
        return password.to_string();
    }

    let mut result = password.to_string();
    if let Some(country) = country {
        result.push_str(&format!("_country-{}", country.trim().to_lowercase()));
    }
    if let Some(session) = session {
        result.push_str(&format!("_session-{}", session));
    }
    if let Some(lifetime) = lifetime {
        result.push_str(&format!("_lifetime-{}", lifetime));
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_external_without_server_fails_loudly() {
        let settings = ProxySettings {
            kind: Some(ProxyKind::External),
            ..Default::default()
        };
        let err = build_proxy_payload(&settings).unwrap_err();
        assert!(matches!(
            err,
            AppError::Config(ConfigError::ProxyServerMissing)
        ));
    }

    #[test]
    fn test_external_shape() {
        let settings = ProxySettings {
            kind: Some(ProxyKind::External),
            server: Some("http://proxy.example:8080".to_string()),
            username: Some("user".to_string()),
            password: Some("p".to_string()),
            country: Some("US".to_string()),
            ..Default::default()
        };
        let payload = build_proxy_payload(&settings).unwrap().unwrap();
        let entry = &payload.as_array().unwrap()[0];
        assert_eq!(entry["type"], "external");
        assert_eq!(entry["server"], "http://proxy.example:8080");
        assert_eq!(entry["password"], "p_country-us");
    }

    #[test]
    fn test_browserbase_geolocation_shape() {
        let settings = ProxySettings {
            country: Some("gb".to_string()),
            ..Default::default()
        };
        let payload = build_proxy_payload(&settings).unwrap().unwrap();
        let entry = &payload.as_array().unwrap()[0];
        assert_eq!(entry["type"], "browserbase");
        assert_eq!(entry["geolocation"]["country"], "GB");
    }

    #[test]
    fn test_generic_marker_when_enabled_without_details() {
        let settings = ProxySettings {
            enabled: Some(true),
            ..Default::default()
        };
        let payload = build_proxy_payload(&settings).unwrap().unwrap();
        assert_eq!(payload, JsonValue::Bool(true));
    }

    #[test]
    fn test_disabled_returns_none() {
        // 什么都没配置：未启用
        let payload = build_proxy_payload(&ProxySettings::default()).unwrap();
        assert!(payload.is_none());

        // 显式关闭压过已配置的国家
        let settings = ProxySettings {
            enabled: Some(false),
            country: Some("us".to_string()),
            ..Default::default()
        };
        assert!(build_proxy_payload(&settings).unwrap().is_none());
    }

    #[test]
    fn test_iproyal_password_country_only() {
        assert_eq!(
            build_iproyal_password("p", Some("US"), None, None),
            "p_country-us"
        );
    }

    #[test]
    fn test_iproyal_password_full_options() {
        assert_eq!(
            build_iproyal_password("p", Some("GB"), Some("xyz98765"), Some("1h")),
            "p_country-gb_session-xyz98765_lifetime-1h"
        );
    }

    #[test]
    fn test_iproyal_password_idempotent() {
        let once = build_iproyal_password("p", Some("US"), Some("abc"), None);
        let twice = build_iproyal_password(&once, Some("US"), Some("abc"), None);
        assert_eq!(once, twice);

        // 带任一标记的密码原样返回
        assert_eq!(
            build_iproyal_password("p_lifetime-24h", Some("US"), None, None),
            "p_lifetime-24h"
        );
    }

    #[test]
    fn test_iproyal_password_no_options() {
        assert_eq!(build_iproyal_password("p", None, None, None), "p");
    }
}
