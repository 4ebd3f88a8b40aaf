//! Flowdock HTTP 传输
//!
//! 一次投递：路由取 token → 序列化 → 按变体选择编码 → POST。
//! 只有 200 视为成功，成功时不读响应体；其余状态读出完整响应体，
//! 连同请求 JSON 记一条 warn 日志后放进错误。

use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, StatusCode};
use tracing::{debug, info, warn};

use super::payload::{Notification, WireEncoding};
use super::router::Router;
use crate::config::{
    Settings, DEFAULT_API_URL, DEFAULT_TIMEOUT_SECS, SETTING_API_URL, SETTING_CONNECT_TIMEOUT,
    SETTING_READ_TIMEOUT,
};
use crate::error::DeliveryError;

/// 传输配置
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// API 根地址 (如 https://api.flowdock.com)
    pub api_url: String,
    /// 连接超时 (秒)
    pub connect_timeout_secs: u64,
    /// 读超时 (秒)
    pub read_timeout_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            connect_timeout_secs: DEFAULT_TIMEOUT_SECS,
            read_timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl TransportConfig {
    pub fn from_settings(settings: &dyn Settings) -> Self {
        let timeout = |key: &str| {
            u64::try_from(settings.get_int(key, DEFAULT_TIMEOUT_SECS as i64))
                .ok()
                .filter(|secs| *secs > 0)
                .unwrap_or(DEFAULT_TIMEOUT_SECS)
        };
        Self {
            api_url: settings
                .get_non_empty(SETTING_API_URL)
                .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            connect_timeout_secs: timeout(SETTING_CONNECT_TIMEOUT),
            read_timeout_secs: timeout(SETTING_READ_TIMEOUT),
        }
    }
}

/// Flowdock 客户端
#[derive(Clone)]
pub struct FlowdockTransport {
    client: Client,
    router: Router,
    config: TransportConfig,
}

impl FlowdockTransport {
    pub fn new(config: TransportConfig, router: Router) -> Result<Self, DeliveryError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .read_timeout(Duration::from_secs(config.read_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            router,
            config,
        })
    }

    pub fn from_settings(settings: std::sync::Arc<dyn Settings>) -> Result<Self, DeliveryError> {
        let config = TransportConfig::from_settings(settings.as_ref());
        Self::new(config, Router::new(settings))
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// 投递一条通知
    pub async fn deliver(&self, notification: &Notification) -> Result<(), DeliveryError> {
        let route = self.router.resolve(notification.flow())?;
        let payload = &notification.payload;
        let url = payload.endpoint(&self.config.api_url, &route.token);
        let json = payload.to_json()?;

        debug!(kind = payload.kind(), flow = ?route.flow, "Posting notification");

        let request = self
            .client
            .post(&url)
            .header(USER_AGENT, user_agent())
            .header(ACCEPT, "application/json");

        let request = match payload.encoding() {
            WireEncoding::Form => request.form(&[("payload", json.as_str())]),
            WireEncoding::Json => request
                .header(CONTENT_TYPE, "application/json; charset=utf-8")
                .body(json.clone()),
        };

        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::OK {
            info!(kind = payload.kind(), flow = ?route.flow, "Notification delivered");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        warn!(
            kind = payload.kind(),
            flow = ?route.flow,
            status = status.as_u16(),
            response = %body,
            payload = %json,
            "Flowdock rejected notification"
        );
        Err(DeliveryError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

fn user_agent() -> String {
    format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemorySettings;

    #[test]
    fn test_config_defaults() {
        let config = TransportConfig::from_settings(&MemorySettings::new());
        assert_eq!(config.api_url, "https://api.flowdock.com");
        assert_eq!(config.connect_timeout_secs, 5);
        assert_eq!(config.read_timeout_secs, 5);
    }

    #[test]
    fn test_config_from_settings() {
        let settings = MemorySettings::new()
            .with(SETTING_API_URL, "http://127.0.0.1:9000")
            .with(SETTING_CONNECT_TIMEOUT, "2")
            .with(SETTING_READ_TIMEOUT, "-1");
        let config = TransportConfig::from_settings(&settings);
        assert_eq!(config.api_url, "http://127.0.0.1:9000");
        assert_eq!(config.connect_timeout_secs, 2);
        // 非法值回退到默认
        assert_eq!(config.read_timeout_secs, 5);
    }

    #[test]
    fn test_user_agent() {
        assert!(user_agent().starts_with("flowdock-notify/"));
    }
}
