//! 配置 - 设置键与设置存储
//!
//! 核心只通过 [`Settings`] trait 读取配置（宿主的设置存储是外部协作者）。
//! 这里提供两种实现：
//! 1. [`MemorySettings`] - 进程内 map，宿主嵌入和测试使用
//! 2. [`PropertiesSettings`] - `key = value` 文件（gitblit.properties 风格），CLI 使用

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const SETTING_DEFAULT_TOKEN: &str = "flowdock.defaultToken";
pub const SETTING_FIXED_COMMIT_TAGS: &str = "flowdock.fixedCommitTags";
pub const SETTING_FIXED_TICKET_TAGS: &str = "flowdock.fixedTicketTags";
pub const SETTING_USE_PROJECT_FLOWS: &str = "flowdock.useProjectFlows";
pub const SETTING_POST_PERSONAL_REPOS: &str = "flowdock.postPersonalRepos";
pub const SETTING_POST_TICKETS: &str = "flowdock.postTickets";
pub const SETTING_POST_TICKET_COMMENTS: &str = "flowdock.postTicketComments";
pub const SETTING_POST_BRANCHES: &str = "flowdock.postBranches";
pub const SETTING_POST_TAGS: &str = "flowdock.postTags";
pub const SETTING_TICKET_GENERATOR: &str = "flowdock.ticketPayloadGenerator";
pub const SETTING_MAX_COMMITS: &str = "flowdock.maxCommits";
pub const SETTING_API_URL: &str = "flowdock.apiUrl";
pub const SETTING_CONNECT_TIMEOUT: &str = "flowdock.connectTimeout";
pub const SETTING_READ_TIMEOUT: &str = "flowdock.readTimeout";
pub const SETTING_NEW_TICKET_EXCLUSIONS: &str = "flowdock.newTicketFieldExclusions";
pub const SETTING_UPDATE_TICKET_EXCLUSIONS: &str = "flowdock.updateTicketFieldExclusions";

/// 宿主自身的设置键
pub const SETTING_CANONICAL_URL: &str = "web.canonicalUrl";
pub const SETTING_SHORT_COMMIT_ID_LENGTH: &str = "web.shortCommitIdLength";

pub const DEFAULT_API_URL: &str = "https://api.flowdock.com";
pub const DEFAULT_CANONICAL_URL: &str = "https://localhost:8443";
pub const DEFAULT_MAX_COMMITS: usize = 20;
pub const DEFAULT_TIMEOUT_SECS: u64 = 5;

/// 每个 flow 的 token 键：`flowdock.<flow>.token`
pub fn flow_token_key(flow: &str) -> String {
    format!("flowdock.{}.token", flow)
}

/// 宿主设置存储（只读）
pub trait Settings: Send + Sync {
    fn get_string(&self, key: &str) -> Option<String>;

    fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get_string(key) {
            Some(v) => match v.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => true,
                "false" | "no" | "off" | "0" => false,
                _ => default,
            },
            None => default,
        }
    }

    fn get_int(&self, key: &str, default: i64) -> i64 {
        self.get_string(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    /// 列表值以空白或逗号分隔
    fn get_strings(&self, key: &str) -> Vec<String> {
        self.get_string(key)
            .map(|v| split_list(&v))
            .unwrap_or_default()
    }

    /// 非空字符串，空值视为未设置
    fn get_non_empty(&self, key: &str) -> Option<String> {
        self.get_string(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// 进程内设置
#[derive(Debug, Clone, Default)]
pub struct MemorySettings {
    values: HashMap<String, String>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// 链式设置
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }
}

impl Settings for MemorySettings {
    fn get_string(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

/// properties 文件设置
#[derive(Debug, Clone, Default)]
pub struct PropertiesSettings {
    path: Option<PathBuf>,
    values: HashMap<String, String>,
}

impl PropertiesSettings {
    /// 默认配置文件路径：~/.config/flowdock-notify/flowdock.properties
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("flowdock-notify")
            .join("flowdock.properties")
    }

    /// 从文件加载
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings from {}", path.display()))?;
        let mut settings = Self::parse(&content);
        settings.path = Some(path.to_path_buf());
        debug!(path = %path.display(), keys = settings.values.len(), "Loaded settings");
        Ok(settings)
    }

    /// 加载默认文件，不存在时返回空设置
    pub fn load_default() -> Result<Self> {
        let path = Self::default_path();
        if !path.exists() {
            debug!(path = %path.display(), "No settings file, using defaults");
            return Ok(Self::default());
        }
        Self::load(&path)
    }

    /// 解析 properties 文本
    ///
    /// 支持 `key = value` 与 `key: value`，`#` / `!` 开头为注释，
    /// 行尾 `\` 续行。
    pub fn parse(content: &str) -> Self {
        let mut values = HashMap::new();
        let mut pending = String::new();

        for raw in content.lines() {
            let line = raw.trim_start();
            if pending.is_empty() && (line.is_empty() || line.starts_with('#') || line.starts_with('!')) {
                continue;
            }

            if let Some(stripped) = line.strip_suffix('\\') {
                pending.push_str(stripped);
                continue;
            }
            pending.push_str(line);

            let entry = std::mem::take(&mut pending);
            if let Some(idx) = entry.find(['=', ':']) {
                let key = entry[..idx].trim();
                let value = entry[idx + 1..].trim();
                if !key.is_empty() {
                    values.insert(key.to_string(), value.to_string());
                }
            }
        }

        Self { path: None, values }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl Settings for PropertiesSettings {
    fn get_string(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_flow_token_key() {
        assert_eq!(flow_token_key("acme"), "flowdock.acme.token");
    }

    #[test]
    fn test_memory_settings_defaults() {
        let settings = MemorySettings::new().with(SETTING_POST_TAGS, "false");
        assert!(!settings.get_bool(SETTING_POST_TAGS, true));
        assert!(settings.get_bool(SETTING_POST_BRANCHES, true));
        assert_eq!(settings.get_int(SETTING_MAX_COMMITS, 20), 20);
        assert!(settings.get_strings(SETTING_FIXED_COMMIT_TAGS).is_empty());
    }

    #[test]
    fn test_unparseable_bool_falls_back() {
        let settings = MemorySettings::new().with(SETTING_POST_TICKETS, "maybe");
        assert!(settings.get_bool(SETTING_POST_TICKETS, true));
    }

    #[test]
    fn test_get_strings_splits_on_space_and_comma() {
        let settings = MemorySettings::new().with(SETTING_FIXED_TICKET_TAGS, "gitblit, tickets  ops");
        assert_eq!(
            settings.get_strings(SETTING_FIXED_TICKET_TAGS),
            vec!["gitblit", "tickets", "ops"]
        );
    }

    #[test]
    fn test_get_non_empty() {
        let settings = MemorySettings::new().with(SETTING_DEFAULT_TOKEN, "  ");
        assert_eq!(settings.get_non_empty(SETTING_DEFAULT_TOKEN), None);
    }

    #[test]
    fn test_parse_properties() {
        let settings = PropertiesSettings::parse(
            "# comment\n\
             ! also a comment\n\
             flowdock.defaultToken = T0\n\
             flowdock.acme.token: T1\n\
             flowdock.fixedCommitTags = a \\\n    b\n",
        );
        assert_eq!(settings.get_string(SETTING_DEFAULT_TOKEN), Some("T0".to_string()));
        assert_eq!(settings.get_string("flowdock.acme.token"), Some("T1".to_string()));
        assert_eq!(settings.get_strings(SETTING_FIXED_COMMIT_TAGS), vec!["a", "b"]);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "flowdock.postTags = false").unwrap();

        let settings = PropertiesSettings::load(file.path()).unwrap();
        assert!(!settings.get_bool(SETTING_POST_TAGS, true));
        assert_eq!(settings.path(), Some(file.path()));
    }

    #[test]
    fn test_load_missing_file_fails() {
        let result = PropertiesSettings::load(Path::new("/nonexistent/flowdock.properties"));
        assert!(result.is_err());
    }
}
