//! Payload 定义 - 三种线上消息格式
//!
//! | 变体 | 端点 | 编码 |
//! |------|------|------|
//! | [`PushPayload`] | `/v1/git/{token}` | 表单字段 `payload` |
//! | [`MessagePayload`] | `/v1/messages/team_inbox/{token}` | JSON |
//! | [`IssuePayload`] | `/v1/jira/{token}` | JSON |
//!
//! 目标 flow 不属于 payload 本身，由外层 [`Notification`] 携带，只用于路由。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::sanitize::{sanitize, sanitize_tags};
use crate::graph::{CommitRange, CommitRecord};
use crate::host::{Identity, HOST_NAME};

/// 线上编码方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireEncoding {
    /// `application/x-www-form-urlencoded`，单个 `payload` 字段装 JSON
    Form,
    /// `application/json`
    Json,
}

/// 日期格式：`yyyy-MM-ddTHH:mm:ssZ`（UTC，秒级）
pub mod gmt_date {
    use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

    pub fn serialize<S: Serializer>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&date.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let s = String::deserialize(deserializer)?;
        let naive = NaiveDateTime::parse_from_str(&s, FORMAT).map_err(serde::de::Error::custom)?;
        Ok(Utc.from_utc_datetime(&naive))
    }
}

// ============================================================================
// Push
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushRepository {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushCommit {
    pub id: String,
    pub url: String,
    pub author: Identity,
    #[serde(with = "gmt_date")]
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub removed: Vec<String>,
}

impl PushCommit {
    pub fn from_record(record: &CommitRecord, url: String) -> Self {
        Self {
            id: record.id.clone(),
            url,
            author: record.author.clone(),
            timestamp: record.timestamp,
            message: record.message.trim().to_string(),
            added: record.added.clone(),
            modified: record.modified.clone(),
            removed: record.removed.clone(),
        }
    }
}

/// push 通知
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushPayload {
    #[serde(rename = "compare")]
    pub compare_url: String,
    pub before: String,
    pub after: String,
    #[serde(rename = "ref")]
    pub reference: String,
    pub ref_name: String,
    pub repository: PushRepository,
    pub pusher: Identity,
    /// 展示用提交列表（有上限）
    pub commits: Vec<PushCommit>,
    /// 提交总数（不受上限影响）
    pub size: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl PushPayload {
    /// `name` 去掉末尾的 `.git`
    pub fn new(repository: &str, repository_url: impl Into<String>, pusher: Identity) -> Self {
        Self {
            compare_url: String::new(),
            before: String::new(),
            after: String::new(),
            reference: String::new(),
            ref_name: String::new(),
            repository: PushRepository {
                name: strip_dot_git(repository).to_string(),
                url: repository_url.into(),
            },
            pusher,
            commits: Vec::new(),
            size: 0,
            tags: Vec::new(),
        }
    }

    pub fn with_ref(mut self, reference: impl Into<String>) -> Self {
        let reference = reference.into();
        self.ref_name = shorten_ref_name(&reference).to_string();
        self.reference = reference;
        self
    }

    pub fn with_ids(mut self, before: impl Into<String>, after: impl Into<String>) -> Self {
        self.before = before.into();
        self.after = after.into();
        self
    }

    pub fn with_compare_url(mut self, url: impl Into<String>) -> Self {
        self.compare_url = url.into();
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.tags = sanitize_tags(tags);
        self
    }

    /// 设置提交列表：只保留前 `max` 个，`size` 记录总数
    pub fn with_commits<F>(mut self, range: &CommitRange, max: usize, commit_url: F) -> Self
    where
        F: Fn(&str) -> String,
    {
        self.size = range.total();
        self.commits = range
            .visible(max)
            .iter()
            .map(|c| PushCommit::from_record(c, commit_url(&c.id)))
            .collect();
        self
    }
}

// ============================================================================
// Team inbox message
// ============================================================================

/// 通用消息（team inbox）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagePayload {
    pub source: String,
    pub subject: String,
    pub content: String,
    pub from_name: Option<String>,
    pub from_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

impl MessagePayload {
    pub fn new(subject: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            source: HOST_NAME.to_string(),
            subject: subject.into(),
            content: content.into(),
            from_name: None,
            from_address: None,
            reply_to: None,
            project: None,
            tags: Vec::new(),
            link: None,
        }
    }

    pub fn with_from(mut self, from: &Identity) -> Self {
        self.from_name = Some(from.name.clone());
        self.from_address = from.email.clone();
        self
    }

    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }

    pub fn with_source(mut self, source: &str) -> Self {
        self.source = sanitize(source);
        self
    }

    pub fn with_project(mut self, project: &str) -> Self {
        self.project = Some(sanitize(project)).filter(|p| !p.is_empty());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.tags = sanitize_tags(tags);
        self
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }
}

// ============================================================================
// Issue tracker
// ============================================================================

/// issue 事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueEventType {
    Create,
    Comment,
    Assign,
    Reopen,
    Resolve,
    Close,
    Update,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Changelog {
    pub field: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

/// issue tracker 格式的工单通知
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssuePayload {
    #[serde(rename = "issue_key")]
    pub id: String,
    #[serde(rename = "issue_summary")]
    pub title: String,
    #[serde(rename = "issue_description")]
    pub description: Option<String>,
    #[serde(rename = "issue_status")]
    pub status: String,
    #[serde(rename = "issue_resolution")]
    pub resolution: Option<String>,
    #[serde(rename = "issue_type")]
    pub issue_type: String,
    #[serde(rename = "project_name")]
    pub project: String,
    #[serde(rename = "issue_votes")]
    pub votes: String,
    #[serde(rename = "issue_reporter_name")]
    pub reporter_name: String,
    #[serde(rename = "issue_reporter_email")]
    pub reporter_email: Option<String>,
    #[serde(rename = "issue_assignee_name")]
    pub assignee_name: Option<String>,
    #[serde(rename = "issue_assignee_email")]
    pub assignee_email: Option<String>,
    #[serde(rename = "user_name")]
    pub updater_name: String,
    #[serde(rename = "user_email")]
    pub updater_email: Option<String>,
    pub event_type: IssueEventType,
    #[serde(rename = "comment_body")]
    pub comment: Option<String>,
    #[serde(rename = "issue_url")]
    pub url: String,
    pub project_url: String,
    #[serde(rename = "issue_changelog", default, skip_serializing_if = "Vec::is_empty")]
    pub changelog: Vec<Changelog>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

// ============================================================================
// Envelope
// ============================================================================

/// 线上 payload
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    Push(PushPayload),
    Message(MessagePayload),
    Issue(IssuePayload),
}

impl Payload {
    /// 变体名（日志用）
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Push(_) => "push",
            Payload::Message(_) => "message",
            Payload::Issue(_) => "issue",
        }
    }

    pub fn encoding(&self) -> WireEncoding {
        match self {
            Payload::Push(_) => WireEncoding::Form,
            Payload::Message(_) | Payload::Issue(_) => WireEncoding::Json,
        }
    }

    /// 端点 URL，token 嵌在路径里
    pub fn endpoint(&self, api_url: &str, token: &str) -> String {
        let base = api_url.trim_end_matches('/');
        match self {
            Payload::Push(_) => format!("{}/v1/git/{}", base, token),
            Payload::Message(_) => format!("{}/v1/messages/team_inbox/{}", base, token),
            Payload::Issue(_) => format!("{}/v1/jira/{}", base, token),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl From<PushPayload> for Payload {
    fn from(p: PushPayload) -> Self {
        Payload::Push(p)
    }
}

impl From<MessagePayload> for Payload {
    fn from(p: MessagePayload) -> Self {
        Payload::Message(p)
    }
}

impl From<IssuePayload> for Payload {
    fn from(p: IssuePayload) -> Self {
        Payload::Issue(p)
    }
}

/// 一条待发送的通知：payload + 目标 flow
///
/// flow 为空表示默认 flow，发送前由路由器换成 token，从不上线。
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub flow: Option<String>,
    pub payload: Payload,
}

impl Notification {
    pub fn new(payload: impl Into<Payload>) -> Self {
        Self {
            flow: None,
            payload: payload.into(),
        }
    }

    pub fn with_flow(mut self, flow: impl Into<String>) -> Self {
        self.flow = Some(flow.into()).filter(|f: &String| !f.is_empty());
        self
    }

    /// 只在调用方没指定 flow 时设置
    pub fn with_default_flow(mut self, flow: impl Into<String>) -> Self {
        if self.flow.is_none() {
            self = self.with_flow(flow);
        }
        self
    }

    pub fn flow(&self) -> Option<&str> {
        self.flow.as_deref()
    }
}

/// 去掉仓库名末尾的 `.git`
pub fn strip_dot_git(name: &str) -> &str {
    name.strip_suffix(".git").unwrap_or(name)
}

/// `refs/heads/main` -> `main`，`refs/tags/v1` -> `v1`
pub fn shorten_ref_name(reference: &str) -> &str {
    ["refs/heads/", "refs/tags/", "refs/remotes/"]
        .iter()
        .find_map(|prefix| reference.strip_prefix(prefix))
        .unwrap_or(reference)
}
