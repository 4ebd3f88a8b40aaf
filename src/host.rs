//! 宿主协作者接口
//!
//! 通知管道嵌入在版本控制服务器中运行，用户、仓库、富文本渲染都由宿主提供。
//! 这里只定义核心消费的接口和数据结构，不重新实现它们。

use crate::config::Settings;
use crate::error::GraphError;
use crate::graph::RevisionGraph;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// 宿主产品名（payload 的 source 字段）
pub const HOST_NAME: &str = "Gitblit";

/// 用户身份（显示名 + 邮箱）
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Identity {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Identity {
    pub fn new(name: impl Into<String>, email: Option<String>) -> Self {
        Self {
            name: name.into(),
            email,
        }
    }

    /// 解析 `Name <email>` 形式
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        match (value.find('<'), value.rfind('>')) {
            (Some(start), Some(end)) if start < end => {
                let name = value[..start].trim();
                let email = value[start + 1..end].trim();
                Self::new(
                    if name.is_empty() { email } else { name },
                    Some(email.to_string()).filter(|e| !e.is_empty()),
                )
            }
            _ => Self::new(value, None),
        }
    }
}

/// 宿主用户
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserModel {
    pub username: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
}

impl UserModel {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            display_name: None,
            email: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// 显示名，缺省时回退到用户名
    pub fn display_name(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.username)
    }

    pub fn identity(&self) -> Identity {
        Identity::new(self.display_name(), self.email.clone())
    }
}

/// 宿主仓库
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryModel {
    /// 仓库名，如 `team/app.git`
    pub name: String,
    /// 所属项目路径，如 `team`；根目录仓库为空
    pub project_path: String,
    /// 是否个人仓库（`~user/xxx.git`）
    pub personal: bool,
}

impl RepositoryModel {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let project_path = name
            .rsplit_once('/')
            .map(|(p, _)| p.to_string())
            .unwrap_or_default();
        let personal = name.starts_with('~');
        Self {
            name,
            project_path,
            personal,
        }
    }

    pub fn is_personal(&self) -> bool {
        self.personal
    }
}

/// 用户目录
pub trait UserDirectory: Send + Sync {
    fn user(&self, username: &str) -> Option<UserModel>;

    /// 用户名对应的显示名，查不到时原样返回
    fn display_name(&self, username: &str) -> String {
        if username.is_empty() {
            return String::new();
        }
        self.user(username)
            .map(|u| u.display_name().to_string())
            .unwrap_or_else(|| username.to_string())
    }

    /// 用户名对应的身份，查不到时只有名字
    fn identity(&self, username: &str) -> Identity {
        self.user(username)
            .map(|u| u.identity())
            .unwrap_or_else(|| Identity::new(username, None))
    }
}

/// 仓库目录
pub trait RepositoryDirectory: Send + Sync {
    fn repository(&self, name: &str) -> Option<RepositoryModel>;

    /// 打开仓库的提交图（每次调用打开，用完即释放）
    fn open_graph(&self, name: &str) -> Result<Box<dyn RevisionGraph>, GraphError>;
}

/// 富文本渲染（Markdown 与 issue 引用链接），均限定在某个仓库内
pub trait RichTextRenderer: Send + Sync {
    fn markdown_to_html(&self, markdown: &str, repository: &str) -> String;

    fn link_issue_refs(&self, text: &str, repository: &str) -> String;
}

/// 宿主上下文 - 核心需要的全部协作者
#[derive(Clone)]
pub struct HostContext {
    pub settings: Arc<dyn Settings>,
    pub users: Arc<dyn UserDirectory>,
    pub repositories: Arc<dyn RepositoryDirectory>,
    pub renderer: Arc<dyn RichTextRenderer>,
}

impl HostContext {
    pub fn new(
        settings: Arc<dyn Settings>,
        users: Arc<dyn UserDirectory>,
        repositories: Arc<dyn RepositoryDirectory>,
        renderer: Arc<dyn RichTextRenderer>,
    ) -> Self {
        Self {
            settings,
            users,
            repositories,
            renderer,
        }
    }

    /// 仓库模型，目录中没有时按名字推导
    pub fn repository(&self, name: &str) -> RepositoryModel {
        self.repositories
            .repository(name)
            .unwrap_or_else(|| RepositoryModel::new(name))
    }
}

/// 进程内用户目录
#[derive(Debug, Clone, Default)]
pub struct StaticUsers {
    users: HashMap<String, UserModel>,
}

impl StaticUsers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, user: UserModel) -> Self {
        self.users.insert(user.username.clone(), user);
        self
    }
}

impl UserDirectory for StaticUsers {
    fn user(&self, username: &str) -> Option<UserModel> {
        self.users.get(username).cloned()
    }
}

/// 基础渲染器
///
/// 宿主没有注入自己的渲染器时使用。它不是 Markdown 渲染器：只做空行分段、
/// 段内换行转 `<br/>`，`**bold**`、列表、代码块等语法原样输出，内联 HTML 也原样保留。
/// 另外按配置的正则把 issue 引用改写成链接。需要完整 Markdown 的宿主应注入自己的
/// [`RichTextRenderer`]。
pub struct BasicRenderer {
    issue_pattern: Option<Regex>,
    issue_url: String,
}

impl BasicRenderer {
    pub fn new() -> Self {
        Self {
            issue_pattern: None,
            issue_url: String::new(),
        }
    }

    /// 设置 issue 引用规则，`url` 中的 `%BUGID%` 替换为第一个捕获组
    pub fn with_issue_links(mut self, pattern: &str, url: impl Into<String>) -> Self {
        match Regex::new(pattern) {
            Ok(re) => {
                self.issue_pattern = Some(re);
                self.issue_url = url.into();
            }
            Err(e) => warn!(pattern, error = %e, "Ignoring invalid issue reference pattern"),
        }
        self
    }
}

impl Default for BasicRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl RichTextRenderer for BasicRenderer {
    fn markdown_to_html(&self, markdown: &str, _repository: &str) -> String {
        markdown
            .split("\n\n")
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| format!("<p>{}</p>", p.replace('\n', "<br/>")))
            .collect()
    }

    fn link_issue_refs(&self, text: &str, _repository: &str) -> String {
        let Some(re) = &self.issue_pattern else {
            return text.to_string();
        };
        re.replace_all(text, |caps: &regex::Captures| {
            let id = caps.get(1).or_else(|| caps.get(0)).map_or("", |m| m.as_str());
            format!(
                "<a href=\"{}\">{}</a>",
                self.issue_url.replace("%BUGID%", id),
                &caps[0]
            )
        })
        .into_owned()
    }
}

/// HTML 转义
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
