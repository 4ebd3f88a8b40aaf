//! 工单 payload 生成器
//!
//! 由 `flowdock.ticketPayloadGenerator` 选择：
//! - `email`（默认）：分类后渲染成 HTML team inbox 消息
//! - `jira`：issue tracker 格式，每次更新都发送
//!
//! 未知名称告警并回退到 `email`。

use tracing::warn;

use super::classifier::{classify_new, classify_update};
use super::links::LinkBuilder;
use super::payload::{strip_dot_git, Changelog, IssueEventType, IssuePayload, Payload};
use super::render::TicketRenderer;
use super::sanitize::sanitize_tags;
use crate::config::{Settings, SETTING_TICKET_GENERATOR};
use crate::host::HostContext;
use crate::ticket::{Change, Field, Status, Ticket};

/// 工单 payload 生成器
pub trait TicketPayloadGenerator: Send + Sync {
    fn name(&self) -> &'static str;

    /// 新建工单，`None` 表示不发送
    fn generate_new(&self, host: &HostContext, ticket: &Ticket) -> Option<Payload>;

    /// 工单更新，`None` 表示不发送
    fn generate_update(&self, host: &HostContext, ticket: &Ticket, change: &Change) -> Option<Payload>;
}

/// 生成器种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GeneratorKind {
    #[default]
    Email,
    IssueTracker,
}

impl GeneratorKind {
    /// 按配置名选择，未知名称回退到 `Email`
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "" | "email" => GeneratorKind::Email,
            "jira" | "issue" => GeneratorKind::IssueTracker,
            other => {
                warn!(generator = other, "Unknown ticket payload generator, using email");
                GeneratorKind::Email
            }
        }
    }

    pub fn from_settings(settings: &dyn Settings) -> Self {
        settings
            .get_non_empty(SETTING_TICKET_GENERATOR)
            .map(|name| Self::from_name(&name))
            .unwrap_or_default()
    }

    pub fn generator(self) -> Box<dyn TicketPayloadGenerator> {
        match self {
            GeneratorKind::Email => Box::new(EmailGenerator),
            GeneratorKind::IssueTracker => Box::new(IssueTrackerGenerator),
        }
    }
}

/// HTML 消息生成器
pub struct EmailGenerator;

impl TicketPayloadGenerator for EmailGenerator {
    fn name(&self) -> &'static str {
        "email"
    }

    fn generate_new(&self, host: &HostContext, ticket: &Ticket) -> Option<Payload> {
        let renderer = TicketRenderer::new(host);
        let event = classify_new(ticket);
        renderer.render_new(ticket, &event).map(Payload::from)
    }

    fn generate_update(&self, host: &HostContext, ticket: &Ticket, change: &Change) -> Option<Payload> {
        let renderer = TicketRenderer::new(host);
        let event = classify_update(ticket, change, renderer.post_comments())?;
        Some(renderer.render_update(ticket, change, &event).into())
    }
}

/// issue tracker 格式生成器
pub struct IssueTrackerGenerator;

impl TicketPayloadGenerator for IssueTrackerGenerator {
    fn name(&self) -> &'static str {
        "jira"
    }

    fn generate_new(&self, host: &HostContext, ticket: &Ticket) -> Option<Payload> {
        issue_payload(host, ticket).map(Payload::from)
    }

    fn generate_update(&self, host: &HostContext, ticket: &Ticket, _change: &Change) -> Option<Payload> {
        issue_payload(host, ticket).map(Payload::from)
    }
}

/// 以工单当前状态和最后一条变更构造 issue payload
pub fn issue_payload(host: &HostContext, ticket: &Ticket) -> Option<IssuePayload> {
    let last = ticket.last_change()?;
    let links = LinkBuilder::from_settings(host.settings.as_ref());
    let renderer = TicketRenderer::new(host);

    let reporter = host.users.identity(&ticket.created_by);
    let assignee = ticket
        .responsible
        .as_deref()
        .filter(|r| !r.is_empty())
        .map(|r| host.users.identity(r));
    let updater = host.users.identity(&last.author);

    let changelog = last
        .fields
        .iter()
        .map(|(field, value)| Changelog {
            field: field.name().to_string(),
            old_value: None,
            new_value: value.clone(),
        })
        .collect();

    Some(IssuePayload {
        id: ticket.number.to_string(),
        title: ticket.title.clone(),
        description: ticket.body.clone(),
        status: ticket.status.name().to_string(),
        resolution: ticket.is_closed().then(|| ticket.status.name().to_string()),
        issue_type: format!("{:?}", ticket.ticket_type),
        project: strip_dot_git(&ticket.repository).to_string(),
        votes: ticket.voters.len().to_string(),
        reporter_name: reporter.name,
        reporter_email: reporter.email,
        assignee_name: assignee.as_ref().map(|a| a.name.clone()),
        assignee_email: assignee.and_then(|a| a.email),
        updater_name: updater.name,
        updater_email: updater.email,
        event_type: issue_event_type(ticket, last),
        comment: last.comment.as_ref().map(|c| c.text.clone()).filter(|t| !t.is_empty()),
        url: links.ticket(&ticket.repository, ticket.number),
        project_url: links.summary(&ticket.repository),
        changelog,
        tags: sanitize_tags(renderer.tags(ticket)),
    })
}

/// create / comment / assign / reopen / resolve / close / update
pub fn issue_event_type(ticket: &Ticket, last: &Change) -> IssueEventType {
    if ticket.changes.len() == 1 {
        IssueEventType::Create
    } else if last.has_comment() {
        IssueEventType::Comment
    } else if last.field(Field::Responsible).is_some() {
        IssueEventType::Assign
    } else if last.is_status_change() {
        match last.status() {
            Some(Status::Open) => IssueEventType::Reopen,
            Some(Status::Resolved) => IssueEventType::Resolve,
            _ => IssueEventType::Close,
        }
    } else {
        IssueEventType::Update
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemorySettings;
    use crate::graph::MemoryGraph;
    use crate::host::{BasicRenderer, StaticUsers, UserModel};
    use crate::ticket::TicketType;
    use chrono::DateTime;
    use std::sync::Arc;

    struct NoRepos;

    impl crate::host::RepositoryDirectory for NoRepos {
        fn repository(&self, _name: &str) -> Option<crate::host::RepositoryModel> {
            None
        }

        fn open_graph(&self, _name: &str) -> Result<Box<dyn crate::graph::RevisionGraph>, crate::error::GraphError> {
            Ok(Box::new(MemoryGraph::new()))
        }
    }

    fn host(settings: MemorySettings) -> HostContext {
        HostContext::new(
            Arc::new(settings),
            Arc::new(
                StaticUsers::new()
                    .with_user(UserModel::new("jane").with_display_name("Jane Doe").with_email("jane@example.com")),
            ),
            Arc::new(NoRepos),
            Arc::new(BasicRenderer::new()),
        )
    }

    fn change(author: &str, secs: i64) -> Change {
        Change::new(author, DateTime::from_timestamp(secs, 0).unwrap())
    }

    fn ticket() -> Ticket {
        Ticket::new(5, "team/app.git", "Add dark mode", "jane")
            .with_type(TicketType::Enhancement)
            .with_change(change("jane", 1).with_field(Field::Title, "Add dark mode"))
    }

    #[test]
    fn test_registry_selection() {
        assert_eq!(GeneratorKind::from_settings(&MemorySettings::new()), GeneratorKind::Email);
        assert_eq!(GeneratorKind::from_name("jira"), GeneratorKind::IssueTracker);
        assert_eq!(GeneratorKind::from_name("com.example.Custom"), GeneratorKind::Email);
        assert_eq!(GeneratorKind::IssueTracker.generator().name(), "jira");
    }

    #[test]
    fn test_email_generator_suppresses_field_edits() {
        let host = host(MemorySettings::new());
        let t = ticket();
        let edit = change("bob", 2).with_field(Field::Milestone, "2.0");
        assert!(EmailGenerator.generate_update(&host, &t, &edit).is_none());
        assert!(matches!(EmailGenerator.generate_new(&host, &t), Some(Payload::Message(_))));
    }

    #[test]
    fn test_issue_payload_for_new_ticket() {
        let host = host(MemorySettings::new());
        let payload = issue_payload(&host, &ticket()).unwrap();

        assert_eq!(payload.event_type, IssueEventType::Create);
        assert_eq!(payload.id, "5");
        assert_eq!(payload.issue_type, "Enhancement");
        assert_eq!(payload.project, "team/app");
        assert_eq!(payload.reporter_name, "Jane Doe");
        assert_eq!(payload.reporter_email.as_deref(), Some("jane@example.com"));
        assert_eq!(payload.resolution, None);
        assert_eq!(payload.url, "https://localhost:8443/tickets?r=team/app.git&h=5");
        assert_eq!(payload.project_url, "https://localhost:8443/summary?r=team/app.git");
        assert_eq!(payload.changelog.len(), 1);
        assert_eq!(payload.changelog[0].field, "title");
        assert_eq!(payload.tags, vec!["5", "enhancement"]);

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["issue_key"], "5");
        assert_eq!(json["event_type"], "create");
        assert_eq!(json["issue_changelog"][0]["new_value"], "Add dark mode");
    }

    #[test]
    fn test_issue_event_types() {
        let base = ticket();
        let with = |c: Change| base.clone().with_change(c);

        let t = with(change("bob", 2).with_comment("nice"));
        assert_eq!(issue_event_type(&t, t.last_change().unwrap()), IssueEventType::Comment);

        let t = with(change("bob", 2).with_field(Field::Responsible, "jane"));
        assert_eq!(issue_event_type(&t, t.last_change().unwrap()), IssueEventType::Assign);

        let t = with(change("bob", 2).with_field(Field::Status, "Open"));
        assert_eq!(issue_event_type(&t, t.last_change().unwrap()), IssueEventType::Reopen);

        let t = with(change("bob", 2).with_field(Field::Status, "Resolved"));
        assert_eq!(issue_event_type(&t, t.last_change().unwrap()), IssueEventType::Resolve);

        let t = with(change("bob", 2).with_field(Field::Status, "Declined"));
        assert_eq!(issue_event_type(&t, t.last_change().unwrap()), IssueEventType::Close);

        let t = with(change("bob", 2).with_field(Field::Milestone, "2.0"));
        assert_eq!(issue_event_type(&t, t.last_change().unwrap()), IssueEventType::Update);
    }

    #[test]
    fn test_issue_payload_closed_ticket_has_resolution() {
        let host = host(MemorySettings::new());
        let t = ticket()
            .with_status(Status::Fixed)
            .with_change(change("ghost", 2).with_field(Field::Status, "Fixed"));
        let payload = issue_payload(&host, &t).unwrap();

        assert_eq!(payload.resolution.as_deref(), Some("Fixed"));
        assert_eq!(payload.event_type, IssueEventType::Close);
        // 查不到的用户用原始用户名
        assert_eq!(payload.updater_name, "ghost");
        assert_eq!(payload.updater_email, None);
    }
}
