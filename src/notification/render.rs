//! 工单消息渲染
//!
//! 把分类后的工单事件渲染成 team inbox 消息：标题、HTML 正文、标签、链接。
//! Flowdock 的富文本支持有限，Markdown 渲染后去掉 `<p>`，段落改用 `<br/>` 分隔。

use std::collections::{BTreeMap, BTreeSet};

use tracing::{error, warn};

use super::classifier::{commit_noun, PatchsetUpdate, TicketEvent};
use super::links::LinkBuilder;
use super::payload::{strip_dot_git, MessagePayload};
use crate::config::{
    SETTING_FIXED_TICKET_TAGS, SETTING_NEW_TICKET_EXCLUSIONS, SETTING_POST_TICKET_COMMENTS,
    SETTING_SHORT_COMMIT_ID_LENGTH, SETTING_UPDATE_TICKET_EXCLUSIONS,
};
use crate::graph::{resolve_range_or_empty, CommitRange, WalkOrder};
use crate::host::{escape_html, HostContext, Identity, HOST_NAME};
use crate::ticket::{Change, Field, Patchset, Score, Ticket};

/// patchset 消息里最多列出的提交数
const MAX_PATCHSET_COMMITS: usize = 5;

/// 提交短说明的最大长度
const SHORT_MESSAGE_LEN: usize = 78;

const DEFAULT_SHORT_ID_LEN: usize = 6;

const REVIEW_DATE_FORMAT: &str = "%Y-%m-%d %H:%M";

/// 字段表的排除策略，新建和更新各一套
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPolicy {
    pub new_ticket: BTreeSet<Field>,
    pub update: BTreeSet<Field>,
}

impl Default for FieldPolicy {
    fn default() -> Self {
        Self {
            new_ticket: BTreeSet::from([Field::Watchers, Field::Voters, Field::Status, Field::Mentions]),
            update: BTreeSet::from([
                Field::Watchers,
                Field::Voters,
                Field::Mentions,
                Field::Title,
                Field::Body,
                Field::MergeSha,
            ]),
        }
    }
}

impl FieldPolicy {
    /// 配置了就整体替换对应的默认集合
    pub fn from_settings(settings: &dyn crate::config::Settings) -> Self {
        let defaults = Self::default();
        let load = |key: &str, default: BTreeSet<Field>| {
            let names = settings.get_strings(key);
            if names.is_empty() {
                return default;
            }
            names
                .iter()
                .filter_map(|name| match name.parse::<Field>() {
                    Ok(field) => Some(field),
                    Err(e) => {
                        warn!(key, error = %e, "Ignoring unknown field exclusion");
                        None
                    }
                })
                .collect()
        };
        Self {
            new_ticket: load(SETTING_NEW_TICKET_EXCLUSIONS, defaults.new_ticket),
            update: load(SETTING_UPDATE_TICKET_EXCLUSIONS, defaults.update),
        }
    }
}

/// 工单消息渲染器
pub struct TicketRenderer<'a> {
    host: &'a HostContext,
    links: LinkBuilder,
    policy: FieldPolicy,
    post_comments: bool,
    short_id_len: usize,
}

impl<'a> TicketRenderer<'a> {
    pub fn new(host: &'a HostContext) -> Self {
        let settings = host.settings.as_ref();
        let short_id_len = usize::try_from(settings.get_int(SETTING_SHORT_COMMIT_ID_LENGTH, DEFAULT_SHORT_ID_LEN as i64))
            .ok()
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_SHORT_ID_LEN);
        Self {
            host,
            links: LinkBuilder::from_settings(settings),
            policy: FieldPolicy::from_settings(settings),
            post_comments: settings.get_bool(SETTING_POST_TICKET_COMMENTS, true),
            short_id_len,
        }
    }

    pub fn post_comments(&self) -> bool {
        self.post_comments
    }

    /// 新建工单消息，工单没有任何变更记录时返回 `None`
    pub fn render_new(&self, ticket: &Ticket, event: &TicketEvent) -> Option<MessagePayload> {
        let change = ticket.first_change()?;
        let author = self.host.users.identity(&change.author);
        let mut body = format!(
            "<b>{}</b> has created <b>{}</b> <a href=\"{}\">ticket-{}</a>",
            author.name,
            strip_dot_git(&ticket.repository),
            self.ticket_url(ticket),
            ticket.number
        );
        self.fields(&mut body, ticket, change, &self.policy.new_ticket);
        Some(self.message(ticket, event, &author, body))
    }

    /// 工单更新消息
    pub fn render_update(&self, ticket: &Ticket, change: &Change, event: &TicketEvent) -> MessagePayload {
        let author = self.host.users.identity(&change.author);
        let who = format!("<b>{}</b>", author.name);
        let repo = format!("<b>{}</b>", strip_dot_git(&ticket.repository));
        let link = format!("<a href=\"{}\">ticket-{}</a>", self.ticket_url(ticket), ticket.number);
        let exclusions = &self.policy.update;

        let mut body = match (event, &change.patchset) {
            (TicketEvent::Reviewed { number, rev }, _) => {
                let mut s = format!("{} has reviewed {} {} patchset {}-{}<p/>", who, repo, link, number, rev);
                s.push_str(&self.review_table(ticket, *number, *rev));
                s
            }
            (TicketEvent::Patchset(update), Some(ps)) => {
                let lead_in = match update {
                    PatchsetUpdate::Proposal => format!("{} has pushed a proposal for {} {}", who, repo, link),
                    PatchsetUpdate::Rewritten { patchset_type, .. } => {
                        format!("{} has rewritten the patchset for {} {} ({})", who, repo, link, patchset_type)
                    }
                    PatchsetUpdate::CommitsAdded { added } => {
                        format!("{} has added {} {} to {} {}", who, added, commit_noun(*added), repo, link)
                    }
                };
                // 字段表在提交列表之前
                let mut s = lead_in;
                self.fields(&mut s, ticket, change, exclusions);
                s.push_str(&self.patchset_commits(ticket, ps));
                return self.message(ticket, event, &author, s);
            }
            (TicketEvent::Merged { target }, _) => {
                format!("{} has merged {} {} to <b>{}</b>", who, repo, link, target)
            }
            (TicketEvent::StatusChanged { .. }, _) => {
                format!("{} has changed the status of {} {}", who, repo, link)
            }
            (TicketEvent::Commented, _) => format!("{} has commented on {} {}", who, repo, link),
            (TicketEvent::Created { .. }, _) | (TicketEvent::Patchset(_), None) => {
                format!("{} has updated {} {}", who, repo, link)
            }
        };

        self.fields(&mut body, ticket, change, exclusions);
        self.message(ticket, event, &author, body)
    }

    fn message(&self, ticket: &Ticket, event: &TicketEvent, author: &Identity, content: String) -> MessagePayload {
        MessagePayload::new(subject(ticket, event), content)
            .with_from(author)
            .with_project(&ticket_project(ticket))
            .with_source(HOST_NAME)
            .with_tags(self.tags(ticket))
            .with_link(self.ticket_url(ticket))
    }

    pub fn ticket_url(&self, ticket: &Ticket) -> String {
        self.links.ticket(&ticket.repository, ticket.number)
    }

    /// 工单号、类型、固定标签、labels、topic 中的词、milestone
    pub fn tags(&self, ticket: &Ticket) -> Vec<String> {
        let mut tags = vec![ticket.number.to_string(), ticket.ticket_type.to_string()];
        tags.extend(self.host.settings.get_strings(SETTING_FIXED_TICKET_TAGS));
        tags.extend(ticket.labels.iter().cloned());
        if let Some(topic) = &ticket.topic {
            tags.extend(topic.split(' ').filter(|w| !w.is_empty()).map(str::to_string));
        }
        if let Some(milestone) = ticket.milestone.as_ref().filter(|m| !m.is_empty()) {
            tags.push(milestone.clone());
        }
        tags
    }

    /// 字段表（按字段声明顺序），评论开启时先输出评论
    fn fields(&self, out: &mut String, ticket: &Ticket, change: &Change, exclusions: &BTreeSet<Field>) {
        let mut filtered: BTreeMap<Field, Option<String>> = change
            .fields
            .iter()
            .filter(|(field, _)| !exclusions.contains(field))
            .map(|(field, value)| (*field, value.clone()))
            .collect();

        if change.has_comment() && self.post_comments {
            if let Some(comment) = &change.comment {
                out.push_str("<br/>\n");
                out.push_str(&self.render_markdown(&comment.text, &ticket.repository));
            }
        }

        filtered
            .entry(Field::Title)
            .or_insert_with(|| Some(ticket.title.clone()));

        out.push_str("\n<table><tbody>\n");
        for (field, value) in &filtered {
            let Some(value) = value else {
                continue;
            };
            let value = match field {
                Field::Body => self.render_markdown(value, &ticket.repository),
                Field::Topic => self.host.renderer.link_issue_refs(value, &ticket.repository),
                Field::Responsible => self.host.users.display_name(value),
                _ => value.clone(),
            };
            out.push_str(&format!("<tr><td><b>{}:<b/></td><td>{}</td></tr>\n", field, value));
        }
        out.push_str("</tbody></table>\n");
    }

    /// issue 引用链接 + Markdown，去掉段落标签
    pub fn render_markdown(&self, markdown: &str, repository: &str) -> String {
        if markdown.is_empty() {
            return String::new();
        }
        let linked = self.host.renderer.link_issue_refs(markdown, repository);
        self.host
            .renderer
            .markdown_to_html(&linked, repository)
            .replace("<p>", "")
            .replace("</p>", "<br/><br/>")
    }

    /// 某个 patchset 版本的全部评审
    fn review_table(&self, ticket: &Ticket, number: u32, rev: u32) -> String {
        let mut s = String::from(
            "<table><thead><tr><th>Date</th><th>Reviewer</th><th>Score</th><th>Description</th></tr></thead><tbody>\n",
        );
        for change in ticket.reviews(number, rev) {
            let Some(review) = change.review else {
                continue;
            };
            s.push_str(&format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
                change.date.format(REVIEW_DATE_FORMAT),
                self.host.users.display_name(&change.author),
                score_html(review.score),
                review.score
            ));
        }
        s.push_str("</tbody></table>");
        s
    }

    /// 简要提交列表（最旧在前）和对比链接
    fn patchset_commits(&self, ticket: &Ticket, ps: &Patchset) -> String {
        let base = if ps.rev > 1 {
            match ticket.patchset(ps.number, ps.rev - 1) {
                Some(prev) => prev.tip.clone(),
                None => {
                    warn!(ticket = ticket.number, patchset = ps.number, rev = ps.rev, "Previous patchset revision not found");
                    ps.base.clone()
                }
            }
        } else {
            ps.base.clone()
        };

        let range = self.commits(&ticket.repository, &base, &ps.tip);
        let mut s = String::from("\n<table><tbody>\n");
        for commit in range.visible(MAX_PATCHSET_COMMITS) {
            let short_id: String = commit.id.chars().take(self.short_id_len).collect();
            s.push_str(&format!(
                "<tr><td><pre><a href=\"{}\">{}</a></pre></td><td>{}</td></tr>\n",
                self.links.commit(&ticket.repository, &commit.id),
                short_id,
                escape_html(&trim_string(commit.short_message(), SHORT_MESSAGE_LEN))
            ));
        }
        s.push_str("</tbody></table>\n");

        let total = range.total();
        if total > 1 {
            let text = match range.hidden(MAX_PATCHSET_COMMITS) {
                0 => format!("view comparison of these {} commits", total),
                1 => "1 more commit".to_string(),
                n => format!("{} more commits", n),
            };
            s.push_str(&format!(
                "<a href=\"{}\">{}</a>\n",
                self.links.compare(&ticket.repository, &base, &ps.tip),
                text
            ));
        }
        s
    }

    fn commits(&self, repository: &str, base: &str, tip: &str) -> CommitRange {
        match self.host.repositories.open_graph(repository) {
            Ok(graph) => resolve_range_or_empty(graph.as_ref(), base, tip, WalkOrder::TopoReverse),
            Err(e) => {
                error!(repository, error = %e, "Failed to open repository");
                CommitRange::empty()
            }
        }
    }
}

/// `{title} ({summary})`
pub fn subject(ticket: &Ticket, event: &TicketEvent) -> String {
    format!("{} ({})", ticket.title, event.summary())
}

/// 仓库路径的最后一段，去掉 `.git`
pub fn ticket_project(ticket: &Ticket) -> String {
    let last = ticket
        .repository
        .rsplit('/')
        .next()
        .unwrap_or(&ticket.repository);
    strip_dot_git(last).to_string()
}

/// 评分样式：通过为绿色 +N，否决为红色 -N，其余为数字
fn score_html(score: Score) -> String {
    match score {
        Score::Approved => format!("<span style=\"color:darkgreen;\">+{}</span>", score.value()),
        Score::Vetoed => format!("<span style=\"color:darkred;\">-{}</span>", score.value().abs()),
        _ => score.value().to_string(),
    }
}

/// 超长时截断并以 `...` 结尾
fn trim_string(value: &str, max: usize) -> String {
    if value.chars().count() <= max {
        return value.to_string();
    }
    let mut s: String = value.chars().take(max.saturating_sub(3)).collect();
    s.push_str("...");
    s
}
