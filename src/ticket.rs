//! 工单模型
//!
//! 工单由宿主的工单服务维护，核心只读取它的快照：
//! 基本属性加上一串不可变的 [`Change`]（评论、状态变化、patchset、评审、字段修改）。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// 工单类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TicketType {
    Enhancement,
    Task,
    Bug,
    Proposal,
    Question,
    Maintenance,
}

impl fmt::Display for TicketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TicketType::Enhancement => "enhancement",
            TicketType::Task => "task",
            TicketType::Bug => "bug",
            TicketType::Proposal => "proposal",
            TicketType::Question => "question",
            TicketType::Maintenance => "maintenance",
        };
        f.write_str(s)
    }
}

/// 工单状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    New,
    Open,
    Closed,
    Resolved,
    Fixed,
    Merged,
    Wontfix,
    Declined,
    Duplicate,
    Invalid,
    Abandoned,
    OnHold,
    InProgress,
}

impl Status {
    /// 终态
    pub fn is_closed(&self) -> bool {
        matches!(
            self,
            Status::Closed
                | Status::Resolved
                | Status::Fixed
                | Status::Merged
                | Status::Wontfix
                | Status::Declined
                | Status::Duplicate
                | Status::Invalid
                | Status::Abandoned
        )
    }

    /// 状态的规范名（如 `OnHold`），issue tracker payload 使用
    pub fn name(&self) -> &'static str {
        match self {
            Status::New => "New",
            Status::Open => "Open",
            Status::Closed => "Closed",
            Status::Resolved => "Resolved",
            Status::Fixed => "Fixed",
            Status::Merged => "Merged",
            Status::Wontfix => "Wontfix",
            Status::Declined => "Declined",
            Status::Duplicate => "Duplicate",
            Status::Invalid => "Invalid",
            Status::Abandoned => "Abandoned",
            Status::OnHold => "On_Hold",
            Status::InProgress => "In_Progress",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name().to_lowercase().replace('_', " "))
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        let status = match normalized.as_str() {
            "new" => Status::New,
            "open" => Status::Open,
            "closed" => Status::Closed,
            "resolved" => Status::Resolved,
            "fixed" => Status::Fixed,
            "merged" => Status::Merged,
            "wontfix" => Status::Wontfix,
            "declined" => Status::Declined,
            "duplicate" => Status::Duplicate,
            "invalid" => Status::Invalid,
            "abandoned" => Status::Abandoned,
            "onhold" => Status::OnHold,
            "inprogress" => Status::InProgress,
            _ => return Err(format!("unknown ticket status '{}'", s)),
        };
        Ok(status)
    }
}

/// 工单字段，声明顺序即展示顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Field {
    Title,
    Body,
    Responsible,
    Type,
    Status,
    Milestone,
    MergeSha,
    MergeTo,
    Topic,
    Labels,
    Watchers,
    Reviewers,
    Voters,
    Mentions,
}

impl Field {
    pub const ALL: [Field; 14] = [
        Field::Title,
        Field::Body,
        Field::Responsible,
        Field::Type,
        Field::Status,
        Field::Milestone,
        Field::MergeSha,
        Field::MergeTo,
        Field::Topic,
        Field::Labels,
        Field::Watchers,
        Field::Reviewers,
        Field::Voters,
        Field::Mentions,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Field::Title => "title",
            Field::Body => "body",
            Field::Responsible => "responsible",
            Field::Type => "type",
            Field::Status => "status",
            Field::Milestone => "milestone",
            Field::MergeSha => "mergeSha",
            Field::MergeTo => "mergeTo",
            Field::Topic => "topic",
            Field::Labels => "labels",
            Field::Watchers => "watchers",
            Field::Reviewers => "reviewers",
            Field::Voters => "voters",
            Field::Mentions => "mentions",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Field {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Field::ALL
            .iter()
            .find(|f| f.name().eq_ignore_ascii_case(s.trim()))
            .copied()
            .ok_or_else(|| format!("unknown ticket field '{}'", s))
    }
}

/// patchset 的产生方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatchsetType {
    Proposal,
    FastForward,
    Rebase,
    Squash,
    RebaseSquash,
    Delete,
    Amend,
}

impl fmt::Display for PatchsetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PatchsetType::Proposal => "proposal",
            PatchsetType::FastForward => "fastforward",
            PatchsetType::Rebase => "rebase",
            PatchsetType::Squash => "squash",
            PatchsetType::RebaseSquash => "rebase+squash",
            PatchsetType::Delete => "delete",
            PatchsetType::Amend => "amend",
        };
        f.write_str(s)
    }
}

/// 一个 patchset 版本，由 (number, rev) 标识
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patchset {
    pub number: u32,
    pub rev: u32,
    pub tip: String,
    pub base: String,
    /// 本次新增的提交数
    pub added: usize,
    #[serde(rename = "type")]
    pub patchset_type: PatchsetType,
}

/// 评审分数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Score {
    Approved,
    LooksGood,
    NotReviewed,
    NeedsImprovement,
    Vetoed,
}

impl Score {
    pub fn value(&self) -> i32 {
        match self {
            Score::Approved => 2,
            Score::LooksGood => 1,
            Score::NotReviewed => 0,
            Score::NeedsImprovement => -1,
            Score::Vetoed => -2,
        }
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Score::Approved => "approved",
            Score::LooksGood => "looks good",
            Score::NotReviewed => "not reviewed",
            Score::NeedsImprovement => "needs improvement",
            Score::Vetoed => "vetoed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub patchset: u32,
    pub rev: u32,
    pub score: Score,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub text: String,
}

/// 工单历史中的一条变更（不可变）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    /// 变更者用户名
    pub author: String,
    pub date: DateTime<Utc>,
    /// 字段修改，`None` 表示清空
    #[serde(default)]
    pub fields: BTreeMap<Field, Option<String>>,
    #[serde(default)]
    pub comment: Option<Comment>,
    #[serde(default)]
    pub patchset: Option<Patchset>,
    #[serde(default)]
    pub review: Option<Review>,
}

impl Change {
    pub fn new(author: impl Into<String>, date: DateTime<Utc>) -> Self {
        Self {
            author: author.into(),
            date,
            fields: BTreeMap::new(),
            comment: None,
            patchset: None,
            review: None,
        }
    }

    pub fn with_field(mut self, field: Field, value: impl Into<String>) -> Self {
        self.fields.insert(field, Some(value.into()));
        self
    }

    pub fn with_cleared_field(mut self, field: Field) -> Self {
        self.fields.insert(field, None);
        self
    }

    pub fn with_comment(mut self, text: impl Into<String>) -> Self {
        self.comment = Some(Comment { text: text.into() });
        self
    }

    pub fn with_patchset(mut self, patchset: Patchset) -> Self {
        self.patchset = Some(patchset);
        self
    }

    pub fn with_review(mut self, review: Review) -> Self {
        self.review = Some(review);
        self
    }

    pub fn has_review(&self) -> bool {
        self.review.is_some()
    }

    pub fn has_patchset(&self) -> bool {
        self.patchset.is_some()
    }

    pub fn has_comment(&self) -> bool {
        self.comment.as_ref().is_some_and(|c| !c.text.is_empty())
    }

    pub fn has_field_changes(&self) -> bool {
        !self.fields.is_empty()
    }

    pub fn has_field(&self, field: Field) -> bool {
        self.fields.contains_key(&field)
    }

    pub fn field(&self, field: Field) -> Option<&str> {
        self.fields.get(&field).and_then(|v| v.as_deref())
    }

    pub fn is_status_change(&self) -> bool {
        self.has_field(Field::Status)
    }

    /// 状态变为 Merged 且带合并提交
    pub fn is_merge(&self) -> bool {
        self.status() == Some(Status::Merged) && self.has_field(Field::MergeSha)
    }

    pub fn status(&self) -> Option<Status> {
        self.field(Field::Status).and_then(|s| s.parse().ok())
    }
}

/// 工单快照
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub number: u64,
    pub repository: String,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(rename = "type")]
    pub ticket_type: TicketType,
    pub status: Status,
    pub created_by: String,
    #[serde(default)]
    pub responsible: Option<String>,
    #[serde(default)]
    pub milestone: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub merge_to: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub voters: Vec<String>,
    #[serde(default)]
    pub changes: Vec<Change>,
}

impl Ticket {
    pub fn new(number: u64, repository: impl Into<String>, title: impl Into<String>, created_by: impl Into<String>) -> Self {
        Self {
            number,
            repository: repository.into(),
            title: title.into(),
            body: None,
            ticket_type: TicketType::Task,
            status: Status::New,
            created_by: created_by.into(),
            responsible: None,
            milestone: None,
            topic: None,
            merge_to: None,
            labels: Vec::new(),
            voters: Vec::new(),
            changes: Vec::new(),
        }
    }

    pub fn with_type(mut self, ticket_type: TicketType) -> Self {
        self.ticket_type = ticket_type;
        self
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    pub fn with_change(mut self, change: Change) -> Self {
        self.changes.push(change);
        self
    }

    pub fn first_change(&self) -> Option<&Change> {
        self.changes.first()
    }

    pub fn last_change(&self) -> Option<&Change> {
        self.changes.last()
    }

    pub fn is_closed(&self) -> bool {
        self.status.is_closed()
    }

    /// 按 (number, rev) 查找 patchset
    pub fn patchset(&self, number: u32, rev: u32) -> Option<&Patchset> {
        self.changes
            .iter()
            .filter_map(|c| c.patchset.as_ref())
            .find(|p| p.number == number && p.rev == rev)
    }

    /// 某个 patchset 版本的全部评审
    pub fn reviews(&self, number: u32, rev: u32) -> Vec<&Change> {
        self.changes
            .iter()
            .filter(|c| c.review.is_some_and(|r| r.patchset == number && r.rev == rev))
            .collect()
    }
}
