//! 工单事件分类
//!
//! 对一条工单变更按固定优先级判定通知类型，先命中者生效：
//!
//! | 优先级 | 条件 | 类型 |
//! |--------|------|------|
//! | 1 | 有评审 | [`TicketEvent::Reviewed`] |
//! | 2 | 有 patchset | proposal / rewritten / commits added |
//! | 3 | 合并 | [`TicketEvent::Merged`] |
//! | 4 | 状态变化 | [`TicketEvent::StatusChanged`] |
//! | 5 | 有评论且允许发布评论 | [`TicketEvent::Commented`] |
//! | - | 其他 | 不通知（`None`） |
//!
//! 新建工单不走这张表，总是 [`TicketEvent::Created`]。
//! 分类是纯函数：同一条变更分类多次结果相同。

use crate::ticket::{Change, PatchsetType, Status, Ticket, TicketType};

/// patchset 变更的子类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchsetUpdate {
    /// rev 1 / patchset 1：初次提交
    Proposal,
    /// rev 1 / patchset > 1：重写
    Rewritten { number: u32, patchset_type: PatchsetType },
    /// rev > 1：追加提交
    CommitsAdded { added: usize },
}

/// 通知类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TicketEvent {
    Created { ticket_type: TicketType },
    Reviewed { number: u32, rev: u32 },
    Patchset(PatchsetUpdate),
    Merged { target: String },
    StatusChanged { status: Status },
    Commented,
}

impl TicketEvent {
    /// 标题里的动作描述，如 `proposal pushed`
    pub fn summary(&self) -> String {
        match self {
            TicketEvent::Created { ticket_type } => format!("new {} ticket", ticket_type),
            TicketEvent::Reviewed { number, rev } => format!("reviewed patchset {}-{}", number, rev),
            TicketEvent::Patchset(PatchsetUpdate::Proposal) => "proposal pushed".to_string(),
            TicketEvent::Patchset(PatchsetUpdate::Rewritten { number, patchset_type }) => {
                format!("patchset {} pushed ({})", number, patchset_type)
            }
            TicketEvent::Patchset(PatchsetUpdate::CommitsAdded { added }) => {
                format!("added {} {}", added, commit_noun(*added))
            }
            TicketEvent::Merged { target } => format!("merged to {}", target),
            TicketEvent::StatusChanged { status } => format!("status changed to {}", status),
            TicketEvent::Commented => "comment added".to_string(),
        }
    }

    /// 日志用的短名
    pub fn kind(&self) -> &'static str {
        match self {
            TicketEvent::Created { .. } => "new-ticket",
            TicketEvent::Reviewed { .. } => "patchset-review",
            TicketEvent::Patchset(_) => "patchset-added",
            TicketEvent::Merged { .. } => "merged",
            TicketEvent::StatusChanged { .. } => "status-changed",
            TicketEvent::Commented => "comment-added",
        }
    }
}

/// 单复数
pub fn commit_noun(count: usize) -> &'static str {
    if count == 1 {
        "commit"
    } else {
        "commits"
    }
}

/// 新建工单
pub fn classify_new(ticket: &Ticket) -> TicketEvent {
    TicketEvent::Created {
        ticket_type: ticket.ticket_type,
    }
}

/// 工单更新，返回 `None` 表示不通知
pub fn classify_update(ticket: &Ticket, change: &Change, post_comments: bool) -> Option<TicketEvent> {
    if let Some(review) = &change.review {
        return Some(TicketEvent::Reviewed {
            number: review.patchset,
            rev: review.rev,
        });
    }

    if let Some(ps) = &change.patchset {
        let update = match (ps.rev, ps.number) {
            (1, 1) => PatchsetUpdate::Proposal,
            (1, number) => PatchsetUpdate::Rewritten {
                number,
                patchset_type: ps.patchset_type,
            },
            _ => PatchsetUpdate::CommitsAdded { added: ps.added },
        };
        return Some(TicketEvent::Patchset(update));
    }

    if change.is_merge() {
        return Some(TicketEvent::Merged {
            target: ticket.merge_to.clone().unwrap_or_default(),
        });
    }

    if change.is_status_change() {
        return Some(TicketEvent::StatusChanged {
            status: change.status().unwrap_or(ticket.status),
        });
    }

    if change.has_comment() && post_comments {
        return Some(TicketEvent::Commented);
    }

    None
}
