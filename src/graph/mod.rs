//! 提交范围解析
//!
//! 给定 base 和 tip，按拓扑顺序列出“从 tip 可达、从 base 不可达”的全部提交，
//! 并把每个提交相对父提交的文件变更分成 added / modified / removed 三类。
//!
//! 图本身由宿主提供（[`RevisionGraph`]）。git2 后端直接用 libgit2 的 revwalk；
//! 其它后端用通用的 [`date_walk`]：
//! 1. tip 标记为起点，base 标记为 uninteresting
//! 2. 按提交时间从新到旧遍历，uninteresting 标记沿父链传播
//! 3. 队列里只剩 uninteresting 提交后再走几步（slop）才停止
//! 4. 对结果做拓扑排序（默认子提交在前，可反转）

pub mod git;
pub mod memory;

pub use git::{GitGraph, GitRepositories};
pub use memory::MemoryGraph;

use crate::error::GraphError;
use crate::host::Identity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap, HashSet, VecDeque};
use tracing::{debug, error};

/// 文件变更类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    Add,
    Copy,
    Modify,
    Rename,
    Delete,
}

/// 单个文件的变更
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathChange {
    pub path: String,
    pub change_type: ChangeType,
}

impl PathChange {
    pub fn new(path: impl Into<String>, change_type: ChangeType) -> Self {
        Self {
            path: path.into(),
            change_type,
        }
    }
}

/// 图中的一个提交
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitData {
    pub id: String,
    pub parents: Vec<String>,
    pub author: Identity,
    pub author_time: DateTime<Utc>,
    pub commit_time: DateTime<Utc>,
    pub message: String,
}

/// 宿主提交图
pub trait RevisionGraph {
    /// ref 名或提交 id 解析为完整提交 id
    fn resolve(&self, rev: &str) -> Result<String, GraphError>;

    fn commit(&self, id: &str) -> Result<CommitData, GraphError>;

    /// 相对第一个父提交的文件变更
    fn changed_paths(&self, id: &str) -> Result<Vec<PathChange>, GraphError>;

    /// `base..tip` 中的提交 id（均为完整 id），子提交在前
    ///
    /// 默认按提交时间遍历（[`date_walk`]），有原生遍历的后端应覆盖。
    fn walk_range(&self, base_id: &str, tip_id: &str) -> Result<Vec<String>, GraphError> {
        date_walk(self, base_id, tip_id)
    }
}

/// 输出顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WalkOrder {
    /// 子提交在父提交之前（tip 在前）
    #[default]
    Topo,
    /// 父提交在子提交之前（最旧的在前）
    TopoReverse,
}

/// 解析出的提交
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    pub id: String,
    pub author: Identity,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub removed: Vec<String>,
}

impl CommitRecord {
    /// 提交说明的第一行
    pub fn short_message(&self) -> &str {
        self.message.lines().next().unwrap_or("").trim()
    }
}

/// 一次 push 或 patchset 更新涉及的全部提交
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitRange {
    commits: Vec<CommitRecord>,
}

impl CommitRange {
    pub fn new(commits: Vec<CommitRecord>) -> Self {
        Self { commits }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn commits(&self) -> &[CommitRecord] {
        &self.commits
    }

    /// 提交总数（不受展示上限影响）
    pub fn total(&self) -> usize {
        self.commits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commits.is_empty()
    }

    /// 展示用的前 `max` 个提交
    pub fn visible(&self, max: usize) -> &[CommitRecord] {
        &self.commits[..self.commits.len().min(max)]
    }

    /// 超出展示上限的提交数
    pub fn hidden(&self, max: usize) -> usize {
        self.commits.len().saturating_sub(max)
    }

    /// 按作者分组计数
    pub fn authors(&self) -> BTreeMap<Identity, usize> {
        let mut authors = BTreeMap::new();
        for commit in &self.commits {
            *authors.entry(commit.author.clone()).or_insert(0) += 1;
        }
        authors
    }

    pub fn into_commits(self) -> Vec<CommitRecord> {
        self.commits
    }
}

/// 队列里只剩 uninteresting 提交后继续遍历的提交数，应对提交时间倒挂
const SLOP: usize = 5;

#[derive(Debug, Default, Clone, Copy)]
struct WalkState {
    uninteresting: bool,
    processed: bool,
    queued: bool,
}

struct WalkNode {
    time: DateTime<Utc>,
    parents: Vec<String>,
}

/// 按提交时间从新到旧的遍历队列，同时记录队列中 interesting 提交的数量
#[derive(Default)]
struct WalkQueue {
    heap: BinaryHeap<(DateTime<Utc>, Reverse<u64>, String)>,
    state: HashMap<String, WalkState>,
    seq: u64,
    interesting: usize,
}

impl WalkQueue {
    fn push(&mut self, id: &str, time: DateTime<Utc>) {
        let entry = self.state.entry(id.to_string()).or_default();
        if entry.queued || entry.processed {
            return;
        }
        entry.queued = true;
        if !entry.uninteresting {
            self.interesting += 1;
        }
        self.heap.push((time, Reverse(self.seq), id.to_string()));
        self.seq += 1;
    }

    fn pop(&mut self) -> Option<(String, WalkState)> {
        let (_, _, id) = self.heap.pop()?;
        let entry = self.state.entry(id.clone()).or_default();
        entry.queued = false;
        if !entry.uninteresting {
            self.interesting -= 1;
        }
        let current = *entry;
        entry.processed = true;
        Some((id, current))
    }

    fn mark_uninteresting(&mut self, id: &str) {
        let entry = self.state.entry(id.to_string()).or_default();
        if entry.uninteresting {
            return;
        }
        entry.uninteresting = true;
        if entry.queued {
            self.interesting -= 1;
        } else if entry.processed {
            // 已按 interesting 处理过，需要重新入队把标记传给祖先
            entry.processed = false;
        }
    }

    fn is_uninteresting(&self, id: &str) -> bool {
        self.state.get(id).is_some_and(|s| s.uninteresting)
    }
}

fn load_node<G: RevisionGraph + ?Sized>(
    graph: &G,
    nodes: &mut HashMap<String, WalkNode>,
    id: &str,
) -> Result<DateTime<Utc>, GraphError> {
    if let Some(node) = nodes.get(id) {
        return Ok(node.time);
    }
    let data = graph.commit(id)?;
    let time = data.commit_time;
    nodes.insert(
        id.to_string(),
        WalkNode {
            time,
            parents: data.parents,
        },
    );
    Ok(time)
}

/// 通用的 `base..tip` 遍历，返回子提交在前的提交 id
///
/// tip 为起点，base 标记为 uninteresting 并沿父链传播。队列里不再有
/// interesting 提交之后再多走 `SLOP` 个提交，让时间倒挂的祖先也能被标记。
pub fn date_walk<G: RevisionGraph + ?Sized>(
    graph: &G,
    base_id: &str,
    tip_id: &str,
) -> Result<Vec<String>, GraphError> {
    let mut nodes: HashMap<String, WalkNode> = HashMap::new();
    let mut queue = WalkQueue::default();
    let mut candidates: Vec<String> = Vec::new();

    let tip_time = load_node(graph, &mut nodes, tip_id)?;
    let base_time = load_node(graph, &mut nodes, base_id)?;
    queue.mark_uninteresting(base_id);
    queue.push(tip_id, tip_time);
    queue.push(base_id, base_time);

    let mut slop = SLOP;
    while let Some((id, current)) = queue.pop() {
        if !current.uninteresting {
            candidates.push(id.clone());
        }

        let parents = nodes.get(&id).map(|n| n.parents.clone()).unwrap_or_default();
        for parent in parents {
            let time = load_node(graph, &mut nodes, &parent)?;
            if current.uninteresting {
                queue.mark_uninteresting(&parent);
            }
            queue.push(&parent, time);
        }

        if queue.interesting > 0 {
            slop = SLOP;
        } else if slop == 0 {
            break;
        } else {
            slop -= 1;
        }
    }

    let selected: Vec<String> = candidates
        .into_iter()
        .filter(|id| !queue.is_uninteresting(id))
        .collect();
    Ok(topo_sort(&selected, &nodes))
}

/// 解析 `base..tip` 的提交范围
///
/// base 或 tip 无法解析时返回 [`GraphError`]；两者相同时返回空范围。
pub fn resolve_range(
    graph: &dyn RevisionGraph,
    base: &str,
    tip: &str,
    order: WalkOrder,
) -> Result<CommitRange, GraphError> {
    let tip_id = graph.resolve(tip)?;
    let base_id = graph.resolve(base)?;

    let mut ids = graph.walk_range(&base_id, &tip_id)?;
    if order == WalkOrder::TopoReverse {
        ids.reverse();
    }

    let mut records = Vec::with_capacity(ids.len());
    for id in ids {
        let data = graph.commit(&id)?;
        let paths = graph.changed_paths(&id)?;
        records.push(to_record(data, &paths));
    }

    debug!(base = %base_id, tip = %tip_id, commits = records.len(), "Resolved commit range");
    Ok(CommitRange::new(records))
}

/// 解析失败时记录日志并返回空范围
///
/// 宿主操作不能因为通知内容算不出来而失败。
pub fn resolve_range_or_empty(
    graph: &dyn RevisionGraph,
    base: &str,
    tip: &str,
    order: WalkOrder,
) -> CommitRange {
    match resolve_range(graph, base, tip, order) {
        Ok(range) => range,
        Err(e) => {
            error!(base, tip, error = %e, "Failed to get commits");
            CommitRange::empty()
        }
    }
}

/// 子提交在前的拓扑排序，同层保持遍历（时间）顺序
fn topo_sort(selected: &[String], nodes: &HashMap<String, WalkNode>) -> Vec<String> {
    let members: HashSet<&str> = selected.iter().map(String::as_str).collect();
    let mut children: HashMap<&str, usize> = HashMap::new();

    for id in selected {
        if let Some(node) = nodes.get(id) {
            for parent in &node.parents {
                if members.contains(parent.as_str()) {
                    *children.entry(parent.as_str()).or_insert(0) += 1;
                }
            }
        }
    }

    let mut ready: VecDeque<&str> = selected
        .iter()
        .map(String::as_str)
        .filter(|id| children.get(id).copied().unwrap_or(0) == 0)
        .collect();
    let mut out = Vec::with_capacity(selected.len());

    while let Some(id) = ready.pop_front() {
        out.push(id.to_string());
        let Some(node) = nodes.get(id) else {
            continue;
        };
        for parent in &node.parents {
            if let Some(count) = children.get_mut(parent.as_str()) {
                *count -= 1;
                if *count == 0 {
                    ready.push_back(parent.as_str());
                }
            }
        }
    }

    out
}

/// 按变更类型分桶：copy 归入 added，delete 归入 removed，其余归入 modified
fn to_record(data: CommitData, paths: &[PathChange]) -> CommitRecord {
    let mut added = Vec::new();
    let mut modified = Vec::new();
    let mut removed = Vec::new();

    for change in paths {
        match change.change_type {
            ChangeType::Add | ChangeType::Copy => added.push(change.path.clone()),
            ChangeType::Delete => removed.push(change.path.clone()),
            ChangeType::Modify | ChangeType::Rename => modified.push(change.path.clone()),
        }
    }

    CommitRecord {
        id: data.id,
        author: data.author,
        timestamp: data.author_time,
        message: data.message.trim().to_string(),
        added,
        modified,
        removed,
    }
}
