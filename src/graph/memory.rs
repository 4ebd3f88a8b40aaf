//! 进程内提交图，供嵌入方和测试使用

use super::{ChangeType, CommitData, PathChange, RevisionGraph};
use crate::error::GraphError;
use crate::host::Identity;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct MemoryGraph {
    commits: HashMap<String, (CommitData, Vec<PathChange>)>,
    refs: HashMap<String, String>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加提交，作者和说明使用默认值
    pub fn with_commit(self, id: &str, parents: &[&str], time_secs: i64, paths: Vec<PathChange>) -> Self {
        let author = Identity::new("Jane Doe", Some("jane@example.com".to_string()));
        let message = format!("commit {}", id);
        self.with_authored_commit(id, parents, time_secs, author, &message, paths)
    }

    pub fn with_authored_commit(
        mut self,
        id: &str,
        parents: &[&str],
        time_secs: i64,
        author: Identity,
        message: &str,
        paths: Vec<PathChange>,
    ) -> Self {
        let time = DateTime::<Utc>::from_timestamp(time_secs, 0).unwrap_or_default();
        let data = CommitData {
            id: id.to_string(),
            parents: parents.iter().map(|p| p.to_string()).collect(),
            author,
            author_time: time,
            commit_time: time,
            message: message.to_string(),
        };
        self.commits.insert(id.to_string(), (data, paths));
        self
    }

    pub fn with_ref(mut self, name: &str, id: &str) -> Self {
        self.refs.insert(name.to_string(), id.to_string());
        self
    }

    /// 便捷构造：只有新增文件的提交
    pub fn added(paths: &[&str]) -> Vec<PathChange> {
        paths.iter().map(|p| PathChange::new(*p, ChangeType::Add)).collect()
    }
}

impl RevisionGraph for MemoryGraph {
    fn resolve(&self, rev: &str) -> Result<String, GraphError> {
        if let Some(id) = self.refs.get(rev) {
            return Ok(id.clone());
        }
        if self.commits.contains_key(rev) {
            return Ok(rev.to_string());
        }

        // 至少 4 位的唯一前缀
        if rev.len() >= 4 {
            let mut matches = self.commits.keys().filter(|id| id.starts_with(rev));
            if let (Some(id), None) = (matches.next(), matches.next()) {
                return Ok(id.clone());
            }
        }
        Err(GraphError::UnresolvedRevision(rev.to_string()))
    }

    fn commit(&self, id: &str) -> Result<CommitData, GraphError> {
        self.commits
            .get(id)
            .map(|(data, _)| data.clone())
            .ok_or_else(|| GraphError::MissingCommit(id.to_string()))
    }

    fn changed_paths(&self, id: &str) -> Result<Vec<PathChange>, GraphError> {
        self.commits
            .get(id)
            .map(|(_, paths)| paths.clone())
            .ok_or_else(|| GraphError::MissingCommit(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_by_prefix() {
        let graph = MemoryGraph::new()
            .with_commit("abcdef123456", &[], 1, vec![])
            .with_commit("abcdff000000", &[], 2, vec![]);

        assert_eq!(graph.resolve("abcdef").unwrap(), "abcdef123456");
        // 前缀不唯一
        assert!(graph.resolve("abcd").is_err());
        // 太短
        assert!(graph.resolve("abc").is_err());
    }

    #[test]
    fn test_missing_commit() {
        let graph = MemoryGraph::new();
        assert!(matches!(graph.commit("nope"), Err(GraphError::MissingCommit(_))));
    }
}
