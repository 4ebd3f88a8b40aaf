//! git2 提交图适配
//!
//! 每次调用打开一次仓库，`GitGraph` drop 时释放底层句柄。

use super::{ChangeType, CommitData, PathChange, RevisionGraph};
use crate::error::GraphError;
use crate::host::{Identity, RepositoryDirectory, RepositoryModel};
use chrono::{DateTime, Utc};
use git2::{Delta, DiffFindOptions, Oid, Repository, Sort};
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct GitGraph {
    repo: Repository,
}

impl GitGraph {
    pub fn open(path: &Path) -> Result<Self, GraphError> {
        let repo = Repository::open(path)?;
        Ok(Self { repo })
    }

    pub fn from_repository(repo: Repository) -> Self {
        Self { repo }
    }

    fn find_commit(&self, id: &str) -> Result<git2::Commit<'_>, GraphError> {
        let oid = Oid::from_str(id).map_err(|_| GraphError::MissingCommit(id.to_string()))?;
        self.repo
            .find_commit(oid)
            .map_err(|_| GraphError::MissingCommit(id.to_string()))
    }
}

fn to_datetime(time: git2::Time) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(time.seconds(), 0).unwrap_or_default()
}

impl RevisionGraph for GitGraph {
    fn resolve(&self, rev: &str) -> Result<String, GraphError> {
        self.repo
            .revparse_single(rev)
            .and_then(|obj| obj.peel_to_commit())
            .map(|commit| commit.id().to_string())
            .map_err(|_| GraphError::UnresolvedRevision(rev.to_string()))
    }

    fn commit(&self, id: &str) -> Result<CommitData, GraphError> {
        let commit = self.find_commit(id)?;
        let author = commit.author();
        let committer = commit.committer();

        let data = CommitData {
            id: commit.id().to_string(),
            parents: commit.parent_ids().map(|p| p.to_string()).collect(),
            author: Identity::new(
                author.name().unwrap_or_default(),
                author.email().map(str::to_string).filter(|e| !e.is_empty()),
            ),
            author_time: to_datetime(author.when()),
            commit_time: to_datetime(committer.when()),
            message: commit.message().unwrap_or_default().to_string(),
        };
        Ok(data)
    }

    /// libgit2 revwalk：push tip、hide base，拓扑 + 时间排序
    fn walk_range(&self, base_id: &str, tip_id: &str) -> Result<Vec<String>, GraphError> {
        let tip = Oid::from_str(tip_id).map_err(|_| GraphError::MissingCommit(tip_id.to_string()))?;
        let base = Oid::from_str(base_id).map_err(|_| GraphError::MissingCommit(base_id.to_string()))?;

        let mut walk = self.repo.revwalk()?;
        walk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME)?;
        walk.push(tip)?;
        walk.hide(base)?;

        walk.map(|oid| oid.map(|o| o.to_string()).map_err(GraphError::from))
            .collect()
    }

    fn changed_paths(&self, id: &str) -> Result<Vec<PathChange>, GraphError> {
        let commit = self.find_commit(id)?;
        let tree = commit.tree()?;
        let parent_tree = match commit.parents().next() {
            Some(parent) => Some(parent.tree()?),
            None => None,
        };

        let mut diff = self
            .repo
            .diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), None)?;
        let mut opts = DiffFindOptions::new();
        opts.renames(true).copies(true);
        diff.find_similar(Some(&mut opts))?;

        let mut changes = Vec::new();
        for delta in diff.deltas() {
            let change_type = match delta.status() {
                Delta::Added => ChangeType::Add,
                Delta::Copied => ChangeType::Copy,
                Delta::Deleted => ChangeType::Delete,
                Delta::Renamed => ChangeType::Rename,
                _ => ChangeType::Modify,
            };
            let file = if change_type == ChangeType::Delete {
                delta.old_file()
            } else {
                delta.new_file()
            };
            if let Some(path) = file.path() {
                changes.push(PathChange::new(path.to_string_lossy(), change_type));
            }
        }
        Ok(changes)
    }
}

/// 目录下的裸仓库/工作区仓库
#[derive(Debug, Clone)]
pub struct GitRepositories {
    root: PathBuf,
}

impl GitRepositories {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl RepositoryDirectory for GitRepositories {
    fn repository(&self, name: &str) -> Option<RepositoryModel> {
        self.root
            .join(name)
            .exists()
            .then(|| RepositoryModel::new(name))
    }

    fn open_graph(&self, name: &str) -> Result<Box<dyn RevisionGraph>, GraphError> {
        let path = self.root.join(name);
        if !path.exists() {
            return Err(GraphError::MissingRepository(name.to_string()));
        }
        debug!(repository = name, "Opening revision graph");
        Ok(Box::new(GitGraph::open(&path)?))
    }
}
