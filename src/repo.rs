//! Repository lifecycle and the operation facade.
//!
//! [`Repository::init`] lays down the `.evo` structure; [`Repository::open`]
//! discovers an existing repository by walking up from a start directory.
//! Both return a handle owning the background services (compactor and
//! large-file GC); the services stop when the handle is shut down or
//! dropped — there is no process-global state.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::commit::{self, Commit, CommitStore, ExtendedOp, MergeFilter};
use crate::compact::{self, CompactionConfig, CompactionService};
use crate::config::Config;
use crate::core::{CommitId, Document, FileId, LamportClock, NodeId, Rga, StreamName};
use crate::index::Index;
use crate::ingest::{self, IngestContext, IngestReport, RepoStatus, DEFAULT_WORKERS};
use crate::lfs::{LargeFileStore, LfsGcService, DEFAULT_GC_INTERVAL};
use crate::oplog::OpLog;
use crate::paths;
use crate::signing::{Ed25519Signer, SigningError};
use crate::Result;

pub const DEFAULT_STREAM: &str = "main";

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RepoError {
    #[error("no evo repository found above {start}")]
    NotARepository { start: PathBuf },

    #[error("an evo repository already exists at {path}")]
    AlreadyInitialized { path: PathBuf },

    #[error("stream `{name}` does not exist")]
    StreamNotFound { name: StreamName },

    #[error("stream `{name}` already exists")]
    StreamAlreadyExists { name: StreamName },

    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub struct Repository {
    root: PathBuf,
    node: NodeId,
    clock: LamportClock,
    config: Config,
    oplog: OpLog,
    commits: CommitStore,
    lfs: LargeFileStore,
    compactor: Option<CompactionService>,
    lfs_gc: Option<LfsGcService>,
}

impl Repository {
    /// Create a fresh repository at `root` and start its background
    /// services.
    pub fn init(root: &Path) -> Result<Self> {
        let evo = paths::evo_dir(root);
        if evo.exists() {
            return Err(RepoError::AlreadyInitialized { path: evo }.into());
        }
        for dir in [
            evo.clone(),
            paths::ops_dir(root),
            paths::commits_dir(root),
            paths::config_dir(root),
            paths::streams_dir(root),
            paths::largefiles_dir(root),
            paths::chunks_dir(root),
        ] {
            fs::create_dir_all(&dir).map_err(|source| RepoError::Io { path: dir, source })?;
        }

        let main = StreamName::parse(DEFAULT_STREAM)?;
        write_file(&paths::head_file(root), DEFAULT_STREAM.as_bytes())?;
        write_file(&paths::stream_marker(root, &main), b"")?;
        write_file(&paths::index_file(root), b"")?;
        let config = Config::default();
        config.save(root)?;

        let node = NodeId::generate();
        write_file(&paths::node_id_file(root), node.to_string().as_bytes())?;

        Ok(Self::assemble(root.to_path_buf(), node, config))
    }

    /// Open the repository containing `start`, walking up the ancestry.
    pub fn open(start: &Path) -> Result<Self> {
        let root = Self::discover(start)?;
        let config = Config::load(&root)?;
        let node = load_or_create_node_id(&root)?;
        Ok(Self::assemble(root, node, config))
    }

    /// Find the repository root containing `start`.
    pub fn discover(start: &Path) -> Result<PathBuf> {
        let mut current = start
            .canonicalize()
            .map_err(|source| RepoError::Io {
                path: start.to_path_buf(),
                source,
            })?;
        loop {
            if paths::evo_dir(&current).is_dir() {
                return Ok(current);
            }
            if !current.pop() {
                return Err(RepoError::NotARepository {
                    start: start.to_path_buf(),
                }
                .into());
            }
        }
    }

    fn assemble(root: PathBuf, node: NodeId, config: Config) -> Self {
        let compactor =
            CompactionService::start(root.clone(), CompactionConfig::default());
        let lfs_gc = LfsGcService::start(root.clone(), DEFAULT_GC_INTERVAL);
        Self {
            oplog: OpLog::new(&root),
            commits: CommitStore::new(&root),
            lfs: LargeFileStore::new(&root),
            root,
            node,
            clock: LamportClock::new(),
            config,
            compactor: Some(compactor),
            lfs_gc: Some(lfs_gc),
        }
    }

    /// Stop background services, waiting for in-flight ticks. Called
    /// automatically on drop.
    pub fn shutdown(&mut self) {
        if let Some(mut compactor) = self.compactor.take() {
            compactor.stop();
        }
        if let Some(mut gc) = self.lfs_gc.take() {
            gc.stop();
        }
    }

    // -- accessors ---------------------------------------------------------

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn node_id(&self) -> NodeId {
        self.node
    }

    pub fn clock(&self) -> &LamportClock {
        &self.clock
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn set_config(&mut self, config: Config) -> Result<()> {
        config.save(&self.root)?;
        self.config = config;
        Ok(())
    }

    pub fn oplog(&self) -> &OpLog {
        &self.oplog
    }

    pub fn commit_store(&self) -> &CommitStore {
        &self.commits
    }

    pub fn lfs(&self) -> &LargeFileStore {
        &self.lfs
    }

    // -- streams -----------------------------------------------------------

    pub fn current_stream(&self) -> Result<StreamName> {
        let path = paths::head_file(&self.root);
        let contents = fs::read_to_string(&path)
            .map_err(|source| RepoError::Io { path, source })?;
        Ok(StreamName::parse(contents.trim())?)
    }

    pub fn create_stream(&self, name: &StreamName) -> Result<()> {
        let marker = paths::stream_marker(&self.root, name);
        if marker.exists() {
            return Err(RepoError::StreamAlreadyExists { name: name.clone() }.into());
        }
        write_file(&marker, b"")?;
        Ok(())
    }

    pub fn switch_stream(&self, name: &StreamName) -> Result<()> {
        if !paths::stream_marker(&self.root, name).exists() {
            return Err(RepoError::StreamNotFound { name: name.clone() }.into());
        }
        write_file(&paths::head_file(&self.root), name.as_str().as_bytes())?;
        Ok(())
    }

    pub fn list_streams(&self) -> Result<Vec<StreamName>> {
        let dir = paths::streams_dir(&self.root);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(RepoError::Io { path: dir, source }.into()),
        };
        let mut out = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| RepoError::Io {
                path: dir.clone(),
                source,
            })?;
            if entry.path().is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if let Ok(stream) = StreamName::parse(name) {
                    out.push(stream);
                }
            }
        }
        out.sort();
        Ok(out)
    }

    // -- working tree ------------------------------------------------------

    /// Reconcile the index with the working tree: new paths get fresh
    /// file ids, vanished paths are dropped.
    pub fn update_index(&self) -> Result<Index> {
        let ignore = ingest::IgnoreList::load(&self.root)?;
        let working = ingest::list_working_files(&self.root, &ignore)?;
        let mut index = Index::load(&self.root)?;
        index.update(working.iter().map(String::as_str))?;
        index.save(&self.root)?;
        Ok(index)
    }

    /// Diff every tracked file against the current stream and append the
    /// resulting ops. Returns the paths that changed.
    pub fn ingest(&self) -> Result<IngestReport> {
        let index = Index::load(&self.root)?;
        let ctx = self.ingest_context(&index)?;
        Ok(ingest::ingest_changes(&ctx)?)
    }

    pub fn status(&self) -> Result<RepoStatus> {
        let index = Index::load(&self.root)?;
        let ctx = self.ingest_context(&index)?;
        Ok(ingest::status(&ctx)?)
    }

    fn ingest_context<'a>(&'a self, index: &'a Index) -> Result<IngestContext<'a>> {
        Ok(IngestContext {
            repo_root: &self.root,
            stream: self.current_stream()?,
            node: self.node,
            clock: &self.clock,
            oplog: &self.oplog,
            lfs: &self.lfs,
            index,
            large_threshold: self.config.files.large_threshold,
            workers: DEFAULT_WORKERS,
        })
    }

    // -- documents ---------------------------------------------------------

    /// Materialize the document of one file in one stream.
    pub fn document(&self, stream: &StreamName, file: &FileId) -> Result<Document> {
        let ops = self.oplog.load_all(stream, file)?;
        Ok(Document::from_rga(Rga::replay(ops)?))
    }

    /// The current text of a tracked path in the current stream.
    pub fn file_lines(&self, rel_path: &str) -> Result<Option<Vec<String>>> {
        let index = Index::load(&self.root)?;
        let Some(file) = index.lookup(rel_path) else {
            return Ok(None);
        };
        let stream = self.current_stream()?;
        Ok(Some(self.document(&stream, &file)?.materialize()))
    }

    // -- commits -----------------------------------------------------------

    /// Commit every op of the current stream not yet captured by a
    /// commit. `sign` requires `signing.keyPath` to be configured.
    pub fn commit(&self, message: &str, sign: bool) -> Result<Commit> {
        self.commit_ops(message, Vec::new(), sign)
    }

    /// Like [`Repository::commit`] but with an explicit op list; an empty
    /// list auto-gathers.
    pub fn commit_ops(
        &self,
        message: &str,
        ops: Vec<ExtendedOp>,
        sign: bool,
    ) -> Result<Commit> {
        let stream = self.current_stream()?;
        let signer = if sign { Some(self.require_signer()?) } else { None };
        let commit = commit::create_commit(
            &self.oplog,
            &self.commits,
            &stream,
            message,
            &self.config.user.name,
            &self.config.user.email,
            ops,
            signer.as_ref().map(|s| s as &dyn crate::signing::Signer),
        )?;
        Ok(commit)
    }

    /// Commits of a stream, oldest first. When `verifySignatures` is
    /// enabled, every signed commit is checked and a mismatch fails with
    /// `SignatureInvalid`.
    pub fn list_commits(&self, stream: &StreamName) -> Result<Vec<Commit>> {
        let commits = self.commits.list(stream)?;
        if self.config.verify_signatures {
            if let Some(signer) = self.signer()? {
                for commit in &commits {
                    if commit.signature.is_some() {
                        commit::verify_commit(commit, &signer)?;
                    }
                }
            }
        }
        Ok(commits)
    }

    /// Revert a commit of the current stream.
    pub fn revert(&self, commit_id: &CommitId) -> Result<Commit> {
        let stream = self.current_stream()?;
        let commit = commit::revert_commit(
            &self.oplog,
            &self.commits,
            &self.clock,
            self.node,
            &stream,
            commit_id,
            &self.config.user.name,
            &self.config.user.email,
            None,
        )?;
        Ok(commit)
    }

    /// Replicate one commit (found in any stream) into `target`.
    pub fn cherry_pick(&self, commit_id: &CommitId, target: &StreamName) -> Result<Option<Commit>> {
        self.require_stream(target)?;
        Ok(commit::cherry_pick(&self.oplog, &self.commits, commit_id, target)?)
    }

    /// Replicate every commit of `source` missing from `target`.
    pub fn merge(&self, source: &StreamName, target: &StreamName) -> Result<Vec<CommitId>> {
        self.require_stream(source)?;
        self.require_stream(target)?;
        Ok(commit::merge_streams(&self.oplog, &self.commits, source, target)?)
    }

    /// Replicate only the ops accepted by `filter`.
    pub fn partial_merge(
        &self,
        source: &StreamName,
        target: &StreamName,
        filter: &MergeFilter,
    ) -> Result<Vec<CommitId>> {
        self.require_stream(source)?;
        self.require_stream(target)?;
        Ok(commit::partial_merge(
            &self.oplog,
            &self.commits,
            source,
            target,
            filter,
        )?)
    }

    // -- maintenance -------------------------------------------------------

    /// Run one compaction pass over every stream, in the foreground.
    pub fn compact_now(&self) -> Result<compact::service::CompactionStats> {
        Ok(compact::service::compact_repository(
            &self.root,
            &CompactionConfig::default(),
        )?)
    }

    // -- signing -----------------------------------------------------------

    fn signer(&self) -> Result<Option<Ed25519Signer>> {
        let key_path = &self.config.signing.key_path;
        if key_path.is_empty() {
            return Ok(None);
        }
        Ok(Some(Ed25519Signer::load(Path::new(key_path))?))
    }

    fn require_signer(&self) -> Result<Ed25519Signer> {
        match self.signer()? {
            Some(signer) => Ok(signer),
            None => Err(SigningError::InvalidKey {
                path: PathBuf::new(),
                reason: "signing requested but signing.keyPath is not configured".to_string(),
            }
            .into()),
        }
    }

    fn require_stream(&self, name: &StreamName) -> Result<()> {
        if paths::stream_marker(&self.root, name).exists() {
            Ok(())
        } else {
            Err(RepoError::StreamNotFound { name: name.clone() }.into())
        }
    }
}

impl Drop for Repository {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("root", &self.root)
            .field("node", &self.node)
            .finish_non_exhaustive()
    }
}

fn write_file(path: &Path, contents: &[u8]) -> std::result::Result<(), RepoError> {
    fs::write(path, contents).map_err(|source| RepoError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn load_or_create_node_id(root: &Path) -> Result<NodeId> {
    let path = paths::node_id_file(root);
    match fs::read_to_string(&path) {
        Ok(contents) => Ok(NodeId::parse(contents.trim())?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let node = NodeId::generate();
            write_file(&path, node.to_string().as_bytes())?;
            Ok(node)
        }
        Err(source) => Err(RepoError::Io { path, source }.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn init_creates_the_layout() {
        let dir = tempfile::tempdir().unwrap();
        let mut repo = Repository::init(dir.path()).unwrap();
        assert!(paths::evo_dir(dir.path()).is_dir());
        assert!(paths::head_file(dir.path()).is_file());
        assert!(paths::stream_marker(dir.path(), &StreamName::parse("main").unwrap()).is_file());
        assert!(paths::index_file(dir.path()).is_file());
        assert!(paths::config_file(dir.path()).is_file());
        assert_eq!(repo.current_stream().unwrap().as_str(), "main");
        repo.shutdown();
    }

    #[test]
    fn init_twice_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut repo = Repository::init(dir.path()).unwrap();
        repo.shutdown();
        let err = Repository::init(dir.path()).unwrap_err();
        assert!(matches!(
            err,
            Error::Repo(RepoError::AlreadyInitialized { .. })
        ));
    }

    #[test]
    fn open_discovers_from_a_subdirectory() {
        let dir = tempfile::tempdir().unwrap();
        Repository::init(dir.path()).unwrap().shutdown();
        let sub = dir.path().join("src/deeply/nested");
        fs::create_dir_all(&sub).unwrap();
        let mut repo = Repository::open(&sub).unwrap();
        assert_eq!(
            repo.root().canonicalize().unwrap(),
            dir.path().canonicalize().unwrap()
        );
        repo.shutdown();
    }

    #[test]
    fn open_outside_a_repository_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = Repository::open(dir.path()).unwrap_err();
        assert!(matches!(err, Error::Repo(RepoError::NotARepository { .. })));
    }

    #[test]
    fn node_id_is_stable_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let mut repo = Repository::init(dir.path()).unwrap();
        let first = repo.node_id();
        repo.shutdown();
        drop(repo);
        let mut repo = Repository::open(dir.path()).unwrap();
        assert_eq!(repo.node_id(), first);
        repo.shutdown();
    }

    #[test]
    fn stream_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let mut repo = Repository::init(dir.path()).unwrap();
        let feature = StreamName::parse("feature").unwrap();

        repo.create_stream(&feature).unwrap();
        assert!(matches!(
            repo.create_stream(&feature).unwrap_err(),
            Error::Repo(RepoError::StreamAlreadyExists { .. })
        ));

        repo.switch_stream(&feature).unwrap();
        assert_eq!(repo.current_stream().unwrap(), feature);

        let ghost = StreamName::parse("ghost").unwrap();
        assert!(matches!(
            repo.switch_stream(&ghost).unwrap_err(),
            Error::Repo(RepoError::StreamNotFound { .. })
        ));

        let streams = repo.list_streams().unwrap();
        assert_eq!(streams.len(), 2);
        repo.shutdown();
    }

    #[test]
    fn config_round_trips_through_the_handle() {
        let dir = tempfile::tempdir().unwrap();
        let mut repo = Repository::init(dir.path()).unwrap();
        let mut config = repo.config().clone();
        config.user.name = "Ada".to_string();
        repo.set_config(config).unwrap();
        repo.shutdown();
        drop(repo);

        let mut repo = Repository::open(dir.path()).unwrap();
        assert_eq!(repo.config().user.name, "Ada");
        repo.shutdown();
    }
}
