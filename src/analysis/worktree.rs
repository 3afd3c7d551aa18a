//! # Working Tree Controller
//!
//! Owns one cloned repository on disk and moves it between commits and
//! branches. Every checkout starts from whatever state the tree was left in
//! (detached HEAD, modified files, untracked files) and forces it to exactly
//! the requested reference, or reports failure without raising.
//!
//! A working tree path may be held by only one [`WorkingTree`] in the process
//! at a time. Checkouts take `&mut self`, so they are strictly sequential.

use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{
    AutotagOption, BranchType, Direction, ErrorCode, FetchOptions, ObjectType, Oid, Repository,
    ResetType, Status, StatusOptions,
};
use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::MinerConfig;
use crate::error::{MineError, Result};
use crate::retry::RetryPolicy;
use crate::types::RepositoryHandle;
use crate::utils::{inject_token, redact};

const REMOTE: &str = "origin";
const FALLBACK_BRANCHES: &[&str] = &["main", "master"];

static ACTIVE_TREES: Lazy<Mutex<HashSet<PathBuf>>> = Lazy::new(|| Mutex::new(HashSet::new()));

/// Exclusive claim on a working tree path, released on drop
#[derive(Debug)]
struct PathClaim(PathBuf);

impl PathClaim {
    fn acquire(path: &Path) -> Result<Self> {
        let path = claim_key(path)?;
        let mut active = ACTIVE_TREES.lock().unwrap_or_else(|e| e.into_inner());
        if !active.insert(path.clone()) {
            return Err(MineError::WorkingTreeBusy(path));
        }
        Ok(Self(path))
    }
}

impl Drop for PathClaim {
    fn drop(&mut self) {
        let mut active = ACTIVE_TREES.lock().unwrap_or_else(|e| e.into_inner());
        active.remove(&self.0);
    }
}

/// Absolute path with the parent resolved, so `a/../b/repo` and `b/repo` collide
fn claim_key(path: &Path) -> Result<PathBuf> {
    let path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    let canonical = match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => parent.canonicalize().ok().map(|p| p.join(name)),
        _ => path.canonicalize().ok(),
    };
    Ok(canonical.unwrap_or(path))
}

/// Options controlling how a working tree talks to its remote
#[derive(Debug, Clone, Default)]
pub struct TreeOptions {
    pub token: Option<String>,
    pub retry: RetryPolicy,
}

impl From<&MinerConfig> for TreeOptions {
    fn from(config: &MinerConfig) -> Self {
        Self {
            token: config.token.clone(),
            retry: config.retry.clone(),
        }
    }
}

/// The ability to move a working tree to a reference and report where it is.
///
/// Implemented by [`WorkingTree`]; effort correlation only needs this much.
pub trait Checkout {
    /// Force the tree to `reference`; `false` on any failure
    fn checkout(&mut self, reference: &str) -> bool;

    /// Full hash of the commit HEAD currently points at
    fn head_commit_hash(&self) -> Option<String>;

    fn path(&self) -> &Path;
}

enum Target {
    Branch { name: String, commit: Oid },
    Detached(Oid),
}

impl Target {
    fn commit(&self) -> Oid {
        match self {
            Target::Branch { commit, .. } => *commit,
            Target::Detached(oid) => *oid,
        }
    }
}

pub struct WorkingTree {
    repo: Repository,
    handle: RepositoryHandle,
    name: String,
    options: TreeOptions,
    reused: bool,
    _claim: PathClaim,
}

impl std::fmt::Debug for WorkingTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkingTree")
            .field("handle", &self.handle)
            .field("reused", &self.reused)
            .finish()
    }
}

impl WorkingTree {
    /// Clone `remote` into `destination`, or reuse a repository already there.
    ///
    /// Anything at `destination` that is not a usable repository is removed
    /// first.
    pub fn clone_repository(remote: &str, destination: &Path, options: &TreeOptions) -> Result<Self> {
        let token = options.token.as_deref();
        let shown_remote = redact(remote, token);
        let clone_failure = |reason: String| MineError::CloneFailure {
            remote: shown_remote.clone(),
            destination: destination.to_path_buf(),
            reason: redact(&reason, token),
        };

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).map_err(|e| clone_failure(e.to_string()))?;
        }
        let claim = PathClaim::acquire(destination)?;

        if destination.exists() {
            match Repository::open(destination) {
                Ok(repo) if !repo.is_bare() && repo.workdir().is_some() => {
                    info!(path = %destination.display(), "reusing existing clone");
                    return Ok(Self::from_parts(repo, shown_remote, destination, options, true, claim));
                }
                _ => {
                    warn!(path = %destination.display(), "removing unusable directory before clone");
                    fs::remove_dir_all(destination).map_err(|e| clone_failure(e.to_string()))?;
                }
            }
        }

        let url = inject_token(remote, token);
        info!(remote = %shown_remote, path = %destination.display(), "cloning");
        let repo = options
            .retry
            .run("clone", || {
                if destination.exists() {
                    let _ = fs::remove_dir_all(destination);
                }
                let mut fetch = FetchOptions::new();
                fetch.download_tags(AutotagOption::All);
                RepoBuilder::new().fetch_options(fetch).clone(&url, destination)
            })
            .map_err(|e| clone_failure(e.message().to_string()))?;

        Ok(Self::from_parts(repo, shown_remote, destination, options, false, claim))
    }

    /// Take control of an existing repository without cloning
    pub fn open(path: &Path, options: &TreeOptions) -> Result<Self> {
        let claim = PathClaim::acquire(path)?;
        let repo = Repository::open(path)?;
        let remote = repo
            .find_remote(REMOTE)
            .ok()
            .and_then(|r| r.url().map(|u| redact(u, options.token.as_deref())))
            .unwrap_or_default();
        Ok(Self::from_parts(repo, remote, path, options, true, claim))
    }

    fn from_parts(
        repo: Repository,
        remote: String,
        root: &Path,
        options: &TreeOptions,
        reused: bool,
        claim: PathClaim,
    ) -> Self {
        let current_ref = repo
            .head()
            .ok()
            .and_then(|h| h.shorthand().map(str::to_string));
        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| root.display().to_string());

        Self {
            repo,
            handle: RepositoryHandle {
                root: root.to_path_buf(),
                remote,
                current_ref,
            },
            name,
            options: options.clone(),
            reused,
            _claim: claim,
        }
    }

    pub fn handle(&self) -> &RepositoryHandle {
        &self.handle
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// True when the last `clone_repository` found an existing clone
    pub fn was_reused(&self) -> bool {
        self.reused
    }

    /// Find the branch the remote considers default and check it out.
    ///
    /// Tries the remote's advertised default first, then `main`, then
    /// `master`; the first one that checks out wins.
    pub fn resolve_default_branch(&mut self) -> Result<String> {
        let mut candidates: Vec<String> = Vec::new();
        if let Some(advertised) = self.advertised_default_branch() {
            debug!(branch = %advertised, "remote advertises default branch");
            candidates.push(advertised);
        }
        for fallback in FALLBACK_BRANCHES {
            if !candidates.iter().any(|c| c == fallback) {
                candidates.push(fallback.to_string());
            }
        }

        for candidate in &candidates {
            if self.checkout(candidate) {
                info!(branch = %candidate, "resolved default branch");
                return Ok(candidate.clone());
            }
        }

        Err(MineError::BranchResolutionFailure {
            repository: self.name.clone(),
            tried: candidates,
        })
    }

    fn advertised_default_branch(&self) -> Option<String> {
        let prefix = format!("refs/remotes/{REMOTE}/");
        let from_symref = self
            .repo
            .find_reference(&format!("{prefix}HEAD"))
            .ok()
            .and_then(|r| r.symbolic_target().map(str::to_string))
            .and_then(|target| target.strip_prefix(&prefix).map(str::to_string));
        if from_symref.is_some() {
            return from_symref;
        }

        let mut remote = self.repo.find_remote(REMOTE).ok()?;
        remote.connect(Direction::Fetch).ok()?;
        let branch = remote
            .default_branch()
            .ok()
            .and_then(|buf| buf.as_str().map(str::to_string))
            .and_then(|name| name.strip_prefix("refs/heads/").map(str::to_string));
        let _ = remote.disconnect();
        branch
    }

    fn try_checkout(&mut self, reference: &str) -> Result<()> {
        let failure = |step: &'static str| {
            move |e: MineError| MineError::CheckoutFailure {
                reference: reference.to_string(),
                step,
                reason: e.to_string(),
            }
        };

        self.fetch_all().map_err(failure("fetch"))?;
        self.clean_untracked().map_err(failure("clean"))?;
        self.reset_hard().map_err(failure("reset"))?;
        let target = self.resolve_target(reference).map_err(failure("resolve"))?;
        self.force_checkout(&target).map_err(failure("checkout"))?;

        let head = self.head_commit_hash();
        if head.as_deref() != Some(target.commit().to_string().as_str()) {
            return Err(MineError::CheckoutFailure {
                reference: reference.to_string(),
                step: "verify",
                reason: format!(
                    "HEAD is at {} instead of {}",
                    head.unwrap_or_else(|| "nothing".to_string()),
                    target.commit()
                ),
            });
        }
        Ok(())
    }

    /// Update all remote-tracking refs; a tree without a remote has nothing to fetch
    fn fetch_all(&self) -> Result<()> {
        let mut remote = match self.repo.find_remote(REMOTE) {
            Ok(remote) => remote,
            Err(e) if e.code() == ErrorCode::NotFound => {
                debug!("no {} remote, skipping fetch", REMOTE);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        self.options
            .retry
            .run("fetch", || {
                let mut fetch = FetchOptions::new();
                fetch.download_tags(AutotagOption::All);
                remote.fetch(&[] as &[&str], Some(&mut fetch), None)
            })
            .map_err(|e| {
                MineError::Git(git2::Error::new(
                    e.code(),
                    e.class(),
                    redact(e.message(), self.options.token.as_deref()),
                ))
            })
    }

    /// Remove untracked files and directories; ignored files are left alone
    fn clean_untracked(&self) -> Result<()> {
        let Some(workdir) = self.repo.workdir() else {
            return Ok(());
        };

        let mut opts = StatusOptions::new();
        opts.include_untracked(true)
            .recurse_untracked_dirs(false)
            .include_ignored(false);
        let statuses = self.repo.statuses(Some(&mut opts))?;

        let untracked: Vec<PathBuf> = statuses
            .iter()
            .filter(|entry| entry.status().contains(Status::WT_NEW))
            .filter_map(|entry| entry.path().map(|p| workdir.join(p)))
            .collect();

        for path in untracked {
            debug!(path = %path.display(), "removing untracked");
            if path.is_dir() {
                fs::remove_dir_all(&path)?;
            } else {
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }

    /// Throw away changes to tracked files
    fn reset_hard(&self) -> Result<()> {
        let head = match self.repo.head() {
            Ok(head) => head,
            Err(e) if e.code() == ErrorCode::UnbornBranch => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let object = head.peel(ObjectType::Commit)?;
        self.repo.reset(&object, ResetType::Hard, None)?;
        Ok(())
    }

    /// Branch names (local, then remote-tracking) win over revision syntax
    fn resolve_target(&self, reference: &str) -> Result<Target> {
        let remote_branch = self
            .repo
            .find_branch(&format!("{REMOTE}/{reference}"), BranchType::Remote)
            .ok()
            .and_then(|b| b.get().target());
        let local_branch = self
            .repo
            .find_branch(reference, BranchType::Local)
            .ok()
            .and_then(|b| b.get().target());

        if let Some(commit) = remote_branch.or(local_branch) {
            return Ok(Target::Branch {
                name: reference.to_string(),
                commit,
            });
        }

        let commit = self.repo.revparse_single(reference)?.peel_to_commit()?;
        Ok(Target::Detached(commit.id()))
    }

    fn force_checkout(&self, target: &Target) -> Result<()> {
        let commit = self.repo.find_commit(target.commit())?;

        let mut checkout = CheckoutBuilder::new();
        checkout.force().remove_untracked(true);
        self.repo.checkout_tree(commit.as_object(), Some(&mut checkout))?;

        // Detach first so the branch below may be moved even if it is HEAD.
        self.repo.set_head_detached(commit.id())?;
        if let Target::Branch { name, .. } = target {
            self.repo.branch(name, &commit, true)?;
            self.repo.set_head(&format!("refs/heads/{name}"))?;
        }
        Ok(())
    }

    /// Remove the working tree from disk
    pub fn destroy(self) -> Result<()> {
        let WorkingTree {
            repo, handle, _claim, ..
        } = self;
        drop(repo);

        info!(path = %handle.root.display(), "removing working tree");
        match fs::remove_dir_all(&handle.root) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(MineError::CleanupFailure {
                path: handle.root.clone(),
                reason: e.to_string(),
            }),
        }
    }
}

impl Checkout for WorkingTree {
    fn checkout(&mut self, reference: &str) -> bool {
        match self.try_checkout(reference) {
            Ok(()) => {
                debug!(reference, "checked out");
                self.handle.current_ref = Some(reference.to_string());
                true
            }
            Err(e) => {
                warn!(repository = %self.name, "{}", e);
                self.handle.current_ref = None;
                false
            }
        }
    }

    fn head_commit_hash(&self) -> Option<String> {
        self.repo
            .head()
            .ok()
            .and_then(|h| h.peel_to_commit().ok())
            .map(|c| c.id().to_string())
    }

    fn path(&self) -> &Path {
        &self.handle.root
    }
}
