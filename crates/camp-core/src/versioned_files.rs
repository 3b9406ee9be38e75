//! Versioned file operations with Git-based version control.
//!
//! Each patient's clinical records live in a local Git repository (`git2`/libgit2). This module
//! provides the services that write those files, ensuring:
//!
//! - **Atomic multi-file operations**: several files are written and committed in one commit,
//!   with automatic rollback on failure
//! - **Consistent commit messages**: `<domain>:<action>: <summary>` followed by structured
//!   trailers naming the author, their role and the clinic
//! - **Immutable audit trail**: records are never deleted; superseding a record is itself a
//!   commit, so every earlier state stays in history
//!
//! Commit messages must never carry patient identifiers or clinical content. Summaries are
//! fixed phrases chosen by the calling service.
//!
//! ## Branch Policy
//!
//! All clinical repositories use `refs/heads/main`.

use crate::author::Author;
use crate::{CoreError, CoreResult};
use camp_types::NonEmptyText;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashSet;
use std::fmt;
use std::path::{Component, Path, PathBuf};

const MAIN_REF: &str = "refs/heads/main";

const AUTHOR_NAME_TRAILER: &str = "Author-Name";
const AUTHOR_ROLE_TRAILER: &str = "Author-Role";
const CLINIC_TRAILER: &str = "Clinic";

/// What part of the clinical record a commit touches.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub(crate) enum CommitDomain {
    Record,
    Diagnosis,
    Treatment,
    Mammography,
    GeneralPhysician,
}

impl CommitDomain {
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::Record => "record",
            Self::Diagnosis => "diagnosis",
            Self::Treatment => "treatment",
            Self::Mammography => "mammography",
            Self::GeneralPhysician => "gp",
        }
    }
}

impl fmt::Display for CommitDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Controlled vocabulary for commit actions.
///
/// - **`Create`**: new content added to the record.
/// - **`Superseded`**: a clinical decision that newer content replaces older content. The older
///   record stays in the tree, marked with what replaced it.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub(crate) enum CommitAction {
    Create,
    Superseded,
}

impl CommitAction {
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Superseded => "superseded",
        }
    }
}

impl fmt::Display for CommitAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single `Key: Value` trailer line.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub(crate) struct CommitTrailer {
    key: String,
    value: String,
}

impl CommitTrailer {
    pub(crate) fn new(key: impl Into<String>, value: impl Into<String>) -> CoreResult<Self> {
        let key = key.into().trim().to_string();
        let value = value.into().trim().to_string();

        if key.is_empty()
            || key.contains(['\n', '\r'])
            || key.contains(':')
            || value.is_empty()
            || value.contains(['\n', '\r'])
        {
            return Err(CoreError::invalid(
                "commit trailer key/value must be non-empty and single-line (key cannot contain ':')",
            ));
        }

        Ok(Self { key, value })
    }
}

/// A structured commit message.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct CommitMessage {
    domain: CommitDomain,
    action: CommitAction,
    summary: NonEmptyText,
    clinic: NonEmptyText,
    trailers: Vec<CommitTrailer>,
}

impl CommitMessage {
    pub(crate) fn new(
        domain: CommitDomain,
        action: CommitAction,
        summary: impl AsRef<str>,
        clinic: impl AsRef<str>,
    ) -> CoreResult<Self> {
        let summary_str = summary.as_ref().trim();
        if summary_str.contains(['\n', '\r']) {
            return Err(CoreError::invalid("commit summary must be single-line"));
        }
        let summary = NonEmptyText::new(summary_str)
            .map_err(|_| CoreError::invalid("commit summary must be non-empty"))?;

        let clinic_str = clinic.as_ref().trim();
        if clinic_str.contains(['\n', '\r']) {
            return Err(CoreError::invalid("clinic name must be single-line"));
        }
        let clinic = NonEmptyText::new(clinic_str)
            .map_err(|_| CoreError::invalid("clinic name must be non-empty"))?;

        Ok(Self {
            domain,
            action,
            summary,
            clinic,
            trailers: Vec::new(),
        })
    }

    pub(crate) fn with_trailer(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> CoreResult<Self> {
        let trailer = CommitTrailer::new(key, value)?;
        if is_reserved_trailer(&trailer.key) {
            return Err(CoreError::ReservedTrailerKey);
        }
        self.trailers.push(trailer);
        Ok(self)
    }

    /// Renders the subject line and trailers.
    ///
    /// Reserved trailers come first in a fixed order; other trailers follow sorted by key.
    pub(crate) fn render_with_author(&self, author: &Author) -> CoreResult<String> {
        author.validate_commit_author()?;

        let mut rendered = format!("{}:{}: {}", self.domain, self.action, self.summary);

        rendered.push_str("\n\n");
        for (key, value) in [
            (AUTHOR_NAME_TRAILER, author.name.as_str()),
            (AUTHOR_ROLE_TRAILER, author.role.as_str()),
            (CLINIC_TRAILER, self.clinic.as_str()),
        ] {
            rendered.push_str(key);
            rendered.push_str(": ");
            rendered.push_str(value.trim());
            rendered.push('\n');
        }

        let mut other = self.trailers.clone();
        other.sort_by(|a, b| (&a.key, &a.value).cmp(&(&b.key, &b.value)));
        for trailer in other {
            rendered.push_str(&trailer.key);
            rendered.push_str(": ");
            rendered.push_str(&trailer.value);
            rendered.push('\n');
        }

        Ok(rendered.trim_end().to_string())
    }
}

fn is_reserved_trailer(key: &str) -> bool {
    key.starts_with("Author-") || key == CLINIC_TRAILER
}

/// One entry of a repository's history.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitInfo {
    pub id: String,
    pub summary: String,
    pub author_name: Option<String>,
    pub author_role: Option<String>,
    pub clinic: Option<String>,
    pub time: DateTime<Utc>,
}

/// Describes one file write within a commit.
#[derive(Debug, Clone)]
pub struct FileToWrite<'a> {
    /// Path relative to the repository working directory.
    pub relative_path: &'a Path,
    /// New file content.
    pub content: &'a str,
    /// Previous content, restored if the commit fails. `None` means the file is new and is
    /// removed on failure.
    pub old_content: Option<&'a str>,
}

/// Git-backed versioned file service for one repository.
pub struct VersionedFileService {
    repo: git2::Repository,
    workdir: PathBuf,
}

impl VersionedFileService {
    pub(crate) fn init(workdir: &Path) -> CoreResult<Self> {
        let repo = git2::Repository::init(workdir).map_err(CoreError::GitInit)?;
        // git2 may canonicalise the path; strip prefixes against what it reports.
        let actual_workdir = repo
            .workdir()
            .ok_or_else(|| {
                CoreError::GitInit(git2::Error::from_str("repository has no working directory"))
            })?
            .to_path_buf();
        Ok(Self {
            repo,
            workdir: actual_workdir,
        })
    }

    pub(crate) fn open(workdir: &Path) -> CoreResult<Self> {
        let repo = git2::Repository::open_ext(
            workdir,
            git2::RepositoryOpenFlags::NO_SEARCH,
            std::iter::empty::<&std::ffi::OsStr>(),
        )
        .map_err(CoreError::GitOpen)?;
        let actual_workdir = repo
            .workdir()
            .ok_or_else(|| {
                CoreError::GitOpen(git2::Error::from_str("repository has no working directory"))
            })?
            .to_path_buf();
        Ok(Self {
            repo,
            workdir: actual_workdir,
        })
    }

    /// Writes `files` and commits them in a single commit.
    ///
    /// On any failure, written files are restored to `old_content` (or removed) in reverse order
    /// and newly created directories are removed deepest first.
    pub(crate) fn write_and_commit_files(
        repo_path: &Path,
        author: &Author,
        msg: &CommitMessage,
        files: &[FileToWrite<'_>],
    ) -> CoreResult<git2::Oid> {
        let repo = Self::open(repo_path)?;

        let mut created_dirs: Vec<PathBuf> = Vec::new();
        let mut written_files: Vec<(PathBuf, Option<String>)> = Vec::new();

        let result: CoreResult<git2::Oid> = (|| {
            for file in files {
                ensure_relative(file.relative_path)?;
            }

            let mut dirs_needed = HashSet::new();
            for file in files {
                let full_path = repo.workdir.join(file.relative_path);
                if let Some(parent) = full_path.parent() {
                    let mut current = parent;
                    while current != repo.workdir && !current.exists() {
                        dirs_needed.insert(current.to_path_buf());
                        match current.parent() {
                            Some(p) => current = p,
                            None => break,
                        }
                    }
                }
            }

            let mut dirs_to_create: Vec<PathBuf> = dirs_needed.into_iter().collect();
            dirs_to_create.sort_by_key(|p| p.components().count());

            for dir in &dirs_to_create {
                std::fs::create_dir(dir).map_err(CoreError::FileWrite)?;
                created_dirs.push(dir.clone());
            }

            for file in files {
                let full_path = repo.workdir.join(file.relative_path);
                std::fs::write(&full_path, file.content).map_err(CoreError::FileWrite)?;
                written_files.push((full_path, file.old_content.map(str::to_string)));
            }

            let paths: Vec<PathBuf> = files
                .iter()
                .map(|f| f.relative_path.to_path_buf())
                .collect();
            repo.commit_paths(author, msg, &paths)
        })();

        match result {
            Ok(oid) => Ok(oid),
            Err(write_error) => {
                for (full_path, old_content) in written_files.iter().rev() {
                    match old_content {
                        Some(contents) => {
                            let _ = std::fs::write(full_path, contents);
                        }
                        None => {
                            let _ = std::fs::remove_file(full_path);
                        }
                    }
                }

                for dir in created_dirs.iter().rev() {
                    let _ = std::fs::remove_dir(dir);
                }

                Err(write_error)
            }
        }
    }

    /// Creates a repository at `repo_dir` and makes its first commit.
    ///
    /// If anything fails, the whole directory is removed again.
    pub(crate) fn init_and_commit(
        repo_dir: &Path,
        author: &Author,
        message: &CommitMessage,
        files: &[FileToWrite<'_>],
    ) -> CoreResult<()> {
        let result: CoreResult<()> = (|| {
            std::fs::create_dir_all(repo_dir).map_err(CoreError::StorageDirCreation)?;
            let _repo = Self::init(repo_dir)?;
            Self::write_and_commit_files(repo_dir, author, message, files)?;
            Ok(())
        })();

        match result {
            Ok(()) => Ok(()),
            Err(init_error) => {
                if let Err(cleanup_err) = std::fs::remove_dir_all(repo_dir) {
                    if cleanup_err.kind() != std::io::ErrorKind::NotFound {
                        return Err(CoreError::RollbackFailed {
                            path: repo_dir.to_path_buf(),
                            commit_error: Box::new(init_error),
                            rollback_error: cleanup_err,
                        });
                    }
                }
                Err(init_error)
            }
        }
    }

    /// Commit history of `main`, newest first.
    pub(crate) fn history(repo_path: &Path, limit: Option<usize>) -> CoreResult<Vec<CommitInfo>> {
        let service = Self::open(repo_path)?;
        let repo = &service.repo;

        match repo.head() {
            Ok(_) => {}
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => return Ok(Vec::new()),
            Err(e) if e.code() == git2::ErrorCode::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CoreError::GitHead(e)),
        }

        let mut walk = repo.revwalk().map_err(CoreError::GitRevwalk)?;
        walk.push_head().map_err(CoreError::GitRevwalk)?;
        walk.set_sorting(git2::Sort::TIME)
            .map_err(CoreError::GitRevwalk)?;

        let mut entries = Vec::new();
        for oid in walk {
            if limit.is_some_and(|max| entries.len() >= max) {
                break;
            }
            let oid = oid.map_err(CoreError::GitRevwalk)?;
            let commit = repo.find_commit(oid).map_err(CoreError::GitPeel)?;
            let message = commit.message().unwrap_or("");
            let time = Utc
                .timestamp_opt(commit.time().seconds(), 0)
                .single()
                .unwrap_or_else(Utc::now);

            entries.push(CommitInfo {
                id: oid.to_string(),
                summary: message.lines().next().unwrap_or("").to_string(),
                author_name: trailer_value(message, AUTHOR_NAME_TRAILER),
                author_role: trailer_value(message, AUTHOR_ROLE_TRAILER),
                clinic: trailer_value(message, CLINIC_TRAILER),
                time,
            });
        }

        Ok(entries)
    }

    fn ensure_main_head(&self) -> CoreResult<()> {
        self.repo.set_head(MAIN_REF).map_err(CoreError::GitSetHead)?;
        Ok(())
    }

    fn commit_paths(
        &self,
        author: &Author,
        message: &CommitMessage,
        relative_paths: &[PathBuf],
    ) -> CoreResult<git2::Oid> {
        let rendered = message.render_with_author(author)?;

        self.ensure_main_head()?;
        let mut index = self.repo.index().map_err(CoreError::GitIndex)?;
        for path in relative_paths {
            index.add_path(path).map_err(CoreError::GitAdd)?;
        }
        index.write().map_err(CoreError::GitIndex)?;

        let tree_id = index.write_tree().map_err(CoreError::GitWriteTree)?;
        let tree = self
            .repo
            .find_tree(tree_id)
            .map_err(CoreError::GitFindTree)?;

        let sig = git2::Signature::now(author.name.as_str(), author.email.as_str())
            .map_err(CoreError::GitSignature)?;

        let parents = self.resolve_head_parents()?;
        let parent_refs: Vec<&git2::Commit<'_>> = parents.iter().collect();
        self.repo
            .commit(Some("HEAD"), &sig, &sig, &rendered, &tree, &parent_refs)
            .map_err(CoreError::GitCommit)
    }

    fn resolve_head_parents(&self) -> CoreResult<Vec<git2::Commit<'_>>> {
        match self.repo.head() {
            Ok(head) => {
                let commit = head.peel_to_commit().map_err(CoreError::GitPeel)?;
                Ok(vec![commit])
            }
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => Ok(vec![]),
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(vec![]),
            Err(e) => Err(CoreError::GitHead(e)),
        }
    }
}

fn ensure_relative(path: &Path) -> CoreResult<()> {
    let escapes = path.is_absolute()
        || path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)));
    if escapes {
        return Err(CoreError::invalid(
            "path must be relative to the repository and must not contain '..'",
        ));
    }
    Ok(())
}

fn trailer_value(message: &str, key: &str) -> Option<String> {
    message.lines().rev().find_map(|line| {
        let (k, v) = line.split_once(':')?;
        (k.trim() == key).then(|| v.trim().to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use camp_types::EmailAddress;
    use tempfile::TempDir;

    fn author() -> Author {
        Author {
            name: NonEmptyText::new("Dr Rao").unwrap(),
            role: NonEmptyText::new("doctor").unwrap(),
            email: EmailAddress::parse("rao@camp.example").unwrap(),
        }
    }

    fn message(domain: CommitDomain, summary: &str) -> CommitMessage {
        CommitMessage::new(domain, CommitAction::Create, summary, "Hope Clinic").unwrap()
    }

    #[test]
    fn render_puts_reserved_trailers_first() {
        let msg = message(CommitDomain::Diagnosis, "Diagnosis recorded")
            .with_trailer("Record-Kind", "follow-up")
            .unwrap();

        assert_eq!(
            msg.render_with_author(&author()).unwrap(),
            "diagnosis:create: Diagnosis recorded\n\nAuthor-Name: Dr Rao\nAuthor-Role: doctor\nClinic: Hope Clinic\nRecord-Kind: follow-up"
        );
    }

    #[test]
    fn reserved_and_malformed_trailers_are_rejected() {
        let msg = message(CommitDomain::Record, "Clinical record created");
        assert!(matches!(
            msg.clone().with_trailer("Author-Name", "Mallory"),
            Err(CoreError::ReservedTrailerKey)
        ));
        assert!(matches!(
            msg.clone().with_trailer("Clinic", "Elsewhere"),
            Err(CoreError::ReservedTrailerKey)
        ));
        assert!(matches!(
            msg.with_trailer("Bad:Key", "v"),
            Err(CoreError::InvalidInput(_))
        ));
    }

    #[test]
    fn rejects_multiline_summary_and_blank_clinic() {
        assert!(CommitMessage::new(CommitDomain::Record, CommitAction::Create, "a\nb", "Clinic").is_err());
        assert!(CommitMessage::new(CommitDomain::Record, CommitAction::Create, "ok", "  ").is_err());
    }

    #[test]
    fn init_then_commit_builds_history_newest_first() {
        let temp = TempDir::new().unwrap();
        let repo_dir = temp.path().join("patient");

        VersionedFileService::init_and_commit(
            &repo_dir,
            &author(),
            &message(CommitDomain::Record, "Clinical record created"),
            &[FileToWrite {
                relative_path: Path::new(".gitignore"),
                content: "files/\n",
                old_content: None,
            }],
        )
        .unwrap();

        VersionedFileService::write_and_commit_files(
            &repo_dir,
            &author(),
            &message(CommitDomain::Diagnosis, "Diagnosis recorded"),
            &[FileToWrite {
                relative_path: Path::new("diagnoses/one.yaml"),
                content: "condition: anaemia\n",
                old_content: None,
            }],
        )
        .unwrap();

        assert!(repo_dir.join("diagnoses/one.yaml").is_file());

        let history = VersionedFileService::history(&repo_dir, None).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].summary, "diagnosis:create: Diagnosis recorded");
        assert_eq!(history[0].author_name.as_deref(), Some("Dr Rao"));
        assert_eq!(history[0].author_role.as_deref(), Some("doctor"));
        assert_eq!(history[0].clinic.as_deref(), Some("Hope Clinic"));
        assert_eq!(history[1].summary, "record:create: Clinical record created");

        let limited = VersionedFileService::history(&repo_dir, Some(1)).unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn failed_commit_rolls_back_written_files_and_dirs() {
        let temp = TempDir::new().unwrap();
        let repo_dir = temp.path().join("patient");
        VersionedFileService::init_and_commit(
            &repo_dir,
            &author(),
            &message(CommitDomain::Record, "Clinical record created"),
            &[FileToWrite {
                relative_path: Path::new(".gitignore"),
                content: "files/\n",
                old_content: None,
            }],
        )
        .unwrap();

        // Rendering rejects this author only after files are on disk.
        let mut bad_author = author();
        bad_author.name = NonEmptyText::new("Dr\nRao").unwrap();

        let err = VersionedFileService::write_and_commit_files(
            &repo_dir,
            &bad_author,
            &message(CommitDomain::Treatment, "Treatment recorded"),
            &[
                FileToWrite {
                    relative_path: Path::new(".gitignore"),
                    content: "changed\n",
                    old_content: Some("files/\n"),
                },
                FileToWrite {
                    relative_path: Path::new("treatments/one.yaml"),
                    content: "advice: rest\n",
                    old_content: None,
                },
            ],
        )
        .unwrap_err();

        assert!(matches!(err, CoreError::InvalidAuthorName));
        assert_eq!(
            std::fs::read_to_string(repo_dir.join(".gitignore")).unwrap(),
            "files/\n"
        );
        assert!(!repo_dir.join("treatments").exists());
        assert_eq!(VersionedFileService::history(&repo_dir, None).unwrap().len(), 1);
    }

    #[test]
    fn parent_dir_paths_are_rejected() {
        assert!(ensure_relative(Path::new("../escape.yaml")).is_err());
        assert!(ensure_relative(Path::new("/abs.yaml")).is_err());
        assert!(ensure_relative(Path::new("diagnoses/a.yaml")).is_ok());
    }
}
