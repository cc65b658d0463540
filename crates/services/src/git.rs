//! Git plumbing for the commit-message helper, using git2-rs.

use anyhow::{anyhow, Context, Result};
use git2::{DiffFormat, DiffOptions, IndexAddOption, Repository, StatusOptions};
use std::path::{Path, PathBuf};

/// Diff bytes sent to the model at most.
pub const MAX_DIFF_BYTES: usize = 4000;

const TRUNCATION_NOTE: &str = "\n...(diff truncated due to size)";

pub struct GitRepo {
    repo: Repository,
    path: PathBuf,
}

impl GitRepo {
    /// Open the work tree containing `path`. The path must be a directory.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.is_dir() {
            return Err(anyhow!("the path {} is not a valid directory", path.display()));
        }
        let repo = Repository::discover(path)
            .map_err(|_| anyhow!("the path {} is not a git repository", path.display()))?;
        if repo.is_bare() {
            return Err(anyhow!("the path {} is a bare repository", path.display()));
        }
        Ok(Self {
            repo,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn status_options() -> StatusOptions {
        let mut opts = StatusOptions::new();
        opts.include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(false);
        opts
    }

    pub fn has_uncommitted_changes(&self) -> Result<bool> {
        let statuses = self.repo.statuses(Some(&mut Self::status_options()))?;
        Ok(!statuses.is_empty())
    }

    /// Every path with a staged, unstaged or untracked change, sorted.
    pub fn changed_files(&self) -> Result<Vec<String>> {
        let statuses = self.repo.statuses(Some(&mut Self::status_options()))?;
        let mut files: Vec<String> = statuses
            .iter()
            .filter_map(|entry| entry.path().map(str::to_string))
            .collect();
        files.sort();
        files.dedup();
        Ok(files)
    }

    /// Unified patch of the work tree against HEAD, new files included.
    pub fn diff_text(&self) -> Result<String> {
        let mut opts = DiffOptions::new();
        opts.include_untracked(true)
            .recurse_untracked_dirs(true)
            .show_untracked_content(true);

        let head_tree = match self.repo.head() {
            Ok(head) => Some(head.peel_to_tree()?),
            // Unborn branch: everything is new.
            Err(_) => None,
        };
        let diff = self
            .repo
            .diff_tree_to_workdir_with_index(head_tree.as_ref(), Some(&mut opts))
            .context("error getting git diff content")?;

        let mut text = String::new();
        diff.print(DiffFormat::Patch, |_delta, _hunk, line| {
            match line.origin() {
                '+' | '-' | ' ' => text.push(line.origin()),
                _ => {}
            }
            text.push_str(&String::from_utf8_lossy(line.content()));
            true
        })?;
        Ok(text)
    }

    /// Pathspec covering the opened directory, relative to the work tree.
    fn scope(&self) -> Result<String> {
        let workdir = self
            .repo
            .workdir()
            .ok_or_else(|| anyhow!("the path {} is a bare repository", self.path.display()))?;
        let workdir = workdir.canonicalize()?;
        let path = self.path.canonicalize()?;
        let relative = path.strip_prefix(&workdir).with_context(|| {
            format!("{} is outside the work tree {}", path.display(), workdir.display())
        })?;

        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        if parts.is_empty() {
            Ok("*".to_string())
        } else {
            Ok(format!("{}/*", parts.join("/")))
        }
    }

    /// Stage everything under the opened path and commit on HEAD. Returns the
    /// new commit id.
    pub fn commit_all(&self, message: &str) -> Result<String> {
        let scope = [self.scope()?];
        let mut index = self.repo.index()?;
        index
            .add_all(scope.iter(), IndexAddOption::DEFAULT, None)
            .context("error adding changes")?;
        // Picks up deletions, which add_all leaves in the index.
        index
            .update_all(scope.iter(), None)
            .context("error adding changes")?;
        index.write()?;

        let tree_id = index.write_tree()?;
        let tree = self.repo.find_tree(tree_id)?;
        let sig = self
            .repo
            .signature()
            .context("error committing changes: git user.name/user.email not configured")?;

        let parent = match self.repo.head() {
            Ok(head) => Some(head.peel_to_commit()?),
            Err(_) => None,
        };
        let parents: Vec<&git2::Commit> = parent.iter().collect();

        let oid = self
            .repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
            .context("error committing changes")?;
        Ok(oid.to_string())
    }
}

/// Cap a diff at `max_bytes`, cutting on a char boundary.
pub fn limit_diff(diff: &str, max_bytes: usize) -> String {
    if diff.len() <= max_bytes {
        return diff.to_string();
    }
    let mut cut = max_bytes;
    while !diff.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}{}", &diff[..cut], TRUNCATION_NOTE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn init_repo() -> (TempDir, GitRepo) {
        let temp_dir = TempDir::new().unwrap();
        let repo = Repository::init(temp_dir.path()).unwrap();
        let mut config = repo.config().unwrap();
        config.set_str("user.name", "Test User").unwrap();
        config.set_str("user.email", "test@example.com").unwrap();
        let git = GitRepo::open(temp_dir.path()).unwrap();
        (temp_dir, git)
    }

    #[test]
    fn test_open_rejects_non_repo() {
        let temp_dir = TempDir::new().unwrap();
        let err = GitRepo::open(temp_dir.path()).err().unwrap();
        assert!(err.to_string().contains("not a git repository"));
    }

    #[test]
    fn test_open_rejects_missing_dir() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("nope");
        let err = GitRepo::open(&missing).err().unwrap();
        assert!(err.to_string().contains("not a valid directory"));
    }

    #[test]
    fn test_changes_diff_and_commit() {
        let (temp_dir, git) = init_repo();
        assert!(!git.has_uncommitted_changes().unwrap());

        std::fs::write(temp_dir.path().join("b.txt"), "beta\n").unwrap();
        std::fs::write(temp_dir.path().join("a.txt"), "alpha\n").unwrap();
        assert!(git.has_uncommitted_changes().unwrap());
        assert_eq!(git.changed_files().unwrap(), vec!["a.txt", "b.txt"]);

        let diff = git.diff_text().unwrap();
        assert!(diff.contains("+alpha"));
        assert!(diff.contains("+beta"));

        let first = git.commit_all("Add a and b").unwrap();
        assert!(!git.has_uncommitted_changes().unwrap());

        std::fs::write(temp_dir.path().join("a.txt"), "alpha\nmore\n").unwrap();
        std::fs::remove_file(temp_dir.path().join("b.txt")).unwrap();
        assert_eq!(git.changed_files().unwrap(), vec!["a.txt", "b.txt"]);
        let diff = git.diff_text().unwrap();
        assert!(diff.contains("+more"));
        assert!(diff.contains("-beta"));

        let second = git.commit_all("Update a, drop b").unwrap();
        assert_ne!(first, second);
        assert!(!git.has_uncommitted_changes().unwrap());
    }

    #[test]
    fn test_open_from_subdirectory() {
        let (temp_dir, _git) = init_repo();
        let sub = temp_dir.path().join("src");
        std::fs::create_dir(&sub).unwrap();
        assert!(GitRepo::open(&sub).is_ok());
    }

    #[test]
    fn test_commit_from_subdirectory_stages_only_that_subtree() {
        let (temp_dir, _git) = init_repo();
        let sub = temp_dir.path().join("src");
        std::fs::create_dir(&sub).unwrap();
        std::fs::write(sub.join("lib.rs"), "fn main() {}\n").unwrap();
        std::fs::write(temp_dir.path().join("README.md"), "readme\n").unwrap();

        let git = GitRepo::open(&sub).unwrap();
        git.commit_all("Add lib").unwrap();

        assert_eq!(git.changed_files().unwrap(), vec!["README.md"]);
        let head = git.repo.head().unwrap().peel_to_tree().unwrap();
        assert!(head.get_path(Path::new("src/lib.rs")).is_ok());
        assert!(head.get_path(Path::new("README.md")).is_err());
    }

    #[test]
    fn test_limit_diff() {
        assert_eq!(limit_diff("short", 10), "short");
        let limited = limit_diff("abcdefghij", 4);
        assert_eq!(limited, format!("abcd{}", TRUNCATION_NOTE));
        // 'é' is two bytes; never split it.
        let limited = limit_diff("aé", 2);
        assert_eq!(limited, format!("a{}", TRUNCATION_NOTE));
    }
}
