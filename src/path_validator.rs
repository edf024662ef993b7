//! Path-based file-access policy (§4.4).
//!
//! Allow/deny lists plus a size cap, consulted by every file tool before it
//! touches the filesystem. Deny always wins over allow.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    OutsideAllowList,
    InDenyList,
    OutsideWorkingDir,
    Oversize,
    Empty,
}

impl Decision {
    #[must_use]
    pub fn is_allowed(self) -> bool {
        matches!(self, Decision::Allowed)
    }

    #[must_use]
    pub fn reason(self) -> &'static str {
        match self {
            Decision::Allowed => "allowed",
            Decision::OutsideAllowList => "path outside allow list",
            Decision::InDenyList => "path in deny list",
            Decision::OutsideWorkingDir => "path outside working directory",
            Decision::Oversize => "content exceeds max file size",
            Decision::Empty => "empty path",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PathPolicy {
    pub allowed_paths: Vec<PathBuf>,
    pub deny_paths: Vec<PathBuf>,
    pub restrict_to_working_dir: bool,
    pub allow_temp_files: bool,
    pub max_file_size_bytes: u64,
    pub working_dir: PathBuf,
}

impl PathPolicy {
    #[must_use]
    pub fn new(working_dir: PathBuf) -> Self {
        Self {
            allowed_paths: Vec::new(),
            deny_paths: Vec::new(),
            restrict_to_working_dir: true,
            allow_temp_files: false,
            max_file_size_bytes: 0,
            working_dir,
        }
    }

    fn is_prefix_of(prefix: &Path, candidate: &Path) -> bool {
        candidate.components().count() >= prefix.components().count()
            && candidate
                .components()
                .zip(prefix.components())
                .all(|(a, b)| a == b)
    }

    /// Canonicalize `path` without requiring it to exist: canonicalize the
    /// longest existing ancestor, then re-append the remaining components so
    /// that `..`/symlink resolution still applies to the existing prefix.
    fn canonicalize_lenient(path: &Path) -> std::io::Result<PathBuf> {
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };

        let mut existing = absolute.clone();
        let mut tail: Vec<std::ffi::OsString> = Vec::new();
        loop {
            match existing.canonicalize() {
                Ok(canon) => {
                    let mut result = canon;
                    for component in tail.into_iter().rev() {
                        result.push(component);
                    }
                    return Ok(result);
                }
                Err(_) => {
                    let Some(file_name) = existing.file_name() else {
                        return Ok(absolute);
                    };
                    tail.push(file_name.to_os_string());
                    if !existing.pop() {
                        return Ok(absolute);
                    }
                }
            }
        }
    }

    /// Validate a candidate path for a read (pass `content_size = None`) or
    /// write (`content_size = Some(n)`) operation, per the six-step order in
    /// §4.4.
    pub fn validate(&self, candidate: &Path, content_size: Option<u64>) -> Decision {
        if candidate.as_os_str().is_empty() {
            warn!(target: "path_validator", path = %candidate.display(), "rejected: empty path");
            return Decision::Empty;
        }

        let canonical = match Self::canonicalize_lenient(candidate) {
            Ok(p) => p,
            Err(e) => {
                warn!(target: "path_validator", path = %candidate.display(), error = %e, "rejected: cannot canonicalize");
                return Decision::OutsideWorkingDir;
            }
        };

        for deny in &self.deny_paths {
            if Self::is_prefix_of(deny, &canonical) {
                warn!(target: "path_validator", path = %canonical.display(), deny = %deny.display(), "path-in-deny");
                return Decision::InDenyList;
            }
        }

        if self.restrict_to_working_dir {
            let in_workdir = Self::is_prefix_of(&self.working_dir, &canonical);
            let in_temp = self.allow_temp_files
                && Self::is_prefix_of(&std::env::temp_dir(), &canonical);
            if !in_workdir && !in_temp {
                warn!(target: "path_validator", path = %canonical.display(), "path-outside-allow (working dir)");
                return Decision::OutsideWorkingDir;
            }
        }

        if !self.allowed_paths.is_empty()
            && !self
                .allowed_paths
                .iter()
                .any(|allowed| Self::is_prefix_of(allowed, &canonical))
        {
            warn!(target: "path_validator", path = %canonical.display(), "path-outside-allow");
            return Decision::OutsideAllowList;
        }

        if let Some(size) = content_size
            && self.max_file_size_bytes > 0
            && size > self.max_file_size_bytes
        {
            warn!(target: "path_validator", path = %canonical.display(), size, limit = self.max_file_size_bytes, "oversize");
            return Decision::Oversize;
        }

        info!(target: "path_validator", path = %canonical.display(), "allowed");
        Decision::Allowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy_in(dir: &Path) -> PathPolicy {
        let mut p = PathPolicy::new(dir.to_path_buf());
        p.allowed_paths = vec![dir.to_path_buf()];
        p
    }

    #[test]
    fn allows_file_under_allowed_dir() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("a.txt"), b"hi").unwrap();
        let policy = policy_in(tmp.path());
        let decision = policy.validate(&tmp.path().join("a.txt"), None);
        assert_eq!(decision, Decision::Allowed);
    }

    #[test]
    fn deny_list_wins_over_allow_list() {
        let tmp = tempfile::tempdir().unwrap();
        let secrets = tmp.path().join("secrets");
        std::fs::create_dir(&secrets).unwrap();
        std::fs::write(secrets.join("key"), b"s").unwrap();

        let mut policy = policy_in(tmp.path());
        policy.deny_paths = vec![secrets.clone()];

        let decision = policy.validate(&secrets.join("key"), None);
        assert_eq!(decision, Decision::InDenyList);
    }

    #[test]
    fn dotdot_traversal_resolves_before_check() {
        let tmp = tempfile::tempdir().unwrap();
        let work = tmp.path().join("work");
        std::fs::create_dir(&work).unwrap();

        let policy = policy_in(&work);
        // work/../ escapes the allowed dir once canonicalized.
        let escaping = work.join("..").join(
            tmp.path()
                .file_name()
                .map(|_| "outside.txt")
                .unwrap_or("outside.txt"),
        );
        let decision = policy.validate(&escaping, None);
        assert_ne!(decision, Decision::Allowed);
    }

    #[test]
    fn oversize_write_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let mut policy = policy_in(tmp.path());
        policy.max_file_size_bytes = 10;
        let decision = policy.validate(&tmp.path().join("big.txt"), Some(100));
        assert_eq!(decision, Decision::Oversize);
    }

    #[test]
    fn empty_path_rejected() {
        let policy = PathPolicy::new(std::env::temp_dir());
        let decision = policy.validate(Path::new(""), None);
        assert_eq!(decision, Decision::Empty);
    }

    #[test]
    fn working_dir_restriction_denies_outside_path() {
        let tmp = tempfile::tempdir().unwrap();
        let mut policy = PathPolicy::new(tmp.path().to_path_buf());
        policy.restrict_to_working_dir = true;
        let decision = policy.validate(Path::new("/etc/hosts"), None);
        assert_eq!(decision, Decision::OutsideWorkingDir);
    }
}
