//! `git` subprocess implementation of [`GitAccessor`].
//!
//! Every invocation runs with credential prompts disabled and the `C`
//! locale so the output parsers see stable text. Each command is bounded by
//! a timeout; on expiry the child is killed and whatever it wrote to stderr
//! is surfaced in the error.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::git::namespace::{derive_namespace, redact, with_token};
use crate::git::parse::{self, LOG_FORMAT};
use crate::git::{CloneOptions, Commit, Diff, GitAccessor, RepoInfo};
use crate::parser::glob::Glob;

/// Default per-command timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Clone gets this multiple of the per-command timeout.
pub const CLONE_TIMEOUT_FACTOR: u32 = 5;

#[cfg(windows)]
const NULL_DEVICE: &str = "NUL";
#[cfg(not(windows))]
const NULL_DEVICE: &str = "/dev/null";

/// Raw result of a finished git process.
#[derive(Debug)]
struct GitOutput {
    stdout: String,
    stderr: String,
    exit_code: Option<i32>,
    success: bool,
}

/// Repository accessor backed by the `git` binary.
#[derive(Debug, Clone)]
pub struct CliGit {
    binary: String,
    timeout: Duration,
}

impl Default for CliGit {
    fn default() -> Self {
        Self::new()
    }
}

impl CliGit {
    /// Accessor using `git` from `PATH` and the default timeout.
    #[must_use]
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            binary: "git".to_string(),
            timeout,
        }
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run git and return the raw output, failing only on spawn errors and timeouts.
    async fn exec(&self, cwd: Option<&Path>, args: &[&str], limit: Duration) -> Result<GitOutput> {
        let command_line = args.join(" ");
        debug!(command = %redact(&command_line), "git");

        let mut cmd = Command::new(&self.binary);
        cmd.args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("GIT_ASKPASS", "")
            .env("SSH_ASKPASS", "")
            .env("GCM_INTERACTIVE", "never")
            .env("LC_ALL", "C")
            .env("LANG", "C")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn()?;
        let mut stdout_pipe = child
            .stdout
            .take()
            .ok_or_else(|| Error::Other("git stdout not captured".to_string()))?;
        let mut stderr_pipe = child
            .stderr
            .take()
            .ok_or_else(|| Error::Other("git stderr not captured".to_string()))?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();

        let finished = tokio::time::timeout(limit, async {
            let (out, err) = tokio::join!(
                stdout_pipe.read_to_end(&mut stdout),
                stderr_pipe.read_to_end(&mut stderr)
            );
            out?;
            err?;
            child.wait().await
        })
        .await;

        match finished {
            Ok(status) => {
                let status = status?;
                Ok(GitOutput {
                    stdout: String::from_utf8_lossy(&stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
                    exit_code: status.code(),
                    success: status.success(),
                })
            }
            Err(_) => {
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "failed to kill timed out git process");
                }
                Err(Error::GitTimeout {
                    command: redact(&command_line),
                    stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
                    secs: limit.as_secs(),
                })
            }
        }
    }

    /// Run git in `cwd` and return stdout, turning a non-zero exit into `Error::GitCommand`.
    async fn run(&self, cwd: &Path, args: &[&str]) -> Result<String> {
        let output = self.exec(Some(cwd), args, self.timeout).await?;
        if output.success {
            Ok(output.stdout)
        } else {
            Err(Error::GitCommand {
                command: redact(&args.join(" ")),
                stderr: output.stderr,
                exit_code: output.exit_code,
            })
        }
    }

    /// Run git and return trimmed stdout, or `None` on a non-zero exit.
    async fn run_optional(&self, cwd: &Path, args: &[&str]) -> Result<Option<String>> {
        let output = self.exec(Some(cwd), args, self.timeout).await?;
        Ok(output.success.then(|| output.stdout.trim().to_string()))
    }

    /// Hash of the empty tree in this repository's object format.
    async fn empty_tree(&self, cwd: &Path) -> Result<String> {
        let out = self.run(cwd, &["hash-object", "-t", "tree", NULL_DEVICE]).await?;
        Ok(out.trim().to_string())
    }
}

impl GitAccessor for CliGit {
    async fn is_repo(&self, path: &Path) -> bool {
        if !path.is_dir() {
            return false;
        }
        match self.exec(Some(path), &["rev-parse", "--git-dir"], self.timeout).await {
            Ok(output) => output.success,
            Err(_) => false,
        }
    }

    async fn repo_info(&self, path: &Path) -> Result<RepoInfo> {
        if !self.is_repo(path).await {
            return Err(Error::NotARepository {
                path: path.to_path_buf(),
            });
        }

        let remote_url = self
            .run_optional(path, &["remote", "get-url", "origin"])
            .await?
            .filter(|url| !url.is_empty());
        let current_branch = self
            .run_optional(path, &["rev-parse", "--abbrev-ref", "HEAD"])
            .await?
            .unwrap_or_else(|| "HEAD".to_string());
        let head = self
            .run_optional(path, &["rev-parse", "HEAD"])
            .await?
            .unwrap_or_default();
        let is_bare = self
            .run_optional(path, &["rev-parse", "--is-bare-repository"])
            .await?
            .is_some_and(|v| v == "true");
        let is_dirty = if is_bare {
            false
        } else {
            self.run_optional(path, &["status", "--porcelain"])
                .await?
                .is_some_and(|v| !v.is_empty())
        };

        let ns_source = remote_url
            .clone()
            .unwrap_or_else(|| path.to_string_lossy().into_owned());

        Ok(RepoInfo {
            path: path.to_path_buf(),
            ns: derive_namespace(&ns_source),
            remote_url: remote_url.map(|url| redact(&url)),
            current_branch,
            head,
            is_bare,
            is_dirty,
        })
    }

    async fn commit(&self, path: &Path, reference: &str) -> Result<Commit> {
        let out = self
            .run(path, &["log", "-1", LOG_FORMAT, reference, "--"])
            .await?;
        parse::parse_log(&out)?
            .into_iter()
            .next()
            .ok_or_else(|| Error::GitCommand {
                command: format!("log -1 {reference}"),
                stderr: "no commit found".to_string(),
                exit_code: None,
            })
    }

    async fn commits(&self, path: &Path, from: &str, to: &str) -> Result<Vec<Commit>> {
        let range = if from.is_empty() {
            to.to_string()
        } else {
            format!("{from}..{to}")
        };
        let out = self
            .run(path, &["log", "--reverse", LOG_FORMAT, &range, "--"])
            .await?;
        parse::parse_log(&out)
    }

    async fn diff(&self, path: &Path, from: &str, to: &str) -> Result<Diff> {
        let base = if from.is_empty() {
            self.empty_tree(path).await?
        } else {
            from.to_string()
        };

        let name_status = self
            .run(path, &["diff", "--name-status", "-z", "-M", "-C", &base, to])
            .await?;
        let numstat = self
            .run(path, &["diff", "--numstat", "-z", "-M", "-C", &base, to])
            .await?;
        let patch = self.run(path, &["diff", "-M", "-C", &base, to]).await?;

        let counts = parse::parse_numstat(&numstat);
        let files = parse::correlate(parse::parse_name_status(&name_status), &counts);
        let stats = parse::diff_stats(&files);

        Ok(Diff {
            from_commit: from.to_string(),
            to_commit: to.to_string(),
            files,
            patch,
            stats,
        })
    }

    async fn file_content(&self, path: &Path, file: &str, reference: &str) -> Result<String> {
        let object = format!("{reference}:{file}");
        match self.run(path, &["show", &object]).await {
            Ok(content) => Ok(content),
            Err(Error::GitCommand { stderr, .. })
                if stderr.contains("does not exist") || stderr.contains("exists on disk, but not in") =>
            {
                Err(Error::FileNotFound {
                    file: file.to_string(),
                    reference: reference.to_string(),
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn list_files(&self, path: &Path, reference: &str, pattern: Option<&str>) -> Result<Vec<String>> {
        let out = self
            .run(path, &["ls-tree", "-r", "--name-only", "-z", reference])
            .await?;
        let glob = pattern.map(Glob::new).transpose()?;

        Ok(out
            .split('\0')
            .filter(|p| !p.is_empty())
            .filter(|p| glob.as_ref().is_none_or(|g| g.is_match(p)))
            .map(String::from)
            .collect())
    }

    async fn clone_repo(&self, url: &str, dest: &Path, options: &CloneOptions) -> Result<()> {
        let authed = with_token(url, options.token.as_deref());
        let depth = options.depth.map(|d| d.to_string());
        let dest_str = dest.to_string_lossy().into_owned();

        let mut args = vec!["clone", "--quiet"];
        if let Some(branch) = options.branch.as_deref() {
            args.extend(["--branch", branch]);
        }
        if let Some(depth) = depth.as_deref() {
            args.extend(["--depth", depth]);
        }
        if options.single_branch {
            args.push("--single-branch");
        }
        args.push(&authed);
        args.push(&dest_str);

        let output = self
            .exec(None, &args, self.timeout * CLONE_TIMEOUT_FACTOR)
            .await
            .map_err(|e| match e {
                Error::GitTimeout { stderr, secs, .. } => Error::Clone {
                    url: redact(url),
                    message: format!("timed out after {secs}s: {stderr}"),
                },
                other => other,
            })?;

        if output.success {
            Ok(())
        } else {
            Err(Error::Clone {
                url: redact(url),
                message: output.stderr.replace(&authed, &redact(&authed)),
            })
        }
    }

    async fn fetch(&self, path: &Path, branch: Option<&str>) -> Result<()> {
        let mut args = vec!["fetch", "--quiet", "origin"];
        if let Some(branch) = branch {
            args.push(branch);
        }
        self.run(path, &args).await.map(|_| ())
    }

    async fn checkout(&self, path: &Path, reference: &str) -> Result<()> {
        self.run(path, &["checkout", "--quiet", reference])
            .await
            .map(|_| ())
    }
}
