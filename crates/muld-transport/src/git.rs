//! Transport backend driving the `git` command-line client.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use muld_refs::{ContentId, RefState};
use tokio::process::Command;
use tracing::{debug, instrument};

use crate::endpoint::{Endpoint, LocalMirror};
use crate::error::{TransportError, TransportResult};
use crate::traits::Transport;
use crate::types::{PushReport, RefRejection, RefUpdate, RejectReason};

/// Default upper bound for a single `git` invocation.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(600);

/// Refspecs passed per `git fetch`/`git push` invocation.
const REFSPEC_BATCH: usize = 256;

/// stderr fragments (lowercased) that mean the remote refused our identity.
const AUTH_MARKERS: &[&str] = &[
    "authentication failed",
    "permission denied",
    "could not read username",
    "could not read password",
    "invalid username or password",
    "access denied",
    "host key verification failed",
    "the requested url returned error: 401",
    "the requested url returned error: 403",
];

/// stderr fragments (lowercased) that mean the network let us down.
const TRANSIENT_MARKERS: &[&str] = &[
    "could not resolve host",
    "connection timed out",
    "operation timed out",
    "connection refused",
    "connection reset",
    "network is unreachable",
    "temporary failure in name resolution",
    "the remote end hung up unexpectedly",
    "early eof",
    "rpc failed",
    "the requested url returned error: 502",
    "the requested url returned error: 503",
    "the requested url returned error: 504",
    "ssl_read",
    "gnutls_handshake",
];

struct GitOutput {
    success: bool,
    stdout: String,
    stderr: String,
}

/// Runs `git` subprocesses. Every call is an independent process, so
/// concurrent pushes never share session state.
#[derive(Clone, Debug)]
pub struct GitTransport {
    program: PathBuf,
    timeout: Duration,
}

impl Default for GitTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl GitTransport {
    pub fn new() -> Self {
        Self {
            program: PathBuf::from("git"),
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Use a specific `git` executable.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Bound every invocation by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn run<I, S>(
        &self,
        cwd: Option<&Path>,
        args: I,
        env: Option<&Endpoint>,
        operation: &'static str,
        target: &str,
    ) -> TransportResult<GitOutput>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = Command::new(&self.program);
        if let Some(dir) = cwd {
            cmd.arg("-C").arg(dir);
        }
        cmd.args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(endpoint) = env {
            cmd.envs(&endpoint.env);
        }

        debug!(operation, target, "running git");
        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(TransportError::Timeout {
                    endpoint: target.to_string(),
                    operation,
                    after: self.timeout,
                })
            }
        };

        Ok(GitOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    /// Run against a remote; failures are classified from stderr.
    async fn run_remote<I, S>(
        &self,
        mirror: Option<&LocalMirror>,
        args: I,
        endpoint: &Endpoint,
        operation: &'static str,
    ) -> TransportResult<GitOutput>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let out = self
            .run(mirror.map(LocalMirror::path), args, Some(endpoint), operation, &endpoint.url)
            .await?;
        if !out.success {
            return Err(classify_failure(&endpoint.url, &out.stderr));
        }
        Ok(out)
    }

    /// Run inside the mirror; failures are mirror errors.
    async fn run_local<I, S>(
        &self,
        mirror: &LocalMirror,
        args: I,
        operation: &'static str,
    ) -> TransportResult<GitOutput>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let target = mirror.to_string();
        let out = self
            .run(Some(mirror.path()), args, None, operation, &target)
            .await?;
        if !out.success {
            return Err(TransportError::Mirror {
                path: mirror.path.clone(),
                message: format!("git {operation} failed: {}", out.stderr.trim()),
            });
        }
        Ok(out)
    }

    async fn mirror_refs(&self, mirror: &LocalMirror) -> TransportResult<RefState> {
        let out = self
            .run_local(
                mirror,
                ["for-each-ref", "--format=%(objectname)%09%(refname)"],
                "for-each-ref",
            )
            .await?;
        parse_ref_listing("git for-each-ref", &out.stdout)
    }
}

#[async_trait]
impl Transport for GitTransport {
    fn name(&self) -> &str {
        "git"
    }

    #[instrument(skip_all, fields(endpoint = %endpoint))]
    async fn list_refs(&self, endpoint: &Endpoint) -> TransportResult<RefState> {
        let out = self
            .run_remote(None, ["ls-remote", "--refs", endpoint.url.as_str()], endpoint, "ls-remote")
            .await?;
        parse_ref_listing("git ls-remote", &out.stdout)
    }

    async fn prepare_mirror(&self, mirror: &LocalMirror) -> TransportResult<bool> {
        let path = mirror.path();
        if tokio::fs::try_exists(path.join("HEAD")).await? {
            return Ok(false);
        }
        if tokio::fs::try_exists(path).await? {
            let mut entries = tokio::fs::read_dir(path).await?;
            if entries.next_entry().await?.is_some() {
                return Err(TransportError::Mirror {
                    path: path.to_path_buf(),
                    message: "directory exists and is not a bare repository".into(),
                });
            }
        }
        tokio::fs::create_dir_all(path).await?;
        self.run_local(mirror, ["init", "--bare", "--quiet"], "init").await?;
        debug!(mirror = %mirror, "initialized bare mirror");
        Ok(true)
    }

    #[instrument(skip_all, fields(mirror = %mirror, endpoint = %endpoint, refs = updates.len()))]
    async fn fetch(
        &self,
        mirror: &LocalMirror,
        endpoint: &Endpoint,
        updates: &[RefUpdate],
    ) -> TransportResult<RefState> {
        let (deletes, sets): (Vec<&RefUpdate>, Vec<&RefUpdate>) =
            updates.iter().partition(|u| u.is_delete());

        for batch in sets.chunks(REFSPEC_BATCH) {
            let mut args = vec![
                "fetch".to_string(),
                "--no-tags".to_string(),
                "--quiet".to_string(),
                endpoint.url.clone(),
            ];
            args.extend(batch.iter().map(|u| format!("+{0}:{0}", u.name)));
            self.run_remote(Some(mirror), &args, endpoint, "fetch").await?;
        }

        for update in deletes {
            self.run_local(mirror, ["update-ref", "-d", update.name.as_str()], "update-ref")
                .await?;
        }

        self.mirror_refs(mirror).await
    }

    #[instrument(skip_all, fields(endpoint = %endpoint, refs = updates.len(), force = force_allowed))]
    async fn push(
        &self,
        mirror: &LocalMirror,
        endpoint: &Endpoint,
        updates: &[RefUpdate],
        force_allowed: bool,
    ) -> TransportResult<PushReport> {
        let mut report = PushReport::default();

        for batch in updates.chunks(REFSPEC_BATCH) {
            let mut args = vec![
                "push".to_string(),
                "--porcelain".to_string(),
                endpoint.url.clone(),
            ];
            args.extend(batch.iter().map(|u| push_refspec(u, force_allowed)));

            let out = self
                .run(Some(mirror.path()), &args, Some(endpoint), "push", &endpoint.url)
                .await?;
            let statuses = parse_push_status(&out.stdout);
            if !out.success && statuses.is_empty() {
                return Err(classify_failure(&endpoint.url, &out.stderr));
            }

            for update in batch {
                match statuses.iter().find(|s| s.refers_to(&update.name)) {
                    Some(status) if status.is_rejected() => report.rejected.push(RefRejection {
                        name: update.name.clone(),
                        reason: status.reject_reason(),
                    }),
                    Some(_) => report.accepted.push(update.clone()),
                    None if out.success => report.accepted.push(update.clone()),
                    None => report.rejected.push(RefRejection {
                        name: update.name.clone(),
                        reason: RejectReason::Remote("no status reported by remote".into()),
                    }),
                }
            }
        }

        Ok(report)
    }
}

fn push_refspec(update: &RefUpdate, force: bool) -> String {
    match (&update.new, force) {
        (None, _) => format!(":{}", update.name),
        (Some(_), true) => format!("+{0}:{0}", update.name),
        (Some(_), false) => format!("{0}:{0}", update.name),
    }
}

/// Map a failed git invocation to a transport error kind.
pub(crate) fn classify_failure(endpoint: &str, stderr: &str) -> TransportError {
    let lowered = stderr.to_ascii_lowercase();
    let message = stderr.trim().to_string();
    if AUTH_MARKERS.iter().any(|m| lowered.contains(m)) {
        TransportError::AuthRejected {
            endpoint: endpoint.to_string(),
            message,
        }
    } else if TRANSIENT_MARKERS.iter().any(|m| lowered.contains(m)) {
        TransportError::Network {
            endpoint: endpoint.to_string(),
            message,
        }
    } else {
        TransportError::Rejected {
            endpoint: endpoint.to_string(),
            message,
        }
    }
}

/// Parse `<id> <TAB> <refname>` lines as printed by `ls-remote` and
/// `for-each-ref`. Peeled tag entries (`^{}`) are skipped.
pub(crate) fn parse_ref_listing(command: &str, text: &str) -> TransportResult<RefState> {
    let mut refs = Vec::new();
    for line in text.lines().map(str::trim_end).filter(|l| !l.is_empty()) {
        let (id, name) = line
            .split_once('\t')
            .or_else(|| line.split_once(char::is_whitespace))
            .ok_or_else(|| TransportError::MalformedOutput {
                command: command.to_string(),
                message: format!("expected '<id>\\t<ref>', got {line:?}"),
            })?;
        let name = name.trim();
        if name.ends_with("^{}") {
            continue;
        }
        refs.push((name.to_string(), ContentId::parse(id)?));
    }
    Ok(refs.into_iter().collect())
}

#[derive(Debug, PartialEq, Eq)]
struct PushStatus {
    flag: char,
    dst: String,
    summary: String,
}

impl PushStatus {
    fn is_rejected(&self) -> bool {
        self.flag == '!'
    }

    /// git reports full names; accept short names from non-git upstreams.
    fn refers_to(&self, name: &str) -> bool {
        self.dst == name
            || self
                .dst
                .strip_suffix(name)
                .is_some_and(|prefix| prefix.ends_with('/'))
    }

    fn reject_reason(&self) -> RejectReason {
        if self.summary.contains("non-fast-forward") || self.summary.contains("fetch first") {
            RejectReason::NonFastForward
        } else {
            RejectReason::Remote(self.summary.clone())
        }
    }
}

/// Parse `git push --porcelain` status lines: `<flag>\t<src>:<dst>\t<summary>`.
fn parse_push_status(stdout: &str) -> Vec<PushStatus> {
    stdout
        .lines()
        .filter_map(|line| {
            let mut parts = line.splitn(3, '\t');
            let flag = parts.next()?;
            let mut flag_chars = flag.chars();
            let flag = flag_chars.next()?;
            if flag_chars.next().is_some() {
                return None;
            }
            let refs = parts.next()?;
            let summary = parts.next().unwrap_or("").trim().to_string();
            let dst = refs.rsplit_once(':').map_or(refs, |(_, dst)| dst);
            Some(PushStatus {
                flag,
                dst: dst.to_string(),
                summary,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: &str = "3b18e512dba79e4c8300dd08aeb37f8e728b8dad";
    const B: &str = "a94a8fe5ccb19ba61c4c0873d391e987982fbbd3";

    #[test]
    fn parses_ls_remote_output() {
        let text = format!("{A}\trefs/heads/main\n{B}\trefs/tags/v1\n{A}\trefs/tags/v1^{{}}\n");
        let state = parse_ref_listing("git ls-remote", &text).unwrap();
        assert_eq!(state.len(), 2);
        assert_eq!(state.get("refs/heads/main").unwrap().as_str(), A);
        assert_eq!(state.get("refs/tags/v1").unwrap().as_str(), B);
    }

    #[test]
    fn empty_listing_is_empty_state() {
        assert!(parse_ref_listing("git ls-remote", "").unwrap().is_empty());
    }

    #[test]
    fn malformed_listing_is_an_error() {
        let err = parse_ref_listing("git ls-remote", "garbage").unwrap_err();
        assert!(matches!(err, TransportError::MalformedOutput { .. }));
        let err = parse_ref_listing("git ls-remote", "nothex\trefs/heads/main").unwrap_err();
        assert!(matches!(err, TransportError::Ref(_)));
    }

    #[test]
    fn classifies_auth_failures() {
        let err = classify_failure(
            "git@host:a.git",
            "git@host: Permission denied (publickey).\nfatal: Could not read from remote repository.",
        );
        assert!(matches!(err, TransportError::AuthRejected { .. }));
        assert!(!err.is_transient());

        let err = classify_failure(
            "https://host/a.git",
            "fatal: unable to access 'https://host/a.git/': The requested URL returned error: 403",
        );
        assert!(matches!(err, TransportError::AuthRejected { .. }));
    }

    #[test]
    fn classifies_network_failures_as_transient() {
        let err = classify_failure(
            "https://nowhere/a.git",
            "fatal: unable to access 'https://nowhere/a.git/': Could not resolve host: nowhere",
        );
        assert!(err.is_transient());

        let err = classify_failure("ssh://h/a", "fatal: the remote end hung up unexpectedly");
        assert!(err.is_transient());
    }

    #[test]
    fn unknown_failures_are_rejections() {
        let err = classify_failure("/srv/a.git", "fatal: '/srv/a.git' does not appear to be a git repository");
        assert!(matches!(err, TransportError::Rejected { .. }));
        assert!(!err.is_transient());
    }

    #[test]
    fn push_refspecs() {
        let id = ContentId::parse(A).unwrap();
        let set = RefUpdate::set("refs/heads/main", None, id.clone());
        assert_eq!(push_refspec(&set, false), "refs/heads/main:refs/heads/main");
        assert_eq!(push_refspec(&set, true), "+refs/heads/main:refs/heads/main");
        let del = RefUpdate::delete("refs/heads/old", id);
        assert_eq!(push_refspec(&del, false), ":refs/heads/old");
    }

    #[test]
    fn parses_porcelain_push_output() {
        let stdout = "To /srv/down.git\n\
                      *\trefs/heads/new:refs/heads/new\t[new branch]\n\
                      =\trefs/heads/same:refs/heads/same\t[up to date]\n\
                      !\trefs/heads/main:refs/heads/main\t[rejected] (non-fast-forward)\n\
                      !\trefs/heads/prot:refs/heads/prot\t[remote rejected] (protected branch hook declined)\n\
                      -\t:refs/heads/gone\t[deleted]\n\
                      Done\n";
        let statuses = parse_push_status(stdout);
        assert_eq!(statuses.len(), 5);
        assert_eq!(statuses[0].flag, '*');
        assert_eq!(statuses[4].dst, "refs/heads/gone");

        let main = statuses.iter().find(|s| s.refers_to("refs/heads/main")).unwrap();
        assert!(main.is_rejected());
        assert_eq!(main.reject_reason(), RejectReason::NonFastForward);

        let prot = statuses.iter().find(|s| s.refers_to("refs/heads/prot")).unwrap();
        assert!(matches!(prot.reject_reason(), RejectReason::Remote(r) if r.contains("hook declined")));
    }

    #[test]
    fn short_names_match_full_destinations() {
        let status = PushStatus {
            flag: ' ',
            dst: "refs/heads/main".into(),
            summary: String::new(),
        };
        assert!(status.refers_to("main"));
        assert!(status.refers_to("refs/heads/main"));
        assert!(!status.refers_to("ain"));
    }

    fn git_available() -> bool {
        std::process::Command::new("git")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn git(args: &[&str]) {
        let status = std::process::Command::new("git")
            .args(["-c", "user.name=muld", "-c", "user.email=muld@example.invalid"])
            .args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .output()
            .unwrap();
        assert!(status.status.success(), "git {args:?}: {}", String::from_utf8_lossy(&status.stderr));
    }

    #[tokio::test]
    async fn mirrors_between_local_repositories() {
        if !git_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let path = |p: &str| root.join(p).display().to_string();

        git(&["init", "--quiet", "--bare", &path("upstream.git")]);
        git(&["init", "--quiet", "--bare", &path("down.git")]);
        git(&["init", "--quiet", &path("work")]);
        git(&["-C", &path("work"), "commit", "--quiet", "--allow-empty", "-m", "one"]);
        git(&["-C", &path("work"), "push", "--quiet", &path("upstream.git"), "HEAD:refs/heads/main"]);

        let transport = GitTransport::new().with_timeout(Duration::from_secs(60));
        let upstream = Endpoint::new(path("upstream.git"));
        let downstream = Endpoint::new(path("down.git"));
        let mirror = LocalMirror::new(root.join("mirror.git"));

        let listed = transport.list_refs(&upstream).await.unwrap();
        let main = listed.get("refs/heads/main").unwrap().clone();

        assert!(transport.prepare_mirror(&mirror).await.unwrap());
        assert!(!transport.prepare_mirror(&mirror).await.unwrap());

        let update = RefUpdate::set("refs/heads/main", None, main.clone());
        let local = transport.fetch(&mirror, &upstream, &[update.clone()]).await.unwrap();
        assert_eq!(local.get("refs/heads/main"), Some(&main));

        let report = transport
            .push(&mirror, &downstream, &[update], false)
            .await
            .unwrap();
        assert!(report.is_clean());
        assert_eq!(transport.list_refs(&downstream).await.unwrap(), local);

        // Rewrite upstream history; the mirror follows, the downstream refuses.
        git(&["-C", &path("work"), "commit", "--quiet", "--amend", "--allow-empty", "-m", "rewritten"]);
        git(&["-C", &path("work"), "push", "--quiet", "--force", &path("upstream.git"), "HEAD:refs/heads/main"]);
        let rewritten = transport.list_refs(&upstream).await.unwrap();
        let new_main = rewritten.get("refs/heads/main").unwrap().clone();
        let update = RefUpdate::set("refs/heads/main", Some(main.clone()), new_main.clone());
        let local = transport.fetch(&mirror, &upstream, &[update.clone()]).await.unwrap();
        assert_eq!(local.get("refs/heads/main"), Some(&new_main));

        let report = transport
            .push(&mirror, &downstream, &[update.clone()], false)
            .await
            .unwrap();
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].reason, RejectReason::NonFastForward);

        let report = transport
            .push(&mirror, &downstream, &[update], true)
            .await
            .unwrap();
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn missing_repository_is_not_transient() {
        if !git_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let transport = GitTransport::new();
        let endpoint = Endpoint::new(dir.path().join("absent.git").display().to_string());
        let err = transport.list_refs(&endpoint).await.unwrap_err();
        assert!(!err.is_transient());
    }
}
