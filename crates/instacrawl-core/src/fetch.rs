//! Post downloading, delegated to an external tool.
//!
//! The indexer only depends on the files a fetcher leaves behind:
//! `<base_name>.json` plus `<base_name>.jpg`/`.png` or `<base_name>_1.jpg`
//! inside the target directory.

use std::fmt;
use std::io::{self, BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::ProgressCallback;

/// Per-post progress prefix printed by instaloader, e.g. `[ 3/120] `
static COUNTER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\[\s*(\d+)/\s*(\d+)\]").unwrap());

/// Which artifacts the fetcher saves for each post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub pictures: bool,
    pub videos: bool,
    pub video_thumbnails: bool,
    pub geotags: bool,
    pub comments: bool,
    pub metadata_json: bool,
    pub compress_json: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            pictures: true,
            videos: false,
            video_thumbnails: false,
            geotags: false,
            comments: false,
            metadata_json: true,
            compress_json: false,
        }
    }
}

/// Everything a fetcher needs for one profile
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub username: String,
    pub target_dir: PathBuf,
    /// Stop after this many posts
    pub count: Option<u32>,
    pub config: FetchConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchReport {
    /// Highest post number the fetcher reported working on
    pub posts_seen: u32,
    /// The fetcher was stopped because the count was reached
    pub capped: bool,
}

#[derive(Debug)]
pub enum FetchError {
    /// The fetcher program could not be started
    Launch { program: String, source: io::Error },
    ProfileNotFound(String),
    LoginRequired(String),
    Failed { status: Option<i32>, detail: String },
    Io(io::Error),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Launch { program, source } => write!(f, "Could not run {}: {}", program, source),
            FetchError::ProfileNotFound(user) => write!(f, "Profile {} does not exist.", user),
            FetchError::LoginRequired(user) => write!(f, "Login required to access profile {}.", user),
            FetchError::Failed { status: Some(code), detail } => {
                write!(f, "An error occurred (exit status {}): {}", code, detail)
            }
            FetchError::Failed { status: None, detail } => write!(f, "An error occurred: {}", detail),
            FetchError::Io(e) => write!(f, "An error occurred: {}", e),
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FetchError::Launch { source, .. } => Some(source),
            FetchError::Io(e) => Some(e),
            _ => None,
        }
    }
}

/// Downloads a profile's posts into `request.target_dir`.
pub trait Fetcher {
    fn fetch(&self, request: &FetchRequest, progress: &ProgressCallback) -> Result<FetchReport, FetchError>;
}

/// Runs the `instaloader` command line tool.
#[derive(Debug, Clone)]
pub struct InstaloaderFetcher {
    program: PathBuf,
}

impl Default for InstaloaderFetcher {
    fn default() -> Self {
        Self::new("instaloader")
    }
}

impl InstaloaderFetcher {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into() }
    }

    /// Command line arguments for a request
    pub fn args(&self, request: &FetchRequest) -> Vec<String> {
        let config = &request.config;
        let mut args = Vec::new();
        if !config.pictures {
            args.push("--no-pictures".to_string());
        }
        if !config.videos {
            args.push("--no-videos".to_string());
        }
        if !config.video_thumbnails {
            args.push("--no-video-thumbnails".to_string());
        }
        if config.geotags {
            args.push("--geotags".to_string());
        }
        if config.comments {
            args.push("--comments".to_string());
        }
        if !config.metadata_json {
            args.push("--no-metadata-json".to_string());
        }
        if !config.compress_json {
            args.push("--no-compress-json".to_string());
        }

        // Braces are pattern placeholders for instaloader
        let dir = request
            .target_dir
            .to_string_lossy()
            .replace('{', "{{")
            .replace('}', "}}");
        args.push(format!("--dirname-pattern={}", dir));
        args.push("--filename-pattern={date_utc}_UTC".to_string());

        if let Some(count) = request.count {
            args.push(format!("--count={}", count));
        }
        args.push("--".to_string());
        args.push(request.username.clone());
        args
    }
}

impl Fetcher for InstaloaderFetcher {
    fn fetch(&self, request: &FetchRequest, progress: &ProgressCallback) -> Result<FetchReport, FetchError> {
        tracing::debug!(program = %self.program.display(), user = %request.username, "starting fetcher");
        progress("fetch", 0, 0, &format!("Downloading posts for {}...", request.username));

        let mut child = Command::new(&self.program)
            .args(self.args(request))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| FetchError::Launch {
                program: self.program.display().to_string(),
                source,
            })?;

        // Drain stderr separately so a chatty child can't block on a full pipe
        let stderr = child.stderr.take();
        let stderr_reader = std::thread::spawn(move || {
            let mut bytes = Vec::new();
            if let Some(mut s) = stderr {
                let _ = s.read_to_end(&mut bytes);
            }
            String::from_utf8_lossy(&bytes).into_owned()
        });

        let mut report = FetchReport::default();
        if let Some(stdout) = child.stdout.take() {
            for line in BufReader::new(stdout).lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(FetchError::Io(e));
                    }
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match parse_post_counter(line) {
                    Some((current, total)) => {
                        report.posts_seen = report.posts_seen.max(current);
                        // A counter line ends once its post is on disk and before the next one starts
                        if current < total && request.count.is_some_and(|limit| current >= limit) {
                            report.capped = true;
                            let _ = child.kill();
                            break;
                        }
                        progress("fetch", u64::from(current.saturating_sub(1)), u64::from(total), line);
                    }
                    None => progress("fetch", u64::from(report.posts_seen), 0, line),
                }
            }
        }

        let status = child.wait().map_err(FetchError::Io)?;
        let stderr_text = stderr_reader.join().unwrap_or_default();
        for line in stderr_text.lines().filter(|l| !l.trim().is_empty()) {
            tracing::debug!(target: "instacrawl_core::fetch::stderr", "{}", line);
        }

        if !report.capped {
            if let Some(err) = classify_failure(&request.username, status.success(), status.code(), &stderr_text) {
                return Err(err);
            }
        }

        tracing::info!(user = %request.username, posts = report.posts_seen, capped = report.capped, "fetch finished");
        Ok(report)
    }
}

/// `[ 3/120] ...` -> `(3, 120)`
pub fn parse_post_counter(line: &str) -> Option<(u32, u32)> {
    let caps = COUNTER_RE.captures(line)?;
    let current = caps[1].parse().ok()?;
    let total = caps[2].parse().ok()?;
    Some((current, total))
}

/// Map the fetcher's exit status and error output to a [`FetchError`].
/// Known profile errors are recognized even when the tool exits successfully.
pub fn classify_failure(username: &str, success: bool, code: Option<i32>, stderr: &str) -> Option<FetchError> {
    let lower = stderr.to_lowercase();
    if lower.contains("does not exist") {
        return Some(FetchError::ProfileNotFound(username.to_string()));
    }
    if lower.contains("login required") || (lower.contains("--login") && lower.contains("required")) {
        return Some(FetchError::LoginRequired(username.to_string()));
    }
    if success {
        return None;
    }
    let detail = stderr
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .last()
        .unwrap_or("fetcher exited unsuccessfully")
        .to_string();
    Some(FetchError::Failed { status: code, detail })
}
