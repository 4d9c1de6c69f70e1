pub mod fetch;
pub mod index;
pub mod metadata;
pub mod post;
pub mod scan;
pub mod username;
pub mod writer;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use fetch::{FetchConfig, FetchError, FetchReport, FetchRequest, Fetcher, InstaloaderFetcher};
pub use index::{generate_index, IndexReport};
pub use post::PostRecord;
pub use scan::{ScanOutcome, INDEX_FILENAME};

fn default_output_root() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_fetch() -> bool {
    true
}

/// Immutable configuration for one crawl
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlOptions {
    pub username: String,
    #[serde(default = "default_output_root")]
    pub output_root: PathBuf,
    /// Maximum number of posts to download, `None` for all
    #[serde(default)]
    pub count: Option<u32>,
    /// Run the fetcher before indexing
    #[serde(default = "default_fetch")]
    pub fetch: bool,
    #[serde(default)]
    pub fetch_config: FetchConfig,
}

impl CrawlOptions {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            output_root: default_output_root(),
            count: None,
            fetch: true,
            fetch_config: FetchConfig::default(),
        }
    }

    /// Directory holding this user's downloads and index.json
    pub fn target_dir(&self) -> PathBuf {
        self.output_root.join(&self.username)
    }

    pub fn fetch_request(&self) -> FetchRequest {
        FetchRequest {
            username: self.username.clone(),
            target_dir: self.target_dir(),
            count: self.count,
            config: self.fetch_config.clone(),
        }
    }
}

/// Outcome of a full fetch + index run
#[derive(Debug, Default)]
pub struct RunResult {
    pub fetch: Option<FetchReport>,
    /// Fetch failure; indexing still ran
    pub fetch_error: Option<FetchError>,
    /// `None` when the download directory did not exist
    pub index: Option<IndexReport>,
}

/// Type alias for progress callback: (stage, current, total, message)
pub type ProgressCallback = dyn Fn(&str, u64, u64, &str) + Send + Sync;

/// Download posts with `fetcher`, then index whatever is in the target directory.
pub fn run(options: &CrawlOptions, fetcher: &dyn Fetcher, progress: &ProgressCallback) -> anyhow::Result<RunResult> {
    if !username::is_valid_username(&options.username) {
        anyhow::bail!("invalid username {:?}", options.username);
    }

    let mut result = RunResult::default();

    if options.fetch {
        match fetcher.fetch(&options.fetch_request(), progress) {
            Ok(report) => result.fetch = Some(report),
            Err(e) => {
                tracing::warn!(user = %options.username, error = %e, "fetch failed, indexing existing downloads");
                progress("fetch", 0, 0, &e.to_string());
                result.fetch_error = Some(e);
            }
        }
    }

    result.index = index::generate_index(&options.target_dir(), progress)?;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::tempdir;

    fn noop(_: &str, _: u64, _: u64, _: &str) {}

    /// Writes a fixed set of posts, then optionally fails
    struct FakeFetcher {
        posts: Vec<(&'static str, &'static str)>,
        fail: bool,
        seen: Mutex<Vec<FetchRequest>>,
    }

    impl Fetcher for FakeFetcher {
        fn fetch(&self, request: &FetchRequest, _progress: &ProgressCallback) -> Result<FetchReport, FetchError> {
            self.seen.lock().unwrap().push(request.clone());
            fs::create_dir_all(&request.target_dir).map_err(FetchError::Io)?;
            for (base, code) in &self.posts {
                fs::write(
                    request.target_dir.join(format!("{}.json", base)),
                    format!(r#"{{"node": {{"shortcode": "{}"}}}}"#, code),
                )
                .map_err(FetchError::Io)?;
                fs::write(request.target_dir.join(format!("{}.jpg", base)), "img").map_err(FetchError::Io)?;
            }
            if self.fail {
                return Err(FetchError::LoginRequired(request.username.clone()));
            }
            Ok(FetchReport {
                posts_seen: self.posts.len() as u32,
                capped: false,
            })
        }
    }

    fn options(root: &std::path::Path) -> CrawlOptions {
        let mut opts = CrawlOptions::new("test_user");
        opts.output_root = root.to_path_buf();
        opts.count = Some(10);
        opts
    }

    #[test]
    fn test_run_fetches_then_indexes() {
        let dir = tempdir().unwrap();
        let fetcher = FakeFetcher {
            posts: vec![("2020-09-13_12-26-40_UTC", "A"), ("2020-09-14_12-26-40_UTC", "B")],
            fail: false,
            seen: Mutex::new(Vec::new()),
        };
        let opts = options(dir.path());

        let result = run(&opts, &fetcher, &noop).unwrap();
        assert_eq!(result.fetch.unwrap().posts_seen, 2);
        assert!(result.fetch_error.is_none());
        assert_eq!(result.index.unwrap().included(), 2);

        let seen = fetcher.seen.lock().unwrap();
        assert_eq!(seen[0].target_dir, dir.path().join("test_user"));
        assert_eq!(seen[0].count, Some(10));
    }

    #[test]
    fn test_fetch_failure_still_indexes_partial_download() {
        let dir = tempdir().unwrap();
        let fetcher = FakeFetcher {
            posts: vec![("2020-09-13_12-26-40_UTC", "A")],
            fail: true,
            seen: Mutex::new(Vec::new()),
        };

        let result = run(&options(dir.path()), &fetcher, &noop).unwrap();
        assert!(result.fetch.is_none());
        assert!(matches!(&result.fetch_error, Some(FetchError::LoginRequired(u)) if u == "test_user"));
        assert_eq!(result.index.unwrap().included(), 1);
    }

    #[test]
    fn test_missing_launch_leaves_no_index() {
        let dir = tempdir().unwrap();
        let fetcher = InstaloaderFetcher::new("/nonexistent/instaloader-for-tests");

        let result = run(&options(dir.path()), &fetcher, &noop).unwrap();
        assert!(matches!(result.fetch_error, Some(FetchError::Launch { .. })));
        assert!(result.index.is_none());
        assert!(!dir.path().join("test_user").join(INDEX_FILENAME).exists());
    }

    #[test]
    fn test_skip_fetch_and_invalid_username() {
        let dir = tempdir().unwrap();
        let fetcher = FakeFetcher {
            posts: vec![("p", "A")],
            fail: false,
            seen: Mutex::new(Vec::new()),
        };
        let mut opts = options(dir.path());
        opts.fetch = false;
        let result = run(&opts, &fetcher, &noop).unwrap();
        assert!(fetcher.seen.lock().unwrap().is_empty());
        assert!(result.fetch.is_none());
        assert!(result.index.is_none());

        opts.username = "../escape".to_string();
        assert!(run(&opts, &fetcher, &noop).is_err());
    }

    #[test]
    fn test_options_serde_defaults() {
        let opts: CrawlOptions = serde_json::from_str(r#"{"username": "u"}"#).unwrap();
        assert_eq!(opts.output_root, PathBuf::from("downloads"));
        assert!(opts.fetch);
        assert_eq!(opts.count, None);
        assert_eq!(opts.fetch_config, FetchConfig::default());
        assert_eq!(opts.target_dir(), PathBuf::from("downloads").join("u"));
    }
}
