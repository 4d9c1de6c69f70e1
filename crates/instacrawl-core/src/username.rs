use regex::Regex;
use std::sync::LazyLock;

static USERNAME_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._]{1,30}$").unwrap());

/// Check that a profile name is usable as a single directory component
pub fn is_valid_username(name: &str) -> bool {
    USERNAME_RE.is_match(name) && name != "." && name != ".."
}
