//! Link-id normalization and token n-grams.

use std::sync::LazyLock;

use regex::Regex;

/// Drop a `#subsection` fragment from a link target.
pub fn trim_link_subsection(target: &str) -> &str {
    match target.find('#') {
        Some(idx) => &target[..idx],
        None => target,
    }
}

/// Drop a `scheme://` prefix from a link target.
pub fn trim_link_protocol(target: &str) -> &str {
    match target.find("://") {
        Some(idx) => &target[idx + 3..],
        None => target,
    }
}

/// Canonical form used whenever link targets are compared or counted.
pub fn normalize_target(target: &str) -> &str {
    trim_link_protocol(trim_link_subsection(target))
}

/// Word tokens of `text` (runs of Unicode word characters).
pub fn tokens(text: &str) -> Vec<&str> {
    static TOKEN_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\w+").expect("valid regex"));

    TOKEN_RE.find_iter(text).map(|m| m.as_str()).collect()
}

/// All contiguous `n`-token windows of `text`, tokens joined by one space.
pub fn ngrams(text: &str, n: usize) -> Vec<String> {
    let toks = tokens(text);
    if n == 0 || toks.len() < n {
        return Vec::new();
    }
    toks.windows(n).map(|w| w.join(" ")).collect()
}
