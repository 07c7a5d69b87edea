//! Request-target and form decoding
//!
//! Splitting of the request target into path and query, percent-decoding,
//! path normalization and `key=value&...` parameter parsing. Decoding is
//! permissive: malformed escapes are left as literal characters.

use std::borrow::Cow;

/// Decoded `key=value` parameters in arrival order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    pairs: Vec<(String, String)>,
}

impl Params {
    /// Parse a URL-encoded parameter string
    ///
    /// Pairs are separated by `&`; `+` decodes to a space and `%XX` to the
    /// corresponding byte. A key without `=` gets an empty value and empty
    /// pairs are skipped.
    pub fn parse(input: &str) -> Self {
        let pairs = input
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| match pair.split_once('=') {
                Some((key, value)) => (form_decode(key), form_decode(value)),
                None => (form_decode(pair), String::new()),
            })
            .collect();

        Params { pairs }
    }

    /// Get the first value for a key
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Get every value for a key
    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.pairs
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Percent-decode a string, leaving malformed escapes untouched
pub fn percent_decode(input: &str) -> String {
    match urlencoding::decode_binary(input.as_bytes()) {
        Cow::Borrowed(_) => input.to_string(),
        Cow::Owned(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
    }
}

/// Decode a form component: `+` is a space, then percent-decoding
pub fn form_decode(input: &str) -> String {
    if input.contains('+') {
        percent_decode(&input.replace('+', " "))
    } else {
        percent_decode(input)
    }
}

/// Split a request target into its raw path and raw query
///
/// The first `?` that precedes any `#` starts the query, which runs up to
/// the `#`. The fragment is dropped.
pub fn split_target(target: &str) -> (&str, Option<&str>) {
    let without_fragment = match target.find('#') {
        Some(hash) => &target[..hash],
        None => target,
    };

    match without_fragment.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (without_fragment, None),
    }
}

/// Normalize a decoded absolute path
///
/// Empty and `.` segments are removed and `..` drops the previous segment,
/// never climbing above the root. A trailing slash is preserved.
pub fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }

    let mut normalized = String::with_capacity(path.len());
    for segment in &segments {
        normalized.push('/');
        normalized.push_str(segment);
    }

    let trailing = path.ends_with('/') || path.ends_with("/.") || path.ends_with("/..");
    if normalized.is_empty() || trailing {
        normalized.push('/');
    }

    normalized
}

/// Check whether `prefix` matches `path` on a path-segment boundary
///
/// The prefix matches when it equals the path, when the path continues with
/// `/` right after it, or when the prefix itself ends with `/`.
pub fn matches_segment_prefix(prefix: &str, path: &str) -> bool {
    if !path.starts_with(prefix) {
        return false;
    }
    prefix.len() == path.len()
        || prefix.ends_with('/')
        || path.as_bytes()[prefix.len()] == b'/'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_decoding() {
        let params = Params::parse("a=1&b=two%20words");
        assert_eq!(params.get("a"), Some("1"));
        assert_eq!(params.get("b"), Some("two words"));
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_params_plus_and_edge_cases() {
        let params = Params::parse("q=hello+world&&flag&x=%2B&y=1&y=2");
        assert_eq!(params.get("q"), Some("hello world"));
        assert_eq!(params.get("flag"), Some(""));
        assert_eq!(params.get("x"), Some("+"));
        assert_eq!(params.get_all("y"), vec!["1", "2"]);
        assert_eq!(params.get("missing"), None);
    }

    #[test]
    fn test_malformed_escapes_are_kept() {
        assert_eq!(percent_decode("100%"), "100%");
        assert_eq!(percent_decode("%zzok"), "%zzok");
        assert_eq!(percent_decode("a%2"), "a%2");
        assert_eq!(percent_decode("%41%42"), "AB");
    }

    #[test]
    fn test_split_target() {
        assert_eq!(split_target("/a/b"), ("/a/b", None));
        assert_eq!(split_target("/a?x=1"), ("/a", Some("x=1")));
        assert_eq!(split_target("/a?x=1#frag"), ("/a", Some("x=1")));
        assert_eq!(split_target("/a#frag?x=1"), ("/a", None));
        assert_eq!(split_target("/a?"), ("/a", Some("")));
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path("/a//b/./c"), "/a/b/c");
        assert_eq!(normalize_path("/a/b/../c"), "/a/c");
        assert_eq!(normalize_path("/../../etc/passwd"), "/etc/passwd");
        assert_eq!(normalize_path("/dir/"), "/dir/");
        assert_eq!(normalize_path("/dir/sub/.."), "/dir/");
    }

    #[test]
    fn test_matches_segment_prefix() {
        assert!(matches_segment_prefix("/admin", "/admin"));
        assert!(matches_segment_prefix("/admin", "/admin/x"));
        assert!(!matches_segment_prefix("/admin", "/administrator"));
        assert!(matches_segment_prefix("/", "/anything"));
        assert!(!matches_segment_prefix("/admin/x", "/admin"));
    }
}
