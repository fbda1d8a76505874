//! Anchor path handling.
//!
//! An anchor path is a sequence of segments. Its textual form is the
//! segments joined by `/` with a leading `/`; the root is the empty sequence,
//! written `/`.
//!
//! Valid segments:
//! - Must be non-empty
//! - Must not contain `/`
//! - Must not contain whitespace or control characters
//! - Must not be `.` or `..`

use crate::error::TypeError;

/// Path separator.
pub const SEPARATOR: char = '/';

/// Split a textual path into segments.
///
/// Leading and trailing separators are ignored, so `"/"`, `""` and `"//"`
/// all denote the root. Segments are validated.
///
/// # Examples
///
/// ```
/// use ww_types::path::parse;
///
/// assert_eq!(parse("/a/b/").unwrap(), vec!["a", "b"]);
/// assert!(parse("/").unwrap().is_empty());
/// assert!(parse("/a//b").is_err());
/// ```
pub fn parse(path: &str) -> Result<Vec<String>, TypeError> {
    let trimmed = path.trim_matches(SEPARATOR);
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let segments: Vec<String> = trimmed.split(SEPARATOR).map(str::to_string).collect();
    validate(&segments)?;
    Ok(segments)
}

/// Join segments into the textual form, always with a leading separator.
pub fn join<S: AsRef<str>>(segments: &[S]) -> String {
    let mut out = String::with_capacity(segments.iter().map(|s| s.as_ref().len() + 1).sum());
    for segment in segments {
        out.push(SEPARATOR);
        out.push_str(segment.as_ref());
    }
    if out.is_empty() {
        out.push(SEPARATOR);
    }
    out
}

/// Returns `true` if the path denotes the root.
pub fn is_root<S: AsRef<str>>(segments: &[S]) -> bool {
    segments.is_empty()
}

/// Validate every segment of a path.
pub fn validate<S: AsRef<str>>(segments: &[S]) -> Result<(), TypeError> {
    segments.iter().try_for_each(|s| validate_segment(s.as_ref()))
}

/// Validate a single path segment.
pub fn validate_segment(segment: &str) -> Result<(), TypeError> {
    let reject = |reason: &str| {
        Err(TypeError::InvalidSegment {
            segment: segment.to_string(),
            reason: reason.to_string(),
        })
    };

    if segment.is_empty() {
        return reject("segment must not be empty");
    }
    if segment.contains(SEPARATOR) {
        return reject("segment must not contain '/'");
    }
    if segment == "." || segment == ".." {
        return reject("relative segments are not allowed");
    }
    if let Some(ch) = segment.chars().find(|c| c.is_whitespace() || c.is_control()) {
        return reject(&format!("contains forbidden character: {ch:?}"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_root_forms() {
        assert!(parse("").unwrap().is_empty());
        assert!(parse("/").unwrap().is_empty());
        assert!(parse("//").unwrap().is_empty());
    }

    #[test]
    fn parse_trims_separators() {
        assert_eq!(parse("a/b").unwrap(), vec!["a", "b"]);
        assert_eq!(parse("/a/b/").unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn parse_rejects_empty_inner_segment() {
        assert!(parse("/a//b").is_err());
    }

    #[test]
    fn join_formats() {
        assert_eq!(join::<&str>(&[]), "/");
        assert_eq!(join(&["a"]), "/a");
        assert_eq!(join(&["a", "b", "c"]), "/a/b/c");
    }

    #[test]
    fn join_inverts_parse() {
        let text = "/alpha/bravo/charlie";
        assert_eq!(join(&parse(text).unwrap()), text);
    }

    #[test]
    fn root_detection() {
        assert!(is_root::<String>(&[]));
        assert!(!is_root(&["a"]));
    }

    #[test]
    fn reject_bad_segments() {
        assert!(validate_segment("").is_err());
        assert!(validate_segment("a/b").is_err());
        assert!(validate_segment(".").is_err());
        assert!(validate_segment("..").is_err());
        assert!(validate_segment("has space").is_err());
        assert!(validate_segment("tab\there").is_err());
        assert!(validate_segment("nul\0").is_err());
    }

    #[test]
    fn accept_ordinary_segments() {
        assert!(validate_segment("foo").is_ok());
        assert!(validate_segment("foo.bar").is_ok());
        assert!(validate_segment("...").is_ok());
        assert!(validate_segment("9f86d081884c7d65").is_ok());
    }

    #[test]
    fn error_names_offending_segment() {
        let err = validate(&["ok", ".."]).unwrap_err();
        match err {
            TypeError::InvalidSegment { segment, .. } => assert_eq!(segment, ".."),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
