//! Materialized-path addressing for the page tree.
//!
//! Every page path is a concatenation of fixed-width segments, one per level.
//! A segment encodes the page's 1-based position among its siblings in base 36.

/// Width of one path segment.
pub const STEP_LEN: usize = 4;

const ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Largest sibling position a single segment can encode.
pub const MAX_SIBLINGS: u64 = 36u64.pow(STEP_LEN as u32) - 1;

/// Check that a path is non-empty, a whole number of segments, and uses only
/// the segment alphabet.
pub fn is_valid(path: &str) -> bool {
    !path.is_empty()
        && path.len() % STEP_LEN == 0
        && path.bytes().all(|b| ALPHABET.contains(&b))
}

/// Tree depth of a path (a single segment is depth 1).
pub fn depth(path: &str) -> usize {
    path.len() / STEP_LEN
}

/// Path of the parent page, or `None` for a top-level or malformed path.
pub fn parent_path(path: &str) -> Option<&str> {
    if !is_valid(path) || path.len() == STEP_LEN {
        return None;
    }
    Some(&path[..path.len() - STEP_LEN])
}

/// True when `child` is `parent` plus exactly one segment.
pub fn extends_by_one(child: &str, parent: &str) -> bool {
    parent_path(child) == Some(parent)
}

/// Encode a 1-based sibling position as a single segment.
pub fn encode_segment(position: u64) -> Option<String> {
    if position == 0 || position > MAX_SIBLINGS {
        return None;
    }
    let mut digits = [b'0'; STEP_LEN];
    let mut rest = position;
    for slot in digits.iter_mut().rev() {
        *slot = ALPHABET[(rest % 36) as usize];
        rest /= 36;
    }
    Some(String::from_utf8_lossy(&digits).into_owned())
}

/// Decode the last segment of a path into its sibling position.
pub fn last_position(path: &str) -> Option<u64> {
    if !is_valid(path) {
        return None;
    }
    path[path.len() - STEP_LEN..].bytes().try_fold(0u64, |acc, b| {
        let digit = ALPHABET.iter().position(|&a| a == b)? as u64;
        Some(acc * 36 + digit)
    })
}

/// Path of the child at `position` under `parent`.
pub fn child_path(parent: &str, position: u64) -> Option<String> {
    encode_segment(position).map(|segment| format!("{}{}", parent, segment))
}

/// Check the document ordering invariant: every path after the first either
/// equals the first path or extends some earlier path by exactly one segment.
///
/// Returns the index of the first offending path.
pub fn check_parent_before_child<'a, I>(paths: I) -> Result<(), usize>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen: std::collections::HashSet<&str> = std::collections::HashSet::new();
    let mut first: Option<&str> = None;
    for (index, path) in paths.into_iter().enumerate() {
        match first {
            None => first = Some(path),
            Some(root) => {
                let anchored = path == root
                    || parent_path(path).is_some_and(|parent| seen.contains(parent));
                if !anchored {
                    return Err(index);
                }
            }
        }
        seen.insert(path);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parent_path() {
        assert_eq!(parent_path("00010001"), Some("0001"));
        assert_eq!(parent_path("0001"), None);
        assert_eq!(parent_path("000100"), None);
        assert_eq!(parent_path(""), None);
    }

    #[test]
    fn test_depth() {
        assert_eq!(depth("0001"), 1);
        assert_eq!(depth("000100010003"), 3);
    }

    #[test]
    fn test_encode_segment() {
        assert_eq!(encode_segment(1).as_deref(), Some("0001"));
        assert_eq!(encode_segment(10).as_deref(), Some("000A"));
        assert_eq!(encode_segment(36).as_deref(), Some("0010"));
        assert_eq!(encode_segment(0), None);
        assert_eq!(encode_segment(MAX_SIBLINGS + 1), None);
    }

    #[test]
    fn test_last_position() {
        assert_eq!(last_position("0001000A"), Some(10));
        assert_eq!(last_position("0010"), Some(36));
        assert_eq!(last_position("00x1"), None);
    }

    #[test]
    fn test_child_path() {
        assert_eq!(child_path("0001", 2).as_deref(), Some("00010002"));
        assert!(extends_by_one("00010002", "0001"));
        assert!(!extends_by_one("000100020001", "0001"));
    }

    #[test]
    fn test_check_parent_before_child() {
        assert!(check_parent_before_child(["0001", "00010001", "00010002", "000100010001"]).is_ok());
        assert_eq!(check_parent_before_child(["0001", "000100010001"]), Err(1));
        assert!(check_parent_before_child(Vec::<&str>::new()).is_ok());
    }
}
