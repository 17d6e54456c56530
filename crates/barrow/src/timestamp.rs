//! Filesystem-safe timestamps for snapshot directories and catalogue rows.

use jiff::Zoned;

/// Format the current local time as `YYYY-MM-DD_HH-MM-SS`.
///
/// All fields are zero-padded, so the result is always 19 characters and
/// contains nothing unsafe in a file name on any target platform.
pub fn now_filesystem_safe() -> String {
    Zoned::now().strftime("%Y-%m-%d_%H-%M-%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_shape() {
        let stamp = now_filesystem_safe();
        assert_eq!(stamp.len(), 19);

        let bytes = stamp.as_bytes();
        for (i, b) in bytes.iter().enumerate() {
            match i {
                4 | 7 => assert_eq!(*b, b'-'),
                10 => assert_eq!(*b, b'_'),
                13 | 16 => assert_eq!(*b, b'-'),
                _ => assert!(b.is_ascii_digit(), "non-digit at {i} in {stamp}"),
            }
        }
    }

    #[test]
    fn test_no_path_separators() {
        let stamp = now_filesystem_safe();
        assert!(!stamp.contains('/'));
        assert!(!stamp.contains('\\'));
        assert!(!stamp.contains(':'));
    }
}
