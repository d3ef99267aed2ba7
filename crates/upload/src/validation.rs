use crate::UploadError;

/// Longest accepted file name, in bytes.
const MAX_FILE_NAME_LEN: usize = 255;

/// Validates a client-supplied file name.
///
/// Names never become storage keys (chunk and file keys are derived from
/// session and file ids), but they are recorded verbatim in the
/// FileRecord and consumers may write them to disk when exporting a
/// workspace. The same segment rules the object stores enforce on keys
/// apply here, plus a length cap and a ban on control characters and
/// backslashes.
pub fn validate_file_name(file_name: &str) -> Result<(), UploadError> {
    if file_name.is_empty() {
        return Err(UploadError::InvalidFileName("empty name".into()));
    }
    if file_name.len() > MAX_FILE_NAME_LEN {
        return Err(UploadError::InvalidFileName(format!(
            "name exceeds {MAX_FILE_NAME_LEN} bytes"
        )));
    }
    if file_name.chars().any(char::is_control) {
        return Err(UploadError::InvalidFileName(
            "control character in name".into(),
        ));
    }
    if file_name.contains('\\') {
        return Err(UploadError::InvalidFileName(format!(
            "backslash separator not allowed: {file_name}"
        )));
    }
    if file_name.starts_with('/') {
        return Err(UploadError::InvalidFileName(format!(
            "absolute path not allowed: {file_name}"
        )));
    }
    for segment in file_name.split('/') {
        if segment.is_empty() {
            return Err(UploadError::InvalidFileName(format!(
                "empty path segment: {file_name}"
            )));
        }
        if segment == "." || segment == ".." {
            return Err(UploadError::InvalidFileName(format!(
                "relative segment not allowed: {file_name}"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_name() {
        assert!(validate_file_name("").is_err());
    }

    #[test]
    fn rejects_oversized_name() {
        assert!(validate_file_name(&"a".repeat(256)).is_err());
        assert!(validate_file_name(&"a".repeat(255)).is_ok());
    }

    #[test]
    fn rejects_traversal_segments() {
        assert!(validate_file_name("../../../etc/passwd").is_err());
        assert!(validate_file_name("sub/../../../escape").is_err());
        assert!(validate_file_name("..").is_err());
        assert!(validate_file_name("./config").is_err());
        assert!(validate_file_name("a/./b").is_err());
    }

    #[test]
    fn rejects_absolute_and_backslash_paths() {
        assert!(validate_file_name("/tmp/malicious").is_err());
        assert!(validate_file_name("C:\\Users\\escape").is_err());
        assert!(validate_file_name("..\\..\\escape").is_err());
    }

    #[test]
    fn rejects_empty_segments() {
        assert!(validate_file_name("a//b").is_err());
        assert!(validate_file_name("trailing/").is_err());
    }

    #[test]
    fn rejects_control_characters() {
        assert!(validate_file_name("report\n.pdf").is_err());
        assert!(validate_file_name("a\0b").is_err());
    }

    #[test]
    fn accepts_simple_and_nested_names() {
        assert!(validate_file_name("report.pdf").is_ok());
        assert!(validate_file_name("designs/logo.svg").is_ok());
        assert!(validate_file_name(".config.json").is_ok());
    }
}
