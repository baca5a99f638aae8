use std::path::{Component, Path};

use crate::TransferError;

/// Validates a requested file name before it is joined onto a storage root.
///
/// Rejects:
/// - Empty names and names made only of `.` components
/// - Absolute paths and Windows prefixes (`C:`, `\\server`)
/// - Parent directory traversal (`..`)
pub fn validate_file_name(file_name: &str) -> Result<(), TransferError> {
    if file_name.is_empty() {
        return Err(TransferError::InvalidPath("empty file name".into()));
    }

    let path = Path::new(file_name);
    if path.is_absolute() {
        return Err(TransferError::InvalidPath(format!(
            "absolute path not allowed: {file_name}"
        )));
    }

    let mut has_name = false;
    for component in path.components() {
        match component {
            Component::Normal(_) => has_name = true,
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(TransferError::InvalidPath(format!(
                    "parent directory traversal not allowed: {file_name}"
                )));
            }
            Component::Prefix(_) | Component::RootDir => {
                return Err(TransferError::InvalidPath(format!(
                    "absolute path not allowed: {file_name}"
                )));
            }
        }
    }

    if !has_name {
        return Err(TransferError::InvalidPath(format!(
            "no file name in: {file_name}"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_and_nested_names() {
        assert!(validate_file_name("a.txt").is_ok());
        assert!(validate_file_name("docs/report.pdf").is_ok());
        assert!(validate_file_name("./a.txt").is_ok());
    }

    #[test]
    fn rejects_empty_and_dot_only() {
        assert!(validate_file_name("").is_err());
        assert!(validate_file_name(".").is_err());
        assert!(validate_file_name("./").is_err());
    }

    #[test]
    fn rejects_traversal() {
        assert!(validate_file_name("..").is_err());
        assert!(validate_file_name("../server.toml").is_err());
        assert!(validate_file_name("sub/../../escape").is_err());
    }

    #[test]
    fn rejects_absolute() {
        let result = validate_file_name("/etc/passwd");
        assert!(matches!(result, Err(TransferError::InvalidPath(_))));
    }
}
