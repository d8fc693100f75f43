//! SFTP data types

use serde::{Deserialize, Serialize};

/// Directory listing row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    /// File name (not full path)
    pub filename: String,
    pub is_directory: bool,
    /// Size in bytes
    pub size: u64,
    /// Last modified time (Unix seconds)
    pub modify_time: u64,
}

impl FileEntry {
    pub fn file(filename: impl Into<String>, size: u64) -> Self {
        Self {
            filename: filename.into(),
            is_directory: false,
            size,
            modify_time: 0,
        }
    }

    pub fn dir(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            is_directory: true,
            size: 0,
            modify_time: 0,
        }
    }

    pub fn is_dot_entry(&self) -> bool {
        self.filename == "." || self.filename == ".."
    }
}

/// Directories first, then by name
pub fn sort_entries(entries: &mut [FileEntry]) {
    entries.sort_by(|a, b| {
        b.is_directory
            .cmp(&a.is_directory)
            .then_with(|| a.filename.cmp(&b.filename))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_dirs_first_then_name() {
        let mut entries = vec![
            FileEntry::file("zeta.txt", 1),
            FileEntry::dir("src"),
            FileEntry::file("alpha.txt", 2),
            FileEntry::dir("bin"),
        ];
        sort_entries(&mut entries);
        let names: Vec<_> = entries.iter().map(|e| e.filename.as_str()).collect();
        assert_eq!(names, vec!["bin", "src", "alpha.txt", "zeta.txt"]);
    }

    #[test]
    fn test_serializes_camel_case() {
        let value = serde_json::to_value(FileEntry::dir("etc")).unwrap();
        assert_eq!(value["filename"], "etc");
        assert_eq!(value["isDirectory"], true);
        assert_eq!(value["modifyTime"], 0);
    }
}
