use std::{fs::File, io, path::Path};

pub struct FileLoader {}

impl FileLoader {
    /// Opens a model archive for reading, attaching the path to any error
    pub fn open(file_path: impl AsRef<Path>) -> io::Result<File> {
        let path = file_path.as_ref();
        File::open(path).map_err(|e| io::Error::new(e.kind(), format!("{}: {e}", path.display())))
    }
}

/// Whether `path` ends in `extension`, ignoring case and a leading dot
pub fn has_extension(path: impl AsRef<Path>, extension: &str) -> bool {
    path.as_ref()
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(extension.trim_start_matches('.')))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_check_is_case_insensitive() {
        assert!(has_extension("models/SMPL_NEUTRAL.NPZ", "npz"));
        assert!(has_extension("a/b.npz", ".npz"));
        assert!(!has_extension("a/b.json", "npz"));
        assert!(!has_extension("a/npz", "npz"));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = FileLoader::open("/definitely/not/here.npz").unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here.npz"));
    }
}
