use serde::{Deserialize, Serialize};

/// The last path segment of `path`, splitting on both `/` and `\`.
///
/// Trailing separators are ignored, so `"a/b/"` yields `"b"`. The empty
/// path yields the empty string.
pub fn file_name(path: &str) -> &str {
    let trimmed = path.trim().trim_end_matches(['/', '\\']);
    match trimmed.rfind(['/', '\\']) {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    }
}

/// A file's base name split into display name and extension.
///
/// The extension keeps its leading dot (`".png"`) so that `{hash}{extension}`
/// forms a complete file name. A leading dot alone does not start an
/// extension: `".profile"` has name `".profile"` and no extension.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileName {
    pub name: String,
    pub extension: String,
}

impl FileName {
    /// Split the file name of `path`.
    pub fn from_path(path: &str) -> Self {
        let base = file_name(path);
        match base.rfind('.') {
            Some(dot) if dot > 0 => Self {
                name: base[..dot].to_string(),
                extension: base[dot..].to_string(),
            },
            _ => Self {
                name: base.to_string(),
                extension: String::new(),
            },
        }
    }

    /// Reassemble `name + extension`.
    pub fn full(&self) -> String {
        format!("{}{}", self.name, self.extension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_of_nested_path() {
        assert_eq!(file_name("/aasx/files/logo.png"), "logo.png");
        assert_eq!(file_name("img\\logo.png"), "logo.png");
        assert_eq!(file_name("logo.png"), "logo.png");
        assert_eq!(file_name("dir/"), "dir");
        assert_eq!(file_name(""), "");
    }

    #[test]
    fn split_regular_extension() {
        let f = FileName::from_path("img/logo.png");
        assert_eq!(f.name, "logo");
        assert_eq!(f.extension, ".png");
        assert_eq!(f.full(), "logo.png");
    }

    #[test]
    fn split_keeps_last_extension_only() {
        let f = FileName::from_path("archive.tar.gz");
        assert_eq!(f.name, "archive.tar");
        assert_eq!(f.extension, ".gz");
    }

    #[test]
    fn no_extension() {
        let f = FileName::from_path("docs/README");
        assert_eq!(f.name, "README");
        assert_eq!(f.extension, "");
    }

    #[test]
    fn dotfile_has_no_extension() {
        let f = FileName::from_path(".profile");
        assert_eq!(f.name, ".profile");
        assert_eq!(f.extension, "");
    }

    proptest::proptest! {
        #[test]
        fn split_reassembles_file_name(path in "[a-zA-Z0-9_./\\\\ -]{0,40}") {
            let split = FileName::from_path(&path);
            proptest::prop_assert_eq!(split.full(), file_name(&path));
        }

        #[test]
        fn file_name_has_no_separators(path in "[a-z/\\\\.]{0,30}") {
            let name = file_name(&path);
            proptest::prop_assert!(!name.contains('/') && !name.contains('\\'));
        }
    }
}
