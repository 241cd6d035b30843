//! Storage Path Helpers

/// Join path segments with single `/` separators, keeping any `scheme://` prefix intact
pub fn path_join(base: &str, segments: &[&str]) -> String {
    let mut out = base.trim_end_matches('/').to_string();
    for segment in segments {
        let segment = segment.trim_matches('/');
        if segment.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push('/');
        }
        out.push_str(segment);
    }
    out
}

/// Path with the URL scheme removed (`abfs://host/a/b` -> `host/a/b`)
pub fn object_key(path: &str) -> &str {
    let key = match path.find("://") {
        Some(idx) => &path[idx + 3..],
        None => path,
    };
    key.trim_start_matches('/')
}

/// Lower-cased extension of the final path segment
pub fn extension(path: &str) -> Option<String> {
    let name = path.rsplit('/').next()?;
    let (_, ext) = name.rsplit_once('.')?;
    Some(ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_join() {
        assert_eq!(
            path_join("abfs://acct/testing/", &["refined", "/project1/", "model.bin"]),
            "abfs://acct/testing/refined/project1/model.bin"
        );
        assert_eq!(path_join("base", &[""]), "base");
    }

    #[test]
    fn test_object_key() {
        assert_eq!(object_key("abfs://acct/testing/raw"), "acct/testing/raw");
        assert_eq!(object_key("/local/file.csv"), "local/file.csv");
    }

    #[test]
    fn test_extension() {
        assert_eq!(extension("a/b/predictions.Parquet").as_deref(), Some("parquet"));
        assert_eq!(extension("abfs://acct.x/dir/file"), None);
    }
}
