//! Reference resolution relative to the primary document

use percent_encoding::percent_decode_str;
use url::Url;

/// Bundle keys and plain paths are joined as paths under this root
const PATH_ROOT: &str = "file:///";

/// Directory part of `primary`, including the trailing slash
pub fn base_of(primary: &str) -> &str {
    match primary.rfind('/') {
        Some(i) => &primary[..=i],
        None => "",
    }
}

pub fn is_data_uri(uri: &str) -> bool {
    uri.starts_with("data:")
}

pub fn is_http(locator: &str) -> bool {
    Url::parse(locator).is_ok_and(|u| matches!(u.scheme(), "http" | "https"))
}

fn decode(input: &str) -> String {
    percent_decode_str(input).decode_utf8_lossy().into_owned()
}

/// Resolve `reference` against `base` the way the document's own URIs are
/// resolved
///
/// Remote bases yield encoded URLs. Path bases (bundle keys, disk paths)
/// yield percent-decoded paths, staying relative when `base` was relative.
pub fn resolve(base: &str, reference: &str) -> String {
    if let Ok(url) = Url::parse(base) {
        if url.scheme() != "file" {
            return match url.join(reference) {
                Ok(joined) => joined.to_string(),
                Err(_) => reference.to_string(),
            };
        }
    }
    if Url::parse(reference).is_ok_and(|u| u.scheme() != "file") {
        return reference.to_string();
    }

    let (prefix, path) = match base.strip_prefix("file://") {
        Some(path) => ("file://", path),
        None => ("", base),
    };
    let joined = Url::parse(PATH_ROOT)
        .and_then(|root| root.join(path.trim_start_matches('/')))
        .and_then(|dir| dir.join(reference));
    let Ok(joined) = joined else {
        return decode(reference);
    };
    let resolved = decode(joined.path());
    let keep_root = !prefix.is_empty() || base.starts_with('/') || reference.starts_with('/');
    match resolved.strip_prefix('/') {
        Some(relative) if !keep_root => relative.to_string(),
        _ => format!("{prefix}{resolved}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_of() {
        assert_eq!(base_of("/drop/robot/scene.gltf"), "/drop/robot/");
        assert_eq!(base_of("scene.gltf"), "");
        assert_eq!(base_of("https://cdn.test/m/a.glb"), "https://cdn.test/m/");
    }

    #[test]
    fn test_resolve_relative() {
        assert_eq!(resolve("/drop/robot/", "scene.bin"), "/drop/robot/scene.bin");
        assert_eq!(resolve("/drop/robot/", "./tex/a.png"), "/drop/robot/tex/a.png");
        assert_eq!(resolve("/drop/robot/", "../shared/b.bin"), "/drop/shared/b.bin");
        assert_eq!(resolve("drop/robot/", "scene.bin"), "drop/robot/scene.bin");
        assert_eq!(resolve("", "scene.bin"), "scene.bin");
        assert_eq!(resolve("", "../scene.bin"), "scene.bin");
    }

    #[test]
    fn test_resolve_decodes_paths() {
        assert_eq!(resolve("/drop/", "my%20model.bin"), "/drop/my model.bin");
        assert_eq!(resolve("/drop/", "tex/%C3%A9t%C3%A9.png"), "/drop/tex/été.png");
        assert_eq!(resolve("", "plain name.bin"), "plain name.bin");
        assert_eq!(
            resolve("file:///srv/models/", "../bin/a%20b.bin"),
            "file:///srv/bin/a b.bin"
        );
    }

    #[test]
    fn test_resolve_urls_and_absolute() {
        assert_eq!(
            resolve("https://cdn.test/m/", "../tex/a%20b.png"),
            "https://cdn.test/tex/a%20b.png"
        );
        assert_eq!(resolve("https://cdn.test/m/", "/root.bin"), "https://cdn.test/root.bin");
        assert_eq!(resolve("/drop/", "https://x.test/a.bin"), "https://x.test/a.bin");
        assert_eq!(resolve("/drop/a/", "/abs/b.bin"), "/abs/b.bin");
        assert_eq!(resolve("", "/abs/b.bin"), "/abs/b.bin");
    }

    #[test]
    fn test_is_http() {
        assert!(is_http("https://cdn.test/a.glb"));
        assert!(is_http("http://localhost:8080/a.glb"));
        assert!(!is_http("/drop/a.glb"));
        assert!(!is_http("file:///drop/a.glb"));
    }
}
