//! Turning a command-line argument into a bundle
//!
//! Directories are flattened the way a browser drop does it: every file is
//! keyed by `/<dir>/<relative path>`, so the document's relative references
//! resolve against sibling keys.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, info};
use vitrine_core::{BlobMap, Bundle};

fn is_gltf_document(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.ends_with(".gltf") || lower.ends_with(".glb")
}

/// Build a bundle from a file, a directory, or an `http(s)` URL
pub fn harvest(source: &str) -> Result<Bundle> {
    if vitrine_gltf::uri::is_http(source) {
        info!(url = %source, "Loading from URL");
        return Ok(Bundle::url(source)?);
    }
    let path = Path::new(source);
    if path.is_dir() {
        harvest_dir(path)
    } else {
        harvest_file(path)
    }
}

fn harvest_file(path: &Path) -> Result<Bundle> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("Not a file name: {}", path.display()))?
        .to_string();
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let mut blobs = BlobMap::new();
    blobs.insert(name.clone(), Bundle::blob(bytes));
    info!(path = %path.display(), "Harvested single file");
    Ok(Bundle::new(name, blobs)?)
}

fn harvest_dir(dir: &Path) -> Result<Bundle> {
    let dir_name = dir
        .canonicalize()
        .with_context(|| format!("Failed to resolve {}", dir.display()))?
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .unwrap_or_default();
    let prefix = if dir_name.is_empty() {
        String::new()
    } else {
        format!("/{dir_name}")
    };

    let mut blobs = BlobMap::new();
    collect(dir, &prefix, &mut blobs)?;

    // BlobMap is ordered, so the first match is the first in sorted order
    let primary = blobs
        .keys()
        .find(|key| is_gltf_document(key))
        .cloned()
        .context("no glTF document in bundle")?;
    info!(
        dir = %dir.display(),
        files = blobs.len(),
        primary = %primary,
        "Harvested directory"
    );
    Ok(Bundle::new(primary, blobs)?)
}

fn collect(dir: &Path, prefix: &str, blobs: &mut BlobMap) -> Result<()> {
    let entries =
        std::fs::read_dir(dir).with_context(|| format!("Failed to list {}", dir.display()))?;
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            debug!(path = %path.display(), "Skipping non UTF-8 file name");
            continue;
        };
        let key = format!("{prefix}/{name}");
        if entry.file_type()?.is_dir() {
            collect(&path, &key, blobs)?;
        } else {
            let bytes =
                std::fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))?;
            debug!(key = %key, bytes = bytes.len(), "Added bundle member");
            blobs.insert(key, Bundle::blob(bytes));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_directory_keys_follow_drop_paths() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("robot");
        fs::create_dir_all(dir.join("textures")).unwrap();
        fs::write(dir.join("scene.gltf"), b"{}").unwrap();
        fs::write(dir.join("scene.bin"), [0u8; 4]).unwrap();
        fs::write(dir.join("textures/base.png"), [1u8; 2]).unwrap();

        let bundle = harvest(dir.to_str().unwrap()).unwrap();
        assert_eq!(bundle.primary, "/robot/scene.gltf");
        let keys: Vec<&str> = bundle.blobs.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec!["/robot/scene.bin", "/robot/scene.gltf", "/robot/textures/base.png"]
        );
    }

    #[test]
    fn test_primary_is_first_sorted_document() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("pack");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("b.glb"), b"glTF").unwrap();
        fs::write(dir.join("a.GLTF"), b"{}").unwrap();

        let bundle = harvest(dir.to_str().unwrap()).unwrap();
        assert_eq!(bundle.primary, "/pack/a.GLTF");
    }

    #[test]
    fn test_directory_without_document_fails() {
        let root = tempfile::tempdir().unwrap();
        fs::write(root.path().join("readme.txt"), b"hi").unwrap();
        let err = harvest(root.path().to_str().unwrap()).unwrap_err();
        assert!(err.to_string().contains("no glTF document in bundle"));
    }

    #[test]
    fn test_single_file_is_its_own_primary() {
        let root = tempfile::tempdir().unwrap();
        let path = root.path().join("cube.glb");
        fs::write(&path, b"glTF").unwrap();

        let bundle = harvest(path.to_str().unwrap()).unwrap();
        assert_eq!(bundle.primary, "cube.glb");
        assert_eq!(bundle.blobs.len(), 1);
        assert_eq!(&bundle.blobs["cube.glb"][..], b"glTF");
    }

    #[test]
    fn test_url_has_no_blobs() {
        let bundle = harvest("https://cdn.test/models/duck.glb").unwrap();
        assert_eq!(bundle.primary, "https://cdn.test/models/duck.glb");
        assert!(bundle.blobs.is_empty());
    }
}
