//! Content saver tests: the sharded on-disk layout, hash-based dedup, and
//! extension selection per content kind.

use std::path::Path;

use onioncrawl::content_saver::{ContentKind, ContentSaver};
use tempfile::TempDir;

/// Collect every regular file under `root`, depth-first.
fn files_under(root: &Path) -> Vec<std::path::PathBuf> {
    let mut found = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                found.push(path);
            }
        }
    }
    found
}

#[tokio::test]
async fn ensure_dirs_creates_every_kind_root() {
    let tmp = TempDir::new().unwrap();
    let saver = ContentSaver::new(tmp.path());
    saver.ensure_dirs().await.unwrap();

    for dir in ["text", "images", "videos", "files", "screenshots"] {
        assert!(tmp.path().join(dir).is_dir(), "missing root {dir}");
    }
}

#[tokio::test]
async fn save_shards_by_domain_and_hash_prefix() {
    let tmp = TempDir::new().unwrap();
    let saver = ContentSaver::new(tmp.path());

    saver
        .save("http://example.onion/page", ContentKind::Text, b"hello world")
        .await;

    let files = files_under(tmp.path());
    assert_eq!(files.len(), 1);

    let path = &files[0];
    let relative = path.strip_prefix(tmp.path()).unwrap();
    let parts: Vec<_> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();
    // <kind>/<domain>/<hash[..2]>/<timestamp>_<hash>.txt
    assert_eq!(parts.len(), 4);
    assert_eq!(parts[0], "text");
    assert_eq!(parts[1], "example.onion");
    assert_eq!(parts[2].len(), 2);
    let name = &parts[3];
    assert!(name.ends_with(".txt"));
    let hash = name
        .split('_')
        .nth(1)
        .and_then(|rest| rest.strip_suffix(".txt"))
        .expect("timestamp_hash.txt shape");
    assert_eq!(hash.len(), 16);
    assert!(hash.starts_with(&parts[2]), "shard prefix comes from the hash");
    assert_eq!(std::fs::read(path).unwrap(), b"hello world");
}

#[tokio::test]
async fn identical_bytes_saved_twice_yield_one_file() {
    let tmp = TempDir::new().unwrap();
    let saver = ContentSaver::new(tmp.path());

    saver
        .save("http://example.onion/a", ContentKind::Text, b"same bytes")
        .await;
    saver
        .save("http://example.onion/a", ContentKind::Text, b"same bytes")
        .await;

    assert_eq!(files_under(tmp.path()).len(), 1);
}

#[tokio::test]
async fn distinct_bytes_get_distinct_files() {
    let tmp = TempDir::new().unwrap();
    let saver = ContentSaver::new(tmp.path());

    saver
        .save("http://example.onion/a", ContentKind::Text, b"first")
        .await;
    saver
        .save("http://example.onion/a", ContentKind::Text, b"second")
        .await;

    assert_eq!(files_under(tmp.path()).len(), 2);
}

#[tokio::test]
async fn empty_payloads_are_not_written() {
    let tmp = TempDir::new().unwrap();
    let saver = ContentSaver::new(tmp.path());

    saver
        .save("http://example.onion/empty", ContentKind::Text, b"")
        .await;

    assert!(files_under(tmp.path()).is_empty());
}

#[tokio::test]
async fn image_extension_follows_url_with_jpg_fallback() {
    let tmp = TempDir::new().unwrap();
    let saver = ContentSaver::new(tmp.path());

    saver
        .save(
            "http://example.onion/logo.PNG",
            ContentKind::Image,
            b"png bytes",
        )
        .await;
    saver
        .save(
            "http://example.onion/img?id=9",
            ContentKind::Image,
            b"opaque bytes",
        )
        .await;

    let mut names: Vec<_> = files_under(tmp.path())
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
        .collect();
    names.sort();
    assert_eq!(names.len(), 2);
    assert!(names.iter().any(|n| n.ends_with(".png")));
    assert!(names.iter().any(|n| n.ends_with(".jpg")));
}

#[tokio::test]
async fn unparsable_url_lands_under_unknown_domain() {
    let tmp = TempDir::new().unwrap();
    let saver = ContentSaver::new(tmp.path());

    saver.save("::garbage::", ContentKind::File, b"blob").await;

    let files = files_under(tmp.path());
    assert_eq!(files.len(), 1);
    assert!(files[0].to_string_lossy().contains("unknown"));
}
