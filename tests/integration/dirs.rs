use crate::*;

use sluice_core::config::FilesConfig;
use sluice_pipeline::files::default_dir_destination;
use sluice_pipeline::{copy_dir, RunOptions};

fn populate(dir: &std::path::Path) {
    std::fs::create_dir_all(dir.join("nested")).unwrap();
    std::fs::write(dir.join("b.txt"), "bravo").unwrap();
    std::fs::write(dir.join("a.txt"), "alpha").unwrap();
    std::fs::write(dir.join("c.bin"), pattern(100_000)).unwrap();
    std::fs::write(dir.join("nested").join("ignored.txt"), "nested").unwrap();
}

#[tokio::test]
async fn copies_files_numbered_in_name_order() {
    let root = scratch("dir-numbered");
    let src = root.join("photos");
    populate(&src);
    let dst = default_dir_destination(&src, "copied-");
    assert_eq!(dst, root.join("copied-photos"));

    let copied = copy_dir(&src, &dst, &FilesConfig::default(), &RunOptions::default())
        .await
        .unwrap();

    let names: Vec<String> = copied
        .iter()
        .map(|f| f.destination.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["1. a.txt", "2. b.txt", "3. c.bin"]);
    assert_eq!(std::fs::read_to_string(dst.join("1. a.txt")).unwrap(), "alpha");
    assert_eq!(std::fs::read(dst.join("3. c.bin")).unwrap(), pattern(100_000));
    assert!(!dst.join("nested").exists());
    let _ = std::fs::remove_dir_all(&root);
}

#[tokio::test]
async fn existing_destination_is_replaced() {
    let root = scratch("dir-replace");
    let src = root.join("src");
    let dst = root.join("dst");
    populate(&src);
    std::fs::create_dir_all(&dst).unwrap();
    std::fs::write(dst.join("stale.txt"), "old").unwrap();

    let files = FilesConfig {
        number_copies: false,
        ..FilesConfig::default()
    };
    copy_dir(&src, &dst, &files, &RunOptions::default()).await.unwrap();

    assert!(!dst.join("stale.txt").exists());
    assert_eq!(std::fs::read_to_string(dst.join("b.txt")).unwrap(), "bravo");
    let _ = std::fs::remove_dir_all(&root);
}

#[tokio::test]
async fn missing_source_directory_is_reported() {
    let root = scratch("dir-missing");
    let err = copy_dir(
        &root.join("nowhere"),
        &root.join("copied-nowhere"),
        &FilesConfig::default(),
        &RunOptions::default(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, PipelineError::SourceNotFound(_)));
    assert!(!root.join("copied-nowhere").exists());
    let _ = std::fs::remove_dir_all(&root);
}

#[tokio::test]
async fn file_as_directory_source_is_rejected() {
    let root = scratch("dir-file");
    let file = root.join("plain.txt");
    std::fs::write(&file, "not a dir").unwrap();
    let err = copy_dir(&file, &root.join("out"), &FilesConfig::default(), &RunOptions::default())
        .await
        .unwrap_err();
    assert!(err.is_usage());
    let _ = std::fs::remove_dir_all(&root);
}

/// A destination that contains the source must never be replaced.
#[tokio::test]
async fn parent_destination_is_rejected_and_source_survives() {
    let root = scratch("dir-parent");
    let photos = root.join("photos");
    let raw = photos.join("raw");
    populate(&raw);
    std::fs::write(photos.join("sibling.jpg"), "keep").unwrap();

    let err = copy_dir(&raw, &photos, &FilesConfig::default(), &RunOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::InvalidArgument { name: "destination", .. }));
    assert_eq!(std::fs::read_to_string(raw.join("a.txt")).unwrap(), "alpha");
    assert_eq!(std::fs::read_to_string(photos.join("sibling.jpg")).unwrap(), "keep");
    let _ = std::fs::remove_dir_all(&root);
}

#[tokio::test]
async fn existing_destination_inside_source_is_rejected() {
    let root = scratch("dir-child");
    let src = root.join("src");
    populate(&src);

    let err = copy_dir(&src, &src.join("nested"), &FilesConfig::default(), &RunOptions::default())
        .await
        .unwrap_err();

    assert!(err.is_usage());
    assert_eq!(
        std::fs::read_to_string(src.join("nested").join("ignored.txt")).unwrap(),
        "nested"
    );
    let _ = std::fs::remove_dir_all(&root);
}

/// A shutdown requested before the copy starts leaves the existing
/// destination alone and copies nothing.
#[tokio::test]
async fn shutdown_stops_before_touching_destination() {
    let root = scratch("dir-shutdown");
    let src = root.join("src");
    let dst = root.join("dst");
    populate(&src);
    std::fs::create_dir_all(&dst).unwrap();
    std::fs::write(dst.join("previous.txt"), "old").unwrap();

    let (tx, rx) = tokio::sync::watch::channel(false);
    tx.send_replace(true);
    let options = RunOptions {
        shutdown: Some(rx),
        ..RunOptions::default()
    };

    let err = copy_dir(&src, &dst, &FilesConfig::default(), &options)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Aborted));
    assert!(dst.join("previous.txt").exists());
    assert!(!dst.join("1. a.txt").exists());
    let _ = std::fs::remove_dir_all(&root);
}

#[cfg(unix)]
#[tokio::test]
async fn symlinked_files_are_copied() {
    let root = scratch("dir-symlink");
    let src = root.join("src");
    std::fs::create_dir_all(&src).unwrap();
    std::fs::write(root.join("target.txt"), "linked").unwrap();
    std::os::unix::fs::symlink(root.join("target.txt"), src.join("link.txt")).unwrap();

    let files = FilesConfig {
        number_copies: false,
        ..FilesConfig::default()
    };
    let dst = root.join("dst");
    let copied = copy_dir(&src, &dst, &files, &RunOptions::default()).await.unwrap();

    assert_eq!(copied.len(), 1);
    assert_eq!(std::fs::read_to_string(dst.join("link.txt")).unwrap(), "linked");
    let _ = std::fs::remove_dir_all(&root);
}
