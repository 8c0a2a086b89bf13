//! Archive creation with the real `tar` binary, skipped when it is not installed

use hcdump::dump::archive::{create_archive, list_entries};
use hcdump::dump::{DumpContext, ARCHIVE_NAME};
use hcdump::error::DumpError;
use hcdump::process::{find_executable, TokioCommandRunner};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn context() -> DumpContext {
    DumpContext::new(Arc::new(TokioCommandRunner), CancellationToken::new())
}

fn populate(dir: &Path) {
    std::fs::write(dir.join("a.log"), "first\n").unwrap();
    std::fs::write(dir.join("b.log"), "second\n").unwrap();
    let logs = dir.join("namespaces/clusters-example/core/pods/logs");
    std::fs::create_dir_all(&logs).unwrap();
    std::fs::write(logs.join("kas-0-apiserver.log"), "listening\n").unwrap();
}

#[tokio::test]
async fn test_archive_members_match_listing() {
    let Some(tar) = find_executable("tar") else {
        eprintln!("tar not installed, skipping");
        return;
    };
    let dir = tempfile::tempdir().unwrap();
    populate(dir.path());
    let entries = list_entries(dir.path()).unwrap();

    let archive = create_archive(&context(), &tar, dir.path()).await.unwrap();
    assert_eq!(archive, dir.path().join(ARCHIVE_NAME));

    let listing = std::process::Command::new(&tar)
        .arg("-tzf")
        .arg(&archive)
        .output()
        .unwrap();
    assert!(listing.status.success());
    let top_level: BTreeSet<String> = String::from_utf8_lossy(&listing.stdout)
        .lines()
        .filter_map(|l| l.split('/').next())
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect();
    assert_eq!(top_level, entries.into_iter().collect::<BTreeSet<_>>());

    let extracted = tempfile::tempdir().unwrap();
    let status = std::process::Command::new(&tar)
        .arg("-xzf")
        .arg(&archive)
        .arg("-C")
        .arg(extracted.path())
        .status()
        .unwrap();
    assert!(status.success());
    assert_eq!(
        std::fs::read_to_string(extracted.path().join("b.log")).unwrap(),
        "second\n"
    );
    assert_eq!(
        std::fs::read_to_string(
            extracted
                .path()
                .join("namespaces/clusters-example/core/pods/logs/kas-0-apiserver.log")
        )
        .unwrap(),
        "listening\n"
    );
}

#[tokio::test]
async fn test_empty_artifact_dir_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let err = create_archive(&context(), Path::new("tar"), dir.path())
        .await
        .unwrap_err();
    assert!(matches!(err, DumpError::Archive(_)));
}

#[tokio::test]
async fn test_failing_archiver_is_fatal() {
    let Some(false_bin) = find_executable("false") else {
        return;
    };
    let dir = tempfile::tempdir().unwrap();
    populate(dir.path());
    let err = create_archive(&context(), &false_bin, dir.path())
        .await
        .unwrap_err();
    assert!(matches!(err, DumpError::Archive(_)));
}
