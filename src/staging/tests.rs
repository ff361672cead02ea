use super::store::{artifact_owner, is_artifact_name};
use super::*;
use crate::dispatch::EvalId;
use crate::error::BridgeError;
use crate::test_support::wait_for;
use std::fs;
use std::time::Duration;

fn store() -> (tempfile::TempDir, StagingStore) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = StagingStore::new(dir.path().join("staging")).expect("store");
    (dir, store)
}

#[test]
fn write_wraps_code_in_uniquely_named_file() {
    let (_dir, store) = store();
    let id = EvalId::next();
    let artifact = store.write(&id, "SinOsc.ar(440)").expect("write");

    let name = artifact
        .path()
        .file_name()
        .expect("file name")
        .to_string_lossy()
        .into_owned();
    assert!(is_artifact_name(&name), "{name}");
    assert!(name.contains(id.as_str()));
    assert_eq!(artifact.path().parent(), Some(store.dir()));
    assert_eq!(
        fs::read_to_string(artifact.path()).expect("read"),
        "(\nSinOsc.ar(440)\n)\n"
    );
}

#[test]
fn write_never_overwrites() {
    let (_dir, store) = store();
    let id = EvalId::next();
    let first = store.write(&id, "1").expect("first write");
    let err = store.write(&id, "2").unwrap_err();
    assert!(matches!(err, BridgeError::StagingWriteFailure { .. }));
    assert_eq!(fs::read_to_string(first.path()).expect("read"), "(\n1\n)\n");
}

#[test]
fn remove_is_idempotent() {
    let (_dir, store) = store();
    let artifact = store.write(&EvalId::next(), "1").expect("write");
    assert!(!artifact.is_removed());
    assert!(artifact.remove());
    assert!(!artifact.remove());
    assert!(artifact.is_removed());
    assert!(!artifact.path().exists());
}

#[test]
fn remove_tolerates_file_deleted_elsewhere() {
    let (_dir, store) = store();
    let artifact = store.write(&EvalId::next(), "1").expect("write");
    fs::remove_file(artifact.path()).expect("external delete");
    assert!(artifact.remove());
}

#[test]
fn new_sweeps_only_stale_artifacts() {
    let dir = tempfile::tempdir().expect("tempdir");
    // pid_max on Linux stays well below this, so no process owns it.
    let stale = dir.path().join("scbridge-eval-18c-999999999-1.scd");
    let unparsable = dir.path().join("scbridge-eval-garbage.scd");
    let unrelated = dir.path().join("notes.scd");
    fs::write(&stale, "(\nold\n)\n").expect("write stale");
    fs::write(&unparsable, "(\nold\n)\n").expect("write unparsable");
    fs::write(&unrelated, "keep").expect("write unrelated");

    let _store = StagingStore::new(dir.path()).expect("store");
    assert!(!stale.exists());
    assert!(!unparsable.exists());
    assert!(unrelated.exists());
}

#[test]
fn new_keeps_artifacts_of_running_bridges() {
    let dir = tempfile::tempdir().expect("tempdir");
    let first = StagingStore::new(dir.path()).expect("first store");
    let ours = first.write(&EvalId::next(), "1").expect("write");
    let parent = dir
        .path()
        .join(format!("scbridge-eval-18c-{}-1.scd", std::os::unix::process::parent_id()));
    fs::write(&parent, "(\n2\n)\n").expect("write parent artifact");

    let second = StagingStore::new(dir.path()).expect("second store");
    assert_eq!(second.sweep_stale(), 0);
    assert!(ours.path().exists());
    assert!(parent.exists());
}

#[test]
fn artifact_owner_reads_pid_field() {
    assert_eq!(artifact_owner("scbridge-eval-18c-4242-7.scd"), Some(4242));
    assert_eq!(artifact_owner("scbridge-eval-18c-0-7.scd"), None);
    assert_eq!(artifact_owner("scbridge-eval-18c-7.scd"), None);
    assert_eq!(artifact_owner("notes.scd"), None);
}

#[test]
fn reaper_removes_after_ttl() {
    let (_dir, store) = store();
    let reaper = ArtifactReaper::start();
    let artifact = store.write(&EvalId::next(), "1").expect("write");
    reaper.schedule(artifact.clone(), Duration::from_millis(100));

    assert!(artifact.path().exists());
    assert!(wait_for(Duration::from_secs(3), || artifact.is_removed()));
    assert!(!artifact.path().exists());
    reaper.shutdown();
}

#[test]
fn reaper_keeps_deadline_order() {
    let (_dir, store) = store();
    let reaper = ArtifactReaper::start();
    let late = store.write(&EvalId::next(), "late").expect("write");
    let early = store.write(&EvalId::next(), "early").expect("write");
    reaper.schedule(late.clone(), Duration::from_secs(3600));
    reaper.schedule(early.clone(), Duration::from_millis(50));

    assert!(wait_for(Duration::from_secs(3), || early.is_removed()));
    assert!(!late.is_removed());
    reaper.shutdown();
    assert!(late.is_removed());
}

#[test]
fn shutdown_removes_pending_artifacts() {
    let (_dir, store) = store();
    let reaper = ArtifactReaper::start();
    let handle = reaper.handle();
    let artifact = store.write(&EvalId::next(), "1").expect("write");
    handle.schedule(artifact.clone(), Duration::from_secs(3600));
    reaper.shutdown();
    assert!(!artifact.path().exists());

    let straggler = store.write(&EvalId::next(), "2").expect("write");
    handle.schedule(straggler.clone(), Duration::from_secs(3600));
    assert!(straggler.is_removed());
}
