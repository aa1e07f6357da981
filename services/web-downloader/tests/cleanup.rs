mod common;

use std::collections::HashSet;
use std::time::{Duration, SystemTime};

use common::{FakeExtractor, TestApp, FAKE_BYTES};
use filetime::FileTime;
use jobstore::NewJob;
use web_downloader::cleanup::{cleanup_once, sweep_stale, CleanupReport};
use ytdl::{MediaFormat, Quality};

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

fn age(path: &std::path::Path, by: Duration) {
    let t = FileTime::from_system_time(SystemTime::now() - by);
    filetime::set_file_mtime(path, t).unwrap();
}

#[test]
fn sweep_removes_only_old_entries() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();

    let old_file = root.join("old.part");
    std::fs::write(&old_file, b"x").unwrap();
    age(&old_file, 2 * DAY);

    let old_dir = root.join("old-job");
    std::fs::create_dir(&old_dir).unwrap();
    let inner = old_dir.join("song.mp3");
    std::fs::write(&inner, b"x").unwrap();
    age(&inner, 2 * DAY);
    age(&old_dir, 2 * DAY);

    let fresh = root.join("fresh.mp4");
    std::fs::write(&fresh, b"x").unwrap();

    // Old directory holding a recently written file counts as fresh.
    let mixed = root.join("mixed-job");
    std::fs::create_dir(&mixed).unwrap();
    std::fs::write(mixed.join("new.mp4"), b"x").unwrap();
    age(&mixed, 2 * DAY);

    let removed = sweep_stale(root, DAY, &HashSet::new()).unwrap();
    assert_eq!(removed, 2);
    assert!(!old_file.exists());
    assert!(!old_dir.exists());
    assert!(fresh.exists());
    assert!(mixed.exists());
}

#[test]
fn sweep_skips_kept_names() {
    let dir = tempfile::tempdir().unwrap();
    let active = dir.path().join("active-job");
    std::fs::create_dir(&active).unwrap();
    age(&active, 3 * DAY);

    let keep: HashSet<String> = ["active-job".to_string()].into();
    assert_eq!(sweep_stale(dir.path(), DAY, &keep).unwrap(), 0);
    assert!(active.exists());
}

#[test]
fn sweep_of_missing_dir_is_noop() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope");
    assert_eq!(sweep_stale(&missing, DAY, &HashSet::new()).unwrap(), 0);
}

#[tokio::test]
async fn cleanup_drops_expired_jobs_and_keeps_active_ones() {
    let app = TestApp::with_config(FakeExtractor::default(), |cfg| {
        cfg.retention = Duration::from_millis(1);
    })
    .await;
    let store = &app.state.store;

    let done = store
        .create(&NewJob::new(&app.session_id, "https://youtu.be/aaaaaaaaaaa", MediaFormat::Mp4, Quality::Best))
        .await
        .unwrap();
    store.claim_next_pending().await.unwrap();
    let done_dir = app.state.job_dir(done.id);
    std::fs::create_dir_all(&done_dir).unwrap();
    let done_file = done_dir.join("Clip.mp4");
    std::fs::write(&done_file, FAKE_BYTES).unwrap();
    store.mark_completed(done.id, &done_file, FAKE_BYTES.len() as u64).await.unwrap();

    let waiting = store
        .create(&NewJob::new(&app.session_id, "https://youtu.be/bbbbbbbbbbb", MediaFormat::Mp3, Quality::Best))
        .await
        .unwrap();
    let waiting_dir = app.state.job_dir(waiting.id);
    std::fs::create_dir_all(&waiting_dir).unwrap();

    let stray = app.state.config.download_dir.join("leftover.webm.part");
    std::fs::write(&stray, b"junk").unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;

    let report = cleanup_once(&app.state).await.unwrap();
    assert_eq!(
        report,
        CleanupReport {
            records_removed: 1,
            entries_removed: 1,
        }
    );

    assert!(store.get(done.id).await.unwrap().is_none());
    assert!(!done_dir.exists());
    assert!(!stray.exists());

    assert!(store.get(waiting.id).await.unwrap().is_some());
    assert!(waiting_dir.exists());
}

#[tokio::test]
async fn cleanup_within_retention_removes_nothing() {
    let app = TestApp::new(FakeExtractor::default()).await;
    let store = &app.state.store;

    let job = store
        .create(&NewJob::new(&app.session_id, "https://youtu.be/aaaaaaaaaaa", MediaFormat::Mp4, Quality::Best))
        .await
        .unwrap();
    store.claim_next_pending().await.unwrap();
    store.mark_failed(job.id, "boom").await.unwrap();
    std::fs::write(app.state.config.download_dir.join("recent.mp4"), b"x").unwrap();

    let report = cleanup_once(&app.state).await.unwrap();
    assert_eq!(report, CleanupReport::default());
    assert!(store.get(job.id).await.unwrap().is_some());
}

#[tokio::test]
async fn sweep_spares_files_of_unexpired_records() {
    let app = TestApp::with_config(FakeExtractor::default(), |cfg| {
        cfg.retention = Duration::from_secs(60 * 60);
    })
    .await;
    let store = &app.state.store;

    let job = store
        .create(&NewJob::new(&app.session_id, "https://youtu.be/aaaaaaaaaaa", MediaFormat::Mp4, Quality::Best))
        .await
        .unwrap();
    store.claim_next_pending().await.unwrap();
    let dir = app.state.job_dir(job.id);
    std::fs::create_dir_all(&dir).unwrap();
    let file = dir.join("Clip.mp4");
    std::fs::write(&file, FAKE_BYTES).unwrap();
    store.mark_completed(job.id, &file, FAKE_BYTES.len() as u64).await.unwrap();

    // Written long before the record was marked complete.
    let stale = Duration::from_secs(60 * 60 + 1);
    age(&file, stale);
    age(&dir, stale);

    let report = cleanup_once(&app.state).await.unwrap();
    assert_eq!(report, CleanupReport::default());
    assert!(file.exists());
    assert!(store.get(job.id).await.unwrap().unwrap().file_available());
}
