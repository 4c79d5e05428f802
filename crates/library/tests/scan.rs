mod common;

use common::{Harness, ROOT, absolute};
use futures::StreamExt;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tome_library::error::{ErrorKind, Result};
use tome_library::{Mounter, Outcome, ScanEvent, Stage, scan};
use tome_media::{DataSource, FileRole};
use tome_storage::backend::MockBackend;
use tome_storage::{BackendHandle, StorageBackend};

const MY_BOOK: &str = "title=My Book\nauthor=Jane Doe\n";

#[tokio::test]
async fn test_second_scan_is_a_noop() {
    let harness = Harness::new(
        &[
            ("[Jane Doe] My Book/My Book.epub", MY_BOOK),
            ("[Jane Doe] My Book/extras.pdf", "pdf"),
            ("[Ann Other] Saga/Saga.m4b", "title=Saga\nauthor=Ann Other\nnarrator=Reader\nseries=Cycle#2"),
        ],
        false,
    )
    .await;

    let first = harness.scan().await;
    assert_eq!(first.created, 3);
    assert!(first.errors.is_empty(), "{:?}", first.errors);

    let second = harness.scan().await;
    assert!(second.is_noop(), "{second:?}");
    assert!(second.errors.is_empty(), "{:?}", second.errors);
    assert_eq!(harness.books().await.len(), 2);
}

#[tokio::test]
async fn test_events_are_ordered() {
    let harness = Harness::new(&[("[Jane Doe] My Book/My Book.epub", MY_BOOK)], false).await;
    let events: Vec<ScanEvent> = scan(harness.ctx.clone(), harness.library.id)
        .map(|event| event.unwrap())
        .collect()
        .await;
    assert_eq!(events.first(), Some(&ScanEvent::Started));
    assert_eq!(events.get(1), Some(&ScanEvent::DiscoveryComplete(1)));
    assert_eq!(
        events.get(2),
        Some(&ScanEvent::Processed {
            path: absolute("[Jane Doe] My Book/My Book.epub"),
            outcome: Outcome::Created,
        })
    );
    assert_eq!(events.last(), Some(&ScanEvent::Complete));
}

#[tokio::test]
async fn test_files_in_one_folder_share_a_book() {
    let harness = Harness::new(
        &[
            ("[Jane Doe] My Book/My Book.epub", MY_BOOK),
            ("[Jane Doe] My Book/My Book.m4b", "title=My Book\nauthor=Jane Doe\nnarrator=Reader\n"),
        ],
        false,
    )
    .await;
    harness.scan().await;

    let book = harness.only_book().await;
    assert_eq!(book.book.filepath, absolute("[Jane Doe] My Book"));
    assert_eq!(book.book.title.value, "My Book");
    assert_eq!(book.files.len(), 2);
    let main = book.main_file().unwrap();
    assert_eq!(main.file.filepath, absolute("[Jane Doe] My Book/My Book.epub"));
    assert_eq!(book.authors[0].name, "Jane Doe");
}

#[tokio::test]
async fn test_sidecar_is_written_next_to_the_main_file() {
    let harness = Harness::new(&[("[Jane Doe] My Book/My Book.epub", MY_BOOK)], false).await;
    harness.scan().await;

    let sidecar = tome_sidecar::read_book(harness.backend.as_ref(), Path::new("[Jane Doe] My Book/My Book.epub"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(sidecar.title.as_deref(), Some("My Book"));
    assert_eq!(sidecar.authors[0].name, "Jane Doe");
    assert_eq!(sidecar.authors[0].sort_name, None);
}

#[tokio::test]
async fn test_sidecar_edits_win_over_embedded_metadata() {
    let harness = Harness::new(&[("[Jane Doe] My Book/My Book.epub", MY_BOOK)], false).await;
    harness
        .backend
        .write(
            Path::new("[Jane Doe] My Book/My Book.metadata.json"),
            br#"{"version": 1, "title": "Edited Title"}"#,
        )
        .await
        .unwrap();
    harness.scan().await;

    let book = harness.only_book().await;
    assert_eq!(book.book.title.value, "Edited Title");
    assert_eq!(book.book.title.source, DataSource::Sidecar);
}

#[tokio::test]
async fn test_removed_main_file_promotes_a_supplement() {
    let harness = Harness::new(
        &[
            ("[Jane Doe] My Book/B.epub", MY_BOOK),
            ("[Jane Doe] My Book/B.m4b", "title=My Book\nauthor=Jane Doe\nnarrator=Reader\n"),
        ],
        false,
    )
    .await;
    harness.scan().await;
    harness.backend.delete(Path::new("[Jane Doe] My Book/B.epub")).await.unwrap();

    let result = harness.scan().await;
    assert_eq!(result.removed, 1);
    let book = harness.only_book().await;
    assert_eq!(book.files.len(), 1);
    assert_eq!(book.files[0].file.filepath, absolute("[Jane Doe] My Book/B.m4b"));
    assert_eq!(book.files[0].file.file_role, FileRole::Main);
    assert_eq!(book.book.primary_file_id, Some(book.files[0].file.id));
}

#[tokio::test]
async fn test_book_goes_with_its_last_file() {
    let harness = Harness::new(&[("[Jane Doe] My Book/My Book.epub", MY_BOOK)], false).await;
    harness.scan().await;
    harness.backend.delete(Path::new("[Jane Doe] My Book/My Book.epub")).await.unwrap();

    let result = harness.scan().await;
    assert_eq!(result.removed, 1);
    assert!(harness.books().await.is_empty());
    // Nobody writes Jane Doe's name anymore.
    let repo = harness.ctx.repo();
    assert!(repo.person_by_name(harness.library.id, "Jane Doe").await.unwrap().is_none());
}

#[tokio::test]
async fn test_parse_failures_are_recorded_and_skipped() {
    let harness = Harness::new(
        &[("[A] Bad/Bad.epub", "corrupt"), ("[Jane Doe] My Book/My Book.epub", MY_BOOK)],
        false,
    )
    .await;
    let result = harness.scan().await;

    assert_eq!(result.created, 1);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].stage, Stage::Parse);
    assert_eq!(result.errors[0].path, absolute("[A] Bad/Bad.epub"));
    assert_eq!(harness.books().await.len(), 1);
}

#[tokio::test]
async fn test_supplement_without_a_book_is_skipped() {
    let harness = Harness::new(&[("notes.pdf", "pdf")], false).await;
    let events: Vec<ScanEvent> = scan(harness.ctx.clone(), harness.library.id)
        .map(|event| event.unwrap())
        .collect()
        .await;
    assert!(events.contains(&ScanEvent::Processed {
        path: absolute("notes.pdf"),
        outcome: Outcome::Skipped,
    }));
    assert!(harness.books().await.is_empty());
}

#[tokio::test]
async fn test_deleted_library_cannot_be_scanned() {
    let harness = Harness::new(&[], false).await;
    harness.ctx.repo().soft_delete_library(harness.library.id).await.unwrap();

    let err = tome_library::scan_library(&harness.ctx, harness.library.id).await.unwrap_err();
    assert!(matches!(&*err, ErrorKind::Scan), "{err:?}");
}

/// Serves `/library` always and `/offline` until it is switched off.
struct Flaky {
    online: BackendHandle,
    offline: BackendHandle,
    available: AtomicBool,
}
impl Mounter for Flaky {
    fn mount(&self, root: &Path) -> Result<BackendHandle> {
        match root.to_str() {
            Some(ROOT) => Ok(self.online.clone()),
            Some("/offline") if self.available.load(Ordering::SeqCst) => Ok(self.offline.clone()),
            _ => exn::bail!(ErrorKind::Unmounted(root.to_path_buf())),
        }
    }
}

#[tokio::test]
async fn test_unavailable_root_keeps_its_files() {
    let online = Arc::new(MockBackend::with_files([("[Jane Doe] My Book/My Book.epub", MY_BOOK)]));
    let offline = Arc::new(MockBackend::with_files([("[Ann Other] Saga/Saga.m4b", "title=Saga\nauthor=Ann Other")]));
    let mounter = Arc::new(Flaky {
        online: online.clone(),
        offline,
        available: AtomicBool::new(true),
    });
    let harness = Harness::with_mounter(online, mounter.clone(), &[ROOT, "/offline"], false).await;
    assert_eq!(harness.scan().await.created, 2);

    mounter.available.store(false, Ordering::SeqCst);
    let result = harness.scan().await;
    assert_eq!(result.removed, 0);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].stage, Stage::Discover);
    assert_eq!(harness.books().await.len(), 2);
}

const WITH_COVER: &str = "title=My Book\nauthor=Jane Doe\ncover=jpeg bytes\n";
const COVER: &str = "[Jane Doe] My Book/My Book.epub.cover.jpg";

#[tokio::test]
async fn test_cover_is_written_when_organizing() {
    let harness = Harness::new(&[("[Jane Doe] My Book/My Book.epub", WITH_COVER)], true).await;
    let result = harness.scan().await;
    assert!(result.errors.is_empty(), "{:?}", result.errors);

    assert!(harness.paths().await.contains(&COVER.to_string()));
    assert_eq!(harness.backend.read(Path::new(COVER)).await.unwrap(), b"jpeg bytes");
    let cover = harness.only_book().await.files[0].file.cover.clone().unwrap();
    assert_eq!(cover.filename, "My Book.epub.cover.jpg");
}

#[tokio::test]
async fn test_cover_is_not_written_without_organizing() {
    let harness = Harness::new(&[("[Jane Doe] My Book/My Book.epub", WITH_COVER)], false).await;
    let result = harness.scan().await;
    assert!(result.errors.is_empty(), "{:?}", result.errors);

    assert!(!harness.paths().await.contains(&COVER.to_string()));
    assert!(harness.only_book().await.files[0].file.cover.is_none());
}

#[tokio::test]
async fn test_existing_cover_is_used_without_organizing() {
    let harness = Harness::new(
        &[("[Jane Doe] My Book/My Book.epub", WITH_COVER), (COVER, "hand picked")],
        false,
    )
    .await;
    harness.scan().await;

    assert_eq!(harness.backend.read(Path::new(COVER)).await.unwrap(), b"hand picked");
    assert!(harness.only_book().await.files[0].file.cover.is_some());
}
