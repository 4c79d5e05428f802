mod common;

use common::{Harness, absolute};
use futures::TryStreamExt;
use std::path::Path;
use std::sync::Arc;
use tome_library::{FileOrganizer, OrganizeEvent, Organized, Organizer, Stage, organize_library};
use tome_storage::StorageBackend;

const MY_BOOK: &str = "title=My Book\nauthor=Jane Doe\n";

#[tokio::test]
async fn test_root_level_file_gets_a_folder() {
    let harness = Harness::new(&[("Loose.epub", MY_BOOK)], true).await;
    let result = harness.scan().await;
    assert!(result.errors.is_empty(), "{:?}", result.errors);

    assert_eq!(
        harness.paths().await,
        vec!["[Jane Doe] My Book/My Book.epub", "[Jane Doe] My Book/My Book.metadata.json"]
    );
    let book = harness.only_book().await;
    assert_eq!(book.book.filepath, absolute("[Jane Doe] My Book"));
    assert_eq!(book.files[0].file.filepath, absolute("[Jane Doe] My Book/My Book.epub"));

    let again = harness.scan().await;
    assert!(again.is_noop(), "{again:?}");
}

#[tokio::test]
async fn test_root_level_files_stay_put_without_organizing() {
    let harness = Harness::new(&[("Loose.epub", MY_BOOK)], false).await;
    harness.scan().await;

    assert_eq!(harness.paths().await, vec!["Loose.epub", "Loose.metadata.json"]);
    assert_eq!(harness.only_book().await.book.filepath, absolute("Loose.epub"));
}

#[tokio::test]
async fn test_root_level_formats_of_one_book_coalesce() {
    let harness = Harness::new(
        &[
            ("Loose.epub", MY_BOOK),
            ("Loose.m4b", "title=My Book\nauthor=Jane Doe\nnarrator=Reader\n"),
        ],
        true,
    )
    .await;
    harness.scan().await;

    let book = harness.only_book().await;
    assert_eq!(book.files.len(), 2);
    let paths = harness.paths().await;
    assert!(paths.contains(&"[Jane Doe] My Book/My Book.epub".to_string()), "{paths:?}");
    assert!(paths.contains(&"[Jane Doe] My Book/My Book {Reader}.m4b".to_string()), "{paths:?}");
}

#[tokio::test]
async fn test_failed_move_is_rolled_back() {
    let harness = Harness::new(&[("Loose.epub", MY_BOOK)], true).await;
    harness.backend.fail_renames_matching(".metadata.json").await;

    let result = harness.scan().await;
    assert_eq!(result.created, 1);
    assert!(result.errors.iter().any(|e| e.stage == Stage::Organize), "{:?}", result.errors);
    assert_eq!(harness.paths().await, vec!["Loose.epub", "Loose.metadata.json"]);
    assert_eq!(harness.only_book().await.book.filepath, absolute("Loose.epub"));

    harness.backend.clear_failures().await;
    let organizer = Organizer::new(harness.ctx.clone());
    let events: Vec<OrganizeEvent> = organize_library(&organizer, harness.library.id).try_collect().await.unwrap();
    assert!(matches!(events.last(), Some(OrganizeEvent::Complete)));
    assert!(
        events
            .iter()
            .any(|e| matches!(e, OrganizeEvent::Organized { outcome: Organized::Moved { files: 1, .. }, .. }))
    );
    assert_eq!(
        harness.paths().await,
        vec!["[Jane Doe] My Book/My Book.epub", "[Jane Doe] My Book/My Book.metadata.json"]
    );
}

#[tokio::test]
async fn test_name_collisions_get_a_suffix() {
    let harness = Harness::new(
        &[
            ("[Jane Doe] My Book/My Book.epub", "title=Something Else\nauthor=Jane Doe\n"),
            ("Loose.epub", MY_BOOK),
        ],
        true,
    )
    .await;
    harness.scan().await;

    let paths = harness.paths().await;
    assert!(paths.contains(&"[Jane Doe] My Book/My Book.epub".to_string()), "{paths:?}");
    assert!(paths.contains(&"[Jane Doe] My Book (1)/My Book.epub".to_string()), "{paths:?}");
}

#[tokio::test]
async fn test_organizing_an_organized_book_changes_nothing() {
    let harness = Harness::new(&[("Loose.epub", MY_BOOK)], true).await;
    harness.scan().await;
    let book = harness.only_book().await;

    let organizer = Organizer::new(harness.ctx.clone());
    let outcome = organizer.organize_book_files(book.book.id).await.unwrap();
    assert!(matches!(outcome, Organized::Unchanged), "{outcome:?}");
}

#[tokio::test]
async fn test_disabled_library_is_left_alone() {
    let harness = Harness::new(&[("[Someone] Wrong Name/x.epub", MY_BOOK)], false).await;
    harness.scan().await;
    let book = harness.only_book().await;

    let organizer = Arc::new(Organizer::new(harness.ctx.clone()));
    assert!(!organizer.library_organize_setting(harness.library.id).await.unwrap());
    let outcome = organizer.organize_book_files(book.book.id).await.unwrap();
    assert!(matches!(outcome, Organized::Disabled));
    assert!(harness.backend.exists(Path::new("[Someone] Wrong Name/x.epub")).await.unwrap());
}

#[tokio::test]
async fn test_deleting_a_file_from_disk_takes_its_side_files() {
    let harness = Harness::new(&[("Loose.epub", MY_BOOK)], true).await;
    harness.scan().await;
    let book = harness.only_book().await;

    let organizer = Organizer::new(harness.ctx.clone());
    organizer.delete_file(book.files[0].file.id, true).await.unwrap();
    assert!(harness.paths().await.is_empty(), "{:?}", harness.paths().await);
    assert!(harness.books().await.is_empty());
}
