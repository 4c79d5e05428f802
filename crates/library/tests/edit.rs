mod common;

use common::Harness;
use std::path::Path;
use std::sync::Arc;
use tome_catalog::Renamed;
use tome_library::error::ErrorKind;
use tome_library::{Editor, Organizer};
use tome_media::DataSource;

const MY_BOOK: &str = "title=My Book\nauthor=Jane Doe\n";

fn editor(harness: &Harness) -> Editor {
    Editor::new(harness.ctx.clone(), Arc::new(Organizer::new(harness.ctx.clone())))
}

#[tokio::test]
async fn test_renaming_an_author_moves_their_books() {
    let harness = Harness::new(&[("Loose.epub", MY_BOOK)], true).await;
    harness.scan().await;
    let jane = harness.only_book().await.authors[0].clone();

    let renamed = editor(&harness).rename_person(jane.id, "J. Doe").await.unwrap();
    assert!(matches!(renamed, Renamed::Renamed(ref p) if p.name == "J. Doe"));
    assert_eq!(
        harness.paths().await,
        vec!["[J. Doe] My Book/My Book.epub", "[J. Doe] My Book/My Book.metadata.json"]
    );

    let sidecar = tome_sidecar::read_book(harness.backend.as_ref(), Path::new("[J. Doe] My Book/My Book.epub"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(sidecar.authors[0].name, "J. Doe");

    // The new name sticks on the next scan.
    let result = harness.scan().await;
    assert!(result.is_noop(), "{result:?}");
    assert_eq!(harness.only_book().await.authors[0].name, "J. Doe");
}

#[tokio::test]
async fn test_renamed_person_survives_a_rescan_without_sidecars() {
    let content = "title=My Book\nauthor=Jane Doe\nnarrator=Jane Doe\n";
    let harness = Harness::new(&[("[Jane Doe] My Book/My Book.m4b", content)], false).await.without_sidecars();
    harness.scan().await;
    let jane = harness.only_book().await.authors[0].clone();

    editor(&harness).rename_person(jane.id, "J. Doe").await.unwrap();
    assert_eq!(harness.paths().await, vec!["[Jane Doe] My Book/My Book.m4b"]);

    let result = harness.scan().await;
    assert!(result.is_noop(), "{result:?}");
    let book = harness.only_book().await;
    assert_eq!(book.authors.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(), vec!["J. Doe"]);
    assert_eq!(book.book.authors_source, Some(DataSource::Manual));
    let file = &book.files[0];
    assert_eq!(file.narrators[0].name, "J. Doe");
    assert_eq!(file.file.narrators_source, Some(DataSource::Manual));
}

#[tokio::test]
async fn test_merged_person_survives_a_rescan_without_sidecars() {
    let harness = Harness::new(
        &[
            ("[Jane Doe] My Book/My Book.epub", MY_BOOK),
            ("[J Doe] Other/Other.epub", "title=Other\nauthor=J Doe\n"),
        ],
        false,
    )
    .await
    .without_sidecars();
    harness.scan().await;
    let repo = harness.ctx.repo();
    let jane = repo.person_by_name(harness.library.id, "Jane Doe").await.unwrap().unwrap();
    let j = repo.person_by_name(harness.library.id, "J Doe").await.unwrap().unwrap();
    editor(&harness).merge_people(jane.id, j.id).await.unwrap();

    let result = harness.scan().await;
    assert!(result.is_noop(), "{result:?}");
    assert!(repo.person_by_name(harness.library.id, "J Doe").await.unwrap().is_none());
    assert_eq!(repo.books_by_person(jane.id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_renaming_onto_an_existing_person_merges() {
    let harness = Harness::new(
        &[
            ("[Jane Doe] My Book/My Book.epub", MY_BOOK),
            ("[J Doe] Other/Other.epub", "title=Other\nauthor=J Doe\n"),
        ],
        false,
    )
    .await;
    harness.scan().await;
    let repo = harness.ctx.repo();
    let j = repo.person_by_name(harness.library.id, "J Doe").await.unwrap().unwrap();

    let renamed = editor(&harness).rename_person(j.id, "jane doe").await.unwrap();
    assert!(matches!(renamed, Renamed::Merged(ref p) if p.name == "Jane Doe"));
    assert_eq!(repo.list_people(harness.library.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_merged_people_leave_nothing_behind() {
    let harness = Harness::new(
        &[
            ("[Jane Doe] My Book/My Book.epub", MY_BOOK),
            ("[J Doe] Other/Other.epub", "title=Other\nauthor=J Doe\n"),
            ("[Ann Other] Saga/Saga.m4b", "title=Saga\nauthor=Ann Other\nnarrator=J Doe\n"),
        ],
        false,
    )
    .await;
    harness.scan().await;
    let repo = harness.ctx.repo();
    let jane = repo.person_by_name(harness.library.id, "Jane Doe").await.unwrap().unwrap();
    let j = repo.person_by_name(harness.library.id, "J Doe").await.unwrap().unwrap();

    let merged = editor(&harness).merge_people(jane.id, j.id).await.unwrap();
    assert_eq!(merged.id, jane.id);
    assert!(repo.person_by_name(harness.library.id, "J Doe").await.unwrap().is_none());
    assert_eq!(repo.books_by_person(jane.id).await.unwrap().len(), 2);
    assert_eq!(repo.files_narrated_by(jane.id).await.unwrap().len(), 1);

    let sidecar = tome_sidecar::read_book(harness.backend.as_ref(), Path::new("[J Doe] Other/Other.epub"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(sidecar.authors[0].name, "Jane Doe");
    let narrated = tome_sidecar::read_file(harness.backend.as_ref(), Path::new("[Ann Other] Saga/Saga.m4b"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(narrated.narrators[0].name, "Jane Doe");
}

#[tokio::test]
async fn test_manual_title_survives_a_rescan() {
    let harness = Harness::new(&[("[Jane Doe] My Book/My Book.epub", MY_BOOK)], false).await;
    harness.scan().await;
    let book = harness.only_book().await;

    let edited = editor(&harness).set_book_title(book.book.id, "A Better Title").await.unwrap();
    assert_eq!(edited.book.title.value, "A Better Title");
    assert_eq!(edited.book.title.source, DataSource::Manual);

    harness.scan().await;
    let book = harness.only_book().await;
    assert_eq!(book.book.title.value, "A Better Title");
    assert_eq!(book.book.title.source, DataSource::Manual);
}

#[tokio::test]
async fn test_blank_title_is_rejected() {
    let harness = Harness::new(&[("[Jane Doe] My Book/My Book.epub", MY_BOOK)], false).await;
    harness.scan().await;
    let book = harness.only_book().await;

    let err = editor(&harness).set_book_title(book.book.id, "   ").await.unwrap_err();
    assert!(matches!(&*err, ErrorKind::InvalidInput(_)), "{err:?}");
}
