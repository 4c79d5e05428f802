use crate::error::{ErrorKind, Result, SqlxResultExt};
use crate::ids::{BookId, LibraryId};
use crate::models::{
    Book, BookDetail, BookFields, BookRow, FileDetail, MembershipRow, Person, PersonRow, SeriesMembership, name_key,
};
use crate::repo::Repository;
use sqlx::SqliteConnection;
use std::path::Path;
use tome_media::Sourced;
use tome_media::models::SeriesEntry;
use tracing::instrument;

impl Repository {
    pub(crate) async fn book_tx(conn: &mut SqliteConnection, id: BookId) -> Result<Book> {
        let row: Option<BookRow> = sqlx::query_as(include_str!("../../queries/get_book.sql"))
            .bind(id)
            .fetch_optional(conn)
            .await
            .or_db()?;
        row.ok_or_else(|| exn::Exn::from(ErrorKind::NotFound("book", id.0)))?.try_into()
    }

    pub async fn book(&self, id: BookId) -> Result<Book> {
        let mut conn = self.pool.acquire().await.or_db()?;
        Self::book_tx(&mut conn, id).await
    }

    /// Load a book with its authors, series and files.
    pub async fn book_detail(&self, id: BookId) -> Result<BookDetail> {
        let mut conn = self.pool.acquire().await.or_db()?;
        Self::book_detail_tx(&mut conn, id).await
    }

    pub(crate) async fn book_detail_tx(conn: &mut SqliteConnection, id: BookId) -> Result<BookDetail> {
        let book = Self::book_tx(&mut *conn, id).await?;
        let authors: Vec<PersonRow> = sqlx::query_as(include_str!("../../queries/list_book_authors.sql"))
            .bind(id)
            .fetch_all(&mut *conn)
            .await
            .or_db()?;
        let series: Vec<MembershipRow> = sqlx::query_as(include_str!("../../queries/list_book_series.sql"))
            .bind(id)
            .fetch_all(&mut *conn)
            .await
            .or_db()?;
        let mut files = Vec::new();
        for file in Self::files_for_book_tx(&mut *conn, id).await? {
            let narrators = Self::narrators_tx(&mut *conn, file.id).await?;
            files.push(FileDetail { file, narrators });
        }
        Ok(BookDetail {
            book,
            authors: authors.into_iter().map(Person::try_from).collect::<Result<_>>()?,
            series: series.into_iter().map(SeriesMembership::try_from).collect::<Result<_>>()?,
            files,
        })
    }

    pub async fn book_by_path(&self, library_id: LibraryId, path: &Path) -> Result<Option<Book>> {
        let row: Option<BookRow> = sqlx::query_as(include_str!("../../queries/get_book_by_path.sql"))
            .bind(library_id)
            .bind(Self::sqlx_hates_paths(path)?)
            .fetch_optional(&self.pool)
            .await
            .or_db()?;
        row.map(Book::try_from).transpose()
    }

    /// Books whose title matches case-insensitively.
    pub async fn books_by_title(&self, library_id: LibraryId, title: &str) -> Result<Vec<Book>> {
        let rows: Vec<BookRow> = sqlx::query_as(include_str!("../../queries/list_books_by_title.sql"))
            .bind(library_id)
            .bind(name_key(title))
            .fetch_all(&self.pool)
            .await
            .or_db()?;
        rows.into_iter().map(Book::try_from).collect()
    }

    pub async fn books_in_library(&self, library_id: LibraryId) -> Result<Vec<Book>> {
        let rows: Vec<BookRow> = sqlx::query_as(include_str!("../../queries/list_books_in_library.sql"))
            .bind(library_id)
            .fetch_all(&self.pool)
            .await
            .or_db()?;
        rows.into_iter().map(Book::try_from).collect()
    }

    /// Delete a book that no longer has any files.
    ///
    /// Refuses with [`ErrorKind::Invariant`] while files remain; those go
    /// through [`remove_file`](Self::remove_file) so promotion can happen.
    #[instrument(skip(self))]
    pub async fn delete_empty_book(&self, id: BookId) -> Result<()> {
        self.retrying(|| async move {
            let mut tx = self.pool.begin().await.or_db()?;
            Self::book_tx(&mut tx, id).await?;
            let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM files WHERE book_id = ?")
                .bind(id)
                .fetch_one(&mut *tx)
                .await
                .or_db()?;
            if remaining > 0 {
                exn::bail!(ErrorKind::Invariant(format!("book {id} still has {remaining} file(s)")));
            }
            sqlx::query("DELETE FROM books WHERE id = ?").bind(id).execute(&mut *tx).await.or_db()?;
            tx.commit().await.or_db()?;
            Ok(())
        })
        .await
    }

    pub(crate) async fn insert_book_tx(
        conn: &mut SqliteConnection,
        library_id: LibraryId,
        filepath: &Path,
        fields: &BookFields,
    ) -> Result<BookId> {
        let id: BookId = sqlx::query_scalar(include_str!("../../queries/insert_book.sql"))
            .bind(library_id)
            .bind(Self::sqlx_hates_paths(filepath)?)
            .bind(fields.title.value.trim())
            .bind(fields.title.source.as_str())
            .bind(fields.subtitle.as_ref().map(|s| s.value.as_str()))
            .bind(fields.subtitle.as_ref().map(|s| s.source.as_str()))
            .bind(fields.sort_title.value.trim())
            .bind(fields.sort_title.source.as_str())
            .bind(fields.description.as_ref().map(|s| s.value.as_str()))
            .bind(fields.description.as_ref().map(|s| s.source.as_str()))
            .bind(fields.authors.as_ref().map(|s| s.source.as_str()))
            .bind(fields.series.as_ref().map(|s| s.source.as_str()))
            .bind(Self::now())
            .bind(name_key(&fields.title.value))
            .fetch_one(&mut *conn)
            .await
            .or_db()?;
        Self::replace_authors_tx(&mut *conn, library_id, id, fields.authors.as_ref()).await?;
        Self::replace_series_tx(conn, library_id, id, fields.series.as_ref()).await?;
        Ok(id)
    }

    pub(crate) async fn update_book_tx(
        conn: &mut SqliteConnection,
        library_id: LibraryId,
        id: BookId,
        fields: &BookFields,
    ) -> Result<()> {
        sqlx::query(include_str!("../../queries/update_book.sql"))
            .bind(id)
            .bind(fields.title.value.trim())
            .bind(fields.title.source.as_str())
            .bind(fields.subtitle.as_ref().map(|s| s.value.as_str()))
            .bind(fields.subtitle.as_ref().map(|s| s.source.as_str()))
            .bind(fields.sort_title.value.trim())
            .bind(fields.sort_title.source.as_str())
            .bind(fields.description.as_ref().map(|s| s.value.as_str()))
            .bind(fields.description.as_ref().map(|s| s.source.as_str()))
            .bind(fields.authors.as_ref().map(|s| s.source.as_str()))
            .bind(fields.series.as_ref().map(|s| s.source.as_str()))
            .bind(Self::now())
            .bind(name_key(&fields.title.value))
            .execute(&mut *conn)
            .await
            .or_db()?;
        Self::replace_authors_tx(&mut *conn, library_id, id, fields.authors.as_ref()).await?;
        Self::replace_series_tx(conn, library_id, id, fields.series.as_ref()).await
    }

    async fn replace_authors_tx(
        conn: &mut SqliteConnection,
        library_id: LibraryId,
        book_id: BookId,
        authors: Option<&Sourced<Vec<String>>>,
    ) -> Result<()> {
        sqlx::query("DELETE FROM authors WHERE book_id = ?")
            .bind(book_id)
            .execute(&mut *conn)
            .await
            .or_db()?;
        let names = authors.map(|a| a.value.as_slice()).unwrap_or_default();
        for (order, name) in names.iter().enumerate() {
            let person = Self::person_in(&mut *conn, library_id, name, None).await?;
            sqlx::query("INSERT OR IGNORE INTO authors (book_id, person_id, sort_order) VALUES (?, ?, ?)")
                .bind(book_id)
                .bind(person.id)
                .bind(order as i64)
                .execute(&mut *conn)
                .await
                .or_db()?;
        }
        Ok(())
    }

    async fn replace_series_tx(
        conn: &mut SqliteConnection,
        library_id: LibraryId,
        book_id: BookId,
        series: Option<&Sourced<Vec<SeriesEntry>>>,
    ) -> Result<()> {
        sqlx::query("DELETE FROM book_series WHERE book_id = ?")
            .bind(book_id)
            .execute(&mut *conn)
            .await
            .or_db()?;
        let Some(series) = series else {
            return Ok(());
        };
        for (order, entry) in series.value.iter().enumerate() {
            let found = Self::series_in(&mut *conn, library_id, &entry.name, series.source).await?;
            sqlx::query(
                "INSERT OR IGNORE INTO book_series (book_id, series_id, series_number, sort_order) VALUES (?, ?, ?, ?)",
            )
            .bind(book_id)
            .bind(found.id)
            .bind(entry.number)
            .bind(order as i64)
            .execute(&mut *conn)
            .await
            .or_db()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::fixtures::{book_fields, file_fields, ingest_new_book, setup};
    use std::path::PathBuf;
    use tome_media::DataSource;

    #[tokio::test]
    async fn test_detail_keeps_author_order() {
        let (_db, repo, library) = setup().await;
        let ingested = ingest_new_book(&repo, &library, "/lib/[B] T", book_fields("T", &["Zed", "Amy", "zed"]), file_fields(&[])).await;
        let detail = repo.book_detail(ingested.book_id).await.unwrap();
        let names: Vec<_> = detail.authors.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Zed", "Amy"]);
        assert_eq!(detail.primary_author().unwrap().name, "Zed");
        assert_eq!(detail.main_file().unwrap().file.id, ingested.file_id);
        assert_eq!(detail.book.primary_file_id, Some(ingested.file_id));
        assert_eq!(detail.fields().authors.unwrap().source, DataSource::Format);
    }

    #[tokio::test]
    async fn test_lookup_by_path_and_title() {
        let (_db, repo, library) = setup().await;
        let ingested = ingest_new_book(&repo, &library, "/lib/[A] Émile", book_fields("Émile", &["A"]), file_fields(&[])).await;
        let found = repo.book_by_path(library.id, &PathBuf::from("/lib/[A] Émile")).await.unwrap().unwrap();
        assert_eq!(found.id, ingested.book_id);
        assert_eq!(repo.books_by_title(library.id, "émile").await.unwrap().len(), 1);
        assert_eq!(repo.books_by_title(library.id, " ÉMILE ").await.unwrap().len(), 1);
        assert!(repo.books_by_title(library.id, "Emile").await.unwrap().is_empty());
        assert_eq!(repo.books_in_library(library.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_empty_book_refuses_books_with_files() {
        let (_db, repo, library) = setup().await;
        let ingested = ingest_new_book(&repo, &library, "/lib/[A] B", book_fields("B", &["A"]), file_fields(&[])).await;
        let err = repo.delete_empty_book(ingested.book_id).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Invariant(_)));
        sqlx::query("DELETE FROM files WHERE id = ?").bind(ingested.file_id).execute(&repo.pool).await.unwrap();
        repo.delete_empty_book(ingested.book_id).await.unwrap();
        assert!(repo.book(ingested.book_id).await.is_err());
    }
}
