use crate::error::{ErrorKind, Result, SqlxResultExt};
use crate::ids::{BookId, FileId, LibraryId};
use crate::models::{File, FileColumns, FileDetail, FileFields, FileRow, Person, PersonRow};
use crate::repo::Repository;
use sqlx::SqliteConnection;
use std::path::Path;
use tome_media::{FileRole, FileType, Sourced};

impl Repository {
    pub(crate) async fn file_tx(conn: &mut SqliteConnection, id: FileId) -> Result<File> {
        let row: Option<FileRow> = sqlx::query_as(include_str!("../../queries/get_file.sql"))
            .bind(id)
            .fetch_optional(conn)
            .await
            .or_db()?;
        row.ok_or_else(|| exn::Exn::from(ErrorKind::NotFound("file", id.0)))?.try_into()
    }

    pub async fn file(&self, id: FileId) -> Result<File> {
        let mut conn = self.pool.acquire().await.or_db()?;
        Self::file_tx(&mut conn, id).await
    }

    pub async fn file_detail(&self, id: FileId) -> Result<FileDetail> {
        let mut conn = self.pool.acquire().await.or_db()?;
        let file = Self::file_tx(&mut conn, id).await?;
        let narrators = Self::narrators_tx(&mut conn, id).await?;
        Ok(FileDetail { file, narrators })
    }

    pub async fn file_by_path(&self, library_id: LibraryId, path: &Path) -> Result<Option<File>> {
        let row: Option<FileRow> = sqlx::query_as(include_str!("../../queries/get_file_by_path.sql"))
            .bind(library_id)
            .bind(Self::sqlx_hates_paths(path)?)
            .fetch_optional(&self.pool)
            .await
            .or_db()?;
        row.map(File::try_from).transpose()
    }

    /// Every file of a library, by path.
    pub async fn files_in_library(&self, library_id: LibraryId) -> Result<Vec<File>> {
        let rows: Vec<FileRow> = sqlx::query_as(include_str!("../../queries/list_files_in_library.sql"))
            .bind(library_id)
            .fetch_all(&self.pool)
            .await
            .or_db()?;
        rows.into_iter().map(File::try_from).collect()
    }

    pub(crate) async fn files_for_book_tx(conn: &mut SqliteConnection, book_id: BookId) -> Result<Vec<File>> {
        let rows: Vec<FileRow> = sqlx::query_as(include_str!("../../queries/list_files_for_book.sql"))
            .bind(book_id)
            .fetch_all(conn)
            .await
            .or_db()?;
        rows.into_iter().map(File::try_from).collect()
    }

    pub(crate) async fn narrators_tx(conn: &mut SqliteConnection, file_id: FileId) -> Result<Vec<Person>> {
        let rows: Vec<PersonRow> = sqlx::query_as(include_str!("../../queries/list_file_narrators.sql"))
            .bind(file_id)
            .fetch_all(conn)
            .await
            .or_db()?;
        rows.into_iter().map(Person::try_from).collect()
    }

    pub(crate) async fn insert_file_tx(
        conn: &mut SqliteConnection,
        library_id: LibraryId,
        book_id: BookId,
        filepath: &Path,
        file_type: FileType,
        role: FileRole,
        fields: &FileFields,
    ) -> Result<FileId> {
        let columns = FileColumns::try_from(fields)?;
        let id: FileId = sqlx::query_scalar(include_str!("../../queries/insert_file.sql"))
            .bind(library_id)
            .bind(book_id)
            .bind(Self::sqlx_hates_paths(filepath)?)
            .bind(file_type.as_str())
            .bind(role.as_str())
            .bind(columns.size)
            .bind(columns.cover_filename)
            .bind(columns.cover_mime)
            .bind(columns.cover_source)
            .bind(fields.intrinsic.duration)
            .bind(columns.bitrate)
            .bind(fields.intrinsic.codec.as_deref())
            .bind(columns.narrators_source)
            .bind(columns.identifiers)
            .bind(columns.identifiers_source)
            .bind(columns.chapters)
            .bind(columns.chapters_source)
            .bind(Self::now())
            .fetch_one(&mut *conn)
            .await
            .or_db()?;
        Self::replace_narrators_tx(conn, library_id, id, fields.narrators.as_ref()).await?;
        Ok(id)
    }

    pub(crate) async fn update_file_tx(
        conn: &mut SqliteConnection,
        library_id: LibraryId,
        id: FileId,
        fields: &FileFields,
    ) -> Result<()> {
        let columns = FileColumns::try_from(fields)?;
        sqlx::query(include_str!("../../queries/update_file.sql"))
            .bind(id)
            .bind(columns.size)
            .bind(columns.cover_filename)
            .bind(columns.cover_mime)
            .bind(columns.cover_source)
            .bind(fields.intrinsic.duration)
            .bind(columns.bitrate)
            .bind(fields.intrinsic.codec.as_deref())
            .bind(columns.narrators_source)
            .bind(columns.identifiers)
            .bind(columns.identifiers_source)
            .bind(columns.chapters)
            .bind(columns.chapters_source)
            .bind(Self::now())
            .execute(&mut *conn)
            .await
            .or_db()?;
        Self::replace_narrators_tx(conn, library_id, id, fields.narrators.as_ref()).await
    }

    async fn replace_narrators_tx(
        conn: &mut SqliteConnection,
        library_id: LibraryId,
        file_id: FileId,
        narrators: Option<&Sourced<Vec<String>>>,
    ) -> Result<()> {
        sqlx::query("DELETE FROM narrators WHERE file_id = ?")
            .bind(file_id)
            .execute(&mut *conn)
            .await
            .or_db()?;
        let names = narrators.map(|n| n.value.as_slice()).unwrap_or_default();
        for (order, name) in names.iter().enumerate() {
            let person = Self::person_in(&mut *conn, library_id, name, None).await?;
            sqlx::query("INSERT OR IGNORE INTO narrators (file_id, person_id, sort_order) VALUES (?, ?, ?)")
                .bind(file_id)
                .bind(person.id)
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
    use crate::models::{CoverRef, FileFields, Intrinsic};
    use crate::repo::fixtures::{book_fields, ingest_new_book, setup};
    use std::path::PathBuf;
    use tome_media::{DataSource, Sourced};

    #[tokio::test]
    async fn test_file_round_trip() {
        let (_db, repo, library) = setup().await;
        let fields = FileFields {
            narrators: Some(Sourced::new(vec!["Reader One".to_string(), "Reader Two".to_string()], DataSource::Format)),
            cover: Some(CoverRef {
                filename: "Book.m4b.cover.jpg".to_string(),
                mime: "image/jpeg".to_string(),
                source: DataSource::Format,
            }),
            intrinsic: Intrinsic {
                size: 1_024,
                duration: Some(3_600.5),
                bitrate: Some(64_000),
                codec: Some("aac".to_string()),
            },
            ..Default::default()
        };
        let ingested = ingest_new_book(&repo, &library, "/lib/[A] Book", book_fields("Book", &["A"]), fields.clone()).await;
        let detail = repo.file_detail(ingested.file_id).await.unwrap();
        assert_eq!(detail.fields(), fields);
        let names: Vec<_> = detail.narrators.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Reader One", "Reader Two"]);

        let by_path = repo.file_by_path(library.id, &PathBuf::from("/lib/[A] Book/Book.epub")).await.unwrap();
        assert_eq!(by_path.map(|f| f.id), Some(ingested.file_id));
        assert_eq!(repo.files_in_library(library.id).await.unwrap().len(), 1);
    }
}
