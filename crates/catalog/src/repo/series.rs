use crate::error::{ErrorKind, Result, SqlxResultExt};
use crate::ids::{BookId, LibraryId, SeriesId};
use crate::models::{Series, SeriesRow, name_key};
use crate::repo::Repository;
use sqlx::SqliteConnection;
use tome_media::DataSource;
use tracing::instrument;

impl Repository {
    async fn series_tx(conn: &mut SqliteConnection, id: SeriesId) -> Result<Series> {
        let row: Option<SeriesRow> = sqlx::query_as(include_str!("../../queries/get_series.sql"))
            .bind(id)
            .fetch_optional(conn)
            .await
            .or_db()?;
        row.ok_or_else(|| exn::Exn::from(ErrorKind::NotFound("series", id.0)))?.try_into()
    }

    /// Find a series by case-insensitive name, restoring a soft-deleted one
    /// or creating it as needed.
    pub(crate) async fn series_in(
        conn: &mut SqliteConnection,
        library_id: LibraryId,
        name: &str,
        source: DataSource,
    ) -> Result<Series> {
        let name = name.trim();
        let key = name_key(name);
        if key.is_empty() {
            exn::bail!(ErrorKind::InvalidData("series name"));
        }
        let existing: Option<SeriesRow> = sqlx::query_as(include_str!("../../queries/get_series_by_key.sql"))
            .bind(library_id)
            .bind(&key)
            .fetch_optional(&mut *conn)
            .await
            .or_db()?;
        match existing {
            Some(row) if row.deleted_at.is_none() => row.try_into(),
            Some(row) => {
                tracing::debug!(series = %row.id, "restoring soft-deleted series");
                sqlx::query("UPDATE series SET deleted_at = NULL, updated_at = ? WHERE id = ?")
                    .bind(Self::now())
                    .bind(row.id)
                    .execute(&mut *conn)
                    .await
                    .or_db()?;
                Self::series_tx(conn, row.id).await
            },
            None => {
                let row: SeriesRow = sqlx::query_as(include_str!("../../queries/insert_series.sql"))
                    .bind(library_id)
                    .bind(name)
                    .bind(&key)
                    .bind(source.as_str())
                    .bind(Self::now())
                    .fetch_one(conn)
                    .await
                    .or_db()?;
                row.try_into()
            },
        }
    }

    pub async fn series(&self, id: SeriesId) -> Result<Series> {
        let mut conn = self.pool.acquire().await.or_db()?;
        Self::series_tx(&mut conn, id).await
    }

    #[instrument(skip(self))]
    pub async fn find_or_create_series(&self, library_id: LibraryId, name: &str, source: DataSource) -> Result<Series> {
        self.retrying(|| async move {
            let mut tx = self.pool.begin().await.or_db()?;
            let series = Self::series_in(&mut tx, library_id, name, source).await?;
            tx.commit().await.or_db()?;
            Ok(series)
        })
        .await
    }

    /// Live series of a library, by name.
    pub async fn list_series(&self, library_id: LibraryId) -> Result<Vec<Series>> {
        let rows: Vec<SeriesRow> = sqlx::query_as(include_str!("../../queries/list_series.sql"))
            .bind(library_id)
            .fetch_all(&self.pool)
            .await
            .or_db()?;
        rows.into_iter().map(Series::try_from).collect()
    }

    pub async fn books_in_series(&self, id: SeriesId) -> Result<Vec<BookId>> {
        sqlx::query_scalar("SELECT book_id FROM book_series WHERE series_id = ? ORDER BY series_number, book_id")
            .bind(id)
            .fetch_all(&self.pool)
            .await
            .or_db()
    }

    /// Fold `source` into `target`: every membership moves over (keeping its
    /// series number), then `source` is deleted.
    #[instrument(skip(self))]
    pub async fn merge_series(&self, target: SeriesId, source: SeriesId) -> Result<Series> {
        if target == source {
            exn::bail!(ErrorKind::Invariant(format!("cannot merge series {target} into itself")));
        }
        self.retrying(|| async move {
            let mut tx = self.pool.begin().await.or_db()?;
            let target = Self::series_tx(&mut tx, target).await?;
            let source = Self::series_tx(&mut tx, source).await?;
            if target.library_id != source.library_id {
                exn::bail!(ErrorKind::Invariant(format!(
                    "series {} and {} belong to different libraries",
                    target.id, source.id
                )));
            }
            sqlx::query("UPDATE OR IGNORE book_series SET series_id = ?1 WHERE series_id = ?2")
                .bind(target.id)
                .bind(source.id)
                .execute(&mut *tx)
                .await
                .or_db()?;
            sqlx::query("DELETE FROM book_series WHERE series_id = ?")
                .bind(source.id)
                .execute(&mut *tx)
                .await
                .or_db()?;
            // The merged membership is an edit by hand; a rescan must not split it again.
            sqlx::query(
                "UPDATE books SET series_source = ?, updated_at = ? WHERE id IN (SELECT book_id FROM book_series WHERE series_id = ?)",
            )
            .bind(DataSource::Manual.as_str())
            .bind(Self::now())
            .bind(target.id)
            .execute(&mut *tx)
            .await
            .or_db()?;
            sqlx::query("DELETE FROM series WHERE id = ?")
                .bind(source.id)
                .execute(&mut *tx)
                .await
                .or_db()?;
            // A merge target that was soft-deleted gains members again.
            sqlx::query("UPDATE series SET deleted_at = NULL, updated_at = ? WHERE id = ?")
                .bind(Self::now())
                .bind(target.id)
                .execute(&mut *tx)
                .await
                .or_db()?;
            let merged = Self::series_tx(&mut tx, target.id).await?;
            tx.commit().await.or_db()?;
            Ok(merged)
        })
        .await
    }

    /// Soft-delete series without any member books.
    pub async fn soft_delete_orphan_series(&self, library_id: LibraryId) -> Result<u64> {
        self.retrying(|| async move {
            let result = sqlx::query(include_str!("../../queries/soft_delete_orphan_series.sql"))
                .bind(library_id)
                .bind(Self::now())
                .execute(&self.pool)
                .await
                .or_db()?;
            Ok(result.rows_affected())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::fixtures::{book_fields, file_fields, ingest_new_book, setup};
    use tome_media::Sourced;
    use tome_media::models::SeriesEntry;

    #[tokio::test]
    async fn test_soft_deleted_series_is_restored() {
        let (_db, repo, library) = setup().await;
        let saga = repo.find_or_create_series(library.id, "The Saga", DataSource::Format).await.unwrap();
        assert_eq!(repo.soft_delete_orphan_series(library.id).await.unwrap(), 1);
        assert!(repo.list_series(library.id).await.unwrap().is_empty());

        let again = repo.find_or_create_series(library.id, "the saga", DataSource::Sidecar).await.unwrap();
        assert_eq!(again.id, saga.id);
        assert!(again.deleted_at.is_none());
        assert_eq!(again.name.value, "The Saga");
    }

    #[tokio::test]
    async fn test_merge_keeps_numbers_and_drops_duplicates() {
        let (_db, repo, library) = setup().await;
        let mut one = book_fields("One", &["A"]);
        one.series = Some(Sourced::new(
            vec![SeriesEntry::new("Saga", Some(1.0)), SeriesEntry::new("The Saga", Some(1.0))],
            DataSource::Format,
        ));
        let mut two = book_fields("Two", &["A"]);
        two.series = Some(Sourced::new(vec![SeriesEntry::new("The Saga", Some(2.0))], DataSource::Format));
        let one = ingest_new_book(&repo, &library, "/lib/[A] One", one, file_fields(&[])).await;
        let two = ingest_new_book(&repo, &library, "/lib/[A] Two", two, file_fields(&[])).await;

        let saga = repo.find_or_create_series(library.id, "Saga", DataSource::Format).await.unwrap();
        let the_saga = repo.find_or_create_series(library.id, "The Saga", DataSource::Format).await.unwrap();
        repo.merge_series(saga.id, the_saga.id).await.unwrap();

        assert!(repo.series(the_saga.id).await.is_err());
        assert_eq!(repo.books_in_series(saga.id).await.unwrap(), vec![one.book_id, two.book_id]);
        let detail = repo.book_detail(two.book_id).await.unwrap();
        assert_eq!(detail.series[0].number, Some(2.0));
        assert_eq!(repo.book_detail(one.book_id).await.unwrap().series.len(), 1);
        assert_eq!(detail.book.series_source, Some(DataSource::Manual));
    }

    #[tokio::test]
    async fn test_merge_into_self_is_rejected() {
        let (_db, repo, library) = setup().await;
        let saga = repo.find_or_create_series(library.id, "Saga", DataSource::Format).await.unwrap();
        let err = repo.merge_series(saga.id, saga.id).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Invariant(_)));
    }
}
