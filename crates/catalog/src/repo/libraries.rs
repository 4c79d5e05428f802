use crate::error::{ErrorKind, Result, SqlxResultExt};
use crate::ids::LibraryId;
use crate::models::{Library, LibraryRow, NewLibrary};
use crate::repo::Repository;
use sqlx::SqliteConnection;
use std::path::{Path, PathBuf};
use tracing::instrument;

impl Repository {
    /// Create a library with its root paths.
    #[instrument(skip(self, new), fields(name = %new.name))]
    pub async fn create_library(&self, new: &NewLibrary) -> Result<Library> {
        if new.paths.is_empty() {
            exn::bail!(ErrorKind::Invariant("a library needs at least one root path".to_string()));
        }
        self.retrying(|| self.create_library_once(new)).await
    }

    async fn create_library_once(&self, new: &NewLibrary) -> Result<Library> {
        let mut tx = self.pool.begin().await.or_db()?;
        let row: LibraryRow = sqlx::query_as(include_str!("../../queries/insert_library.sql"))
            .bind(&new.name)
            .bind(new.organize_file_structure)
            .bind(new.cover_aspect_ratio.as_str())
            .bind(Self::now())
            .fetch_one(&mut *tx)
            .await
            .or_db()?;
        for path in &new.paths {
            sqlx::query(include_str!("../../queries/insert_library_path.sql"))
                .bind(row.id)
                .bind(Self::sqlx_hates_paths(path)?)
                .execute(&mut *tx)
                .await
                .or_db()?;
        }
        let paths = Self::library_paths(&mut tx, row.id).await?;
        tx.commit().await.or_db()?;
        row.into_library(paths)
    }

    async fn library_paths(conn: &mut SqliteConnection, id: LibraryId) -> Result<Vec<PathBuf>> {
        let paths: Vec<String> = sqlx::query_scalar(include_str!("../../queries/list_library_paths.sql"))
            .bind(id)
            .fetch_all(conn)
            .await
            .or_db()?;
        Ok(paths.into_iter().map(PathBuf::from).collect())
    }

    /// Get a library by id, including soft-deleted ones.
    pub async fn library(&self, id: LibraryId) -> Result<Library> {
        let mut conn = self.pool.acquire().await.or_db()?;
        let row: Option<LibraryRow> = sqlx::query_as(include_str!("../../queries/get_library.sql"))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await
            .or_db()?;
        let row = row.ok_or_else(|| exn::Exn::from(ErrorKind::NotFound("library", id.0)))?;
        let paths = Self::library_paths(&mut conn, id).await?;
        row.into_library(paths)
    }

    /// Every library that has not been soft-deleted.
    pub async fn list_libraries(&self) -> Result<Vec<Library>> {
        let mut conn = self.pool.acquire().await.or_db()?;
        let rows: Vec<LibraryRow> = sqlx::query_as(include_str!("../../queries/list_libraries.sql"))
            .fetch_all(&mut *conn)
            .await
            .or_db()?;
        let mut libraries = Vec::with_capacity(rows.len());
        for row in rows {
            let paths = Self::library_paths(&mut conn, row.id).await?;
            libraries.push(row.into_library(paths)?);
        }
        Ok(libraries)
    }

    pub async fn set_organize_file_structure(&self, id: LibraryId, enabled: bool) -> Result<()> {
        self.retrying(|| async move {
            let result = sqlx::query("UPDATE libraries SET organize_file_structure = ?, updated_at = ? WHERE id = ?")
                .bind(enabled)
                .bind(Self::now())
                .bind(id)
                .execute(&self.pool)
                .await
                .or_db()?;
            match result.rows_affected() {
                0 => exn::bail!(ErrorKind::NotFound("library", id.0)),
                _ => Ok(()),
            }
        })
        .await
    }

    pub async fn add_library_path(&self, id: LibraryId, path: &Path) -> Result<()> {
        self.library(id).await?;
        let path = Self::sqlx_hates_paths(path)?;
        self.retrying(|| async move {
            sqlx::query(include_str!("../../queries/insert_library_path.sql"))
                .bind(id)
                .bind(path)
                .execute(&self.pool)
                .await
                .or_db()?;
            Ok(())
        })
        .await
    }

    /// Hide a library from scans and listings. Its catalog rows are kept.
    pub async fn soft_delete_library(&self, id: LibraryId) -> Result<()> {
        self.retrying(|| async move {
            let result = sqlx::query("UPDATE libraries SET deleted_at = ?1, updated_at = ?1 WHERE id = ?2 AND deleted_at IS NULL")
                .bind(Self::now())
                .bind(id)
                .execute(&self.pool)
                .await
                .or_db()?;
            match result.rows_affected() {
                0 => exn::bail!(ErrorKind::NotFound("library", id.0)),
                _ => Ok(()),
            }
        })
        .await
    }
}
