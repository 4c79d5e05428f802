use crate::error::{ErrorKind, Result, SqlxResultExt};
use crate::ids::{BookId, FileId, LibraryId, PersonId};
use crate::models::{Person, PersonRow, name_key, sort_name_for};
use crate::repo::Repository;
use sqlx::SqliteConnection;
use tome_media::{DataSource, Sourced};
use tracing::instrument;

/// Outcome of renaming a person.
#[derive(Debug, Clone, PartialEq)]
pub enum Renamed {
    /// The person now carries the new name.
    Renamed(Person),
    /// Another person already had that name; everything pointing at the
    /// renamed person now points at this one instead.
    Merged(Person),
}
impl Renamed {
    pub fn person(&self) -> &Person {
        match self {
            Self::Renamed(p) | Self::Merged(p) => p,
        }
    }
}

impl Repository {
    pub(crate) async fn person_tx(conn: &mut SqliteConnection, id: PersonId) -> Result<Person> {
        let row: Option<PersonRow> = sqlx::query_as(include_str!("../../queries/get_person.sql"))
            .bind(id)
            .fetch_optional(conn)
            .await
            .or_db()?;
        row.ok_or_else(|| exn::Exn::from(ErrorKind::NotFound("person", id.0)))?.try_into()
    }

    async fn person_by_key_tx(conn: &mut SqliteConnection, library_id: LibraryId, key: &str) -> Result<Option<Person>> {
        let row: Option<PersonRow> = sqlx::query_as(include_str!("../../queries/get_person_by_key.sql"))
            .bind(library_id)
            .bind(key)
            .fetch_optional(conn)
            .await
            .or_db()?;
        row.map(Person::try_from).transpose()
    }

    /// Find a person by case-insensitive name, creating them if needed.
    ///
    /// A created person gets a generated sort name unless one is supplied.
    /// A supplied manual sort name also replaces the sort name of a person
    /// that already exists.
    pub(crate) async fn person_in(
        conn: &mut SqliteConnection,
        library_id: LibraryId,
        name: &str,
        sort_name: Option<&Sourced<String>>,
    ) -> Result<Person> {
        let name = name.trim();
        let key = name_key(name);
        if key.is_empty() {
            exn::bail!(ErrorKind::InvalidData("person name"));
        }
        if let Some(existing) = Self::person_by_key_tx(&mut *conn, library_id, &key).await? {
            return match sort_name {
                Some(sort) if sort.source == DataSource::Manual && existing.sort_name != *sort => {
                    Self::set_sort_name_tx(conn, existing.id, sort).await?;
                    Self::person_tx(conn, existing.id).await
                },
                _ => Ok(existing),
            };
        }
        let sort_name = match sort_name {
            Some(sort) => sort.clone(),
            None => Sourced::new(sort_name_for(name), DataSource::Filepath),
        };
        let row: PersonRow = sqlx::query_as(include_str!("../../queries/insert_person.sql"))
            .bind(library_id)
            .bind(name)
            .bind(&key)
            .bind(&sort_name.value)
            .bind(sort_name.source.as_str())
            .bind(Self::now())
            .fetch_one(conn)
            .await
            .or_db()?;
        row.try_into()
    }

    async fn set_sort_name_tx(conn: &mut SqliteConnection, id: PersonId, sort: &Sourced<String>) -> Result<()> {
        sqlx::query("UPDATE persons SET sort_name = ?, sort_name_source = ?, updated_at = ? WHERE id = ?")
            .bind(sort.value.trim())
            .bind(sort.source.as_str())
            .bind(Self::now())
            .bind(id)
            .execute(conn)
            .await
            .or_db()?;
        Ok(())
    }

    pub async fn person(&self, id: PersonId) -> Result<Person> {
        let mut conn = self.pool.acquire().await.or_db()?;
        Self::person_tx(&mut conn, id).await
    }

    pub async fn person_by_name(&self, library_id: LibraryId, name: &str) -> Result<Option<Person>> {
        let mut conn = self.pool.acquire().await.or_db()?;
        Self::person_by_key_tx(&mut conn, library_id, &name_key(name)).await
    }

    #[instrument(skip(self))]
    pub async fn find_or_create_person(
        &self,
        library_id: LibraryId,
        name: &str,
        sort_name: Option<&Sourced<String>>,
    ) -> Result<Person> {
        self.retrying(|| async move {
            let mut tx = self.pool.begin().await.or_db()?;
            let person = Self::person_in(&mut tx, library_id, name, sort_name).await?;
            tx.commit().await.or_db()?;
            Ok(person)
        })
        .await
    }

    pub async fn list_people(&self, library_id: LibraryId) -> Result<Vec<Person>> {
        let rows: Vec<PersonRow> = sqlx::query_as(include_str!("../../queries/list_people.sql"))
            .bind(library_id)
            .fetch_all(&self.pool)
            .await
            .or_db()?;
        rows.into_iter().map(Person::try_from).collect()
    }

    /// Books the person is an author of.
    pub async fn books_by_person(&self, id: PersonId) -> Result<Vec<BookId>> {
        sqlx::query_scalar("SELECT book_id FROM authors WHERE person_id = ? ORDER BY book_id")
            .bind(id)
            .fetch_all(&self.pool)
            .await
            .or_db()
    }

    /// Files the person narrates.
    pub async fn files_narrated_by(&self, id: PersonId) -> Result<Vec<FileId>> {
        sqlx::query_scalar("SELECT file_id FROM narrators WHERE person_id = ? ORDER BY file_id")
            .bind(id)
            .fetch_all(&self.pool)
            .await
            .or_db()
    }

    /// Set a person's sort name by hand. It will not be regenerated again.
    pub async fn set_person_sort_name(&self, id: PersonId, sort_name: &str) -> Result<Person> {
        let sort = Sourced::new(sort_name.trim().to_string(), DataSource::Manual);
        if sort.value.is_empty() {
            exn::bail!(ErrorKind::InvalidData("sort name"));
        }
        let sort = &sort;
        self.retrying(|| async move {
            let mut tx = self.pool.begin().await.or_db()?;
            Self::person_tx(&mut tx, id).await?;
            Self::set_sort_name_tx(&mut tx, id, sort).await?;
            let person = Self::person_tx(&mut tx, id).await?;
            tx.commit().await.or_db()?;
            Ok(person)
        })
        .await
    }

    /// Rename a person, merging them into whoever already has the new name.
    /// On a merge the surviving person keeps their own spelling. Either way
    /// the person's author and narrator links become `Manual`.
    #[instrument(skip(self))]
    pub async fn rename_person(&self, id: PersonId, name: &str) -> Result<Renamed> {
        let name = name.trim();
        let key = name_key(name);
        if key.is_empty() {
            exn::bail!(ErrorKind::InvalidData("person name"));
        }
        let key = key.as_str();
        self.retrying(|| async move {
            let mut tx = self.pool.begin().await.or_db()?;
            let person = Self::person_tx(&mut tx, id).await?;
            let outcome = match Self::person_by_key_tx(&mut tx, person.library_id, key).await? {
                Some(other) if other.id != person.id => {
                    Self::merge_people_tx(&mut tx, &other, &person).await?;
                    Self::pin_links_tx(&mut tx, other.id).await?;
                    Renamed::Merged(Self::person_tx(&mut tx, other.id).await?)
                },
                _ => {
                    Self::set_name_tx(&mut tx, &person, name, key).await?;
                    Self::pin_links_tx(&mut tx, person.id).await?;
                    Renamed::Renamed(Self::person_tx(&mut tx, person.id).await?)
                },
            };
            tx.commit().await.or_db()?;
            Ok(outcome)
        })
        .await
    }

    async fn set_name_tx(conn: &mut SqliteConnection, person: &Person, name: &str, key: &str) -> Result<()> {
        let sort_name = match person.sort_name.source {
            DataSource::Manual => person.sort_name.value.clone(),
            _ => sort_name_for(name),
        };
        sqlx::query("UPDATE persons SET name = ?, name_key = ?, sort_name = ?, updated_at = ? WHERE id = ?")
            .bind(name)
            .bind(key)
            .bind(sort_name)
            .bind(Self::now())
            .bind(person.id)
            .execute(conn)
            .await
            .or_db()?;
        Ok(())
    }

    /// Mark the author list of every book, and the narrator list of every
    /// file, that names this person as set by hand, so a rescan cannot bring
    /// back the name it had before.
    async fn pin_links_tx(conn: &mut SqliteConnection, id: PersonId) -> Result<()> {
        let manual = DataSource::Manual.as_str();
        let now = Self::now();
        sqlx::query(
            "UPDATE books SET authors_source = ?, updated_at = ? WHERE id IN (SELECT book_id FROM authors WHERE person_id = ?)",
        )
        .bind(manual)
        .bind(now)
        .bind(id)
        .execute(&mut *conn)
        .await
        .or_db()?;
        sqlx::query(
            "UPDATE files SET narrators_source = ?, updated_at = ? WHERE id IN (SELECT file_id FROM narrators WHERE person_id = ?)",
        )
        .bind(manual)
        .bind(now)
        .bind(id)
        .execute(conn)
        .await
        .or_db()?;
        Ok(())
    }

    /// Fold `source` into `target`: every authorship and narration moves
    /// over, then `source` is deleted.
    #[instrument(skip(self))]
    pub async fn merge_people(&self, target: PersonId, source: PersonId) -> Result<Person> {
        if target == source {
            exn::bail!(ErrorKind::Invariant(format!("cannot merge person {target} into itself")));
        }
        self.retrying(|| async move {
            let mut tx = self.pool.begin().await.or_db()?;
            let target = Self::person_tx(&mut tx, target).await?;
            let source = Self::person_tx(&mut tx, source).await?;
            Self::merge_people_tx(&mut tx, &target, &source).await?;
            Self::pin_links_tx(&mut tx, target.id).await?;
            tx.commit().await.or_db()?;
            Ok(target)
        })
        .await
    }

    async fn merge_people_tx(conn: &mut SqliteConnection, target: &Person, source: &Person) -> Result<()> {
        if target.library_id != source.library_id {
            exn::bail!(ErrorKind::Invariant(format!(
                "people {} and {} belong to different libraries",
                target.id, source.id
            )));
        }
        // Rows that would duplicate an existing link of the target stay
        // behind and are dropped with the source.
        for table in ["authors", "narrators"] {
            sqlx::query(&format!("UPDATE OR IGNORE {table} SET person_id = ?1 WHERE person_id = ?2"))
                .bind(target.id)
                .bind(source.id)
                .execute(&mut *conn)
                .await
                .or_db()?;
            sqlx::query(&format!("DELETE FROM {table} WHERE person_id = ?"))
                .bind(source.id)
                .execute(&mut *conn)
                .await
                .or_db()?;
        }
        sqlx::query("DELETE FROM persons WHERE id = ?")
            .bind(source.id)
            .execute(conn)
            .await
            .or_db()?;
        Ok(())
    }

    /// Delete people who are neither an author nor a narrator of anything.
    pub async fn delete_orphan_people(&self, library_id: LibraryId) -> Result<u64> {
        self.retrying(|| async move {
            let result = sqlx::query(include_str!("../../queries/delete_orphan_people.sql"))
                .bind(library_id)
                .execute(&self.pool)
                .await
                .or_db()?;
            Ok(result.rows_affected())
        })
        .await
    }
}
