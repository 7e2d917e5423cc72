use drill_core::model::{QuestionItem, QuestionSet, QuestionSetId};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{conn, id_i64, question_set_id_from_i64, ser, u32_from_i64};
use crate::repository::{QuestionSetRepository, QuestionSetSummary, StorageError};

#[async_trait::async_trait]
impl QuestionSetRepository for SqliteRepository {
    async fn upsert_question_set(&self, set: &QuestionSet) -> Result<(), StorageError> {
        let set_id = id_i64("question_set_id", set.id().value())?;
        let mut tx = self.pool.begin().await.map_err(conn)?;

        sqlx::query(
            r"
                INSERT INTO question_sets (id, name)
                VALUES (?1, ?2)
                ON CONFLICT(id) DO UPDATE SET name = excluded.name
            ",
        )
        .bind(set_id)
        .bind(set.name())
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        // items are replaced wholesale; a shorter sheet must not keep stale tail rows
        sqlx::query("DELETE FROM question_set_items WHERE set_id = ?1")
            .bind(set_id)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

        for (position, item) in set.items().iter().enumerate() {
            let position = i64::try_from(position)
                .map_err(|_| StorageError::Serialization("position overflow".into()))?;
            sqlx::query(
                r"
                    INSERT INTO question_set_items (set_id, position, expression, correct_answer)
                    VALUES (?1, ?2, ?3, ?4)
                ",
            )
            .bind(set_id)
            .bind(position)
            .bind(item.expression.as_str())
            .bind(item.correct_answer)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        }

        tx.commit().await.map_err(conn)?;
        Ok(())
    }

    async fn get_question_set(&self, id: QuestionSetId) -> Result<QuestionSet, StorageError> {
        let set_id = id_i64("question_set_id", id.value())?;
        let row = sqlx::query("SELECT id, name FROM question_sets WHERE id = ?1")
            .bind(set_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?
            .ok_or(StorageError::NotFound)?;
        let name: String = row.try_get("name").map_err(ser)?;

        let rows = sqlx::query(
            r"
                SELECT expression, correct_answer
                FROM question_set_items
                WHERE set_id = ?1
                ORDER BY position ASC
            ",
        )
        .bind(set_id)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            items.push(QuestionItem::new(
                row.try_get::<String, _>("expression").map_err(ser)?,
                row.try_get::<i64, _>("correct_answer").map_err(ser)?,
            ));
        }

        QuestionSet::new(id, name, items).map_err(ser)
    }

    async fn list_question_sets(&self, limit: u32) -> Result<Vec<QuestionSetSummary>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT s.id, s.name, COUNT(i.position) AS question_count
                FROM question_sets s
                LEFT JOIN question_set_items i ON i.set_id = s.id
                GROUP BY s.id, s.name
                ORDER BY s.id ASC
                LIMIT ?1
            ",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(QuestionSetSummary {
                id: question_set_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
                name: row.try_get("name").map_err(ser)?,
                question_count: u32_from_i64(
                    "question_count",
                    row.try_get::<i64, _>("question_count").map_err(ser)?,
                )?,
            });
        }
        Ok(out)
    }
}
