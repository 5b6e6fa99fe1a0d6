use async_trait::async_trait;
use time::OffsetDateTime;

use crate::{
    application::repos::{PendingTemplates, RepoError},
    domain::{entities::PendingTemplate, types::LinkMode},
};

use super::{PostgresSideTables, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct PendingRow {
    rfs_name: String,
    parameters: String,
}

impl From<PendingRow> for PendingTemplate {
    fn from(row: PendingRow) -> Self {
        Self {
            rfs_name: row.rfs_name,
            parameters: Some(row.parameters).filter(|value| !value.is_empty()),
        }
    }
}

#[async_trait]
impl PendingTemplates for PostgresSideTables {
    async fn write(
        &self,
        rfs_name: &str,
        mode: LinkMode,
        parameters: Option<&str>,
        timestamp: OffsetDateTime,
    ) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO export_pending_templates (rfs_name, mode, parameters, written_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (rfs_name, mode, parameters)
            DO UPDATE SET written_at = EXCLUDED.written_at
            "#,
        )
        .bind(rfs_name)
        .bind(mode.as_str())
        .bind(parameters.unwrap_or_default())
        .bind(timestamp)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn query(
        &self,
        mode: LinkMode,
        since: OffsetDateTime,
    ) -> Result<Vec<PendingTemplate>, RepoError> {
        let rows = sqlx::query_as::<_, PendingRow>(
            r#"
            SELECT rfs_name, parameters
            FROM export_pending_templates
            WHERE mode = $1 AND written_at >= $2
            ORDER BY written_at, rfs_name, parameters
            "#,
        )
        .bind(mode.as_str())
        .bind(since)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(PendingTemplate::from).collect())
    }

    async fn delete_all(&self, mode: LinkMode) -> Result<(), RepoError> {
        sqlx::query("DELETE FROM export_pending_templates WHERE mode = $1")
            .bind(mode.as_str())
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }
}
