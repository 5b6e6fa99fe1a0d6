use async_trait::async_trait;

use crate::application::repos::{ParameterLinks, RepoError};

use super::{PostgresSideTables, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct ParameterLinkRow {
    rfs_name: String,
    parameters: String,
}

#[async_trait]
impl ParameterLinks for PostgresSideTables {
    async fn link_id(&self, rfs_name: &str, parameters: &str) -> Result<u64, RepoError> {
        // The no-op update makes RETURNING yield the existing row on conflict.
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO export_parameter_links (rfs_name, parameters)
            VALUES ($1, $2)
            ON CONFLICT (rfs_name, parameters)
            DO UPDATE SET rfs_name = EXCLUDED.rfs_name
            RETURNING id
            "#,
        )
        .bind(rfs_name)
        .bind(parameters)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        u64::try_from(id)
            .map_err(|_| RepoError::from_persistence(format!("negative link id {id}")))
    }

    async fn resolve(&self, id: u64) -> Result<Option<(String, String)>, RepoError> {
        let Ok(id) = i64::try_from(id) else {
            return Ok(None);
        };
        let row = sqlx::query_as::<_, ParameterLinkRow>(
            r#"
            SELECT rfs_name, parameters
            FROM export_parameter_links
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(|row| (row.rfs_name, row.parameters)))
    }
}
