use crate::application::repos::RepoError;

pub fn map_sqlx_error(err: sqlx::Error) -> RepoError {
    match err {
        sqlx::Error::RowNotFound => RepoError::NotFound,
        sqlx::Error::Database(db) if db.message().contains("permission denied") => {
            RepoError::PermissionDenied
        }
        other => RepoError::from_persistence(other),
    }
}
