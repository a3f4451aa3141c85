// sqlx::Error -> AppError, keeping the SQLite result code in the message

use freshness_core::error::AppError;

pub fn map_sqlx_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) => {
            if let Some(code) = db_err.code() {
                let code_str = code.as_ref();

                // SQLite error codes: https://www.sqlite.org/rescode.html
                match code_str {
                    "2067" | "1555" => AppError::Database(format!(
                        "Unique constraint violation: {} ({})",
                        db_err.message(),
                        code_str
                    )),
                    "5" | "517" => AppError::Database(format!(
                        "Database locked (SQLITE_BUSY): {}",
                        db_err.message()
                    )),
                    "13" => AppError::Database(format!("Database full: {}", db_err.message())),
                    _ => AppError::Database(format!(
                        "Database error [{}]: {}",
                        code_str,
                        db_err.message()
                    )),
                }
            } else {
                AppError::Database(format!("Database error: {}", db_err.message()))
            }
        }
        sqlx::Error::RowNotFound => AppError::Database("Row not found".to_string()),
        sqlx::Error::ColumnNotFound(col) => {
            AppError::Database(format!("Column not found: {}", col))
        }
        sqlx::Error::PoolTimedOut => {
            AppError::Database("Connection pool timed out".to_string())
        }
        _ => AppError::Database(err.to_string()),
    }
}

/// Rows carrying an unknown enum string are corrupt, not absent
pub(crate) fn corrupt_row(what: &str, value: &str) -> AppError {
    AppError::Database(format!("Unrecognized {} in row: {:?}", what, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_not_found_maps_to_database_error() {
        let err = map_sqlx_error(sqlx::Error::RowNotFound);
        assert!(matches!(err, AppError::Database(_)));
    }

    #[test]
    fn test_corrupt_row_names_the_value() {
        let err = corrupt_row("job state", "DONE");
        assert!(err.to_string().contains("DONE"));
    }
}
