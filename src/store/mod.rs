pub mod postgres;

/// True when a sqlx error is a Postgres unique-constraint violation.
/// Used to map duplicate inserts to HTTP 409 instead of 500.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.code().as_deref() == Some("23505"),
        _ => false,
    }
}

/// True when a sqlx error is a Postgres foreign-key violation — e.g. a
/// website created for a wallet address that never registered.
pub fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.code().as_deref() == Some("23503"),
        _ => false,
    }
}
