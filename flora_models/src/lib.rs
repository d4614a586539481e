#[cfg(any(test, feature = "testing"))]
pub mod fixtures;
pub mod plant;
pub mod prelude;

// Export all Model at crate root
pub use plant::Plant;

use std::sync::LazyLock;

use database::DatabaseError;

use diesel::result::DatabaseErrorInformation;
use regex::Regex;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("check constraint violation of \"{constraint}\"")]
    CheckViolation { constraint: String },
    #[error("column \"{column}\" cannot be null")]
    NotNullViolation { column: String },
    #[error(transparent)]
    DatabaseError(#[from] DatabaseError),
}

fn try_parse_check_violation(e: &(dyn DatabaseErrorInformation + Send + Sync)) -> Option<Error> {
    static RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r#"^CHECK constraint failed: (.+)$"#).unwrap());
    RE.captures(e.message()).map(|captures| Error::CheckViolation {
        constraint: captures[1].to_owned(),
    })
}

fn try_parse_not_null_violation(
    e: &(dyn DatabaseErrorInformation + Send + Sync),
) -> Option<Error> {
    static RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r#"^NOT NULL constraint failed: (?:\w+\.)?(\w+)$"#).unwrap()
    });
    RE.captures(e.message()).map(|captures| Error::NotNullViolation {
        column: captures[1].to_owned(),
    })
}

impl From<diesel::result::Error> for Error {
    fn from(e: diesel::result::Error) -> Self {
        // SQLite does not always report an accurate error kind, the message is authoritative
        match &e {
            diesel::result::Error::DatabaseError(_, inner) => {
                let inner = inner.as_ref();
                try_parse_check_violation(inner)
                    .or_else(|| try_parse_not_null_violation(inner))
                    .unwrap_or_else(|| Self::DatabaseError(e.into()))
            }
            _ => Self::DatabaseError(e.into()),
        }
    }
}
