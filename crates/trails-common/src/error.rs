use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("duplicate migration version {version}: `{first}` and `{second}`")]
    DuplicateVersion {
        version: u64,
        first: String,
        second: String,
    },

    #[error("gateway error: {0}")]
    Gateway(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Lookup failures are the only errors a rollback may treat as "nothing to undo".
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    pub fn is_constraint(&self) -> bool {
        matches!(self, Error::Constraint(_))
    }
}

#[cfg(test)]
mod tests {
    use super::Error;

    #[test]
    fn error_display_includes_context() {
        let e = Error::Config("bad yaml".into());
        assert_eq!(e.to_string(), "configuration error: bad yaml");

        let e = Error::NotFound("collection `documents`".into());
        assert_eq!(e.to_string(), "not found: collection `documents`");

        let e = Error::Constraint("field `slug` is required".into());
        assert_eq!(e.to_string(), "constraint violation: field `slug` is required");

        let e = Error::Other("misc".into());
        assert_eq!(e.to_string(), "misc");
    }

    #[test]
    fn duplicate_version_names_both_migrations() {
        let e = Error::DuplicateVersion {
            version: 1733842800,
            first: "initial_schema".into(),
            second: "other_schema".into(),
        };
        assert_eq!(
            e.to_string(),
            "duplicate migration version 1733842800: `initial_schema` and `other_schema`"
        );
    }

    #[test]
    fn kind_predicates() {
        assert!(Error::NotFound("x".into()).is_not_found());
        assert!(!Error::Database("x".into()).is_not_found());
        assert!(Error::Constraint("x".into()).is_constraint());
    }
}
