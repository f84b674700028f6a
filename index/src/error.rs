use thiserror::Error;

#[derive(Error, Debug)]
pub enum VaultError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse document {path}: {source}")]
    Document {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// A foreign-key or uniqueness violation. Writes are serialized per
    /// document, so reaching this indicates a bug rather than a race.
    #[error("Index integrity violation: {0}")]
    Integrity(String),

    #[error("Not a document path: {0}")]
    NotADocument(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error(transparent)]
    Syntax(#[from] vault_query::SyntaxError),

    #[error("Search query {query:?} could not be run: {hint}")]
    InvalidSearch { query: String, hint: String },

    #[error("Watcher error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl From<sqlx::Error> for VaultError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err
            && (db_err.is_foreign_key_violation() || db_err.is_unique_violation())
        {
            return VaultError::Integrity(db_err.message().to_string());
        }
        VaultError::Database(err)
    }
}

impl From<toml::de::Error> for VaultError {
    fn from(err: toml::de::Error) -> Self {
        VaultError::Config(err.to_string())
    }
}

impl From<walkdir::Error> for VaultError {
    fn from(err: walkdir::Error) -> Self {
        match err.into_io_error() {
            Some(io) => VaultError::Io(io),
            None => VaultError::InvalidPath("filesystem loop while walking the vault".to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, VaultError>;
