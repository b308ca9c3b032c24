use thiserror::Error;

#[derive(Error, Debug)]
pub enum RowkeeperError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Schema error: {0}")]
    Schema(String),
    #[error("Inheritance error: tables [{}] cannot be linked by a single ancestor chain", tables.join(", "))]
    Inheritance { tables: Vec<String> },
    #[error("Ambiguity error: {} equally short paths between {from} and {to}: {}", paths.len(), paths.join(" | "))]
    Ambiguity {
        from: String,
        to: String,
        paths: Vec<String>,
    },
    #[error("Not found: no row in {table} with primary key {primary_key}")]
    NotFound { table: String, primary_key: String },
    #[error("Duplicate row: more than one row in {table} matches {filter}")]
    DuplicateRow { table: String, filter: String },
    #[error("Cyclic reference: {}", chain.join(" -> "))]
    CyclicReference { chain: Vec<String> },
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
    #[error("Constraint violation: {0}")]
    Constraint(String),
    #[error("Persistence error: {0}")]
    Persistence(String),
}

pub type Result<T> = std::result::Result<T, RowkeeperError>;

impl RowkeeperError {
    // Each frame of a recursive save that held the offending reference prepends
    // its own hop, so the chain reads from the outermost bean inwards.
    pub(crate) fn through(self, hop: String) -> Self {
        match self {
            Self::CyclicReference { mut chain } => {
                chain.insert(0, hop);
                Self::CyclicReference { chain }
            }
            other => other,
        }
    }
}

// Helper conversions
impl From<rusqlite::Error> for RowkeeperError {
    fn from(e: rusqlite::Error) -> Self {
        match e.sqlite_error_code() {
            Some(rusqlite::ErrorCode::ConstraintViolation) => Self::Constraint(e.to_string()),
            _ => Self::Persistence(e.to_string()),
        }
    }
}

impl From<config::ConfigError> for RowkeeperError {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}
