//! Ошибки загрузчика модулей.

use std::path::PathBuf;

use thiserror::Error;

use crate::parser::ParseError;

/// Основной тип `Result` для библиотеки.
pub type ImportResult<T> = Result<T, ImportError>;

/// Категория ошибки.
///
/// Вызывающий код различает «не то место» (`Resolution`), «не то имя
/// в правильном месте» (`Attribute`) и проблемы файловой системы.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Resolution,
    Attribute,
    Filesystem,
    Execution,
    Config,
}

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("No module named '{0}'")]
    ModuleNotFound(String),

    #[error("Invalid module name: '{0}'")]
    InvalidName(String),

    #[error("'{object}' has no attribute '{attribute}'")]
    AttributeNotFound { object: String, attribute: String },

    #[error("Path does not exist: {}", .0.display())]
    PathNotFound(PathBuf),

    #[error("Directory is not a package (no initializer file): {}", .0.display())]
    MissingInitializer(PathBuf),

    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Archive error in {}: {message}", path.display())]
    Archive { path: PathBuf, message: String },

    #[error("Parse error in {origin}: {source}")]
    Parse {
        origin: String,
        #[source]
        source: ParseError,
    },

    #[error("Error while executing module '{module}': {message}")]
    Execution { module: String, message: String },

    #[error("Circular import detected: {0}")]
    CircularImport(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ImportError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ModuleNotFound(_) | Self::InvalidName(_) => ErrorKind::Resolution,
            Self::AttributeNotFound { .. } => ErrorKind::Attribute,
            Self::PathNotFound(_)
            | Self::MissingInitializer(_)
            | Self::Io { .. }
            | Self::Archive { .. } => ErrorKind::Filesystem,
            Self::Parse { .. } | Self::Execution { .. } | Self::CircularImport(_) => {
                ErrorKind::Execution
            }
            Self::Config(_) => ErrorKind::Config,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn execution(module: &str, message: impl Into<String>) -> Self {
        Self::Execution {
            module: module.to_string(),
            message: message.into(),
        }
    }
}
