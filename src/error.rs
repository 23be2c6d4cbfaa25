use std::collections::BTreeMap;
use std::fmt;
use std::io;

/// Result alias for parser operations.
pub type ParserResult<T> = Result<T, ParserError>;

/// Errors that can occur while parsing a GFF3 stream.
#[derive(Debug)]
pub enum ParserError {
    /// An I/O error occurred while reading from an input stream.
    Io(io::Error),
    /// A line was neither blank, nor a valid directive/comment, nor nine
    /// tab-separated fields.
    LineParse {
        /// The name of the source stream the offending line came from.
        source: String,
        /// The 1-based line number within that source.
        line: usize,
        /// The raw offending text.
        text: String,
        /// A short cause.
        cause: String,
    },
    /// A sync or end-of-input flush left one or more orphan references
    /// unresolved.
    Orphans {
        /// The name of the source stream active when the flush occurred.
        source: String,
        /// The 1-based line number active when the flush occurred.
        line: usize,
        /// Unresolved target id -> attribute names still waiting on it.
        unresolved: BTreeMap<String, Vec<String>>,
    },
}

impl fmt::Display for ParserError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParserError::Io(err) => write!(f, "I/O error: {err}"),
            ParserError::LineParse {
                source,
                line,
                text,
                cause,
            } => write!(f, "{source}:{line}: {cause} (line was: {text:?})"),
            ParserError::Orphans {
                source,
                line,
                unresolved,
            } => {
                write!(f, "{source}:{line}: unresolved references at flush:")?;
                for (id, attrs) in unresolved {
                    write!(f, " {id} <- {}", attrs.join(","))?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ParserError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ParserError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for ParserError {
    fn from(err: io::Error) -> Self {
        ParserError::Io(err)
    }
}

impl ParserError {
    pub(crate) fn line_parse(
        source: impl Into<String>,
        line: usize,
        text: impl Into<String>,
        cause: impl Into<String>,
    ) -> Self {
        ParserError::LineParse {
            source: source.into(),
            line,
            text: text.into(),
            cause: cause.into(),
        }
    }

    pub(crate) fn orphans(
        source: impl Into<String>,
        line: usize,
        unresolved: BTreeMap<String, Vec<String>>,
    ) -> Self {
        ParserError::Orphans {
            source: source.into(),
            line,
            unresolved,
        }
    }
}

/// Result alias for `SyncInserter` operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while inserting sync markers.
#[derive(Debug)]
pub enum SyncError {
    /// An I/O error occurred while reading, writing, or managing the
    /// temporary file used by the backward pass.
    Io(io::Error),
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::Io(err) => write!(f, "I/O error: {err}"),
        }
    }
}

impl std::error::Error for SyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SyncError::Io(err) => Some(err),
        }
    }
}

impl From<io::Error> for SyncError {
    fn from(err: io::Error) -> Self {
        SyncError::Io(err)
    }
}
