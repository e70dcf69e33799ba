//! Error types for the shared file formats.

use std::fmt;

/// Errors raised while decoding one of the shared formats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// The archive does not start with the expected magic bytes.
    BadMagic,

    /// The archive was written by an unknown format version.
    UnsupportedVersion {
        /// Version found in the header.
        version: u16,
    },

    /// The data ended before a complete record could be read.
    Truncated {
        /// What was being read when the data ran out.
        context: &'static str,
    },

    /// An entry name was not valid UTF-8.
    InvalidName,

    /// An entry name or payload exceeds the width of its length prefix.
    TooLarge {
        /// The offending entry name.
        name: String,
    },

    /// A line in a text format could not be parsed.
    InvalidLine {
        /// 1-based line number.
        line: usize,
        /// Description of the problem.
        message: String,
    },

    /// A settings document is not valid TOML or does not fit the
    /// requested view.
    InvalidSettings {
        /// Description from the TOML parser.
        message: String,
    },
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatError::BadMagic => write!(f, "Not a bale archive (bad magic)"),
            FormatError::UnsupportedVersion { version } => {
                write!(f, "Unsupported archive version: {}", version)
            }
            FormatError::Truncated { context } => {
                write!(f, "Unexpected end of data while reading {}", context)
            }
            FormatError::InvalidName => write!(f, "Archive entry name is not valid UTF-8"),
            FormatError::TooLarge { name } => write!(f, "Archive entry too large: {}", name),
            FormatError::InvalidLine { line, message } => {
                write!(f, "Line {}: {}", line, message)
            }
            FormatError::InvalidSettings { message } => write!(f, "Invalid settings: {}", message),
        }
    }
}

impl std::error::Error for FormatError {}

/// Result type alias for format operations.
pub type FormatResult<T> = Result<T, FormatError>;
