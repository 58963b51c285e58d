use std::fmt;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("no section: {0:?}")]
    NoSection(String),

    #[error("section {0:?} already exists")]
    DuplicateSection(String),

    #[error("no option {option:?} in section {section:?}")]
    NoOption { section: String, option: String },

    #[error(
        "bad value substitution: option {option:?} in section {section:?} \
         references unknown key {reference:?}"
    )]
    InterpolationMissingOption {
        section: String,
        option: String,
        reference: String,
    },

    #[error("bad interpolation syntax in option {option:?} of section {section:?}: {detail}")]
    InterpolationSyntax {
        section: String,
        option: String,
        detail: String,
    },

    #[error("interpolation too deeply recursive in option {option:?} of section {section:?}")]
    InterpolationDepth {
        section: String,
        option: String,
        raw: String,
    },

    #[error("{0}")]
    Parsing(ParsingErrors),

    #[error("{file}, line {line}: option line before any section header: {text:?}")]
    MissingSectionHeader {
        file: String,
        line: u64,
        text: String,
    },

    #[error("failed to read {file}: {source}")]
    Read { file: String, source: io::Error },

    #[error("failed to write configuration: {source}")]
    Write { source: io::Error },

    #[error("invalid integer value {value:?}: {source}")]
    InvalidInt {
        value: String,
        source: std::num::ParseIntError,
    },

    #[error("invalid float value {value:?}: {source}")]
    InvalidFloat {
        value: String,
        source: std::num::ParseFloatError,
    },

    #[error("not a boolean: {0:?}")]
    NotABoolean(String),
}

/// Every malformed line encountered in one source, reported as a single
/// aggregate failure after the whole source has been consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsingErrors {
    /// Name of the source the lines came from (path, or `"<string>"`).
    pub file: String,
    /// `(line_number, raw_line)` pairs in input order; line numbers are 1-based.
    pub lines: Vec<(u64, String)>,
}

impl fmt::Display for ParsingErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "source contains parsing errors: {}", self.file)?;
        for (lineno, line) in &self.lines {
            write!(f, "\n\t[line {lineno:2}]: {line:?}")?;
        }
        Ok(())
    }
}
