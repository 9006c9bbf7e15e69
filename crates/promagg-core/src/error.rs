//! Error types for the promagg-core crate.
//!
//! Parsing failures ([`ParseError`]) and registry validation failures
//! ([`AggregateError`]) are kept apart so transports can report which stage
//! rejected a line. [`LineError`] joins the two for the parse-then-observe
//! path every transport runs.

use thiserror::Error;

/// Grammar violations of the compact textual line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GrammarError {
    /// No space separates the identifier from the value.
    #[error("couldn't find space")]
    MissingSpace,

    /// The identifier has no `{`.
    #[error("couldn't find opening brace")]
    MissingOpeningBrace,

    /// The identifier does not end with `}`.
    #[error("couldn't find terminating brace")]
    MissingClosingBrace,

    /// Whitespace inside the metric name or the label list.
    #[error("whitespace is not allowed in the name or label list")]
    Whitespace,

    /// A label pair is not of the form `name="value"`.
    #[error("label pair must be of the form name=\"value\"")]
    MalformedLabelPair,

    /// A label value is not wrapped in double quotes.
    #[error("label value must be wrapped in quotes")]
    UnquotedLabelValue,

    /// The name or a label is not valid UTF-8.
    #[error("name and labels must be valid UTF-8")]
    InvalidUtf8,
}

/// Errors produced while turning one raw line into an observation.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The line is empty after trimming.
    #[error("invalid (empty) line")]
    Empty,

    /// The structured (JSON) encoding could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// The trailing value of a textual line is not a finite number.
    #[error("bad value ({token})")]
    Value {
        /// The offending token.
        token: String,
    },

    /// The textual line violates the compact grammar.
    #[error("bad format: {0}")]
    Grammar(#[from] GrammarError),
}

/// Errors raised by the registry when applying an observation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AggregateError {
    /// The observation carries no metric name.
    #[error("a new timeseries value requires a name")]
    MissingName,

    /// The first mention of a family names an unsupported metric type.
    #[error("invalid type '{kind}' for metric {name}")]
    InvalidKind {
        /// The metric family name.
        name: String,
        /// The rejected type string.
        kind: String,
    },

    /// The first mention of a family has no help text.
    #[error("help string cannot be empty (metric {name})")]
    MissingHelp {
        /// The metric family name.
        name: String,
    },

    /// An observation references a family that was never declared.
    #[error("metric {name} has not been declared")]
    UnknownFamily {
        /// The metric family name.
        name: String,
    },
}

/// Error for the full parse-then-observe path of a single line.
#[derive(Debug, Error)]
pub enum LineError {
    /// The line could not be parsed.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// The parsed observation was rejected by the registry.
    #[error("observation error: {0}")]
    Observe(#[from] AggregateError),
}

/// Result type for registry operations.
pub type Result<T> = std::result::Result<T, AggregateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_grammar() {
        let err = ParseError::from(GrammarError::UnquotedLabelValue);
        assert_eq!(
            err.to_string(),
            "bad format: label value must be wrapped in quotes"
        );
    }

    #[test]
    fn error_display_value() {
        let err = ParseError::Value {
            token: "A".to_string(),
        };
        assert_eq!(err.to_string(), "bad value (A)");
    }

    #[test]
    fn error_display_invalid_kind() {
        let err = AggregateError::InvalidKind {
            name: "foo".to_string(),
            kind: "summary".to_string(),
        };
        assert_eq!(err.to_string(), "invalid type 'summary' for metric foo");
    }

    #[test]
    fn error_display_unknown_family() {
        let err = AggregateError::UnknownFamily {
            name: "foo_total".to_string(),
        };
        assert_eq!(err.to_string(), "metric foo_total has not been declared");
    }

    #[test]
    fn line_error_wraps_stage() {
        let err = LineError::from(ParseError::Empty);
        assert_eq!(err.to_string(), "parse error: invalid (empty) line");

        let err = LineError::from(AggregateError::MissingName);
        assert_eq!(
            err.to_string(),
            "observation error: a new timeseries value requires a name"
        );
    }
}
