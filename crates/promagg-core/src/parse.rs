//! Line parser for the write protocol.
//!
//! Every line is one [`Observation`] in one of two encodings:
//!
//! - structured: a JSON object, recognised by a leading `{`
//!   (`{"name":"foo_total","type":"counter","help":"Foos.","value":1}`)
//! - compact textual: `name{label="value",...} 1.5`
//!
//! The textual form has no room for type or help, so it can only feed a
//! family that was already declared with a structured line. Its grammar is
//! deliberately stricter than the exposition format: no whitespace anywhere
//! in the name or label list.

use crate::error::{GrammarError, ParseError};
use crate::types::{Labels, Observation};

/// Parses one raw line into an observation.
///
/// Surrounding whitespace is ignored.
///
/// # Errors
///
/// Returns [`ParseError::Empty`] for blank lines, [`ParseError::Decode`] for
/// malformed JSON, and [`ParseError::Value`] or [`ParseError::Grammar`] for
/// malformed textual lines.
pub fn parse_line(line: &[u8]) -> Result<Observation, ParseError> {
    let line = line.trim_ascii();
    match line.first() {
        None => Err(ParseError::Empty),
        Some(b'{') => Ok(serde_json::from_slice(line)?),
        Some(_) => parse_text(line),
    }
}

fn parse_text(line: &[u8]) -> Result<Observation, ParseError> {
    let split = line
        .iter()
        .rposition(|&b| b == b' ')
        .filter(|&x| x >= 1)
        .ok_or(GrammarError::MissingSpace)?;

    let id = line[..split].trim_ascii();
    let token = line[split + 1..].trim_ascii();

    let value = parse_value(token)?;

    let open = id
        .iter()
        .position(|&b| b == b'{')
        .ok_or(GrammarError::MissingOpeningBrace)?;
    if id.last() != Some(&b'}') || id.len() < open + 2 {
        return Err(GrammarError::MissingClosingBrace.into());
    }

    let name = &id[..open];
    let labels = &id[open + 1..id.len() - 1];
    if name.iter().chain(labels).any(u8::is_ascii_whitespace) {
        return Err(GrammarError::Whitespace.into());
    }

    Ok(Observation {
        name: utf8(name)?.to_string(),
        labels: parse_labels(labels)?,
        value: Some(value),
        ..Observation::default()
    })
}

fn parse_value(token: &[u8]) -> Result<f64, ParseError> {
    let text = String::from_utf8_lossy(token);
    match text.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(ParseError::Value {
            token: text.into_owned(),
        }),
    }
}

fn parse_labels(list: &[u8]) -> Result<Labels, ParseError> {
    let mut labels = Labels::new();
    if list.is_empty() {
        return Ok(labels);
    }

    for pair in list.split(|&b| b == b',') {
        let eq = pair
            .iter()
            .position(|&b| b == b'=')
            .filter(|&z| z > 0)
            .ok_or(GrammarError::MalformedLabelPair)?;
        let (key, value) = (&pair[..eq], &pair[eq + 1..]);

        let unquoted = value
            .strip_prefix(b"\"")
            .and_then(|v| v.strip_suffix(b"\""))
            .ok_or(GrammarError::UnquotedLabelValue)?;

        labels.insert(utf8(key)?.to_string(), utf8(unquoted)?.to_string());
    }

    Ok(labels)
}

fn utf8(bytes: &[u8]) -> Result<&str, ParseError> {
    std::str::from_utf8(bytes).map_err(|_| GrammarError::InvalidUtf8.into())
}
