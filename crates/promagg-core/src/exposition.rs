//! Prometheus text exposition helpers (format version 0.0.4).
//!
//! These functions write into a caller-owned `String` so a whole scrape is
//! rendered into one buffer.

use crate::types::Labels;

/// Content type served with a rendered scrape document.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Writes a label set as `{a="1",b="2"}`.
///
/// Label names come out sorted. When `le` is given it is merged into the
/// set at its sorted position and replaces any `le` label of the series.
pub fn write_labels(out: &mut String, labels: &Labels, le: Option<&str>) {
    let mut le = le;
    let mut first = true;

    out.push('{');
    for (name, value) in labels {
        if let Some(bound) = le {
            if name.as_str() >= "le" {
                write_pair(out, &mut first, "le", bound);
                le = None;
                if name == "le" {
                    continue;
                }
            }
        }
        write_pair(out, &mut first, name, value);
    }
    if let Some(bound) = le {
        write_pair(out, &mut first, "le", bound);
    }
    out.push('}');
}

fn write_pair(out: &mut String, first: &mut bool, name: &str, value: &str) {
    if !*first {
        out.push(',');
    }
    *first = false;
    out.push_str(name);
    out.push_str("=\"");
    escape_label_value(out, value);
    out.push('"');
}

fn escape_label_value(out: &mut String, value: &str) {
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
}

/// Writes the `# HELP` and `# TYPE` header of a family.
pub fn write_header(out: &mut String, name: &str, help: &str, kind: &str) {
    out.push_str("# HELP ");
    out.push_str(name);
    out.push(' ');
    for c in help.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out.push('\n');
    out.push_str("# TYPE ");
    out.push_str(name);
    out.push(' ');
    out.push_str(kind);
    out.push('\n');
}

/// Formats an accumulator with six fraction digits (`4.000000`).
///
/// Non-finite values use the exposition spellings `+Inf`, `-Inf` and `NaN`.
#[must_use]
pub fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        let spelling = if value.is_sign_positive() { "+Inf" } else { "-Inf" };
        spelling.to_string()
    } else {
        format!("{value:.6}")
    }
}

/// Formats a bucket upper bound for the `le` label (`0.5`, `1`, `2.5`).
///
/// Magnitudes below `1e-4` or from `1e21` up use exponent notation with a
/// signed, two-digit exponent (`1e-07`, `1e+21`).
#[must_use]
pub fn format_bound(bound: f64) -> String {
    if bound.is_infinite() && bound.is_sign_positive() {
        return "+Inf".to_string();
    }
    let magnitude = bound.abs();
    if bound == 0.0 || !bound.is_finite() || (1e-4..1e21).contains(&magnitude) {
        return format!("{bound}");
    }

    let scientific = format!("{bound:e}");
    match scientific.split_once('e') {
        Some((mantissa, exponent)) => match exponent.parse::<i32>() {
            Ok(exp) if exp < 0 => format!("{mantissa}e-{:02}", exp.unsigned_abs()),
            Ok(exp) => format!("{mantissa}e+{exp:02}"),
            Err(_) => scientific,
        },
        None => scientific,
    }
}
