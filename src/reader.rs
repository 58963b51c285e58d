//! Line-oriented parser that populates a [`Config`](crate::Config).
//!
//! The grammar is deliberately loose for compatibility with legacy files:
//! `[section]` headers, `key: value` or `key = value` options, RFC 822-style
//! continuation lines, and `#`/`;`/`rem` comments. Malformed lines are
//! collected and reported in one aggregate error after the whole source has
//! been consumed; only an option line before any section header aborts
//! immediately.

use std::io::BufRead;

use indexmap::IndexMap;

use crate::error::{ConfigError, ParsingErrors};
use crate::store::{Config, DEFAULT_SECTION};

pub(crate) fn parse<R: BufRead>(
    config: &mut Config,
    reader: R,
    source: &str,
) -> Result<(), ConfigError> {
    let mut cursect: Option<String> = None;
    let mut optname: Option<String> = None;
    let mut bad: Vec<(u64, String)> = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        let lineno = idx as u64 + 1;
        let line = line.map_err(|e| ConfigError::Read {
            file: source.to_string(),
            source: e,
        })?;
        let stripped = line.trim();

        if stripped.is_empty() || stripped.starts_with('#') || stripped.starts_with(';') {
            continue;
        }
        let indented = line.starts_with(|c: char| c.is_whitespace());
        if !indented
            && line
                .split_whitespace()
                .next()
                .is_some_and(|t| t.eq_ignore_ascii_case("rem"))
        {
            continue;
        }

        if indented {
            if let (Some(sect), Some(opt)) = (cursect.as_deref(), optname.as_deref()) {
                let map = target(config, sect);
                if let Some(value) = map.get_mut(opt) {
                    value.push('\n');
                    value.push_str(stripped);
                }
                continue;
            }
            // Indented line with no option active falls through and is
            // recorded as malformed below.
        }

        if let Some(header) = match_section_header(&line) {
            if header != DEFAULT_SECTION {
                config.sections.entry(header.to_string()).or_default();
            }
            cursect = Some(header.to_string());
            // Sections cannot start with a continuation line.
            optname = None;
            continue;
        }

        if let Some((key, value)) = match_option_line(&line) {
            let Some(sect) = cursect.as_deref() else {
                return Err(ConfigError::MissingSectionHeader {
                    file: source.to_string(),
                    line: lineno,
                    text: line,
                });
            };
            let key = (config.normalize)(&key);
            target(config, sect).insert(key.clone(), value);
            optname = Some(key);
            continue;
        }

        bad.push((lineno, line));
    }

    if !bad.is_empty() {
        return Err(ConfigError::Parsing(ParsingErrors {
            file: source.to_string(),
            lines: bad,
        }));
    }
    Ok(())
}

fn target<'a>(config: &'a mut Config, section: &str) -> &'a mut IndexMap<String, String> {
    if section == DEFAULT_SECTION {
        &mut config.defaults
    } else {
        config
            .sections
            .get_mut(section)
            .expect("current section is created when its header is read")
    }
}

/// Matches `\[[^\]]+\]` at the start of the line; text after the closing
/// bracket is ignored.
fn match_section_header(line: &str) -> Option<&str> {
    let rest = line.strip_prefix('[')?;
    let end = rest.find(']')?;
    if end == 0 {
        return None;
    }
    Some(&rest[..end])
}

/// Matches `[^:=\s][^:=]*\s*[:=]\s*.*` by scanning for the first separator.
/// Returns the trimmed key and the value with the inline-comment and
/// empty-value rules already applied.
fn match_option_line(line: &str) -> Option<(String, String)> {
    let first = line.chars().next()?;
    if first.is_whitespace() || first == ':' || first == '=' {
        return None;
    }
    let sep = line.find([':', '='])?;
    let key = line[..sep].trim_end().to_string();
    Some((key, trim_option_value(&line[sep + 1..])))
}

fn trim_option_value(tail: &str) -> String {
    let mut value = tail.trim_start();
    // A ';' opens an inline comment only when preceded by whitespace. This
    // can truncate a value legitimately containing ';' mid-token; the rule
    // is the documented contract and is kept as-is.
    if let Some(pos) = value.find(';') {
        if value[..pos].ends_with(|c: char| c.is_whitespace()) {
            value = &value[..pos];
        }
    }
    let value = value.trim();
    if value == "\"\"" {
        String::new()
    } else {
        value.to_string()
    }
}
