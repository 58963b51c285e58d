//! Deferred `%(name)s` reference expansion for stored values.
//!
//! Values keep their raw text in the store; expansion happens on every
//! lookup against a transient three-layer view (overrides, then the target
//! section, then DEFAULT) and never writes back. Use `%%` for a literal `%`.

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::error::ConfigError;
use crate::store::NAME_MARKER;

/// Hard ceiling on expansion rounds shared by both strategies.
pub const MAX_INTERPOLATION_DEPTH: usize = 10;

/// Expansion strategy, chosen once at store construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interpolation {
    /// Repeated blanket substitution passes over the whole value until no
    /// `%(name)s` marker remains or the round budget runs out.
    #[default]
    Greedy,
    /// One reference resolved at a time, recursing into referenced values.
    /// Stricter: a `%` not followed by `%` or `(` is a syntax error, and
    /// errors are attributed to the exact reference that caused them.
    Recursive,
    /// No expansion; values are returned exactly as stored.
    None,
}

/// Transient priority chain used to resolve one lookup.
///
/// Built per call by the store and discarded afterwards; holding one never
/// blocks mutation because all fields borrow immutably.
pub(crate) struct Layer<'a> {
    pub(crate) overrides: Option<&'a HashMap<String, String>>,
    pub(crate) section: Option<&'a IndexMap<String, String>>,
    pub(crate) section_name: &'a str,
    pub(crate) defaults: &'a IndexMap<String, String>,
}

impl<'a> Layer<'a> {
    pub(crate) fn lookup(&self, key: &str) -> Option<&'a str> {
        if let Some(v) = self.overrides.and_then(|o| o.get(key)) {
            return Some(v);
        }
        if let Some(v) = self.section.and_then(|s| s.get(key)) {
            return Some(v);
        }
        // The section-name marker is virtual: it is never stored, but the
        // layered lookup answers it so values can reference %(__name__)s.
        if key == NAME_MARKER && self.section.is_some() {
            return Some(self.section_name);
        }
        self.defaults.get(key).map(String::as_str)
    }
}

pub(crate) fn interpolate(
    strategy: Interpolation,
    layer: &Layer<'_>,
    section: &str,
    option: &str,
    rawval: &str,
    normalize: fn(&str) -> String,
) -> Result<String, ConfigError> {
    match strategy {
        Interpolation::None => Ok(rawval.to_string()),
        Interpolation::Greedy => greedy(layer, section, option, rawval, normalize),
        Interpolation::Recursive => {
            let mut out = String::with_capacity(rawval.len());
            recursive(layer, section, option, rawval, 1, &mut out, normalize)?;
            Ok(out)
        }
    }
}

fn greedy(
    layer: &Layer<'_>,
    section: &str,
    option: &str,
    rawval: &str,
    normalize: fn(&str) -> String,
) -> Result<String, ConfigError> {
    let mut value = rawval.to_string();
    for _ in 0..MAX_INTERPOLATION_DEPTH {
        if !value.contains("%(") {
            return Ok(value);
        }
        value = greedy_pass(&value, layer, section, option, normalize)?;
    }
    if value.contains("%(") {
        return Err(ConfigError::InterpolationDepth {
            section: section.to_string(),
            option: option.to_string(),
            raw: rawval.to_string(),
        });
    }
    Ok(value)
}

/// One blanket substitution pass. Replaces every complete `%(name)s` marker
/// and collapses `%%`; substituted text is not rescanned within the pass.
/// Malformed markers are copied through verbatim, so they keep the outer
/// loop spinning until the depth budget forces an error.
fn greedy_pass(
    value: &str,
    layer: &Layer<'_>,
    section: &str,
    option: &str,
    normalize: fn(&str) -> String,
) -> Result<String, ConfigError> {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '%' {
            out.push(ch);
            continue;
        }
        match chars.peek() {
            Some('%') => {
                chars.next();
                out.push('%');
            }
            Some('(') => {
                chars.next();
                let (name, closed) = consume_until(&mut chars, ')');
                if closed && chars.peek() == Some(&'s') {
                    chars.next();
                    let key = normalize(&name);
                    match layer.lookup(&key) {
                        Some(v) => out.push_str(v),
                        None => {
                            return Err(ConfigError::InterpolationMissingOption {
                                section: section.to_string(),
                                option: option.to_string(),
                                reference: key,
                            })
                        }
                    }
                } else {
                    out.push_str("%(");
                    out.push_str(&name);
                    if closed {
                        out.push(')');
                    }
                }
            }
            _ => out.push('%'),
        }
    }
    Ok(out)
}

/// Collects characters up to `delim`. The boolean reports whether the
/// delimiter was actually found before the input ran out.
fn consume_until(
    chars: &mut std::iter::Peekable<std::str::Chars>,
    delim: char,
) -> (String, bool) {
    let mut collected = String::new();
    for ch in chars.by_ref() {
        if ch == delim {
            return (collected, true);
        }
        collected.push(ch);
    }
    (collected, false)
}

fn recursive(
    layer: &Layer<'_>,
    section: &str,
    option: &str,
    text: &str,
    depth: usize,
    out: &mut String,
    normalize: fn(&str) -> String,
) -> Result<(), ConfigError> {
    if depth > MAX_INTERPOLATION_DEPTH {
        return Err(ConfigError::InterpolationDepth {
            section: section.to_string(),
            option: option.to_string(),
            raw: text.to_string(),
        });
    }

    let mut rest = text;
    while !rest.is_empty() {
        let Some(p) = rest.find('%') else {
            out.push_str(rest);
            break;
        };
        out.push_str(&rest[..p]);
        rest = &rest[p..];

        match rest[1..].chars().next() {
            Some('%') => {
                out.push('%');
                rest = &rest[2..];
            }
            Some('(') => {
                // Only a non-empty name closed by ")s" is a valid reference.
                let close = match rest.find(')') {
                    Some(c) if c > 2 && rest[c + 1..].starts_with('s') => c,
                    _ => {
                        return Err(ConfigError::InterpolationSyntax {
                            section: section.to_string(),
                            option: option.to_string(),
                            detail: format!("bad interpolation variable reference {rest:?}"),
                        })
                    }
                };
                let key = normalize(&rest[2..close]);
                let Some(v) = layer.lookup(&key) else {
                    return Err(ConfigError::InterpolationMissingOption {
                        section: section.to_string(),
                        option: option.to_string(),
                        reference: key,
                    });
                };
                if v.contains('%') {
                    recursive(layer, section, option, v, depth + 1, out, normalize)?;
                } else {
                    out.push_str(v);
                }
                rest = &rest[close + 2..];
            }
            _ => {
                return Err(ConfigError::InterpolationSyntax {
                    section: section.to_string(),
                    option: option.to_string(),
                    detail: format!("'%' must be followed by '%' or '(', found: {rest:?}"),
                })
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map_of(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn lower(s: &str) -> String {
        s.to_lowercase()
    }

    fn expand(
        strategy: Interpolation,
        section: &[(&str, &str)],
        defaults: &[(&str, &str)],
        raw: &str,
    ) -> Result<String, ConfigError> {
        let section_map = map_of(section);
        let defaults_map = map_of(defaults);
        let layer = Layer {
            overrides: None,
            section: Some(&section_map),
            section_name: "main",
            defaults: &defaults_map,
        };
        interpolate(strategy, &layer, "main", "opt", raw, lower)
    }

    #[test]
    fn greedy_simple_reference() {
        let got = expand(
            Interpolation::Greedy,
            &[],
            &[("dir", "/tmp")],
            "%(dir)s/x",
        )
        .unwrap();
        assert_eq!(got, "/tmp/x");
    }

    #[test]
    fn greedy_chained_references() {
        let got = expand(
            Interpolation::Greedy,
            &[("a", "%(b)s!"), ("b", "deep %(c)s")],
            &[("c", "value")],
            "start %(a)s",
        )
        .unwrap();
        assert_eq!(got, "start deep value!");
    }

    #[test]
    fn greedy_reference_keys_are_normalized() {
        let got = expand(Interpolation::Greedy, &[("dir", "/tmp")], &[], "%(DIR)s").unwrap();
        assert_eq!(got, "/tmp");
    }

    #[test]
    fn greedy_collapses_percent_escape_during_pass() {
        let got = expand(
            Interpolation::Greedy,
            &[("rate", "50")],
            &[],
            "%(rate)s%% full",
        )
        .unwrap();
        assert_eq!(got, "50% full");
    }

    #[test]
    fn greedy_without_markers_leaves_value_alone() {
        let got = expand(Interpolation::Greedy, &[], &[], "100%% literal").unwrap();
        assert_eq!(got, "100%% literal");
    }

    #[test]
    fn greedy_self_reference_hits_depth_budget() {
        let err = expand(Interpolation::Greedy, &[("a", "%(a)s")], &[], "%(a)s").unwrap_err();
        assert!(matches!(err, ConfigError::InterpolationDepth { .. }));
    }

    #[test]
    fn greedy_missing_reference_names_the_key() {
        let err = expand(Interpolation::Greedy, &[], &[], "%(missing)s").unwrap_err();
        match err {
            ConfigError::InterpolationMissingOption { reference, .. } => {
                assert_eq!(reference, "missing");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn recursive_simple_and_escape() {
        let got = expand(
            Interpolation::Recursive,
            &[("dir", "/tmp")],
            &[],
            "%(dir)s is 100%% ready",
        )
        .unwrap();
        assert_eq!(got, "/tmp is 100% ready");
    }

    #[test]
    fn recursive_expands_nested_values() {
        let got = expand(
            Interpolation::Recursive,
            &[("url", "%(host)s:%(port)s")],
            &[("host", "localhost"), ("port", "8080")],
            "http://%(url)s/",
        )
        .unwrap();
        assert_eq!(got, "http://localhost:8080/");
    }

    #[test]
    fn recursive_missing_reference_names_the_key() {
        let err = expand(
            Interpolation::Recursive,
            &[("x", "%(missing)s")],
            &[],
            "%(x)s",
        )
        .unwrap_err();
        match err {
            ConfigError::InterpolationMissingOption { reference, .. } => {
                assert_eq!(reference, "missing");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn recursive_self_reference_hits_depth_budget() {
        let err = expand(Interpolation::Recursive, &[("a", "%(a)s")], &[], "%(a)s").unwrap_err();
        assert!(matches!(err, ConfigError::InterpolationDepth { .. }));
    }

    #[test]
    fn recursive_trailing_percent_is_a_syntax_error() {
        let err = expand(Interpolation::Recursive, &[], &[], "broken %").unwrap_err();
        assert!(matches!(err, ConfigError::InterpolationSyntax { .. }));
    }

    #[test]
    fn recursive_rejects_unknown_escape() {
        let err = expand(Interpolation::Recursive, &[], &[], "%x").unwrap_err();
        assert!(matches!(err, ConfigError::InterpolationSyntax { .. }));
    }

    #[test]
    fn recursive_rejects_unclosed_reference() {
        let err = expand(Interpolation::Recursive, &[], &[], "%(dir").unwrap_err();
        assert!(matches!(err, ConfigError::InterpolationSyntax { .. }));
    }

    #[test]
    fn recursive_ignores_stray_percent_inside_plain_text_only_when_escaped() {
        // The recursive strategy never runs a blanket pass, so surrounding
        // text can contain resolved references without re-expansion.
        let got = expand(
            Interpolation::Recursive,
            &[("tpl", "a%%b")],
            &[],
            "%(tpl)s",
        )
        .unwrap();
        assert_eq!(got, "a%b");
    }

    #[test]
    fn overrides_win_over_section_and_defaults() {
        let section_map = map_of(&[("dir", "/section")]);
        let defaults_map = map_of(&[("dir", "/default")]);
        let overrides: HashMap<String, String> =
            [("dir".to_string(), "/override".to_string())].into();
        let layer = Layer {
            overrides: Some(&overrides),
            section: Some(&section_map),
            section_name: "main",
            defaults: &defaults_map,
        };
        let got = interpolate(Interpolation::Greedy, &layer, "main", "opt", "%(dir)s", lower)
            .unwrap();
        assert_eq!(got, "/override");
    }

    #[test]
    fn name_marker_resolves_to_section_name() {
        let got = expand(Interpolation::Recursive, &[], &[], "sect=%(__name__)s").unwrap();
        assert_eq!(got, "sect=main");
    }

    #[test]
    fn none_strategy_returns_raw_value() {
        let got = expand(Interpolation::None, &[], &[], "%(dir)s %").unwrap();
        assert_eq!(got, "%(dir)s %");
    }
}
