//! Glob patterns over `/`-separated relative paths.
//!
//! Supports `*`, `?`, `[...]` (with `!` or `^` negation), `**` as a whole segment and
//! `{a,b}` alternatives. Wildcards never match a leading `.` in a name unless the pattern
//! segment itself starts with `.`.

use regex::Regex;

use crate::error::{CdnError, ErrorKind, Result};

/// Expands every `{a,b}` group into separate patterns. Groups without a comma and
/// unbalanced braces are kept literally.
pub fn expand_braces(pattern: &str) -> Vec<String> {
    let Some(open) = pattern.find('{') else {
        return vec![pattern.to_string()];
    };

    let mut depth = 0usize;
    let mut close = None;
    let mut commas = Vec::new();
    for (offset, c) in pattern[open..].char_indices() {
        let i = open + offset;
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    close = Some(i);
                    break;
                }
            }
            ',' if depth == 1 => commas.push(i),
            _ => {}
        }
    }

    let Some(close) = close else {
        return vec![pattern.to_string()];
    };

    if commas.is_empty() {
        let head = &pattern[..=close];
        return expand_braces(&pattern[close + 1..])
            .into_iter()
            .map(|tail| format!("{head}{tail}"))
            .collect();
    }

    let prefix = &pattern[..open];
    let suffix = &pattern[close + 1..];
    let mut bounds = vec![open];
    bounds.extend(commas);
    bounds.push(close);
    bounds
        .windows(2)
        .flat_map(|w| expand_braces(&format!("{prefix}{}{suffix}", &pattern[w[0] + 1..w[1]])))
        .collect()
}

pub fn has_magic(segment: &str) -> bool {
    segment.contains(['*', '?', '['])
}

#[derive(Debug, Clone)]
enum Segment {
    Globstar,
    Literal(String),
    Wild { regex: Regex, explicit_dot: bool },
}

impl Segment {
    fn parse(segment: &str) -> Result<Self> {
        if segment == "**" {
            return Ok(Segment::Globstar);
        }
        if !has_magic(segment) {
            return Ok(Segment::Literal(segment.to_string()));
        }
        let regex = Regex::new(&translate(segment)).map_err(|e| {
            CdnError::new(
                ErrorKind::NoFiles,
                format!("invalid file matcher segment '{segment}'"),
            )
            .with_source(e)
        })?;
        Ok(Segment::Wild {
            regex,
            explicit_dot: segment.starts_with('.'),
        })
    }

    fn matches(&self, name: &str) -> bool {
        match self {
            Segment::Globstar => !name.starts_with('.'),
            Segment::Literal(literal) => literal == name,
            Segment::Wild {
                regex,
                explicit_dot,
            } => (*explicit_dot || !name.starts_with('.')) && regex.is_match(name),
        }
    }
}

/// Regex source for one brace-free segment.
fn translate(segment: &str) -> String {
    let chars: Vec<char> = segment.chars().collect();
    let mut out = String::from("^");
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' => {
                while i + 1 < chars.len() && chars[i + 1] == '*' {
                    i += 1;
                }
                out.push_str("[^/]*");
            }
            '?' => out.push_str("[^/]"),
            '[' => match class_end(&chars, i) {
                Some(end) => {
                    out.push('[');
                    let mut j = i + 1;
                    if matches!(chars[j], '!' | '^') {
                        out.push('^');
                        j += 1;
                    }
                    for &c in &chars[j..end] {
                        if matches!(c, '\\' | '[' | ']' | '&' | '~' | '^') {
                            out.push('\\');
                        }
                        out.push(c);
                    }
                    out.push(']');
                    i = end;
                }
                None => out.push_str(r"\["),
            },
            '\\' if i + 1 < chars.len() => {
                i += 1;
                out.push_str(&regex::escape(&chars[i].to_string()));
            }
            c => out.push_str(&regex::escape(&c.to_string())),
        }
        i += 1;
    }
    out.push('$');
    out
}

/// Index of the `]` closing the class opened at `open`. A `]` right after the opening
/// (or after its negation) is part of the class.
fn class_end(chars: &[char], open: usize) -> Option<usize> {
    let mut j = open + 1;
    if j < chars.len() && matches!(chars[j], '!' | '^') {
        j += 1;
    }
    if j < chars.len() && chars[j] == ']' {
        j += 1;
    }
    (j..chars.len()).find(|&k| chars[k] == ']')
}

/// A brace-free pattern split into a literal base directory and the part that needs
/// matching against a directory walk.
#[derive(Debug, Clone)]
pub struct Glob {
    rooted: bool,
    base: Vec<String>,
    segments: Vec<Segment>,
}

impl Glob {
    pub fn parse(pattern: &str) -> Result<Self> {
        let parts: Vec<&str> = pattern
            .split('/')
            .filter(|s| !s.is_empty() && *s != ".")
            .collect();
        let literal = parts.iter().take_while(|s| !has_magic(s)).count();

        let base = parts[..literal].iter().map(|s| s.to_string()).collect();
        let segments = parts[literal..]
            .iter()
            .map(|s| Segment::parse(s))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            rooted: pattern.starts_with('/'),
            base,
            segments,
        })
    }

    /// Leading literal segments, to be resolved against the working directory.
    /// Absolute patterns keep their leading `/`.
    pub fn base(&self) -> String {
        let base = self.base.join("/");
        if self.rooted {
            format!("/{base}")
        } else {
            base
        }
    }

    /// True when the pattern names a single path with no wildcard.
    pub fn is_literal(&self) -> bool {
        self.segments.is_empty()
    }

    /// Matches a path relative to [`Glob::base`].
    pub fn matches(&self, relative: &str) -> bool {
        let names: Vec<&str> = relative.split('/').filter(|s| !s.is_empty()).collect();
        match_segments(&self.segments, &names)
    }
}

fn match_segments(pattern: &[Segment], names: &[&str]) -> bool {
    match pattern.split_first() {
        None => names.is_empty(),
        Some((Segment::Globstar, rest)) => {
            for skip in 0..=names.len() {
                if match_segments(rest, &names[skip..]) {
                    return true;
                }
                if skip < names.len() && names[skip].starts_with('.') {
                    return false;
                }
            }
            false
        }
        Some((segment, rest)) => match names.split_first() {
            Some((name, tail)) => segment.matches(name) && match_segments(rest, tail),
            None => false,
        },
    }
}
