//! Path and domain pattern matching for range queries.

use crate::error::{JournalError, Result};
use regex::Regex;

/// Matches `(path, domain)` pairs against the query's patterns.
///
/// Each pattern is either a glob (`**` crosses `/`, `*` and `?` do not) or a
/// regular expression, selected by the query's `is_regex` flag. An empty
/// pattern matches everything.
#[derive(Debug)]
pub struct PatternMatcher {
    path_re: Option<Regex>,
    domain_re: Option<Regex>,
}

impl PatternMatcher {
    /// Compiles the matcher from query patterns.
    pub fn new(path_pattern: &str, domain_pattern: &str, is_regex: bool) -> Result<Self> {
        Ok(Self {
            path_re: compile(path_pattern, is_regex)?,
            domain_re: compile(domain_pattern, is_regex)?,
        })
    }

    /// True when both patterns match; absent patterns match all.
    pub fn matches(&self, path: &str, domain: &str) -> bool {
        self.path_re.as_ref().map_or(true, |re| re.is_match(path))
            && self
                .domain_re
                .as_ref()
                .map_or(true, |re| re.is_match(domain))
    }
}

fn compile(pattern: &str, is_regex: bool) -> Result<Option<Regex>> {
    if pattern.is_empty() {
        return Ok(None);
    }
    let re = if is_regex {
        Regex::new(pattern)
            .map_err(|err| JournalError::InvalidPattern(format!("{pattern:?}: {err}")))?
    } else {
        glob_to_regex(pattern)?
    };
    Ok(Some(re))
}

/// Converts a glob pattern to an anchored regex.
///
/// - `**` matches anything, including `/`
/// - `*` matches anything except `/`
/// - `?` matches a single character except `/`
fn glob_to_regex(pattern: &str) -> Result<Regex> {
    let mut regex_str = String::with_capacity(pattern.len() * 2);
    regex_str.push('^');

    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' if i + 1 < chars.len() && chars[i + 1] == '*' => {
                if i + 2 < chars.len() && chars[i + 2] == '/' {
                    regex_str.push_str("(?:.*/)?");
                    i += 3;
                } else {
                    regex_str.push_str(".*");
                    i += 2;
                }
            }
            '*' => {
                regex_str.push_str("[^/]*");
                i += 1;
            }
            '?' => {
                regex_str.push_str("[^/]");
                i += 1;
            }
            c @ ('.' | '+' | '(' | ')' | '{' | '}' | '[' | ']' | '^' | '$' | '|' | '\\') => {
                regex_str.push('\\');
                regex_str.push(c);
                i += 1;
            }
            c => {
                regex_str.push(c);
                i += 1;
            }
        }
    }
    regex_str.push('$');

    Regex::new(&regex_str)
        .map_err(|err| JournalError::InvalidPattern(format!("glob {pattern:?}: {err}")))
}
