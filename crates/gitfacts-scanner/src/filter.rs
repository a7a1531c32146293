//! File-name and scanner-name predicates pushed down from a query.

use gitfacts_core::GitfactsError;
use globset::{GlobBuilder, GlobMatcher};

/// One file-name rule.
#[derive(Debug, Clone)]
pub enum FileRule {
    /// Exact path match.
    Equals(String),
    /// Glob over the slash-separated path; `*` never crosses a `/`.
    Glob(GlobMatcher),
}

impl FileRule {
    pub fn glob(pattern: &str) -> Result<Self, GitfactsError> {
        let glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(|e| GitfactsError::Validation(format!("invalid glob {pattern:?}: {e}")))?;
        Ok(Self::Glob(glob.compile_matcher()))
    }

    pub fn matches(&self, name: &str) -> bool {
        match self {
            Self::Equals(expected) => expected == name,
            Self::Glob(matcher) => matcher.is_match(name),
        }
    }
}

/// Conjunction of file rules. No rules accepts every file.
#[derive(Debug, Clone, Default)]
pub struct FilePredicate {
    rules: Vec<FileRule>,
}

impl FilePredicate {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn and(mut self, rule: FileRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn accepts(&self, name: &str) -> bool {
        self.rules.iter().all(|rule| rule.matches(name))
    }
}

/// One scanner-name rule.
#[derive(Debug, Clone)]
pub enum ScannerRule {
    Equals(String),
    /// SQL `LIKE`: `%` and `_` wildcards, ASCII case-insensitive.
    Like(String),
}

impl ScannerRule {
    pub fn matches(&self, name: &str) -> bool {
        match self {
            Self::Equals(expected) => expected == name,
            Self::Like(pattern) => like(pattern, name),
        }
    }
}

/// Conjunction of scanner rules. No rules accepts every scanner.
#[derive(Debug, Clone, Default)]
pub struct ScannerPredicate {
    rules: Vec<ScannerRule>,
}

impl ScannerPredicate {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn and(mut self, rule: ScannerRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn accepts(&self, name: &str) -> bool {
        self.rules.iter().all(|rule| rule.matches(name))
    }
}

/// SQL `LIKE` matching without an escape character.
pub fn like(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    // Backtrack to the most recent `%` on mismatch.
    let (mut p, mut t) = (0, 0);
    let mut resume: Option<(usize, usize)> = None;
    while t < text.len() {
        match pattern.get(p) {
            Some('%') => {
                resume = Some((p, t));
                p += 1;
            }
            Some('_') => {
                p += 1;
                t += 1;
            }
            Some(c) if c.eq_ignore_ascii_case(&text[t]) => {
                p += 1;
                t += 1;
            }
            _ => match resume {
                Some((rp, rt)) => {
                    p = rp + 1;
                    t = rt + 1;
                    resume = Some((rp, rt + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|&c| c == '%')
}
