//! `golang/mod`: module requirements from `go.mod`.

use gitfacts_core::{CancelToken, Fact, File, GitfactsError};
use serde_json::json;

pub const KEY_REQUIRE: &str = "@golang/mod/require";

/// Emits one `@golang/mod/require` fact per required module.
pub struct GoModScanner;

impl crate::Scanner for GoModScanner {
    fn name(&self) -> &str {
        "golang/mod"
    }

    fn supports(&self, file: &File<'_>) -> bool {
        file.base_name() == "go.mod"
    }

    fn scan(&self, ctx: &CancelToken, file: &File<'_>) -> Result<Vec<Fact>, GitfactsError> {
        ctx.check()?;
        let source = super::text(file.contents()?);
        let facts = parse_requires(&source)?
            .into_iter()
            .map(|(path, version)| Fact::new(KEY_REQUIRE, json!({ "path": path, "version": version })))
            .collect();
        Ok(facts)
    }
}

/// `(path, version)` of every `require`, in file order.
pub fn parse_requires(source: &str) -> Result<Vec<(String, String)>, GitfactsError> {
    let mut requires = Vec::new();
    // Directive of the `( ... )` block we are inside, if any.
    let mut block: Option<String> = None;

    for (number, raw) in source.lines().enumerate() {
        let line = strip_comment(raw).trim();
        if line.is_empty() {
            continue;
        }

        if block.is_some() {
            if line == ")" {
                block = None;
            } else if block.as_deref() == Some("require") {
                requires.push(require_spec(line, number + 1)?);
            }
            continue;
        }

        let (directive, rest) = line
            .split_once(char::is_whitespace)
            .map(|(d, r)| (d, r.trim()))
            .unwrap_or((line, ""));
        if rest == "(" {
            block = Some(directive.to_string());
        } else if directive == "require" {
            requires.push(require_spec(rest, number + 1)?);
        }
    }
    Ok(requires)
}

fn require_spec(spec: &str, line: usize) -> Result<(String, String), GitfactsError> {
    let fields: Vec<&str> = spec.split_whitespace().collect();
    match fields.as_slice() {
        [path, version] => Ok((unquote(path), unquote(version))),
        _ => Err(GitfactsError::Parse(format!(
            "go.mod:{line}: malformed require {spec:?}"
        ))),
    }
}

fn strip_comment(line: &str) -> &str {
    match line.find("//") {
        Some(at) => &line[..at],
        None => line,
    }
}

fn unquote(token: &str) -> String {
    token
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .or_else(|| token.strip_prefix('`').and_then(|t| t.strip_suffix('`')))
        .unwrap_or(token)
        .to_string()
}
