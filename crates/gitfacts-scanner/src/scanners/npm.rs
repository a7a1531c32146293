//! npm manifests: `package.json` and `package-lock.json`.

use gitfacts_core::{CancelToken, Fact, File, GitfactsError};
use serde_json::{json, Map, Value};

pub const KEY_DEPENDENCY: &str = "@node/npm/dependency";
pub const KEY_DEPENDENCY_LOCKED: &str = "@node/npm/dependency-locked";

fn parse_json(file: &File<'_>) -> Result<Map<String, Value>, GitfactsError> {
    let value: Value = serde_json::from_slice(&file.contents()?)
        .map_err(|e| GitfactsError::Parse(format!("{}: invalid JSON: {e}", file.name)))?;
    match value {
        Value::Object(obj) => Ok(obj),
        _ => Err(GitfactsError::Parse(format!(
            "{}: expected a JSON object",
            file.name
        ))),
    }
}

// ── package.json ────────────────────────────────────────────────────────────

/// Emits declared dependencies, flagging dev and peer dependencies.
pub struct PackageJsonScanner;

impl crate::Scanner for PackageJsonScanner {
    fn name(&self) -> &str {
        "node/npm/package-json"
    }

    fn supports(&self, file: &File<'_>) -> bool {
        file.base_name() == "package.json"
    }

    fn scan(&self, ctx: &CancelToken, file: &File<'_>) -> Result<Vec<Fact>, GitfactsError> {
        ctx.check()?;
        let obj = parse_json(file)?;
        let mut facts = Vec::new();

        for (section, flag) in [
            ("dependencies", None),
            ("devDependencies", Some("dev")),
            ("peerDependencies", Some("peer")),
        ] {
            let Some(deps) = obj.get(section).and_then(|v| v.as_object()) else {
                continue;
            };
            for (name, version) in deps {
                let Some(version) = version.as_str() else {
                    tracing::warn!("{}: {section}.{name} has a non-string version", file.name);
                    continue;
                };
                let mut value = json!({ "name": name, "version": version });
                if let Some(flag) = flag {
                    value[flag] = Value::Bool(true);
                }
                facts.push(Fact::new(KEY_DEPENDENCY, value));
            }
        }
        Ok(facts)
    }
}

// ── package-lock.json ───────────────────────────────────────────────────────

/// Emits every resolved package of a lockfile.
pub struct PackageLockScanner;

impl crate::Scanner for PackageLockScanner {
    fn name(&self) -> &str {
        "node/npm/package-lock"
    }

    fn supports(&self, file: &File<'_>) -> bool {
        file.base_name() == "package-lock.json"
    }

    fn scan(&self, ctx: &CancelToken, file: &File<'_>) -> Result<Vec<Fact>, GitfactsError> {
        ctx.check()?;
        let obj = parse_json(file)?;
        let mut facts = Vec::new();

        match obj.get("packages").and_then(|v| v.as_object()) {
            Some(packages) => {
                // lockfileVersion 2 and 3; "" is the root project.
                for (path, entry) in packages.iter().filter(|(path, _)| !path.is_empty()) {
                    facts.push(locked(path, entry));
                }
            }
            None => {
                if let Some(deps) = obj.get("dependencies").and_then(|v| v.as_object()) {
                    collect_v1("", deps, &mut facts);
                }
            }
        }
        Ok(facts)
    }
}

fn locked(path: &str, entry: &Value) -> Fact {
    let field = |name: &str| entry.get(name).and_then(|v| v.as_str()).unwrap_or("");
    Fact::new(
        KEY_DEPENDENCY_LOCKED,
        json!({
            "path": path,
            "version": field("version"),
            "resolved": field("resolved"),
            "integrity": field("integrity"),
        }),
    )
}

/// Lockfile v1 nests transitive dependencies under each entry.
fn collect_v1(prefix: &str, deps: &Map<String, Value>, facts: &mut Vec<Fact>) {
    for (name, entry) in deps {
        let path = format!("{prefix}node_modules/{name}");
        facts.push(locked(&path, entry));
        if let Some(nested) = entry.get("dependencies").and_then(|v| v.as_object()) {
            collect_v1(&format!("{path}/"), nested, facts);
        }
    }
}
