//! `rust/cargo`: dependencies declared in `Cargo.toml`.

use gitfacts_core::{CancelToken, Fact, File, GitfactsError};
use serde_json::{json, Value};

pub const KEY_DEPENDENCY: &str = "@rust/cargo/dependency";

/// Emits one fact per dependency, flagging dev and build dependencies.
pub struct CargoManifestScanner;

impl crate::Scanner for CargoManifestScanner {
    fn name(&self) -> &str {
        "rust/cargo"
    }

    fn supports(&self, file: &File<'_>) -> bool {
        file.base_name() == "Cargo.toml"
    }

    fn scan(&self, ctx: &CancelToken, file: &File<'_>) -> Result<Vec<Fact>, GitfactsError> {
        ctx.check()?;
        let content = super::text(file.contents()?);
        let manifest: toml::Value = toml::from_str(&content)
            .map_err(|e| GitfactsError::Parse(format!("{}: invalid TOML: {e}", file.name)))?;
        let Some(table) = manifest.as_table() else {
            return Ok(Vec::new());
        };

        let mut facts = Vec::new();
        collect(table, &mut facts);

        // [target.'cfg(unix)'.dependencies] and friends
        if let Some(targets) = table.get("target").and_then(|v| v.as_table()) {
            for target in targets.values().filter_map(|v| v.as_table()) {
                collect(target, &mut facts);
            }
        }
        Ok(facts)
    }
}

fn collect(table: &toml::Table, facts: &mut Vec<Fact>) {
    for (section, flag) in [
        ("dependencies", None),
        ("dev-dependencies", Some("dev")),
        ("build-dependencies", Some("build")),
    ] {
        let Some(deps) = table.get(section).and_then(|v| v.as_table()) else {
            continue;
        };
        for (name, spec) in deps {
            let mut value = json!({ "name": name, "version": dependency_version(spec) });
            if let Some(flag) = flag {
                value[flag] = Value::Bool(true);
            }
            if spec.get("workspace").and_then(|v| v.as_bool()) == Some(true) {
                value["workspace"] = Value::Bool(true);
            }
            facts.push(Fact::new(KEY_DEPENDENCY, value));
        }
    }
}

/// Version requirement of a dependency.
/// Handles both `"1.0"` (string) and `{ version = "1.0", ... }` (table) forms.
fn dependency_version(spec: &toml::Value) -> String {
    match spec {
        toml::Value::String(s) => s.clone(),
        toml::Value::Table(t) => t
            .get("version")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string(),
        _ => String::new(),
    }
}
