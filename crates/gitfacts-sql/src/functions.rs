//! Scalar SQL helpers.

use gitfacts_core::{GitfactsError, ObjectId};
use rusqlite::functions::FunctionFlags;
use rusqlite::Connection;
use std::sync::Arc;

use crate::Environment;

/// Convert a YAML document to JSON text.
pub fn yaml_to_json(text: &str) -> Result<String, GitfactsError> {
    let value: serde_json::Value = serde_yaml::from_str(text)
        .map_err(|e| GitfactsError::Parse(format!("invalid yaml: {e}")))?;
    Ok(serde_json::to_string(&value)?)
}

/// Raw bytes of the blob named by `hash` in the registered repository.
pub fn read_blob(env: &Environment, hash: &str) -> Result<Vec<u8>, GitfactsError> {
    let id: ObjectId = hash.parse()?;
    env.open_repository()?.blob(id)
}

fn user_err(e: GitfactsError) -> rusqlite::Error {
    rusqlite::Error::UserFunctionError(Box::new(e))
}

pub(crate) fn register(conn: &Connection, env: &Arc<Environment>) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "yaml_to_json",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let text: String = ctx.get(0)?;
            yaml_to_json(&text).map_err(user_err)
        },
    )?;

    let env = Arc::clone(env);
    conn.create_scalar_function("read_blob", 1, FunctionFlags::SQLITE_UTF8, move |ctx| {
        let hash: String = ctx.get(0)?;
        read_blob(&env, &hash).map_err(user_err)
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_documents_become_json() {
        let json = yaml_to_json("name: app\nports:\n  - 80\n  - 443\nenabled: true\n").unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"name": "app", "ports": [80, 443], "enabled": true})
        );
    }

    #[test]
    fn scalar_documents() {
        assert_eq!(yaml_to_json("42").unwrap(), "42");
        assert_eq!(yaml_to_json("hello").unwrap(), "\"hello\"");
    }

    #[test]
    fn invalid_yaml_is_a_parse_error() {
        assert!(matches!(
            yaml_to_json("key: [unclosed"),
            Err(GitfactsError::Parse(_))
        ));
    }
}
