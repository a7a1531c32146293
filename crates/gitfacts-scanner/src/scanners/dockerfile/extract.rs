//! Extraction routines over a parsed Dockerfile. Each runs on its own thread.

use gitfacts_core::{Fact, GitfactsError};
use serde_json::json;

use super::parser::ERROR;
use crate::fanout::Emitter;
use crate::syntax::{find, Node, SyntaxTree};

pub const KEY_BASE_IMAGE: &str = "@docker/dockerfile/base-image";
pub const KEY_EXPOSED_PORT: &str = "@docker/dockerfile/exposed-port";
pub const KEY_LABEL: &str = "@docker/dockerfile/label";

fn malformed(tree: &SyntaxTree, node: &Node) -> GitfactsError {
    GitfactsError::Parse(format!(
        "malformed dockerfile at line {}: {:?}",
        tree.line(node),
        tree.text(node)
    ))
}

/// One `@docker/dockerfile/base-image` per `FROM`. Every image must name a
/// tag or a digest.
pub fn base_images(tree: &SyntaxTree, out: &Emitter) -> Result<(), GitfactsError> {
    for from in find(tree.root(), |n| n.kind() == "from_instruction") {
        let specs = find(from, |n| n.kind() == "image_spec");
        let [spec] = specs.as_slice() else {
            return Err(malformed(tree, from));
        };
        if from.children_of_kind(ERROR).next().is_some() {
            return Err(malformed(tree, from));
        }
        let name = spec
            .child_by_field_name("name")
            .ok_or_else(|| malformed(tree, from))?;

        // A pinned digest wins over the tag.
        let version = match (spec.child_by_field_name("digest"), spec.child_by_field_name("tag")) {
            (Some(digest), _) => ("digest", tree.text(digest).trim_start_matches('@')),
            (None, Some(tag)) => ("tag", tree.text(tag).trim_start_matches(':')),
            (None, None) => return Err(malformed(tree, from)),
        };

        let mut value = json!({ "name": tree.text(name) });
        value[version.0] = json!(version.1);
        if let Some(alias) = from.child_by_field_name("as") {
            value["alias"] = json!(tree.text(alias));
        }
        out.emit(Fact::new(KEY_BASE_IMAGE, value))?;
    }
    Ok(())
}

/// One `@docker/dockerfile/exposed-port` per literal port of every `EXPOSE`.
pub fn exposed_ports(tree: &SyntaxTree, out: &Emitter) -> Result<(), GitfactsError> {
    for expose in find(tree.root(), |n| n.kind() == "expose_instruction") {
        for child in expose.children() {
            match child.kind() {
                "expose_port" => {
                    let port = child
                        .child_by_field_name("port")
                        .ok_or_else(|| malformed(tree, child))?;
                    let protocol = child
                        .child_by_field_name("protocol")
                        .map(|p| tree.text(p).to_ascii_lowercase())
                        .unwrap_or_else(|| "tcp".to_string());
                    out.emit(Fact::new(
                        KEY_EXPOSED_PORT,
                        json!({ "port": tree.text(port), "protocol": protocol }),
                    ))?;
                }
                "expansion" => {}
                _ => return Err(malformed(tree, child)),
            }
        }
    }
    Ok(())
}

/// One `@docker/dockerfile/label` per `LABEL` key.
pub fn labels(tree: &SyntaxTree, out: &Emitter) -> Result<(), GitfactsError> {
    for label in find(tree.root(), |n| n.kind() == "label_instruction") {
        for pair in label.children() {
            let (Some(key), Some(value)) = (
                pair.child_by_field_name("key"),
                pair.child_by_field_name("value"),
            ) else {
                return Err(malformed(tree, pair));
            };
            out.emit(Fact::new(
                KEY_LABEL,
                json!({ "key": unquote(tree.text(key)), "value": unquote(tree.text(value)) }),
            ))?;
        }
    }
    Ok(())
}

fn unquote(text: &str) -> String {
    if let Some(inner) = text.strip_prefix('"').and_then(|t| t.strip_suffix('"')) {
        return inner.replace("\\\"", "\"");
    }
    text.strip_prefix('\'')
        .and_then(|t| t.strip_suffix('\''))
        .unwrap_or(text)
        .to_string()
}
