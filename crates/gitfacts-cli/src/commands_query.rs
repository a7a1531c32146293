//! `gitfacts query` — run SQL against the virtual tables.

use gitfacts_core::GitfactsConfig;
use gitfacts_scanner::Registry;
use gitfacts_sql::{register, Environment};
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use std::io::Write;
use std::path::Path;

use crate::OutputFormat;

pub(crate) fn cmd_query(
    config: &GitfactsConfig,
    repo: &Path,
    sql: &str,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let registry = Registry::from_config(&config.scanners)?;
    let conn = Connection::open_in_memory()?;
    register(&conn, Environment::new(repo, registry))?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let count = run_query(&conn, sql, format, &mut out)?;
    out.flush()?;
    tracing::debug!("query returned {} rows", count);
    Ok(())
}

/// Execute `sql` and write its rows to `out`. Returns the row count.
pub(crate) fn run_query(
    conn: &Connection,
    sql: &str,
    format: OutputFormat,
    out: &mut impl Write,
) -> anyhow::Result<usize> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

    if format == OutputFormat::Tsv {
        writeln!(out, "{}", columns.join("\t"))?;
    }

    let mut rows = stmt.query([])?;
    let mut count = 0;
    while let Some(row) = rows.next()? {
        let values = (0..columns.len())
            .map(|i| row.get_ref(i).map(to_json))
            .collect::<Result<Vec<_>, _>>()?;
        match format {
            OutputFormat::Json => {
                let object: serde_json::Map<String, serde_json::Value> =
                    columns.iter().cloned().zip(values).collect();
                writeln!(out, "{}", serde_json::Value::Object(object))?;
            }
            OutputFormat::Tsv => {
                let fields: Vec<String> = values.iter().map(tsv_field).collect();
                writeln!(out, "{}", fields.join("\t"))?;
            }
        }
        count += 1;
    }
    Ok(count)
}

fn to_json(value: ValueRef<'_>) -> serde_json::Value {
    match value {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(i) => i.into(),
        ValueRef::Real(f) => f.into(),
        ValueRef::Text(bytes) => String::from_utf8_lossy(bytes).into_owned().into(),
        ValueRef::Blob(bytes) => hex(bytes).into(),
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn tsv_field(value: &serde_json::Value) -> String {
    let text = match value {
        serde_json::Value::Null => return String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    text.replace('\\', "\\\\")
        .replace('\t', "\\t")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(sql: &str, format: OutputFormat) -> String {
        let conn = Connection::open_in_memory().unwrap();
        let mut out = Vec::new();
        run_query(&conn, sql, format, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn json_lines_keyed_by_column() {
        let out = render("SELECT 1 AS n, 'a' AS s, NULL AS z, x'00ff' AS b", OutputFormat::Json);
        let row: serde_json::Value = serde_json::from_str(out.trim()).unwrap();
        assert_eq!(row, serde_json::json!({"n": 1, "s": "a", "z": null, "b": "00ff"}));
    }

    #[test]
    fn tsv_has_header_and_escapes() {
        let out = render("SELECT 'a\tb' AS x, 2.5 AS y, NULL AS z", OutputFormat::Tsv);
        assert_eq!(out, "x\ty\tz\na\\tb\t2.5\t\n");
    }

    #[test]
    fn empty_results_print_only_the_header() {
        let out = render("SELECT 1 AS n WHERE 0", OutputFormat::Tsv);
        assert_eq!(out, "n\n");
        assert_eq!(render("SELECT 1 WHERE 0", OutputFormat::Json), "");
    }
}
