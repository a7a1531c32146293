//! Queries against real repositories through an in-memory SQLite connection.

use chrono::DateTime;
use crossbeam_channel::Sender;
use gitfacts_core::{CancelToken, Fact, File, GitfactsError, ObjectId};
use gitfacts_git::fixture::RepoBuilder;
use gitfacts_git::{HistoryOptions, Repository};
use gitfacts_scanner::scanners::{dockerfile::DockerfileScanner, files::FileMetaScanner, golang::GoModScanner};
use gitfacts_scanner::{Registry, Scanner};
use gitfacts_sql::{register, Environment, InterruptHandle};
use rusqlite::{params, Connection};
use serde_json::{json, Value};
use std::time::Duration;
use tempfile::TempDir;

const T0: i64 = 1_700_000_000;

struct Fixture {
    dir: TempDir,
    conn: Connection,
    interrupt: InterruptHandle,
}

fn fixture(registry: Registry, build: impl FnOnce(&RepoBuilder)) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let builder = RepoBuilder::init(dir.path()).unwrap();
    build(&builder);
    let conn = Connection::open_in_memory().unwrap();
    let interrupt = register(&conn, Environment::new(dir.path(), registry)).unwrap();
    Fixture { dir, conn, interrupt }
}

fn builtin(build: impl FnOnce(&RepoBuilder)) -> Fixture {
    fixture(Registry::builtin().unwrap(), build)
}

fn strings(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, |r| r.get::<_, String>(0))?;
    rows.collect()
}

fn rfc3339(seconds: i64) -> String {
    DateTime::from_timestamp(seconds, 0)
        .unwrap()
        .to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

/// Main-line commits 100s apart, a side branch and the merge joining them.
fn history(builder: &RepoBuilder) -> Vec<ObjectId> {
    let mut ids = Vec::new();
    for i in 0..3 {
        let content = format!("v{i}");
        ids.push(builder.commit(&format!("c{i}"), T0 + i * 100, &[("a.txt", content.as_str())]).unwrap());
    }
    let side = builder
        .commit_detached("side", T0 + 250, &[ids[2]], &[("b.txt", "side")])
        .unwrap();
    ids.push(side);
    ids.push(builder.commit("c3", T0 + 300, &[("a.txt", "v3")]).unwrap());
    ids.push(builder.merge("merge", T0 + 400, side, &[("a.txt", "v3"), ("b.txt", "side")]).unwrap());
    ids
}

// ── commits ─────────────────────────────────────────────────────────────────

#[test]
fn commits_are_newest_first_and_match_a_history_walk() {
    let f = builtin(|b| {
        history(b);
    });
    let mut stmt = f.conn.prepare("SELECT hash, author_when, parents FROM commits").unwrap();
    let rows: Vec<(String, String, i64)> = stmt
        .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();

    let times: Vec<_> = rows
        .iter()
        .map(|(_, when, _)| DateTime::parse_from_rfc3339(when).unwrap())
        .collect();
    assert!(times.windows(2).all(|w| w[0] >= w[1]), "{times:?}");

    let walk: Vec<String> = Repository::open(f.dir.path())
        .unwrap()
        .history(HistoryOptions::default())
        .unwrap()
        .map(|r| r.unwrap().hash.to_string())
        .collect();
    let hashes: Vec<String> = rows.iter().map(|(h, _, _)| h.clone()).collect();
    assert_eq!(hashes, walk);
    assert_eq!(rows.len(), 6);
    assert_eq!(rows[0].2, 2, "the merge has two parents");
}

#[test]
fn commit_columns() {
    let f = builtin(|b| {
        b.commit_at("hello\n\nbody", T0, 120, &[("a.txt", "a")]).unwrap();
    });
    let (message, name, email, when): (String, String, String, String) = f
        .conn
        .query_row(
            "SELECT message, author_name, author_email, author_when FROM commits",
            [],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
        )
        .unwrap();
    assert_eq!(message, "hello\n\nbody");
    assert_eq!(name, gitfacts_git::fixture::AUTHOR_NAME);
    assert_eq!(email, gitfacts_git::fixture::AUTHOR_EMAIL);
    assert_eq!(when, "2023-11-15T00:13:20+02:00");
}

#[test]
fn hash_lookup_returns_at_most_one_row() {
    let mut ids = Vec::new();
    let f = builtin(|b| ids = history(b));
    let count = |hash: &str| -> rusqlite::Result<i64> {
        f.conn
            .query_row("SELECT count(*) FROM commits WHERE hash = ?1", [hash], |r| r.get(0))
    };

    for id in &ids {
        assert_eq!(count(&id.to_string()).unwrap(), 1);
    }
    assert_eq!(count(&"0".repeat(40)).unwrap(), 0);

    // A blob is a well-formed hash of the wrong kind.
    let blob = Repository::open(f.dir.path())
        .unwrap()
        .files(ids[0])
        .unwrap()
        .next()
        .unwrap()
        .unwrap()
        .blob;
    assert_eq!(count(&blob.to_string()).unwrap(), 0);

    let err = count("not-a-hash").unwrap_err();
    assert!(err.to_string().contains("invalid hash"), "{err}");
}

#[test]
fn hash_lookup_respects_time_bounds() {
    let mut ids = Vec::new();
    let f = builtin(|b| ids = history(b));
    let count: i64 = f
        .conn
        .query_row(
            "SELECT count(*) FROM commits WHERE hash = ?1 AND author_when >= ?2",
            params![ids[0].to_string(), rfc3339(T0 + 1)],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(count, 0);
}

#[test]
fn time_range_is_inclusive_and_exact() {
    let mut ids = Vec::new();
    let f = builtin(|b| ids = history(b));
    let hashes = strings(
        &f.conn,
        "SELECT hash FROM commits WHERE author_when <= ?1 AND author_when >= ?2",
        params![rfc3339(T0 + 300), rfc3339(T0 + 100)],
    )
    .unwrap();
    // c3, side, c2, c1
    let expected: Vec<String> = [4, 3, 2, 1].iter().map(|&i| ids[i].to_string()).collect();
    assert_eq!(hashes, expected);

    // The same instant written in another offset selects the same rows.
    let shifted = DateTime::from_timestamp(T0 + 300, 0)
        .unwrap()
        .with_timezone(&chrono::FixedOffset::west_opt(5 * 3600).unwrap())
        .to_rfc3339();
    let again = strings(
        &f.conn,
        "SELECT hash FROM commits WHERE author_when <= ?1 AND author_when >= ?2",
        params![shifted, rfc3339(T0 + 100)],
    )
    .unwrap();
    assert_eq!(again, expected);
}

#[test]
fn ordered_queries_keep_history_order() {
    let mut ids = Vec::new();
    let f = builtin(|b| ids = history(b));
    let hashes = strings(&f.conn, "SELECT hash FROM commits ORDER BY author_when DESC LIMIT 2", []).unwrap();
    assert_eq!(hashes, vec![ids[5].to_string(), ids[4].to_string()]);
}

#[test]
fn time_range_sees_past_a_cherry_picked_commit() {
    let f = builtin(|b| {
        b.commit("root", T0, &[("a.txt", "1")]).unwrap();
        b.commit("newer", T0 + 1000, &[("a.txt", "2")]).unwrap();
        // Keeps an author date older than its parent's.
        b.commit("picked", T0 + 200, &[("a.txt", "3")]).unwrap();
    });
    let messages = strings(
        &f.conn,
        "SELECT message FROM commits WHERE author_when >= ?1 AND author_when <= ?2",
        params![rfc3339(T0 + 500), rfc3339(T0 + 2000)],
    )
    .unwrap();
    assert_eq!(messages, vec!["newer"]);

    let ordered = strings(&f.conn, "SELECT message FROM commits ORDER BY author_when DESC", []).unwrap();
    assert_eq!(ordered, vec!["newer", "picked", "root"]);
    let limited = strings(
        &f.conn,
        "SELECT message FROM commits WHERE author_when <= ?1 ORDER BY author_when DESC LIMIT 1",
        [rfc3339(T0 + 500)],
    )
    .unwrap();
    assert_eq!(limited, vec!["picked"]);
}

#[test]
fn malformed_timestamp_is_a_validation_error() {
    let f = builtin(|b| {
        history(b);
    });
    let err = strings(&f.conn, "SELECT hash FROM commits WHERE author_when >= ?1", ["last tuesday"])
        .unwrap_err();
    assert!(err.to_string().contains("invalid timestamp"), "{err}");
}

// ── facts ───────────────────────────────────────────────────────────────────

fn service_tree(builder: &RepoBuilder) -> ObjectId {
    builder
        .commit(
            "service",
            T0,
            &[
                ("Dockerfile", "FROM golang:1.20 AS builder\nEXPOSE 8080\n"),
                ("go.mod", "module example.com/app\n\nrequire example.com/x v1.2.3\n"),
                ("package.json", r#"{"dependencies": {"left-pad": "1.3.0"}}"#),
                ("web/package.json", r#"{"dependencies": {"react": "18.2.0"}}"#),
                ("web/tsconfig.json", "{}"),
                ("web/src/index.ts", "export {};\n"),
                ("deploy/app.yaml", "replicas: 2\n"),
            ],
        )
        .unwrap()
}

fn values(f: &Fixture, commit: &ObjectId, key: &str) -> Vec<Value> {
    strings(
        &f.conn,
        "SELECT value FROM facts WHERE commit_hash = ?1 AND key = ?2",
        params![commit.to_string(), key],
    )
    .unwrap()
    .iter()
    .map(|v| serde_json::from_str(v).unwrap())
    .collect()
}

#[test]
fn facts_require_a_commit_hash_at_plan_time() {
    let f = builtin(|b| {
        service_tree(b);
    });
    for sql in [
        "SELECT * FROM facts",
        "SELECT * FROM facts WHERE file_name = 'go.mod'",
        "SELECT * FROM facts WHERE key LIKE '@golang/%'",
    ] {
        let err = f.conn.prepare(sql).err().unwrap_or_else(|| panic!("{sql} planned"));
        assert!(err.to_string().contains("commit_hash is required"), "{sql}: {err}");
    }
    for sql in [
        "SELECT * FROM facts WHERE commit_hash > 'a'",
        "SELECT * FROM facts WHERE commit_hash LIKE 'a%'",
        "SELECT * FROM facts WHERE commit_hash GLOB 'a*'",
    ] {
        let err = f.conn.prepare(sql).err().unwrap_or_else(|| panic!("{sql} planned"));
        assert!(err.to_string().contains("commit_hash only supports"), "{sql}: {err}");
    }
}

#[test]
fn dockerfile_base_image() {
    let mut commit = None;
    let f = builtin(|b| commit = Some(service_tree(b)));
    let commit = commit.unwrap();
    assert_eq!(
        values(&f, &commit, "@docker/dockerfile/base-image"),
        vec![json!({"name": "golang", "tag": "1.20", "alias": "builder"})]
    );
    assert_eq!(
        values(&f, &commit, "@docker/dockerfile/exposed-port"),
        vec![json!({"port": "8080", "protocol": "tcp"})]
    );
}

#[test]
fn go_mod_require() {
    let mut commit = None;
    let f = builtin(|b| commit = Some(service_tree(b)));
    assert_eq!(
        values(&f, &commit.unwrap(), "@golang/mod/require"),
        vec![json!({"path": "example.com/x", "version": "v1.2.3"})]
    );
}

#[test]
fn fact_values_are_tagged_as_json() {
    let mut commit = None;
    let f = builtin(|b| commit = Some(service_tree(b)));
    let wrapped = strings(
        &f.conn,
        "SELECT json_object('v', value) FROM facts WHERE commit_hash = ?1 AND scanner = 'golang/mod'",
        [commit.unwrap().to_string()],
    )
    .unwrap();
    assert_eq!(wrapped, vec![r#"{"v":{"path":"example.com/x","version":"v1.2.3"}}"#]);
}

#[test]
fn fact_rows_identify_their_file() {
    let mut commit = None;
    let f = builtin(|b| commit = Some(service_tree(b)));
    let commit = commit.unwrap();
    let repo = Repository::open(f.dir.path()).unwrap();

    let mut stmt = f
        .conn
        .prepare("SELECT commit_hash, file_name, file_blob, scanner FROM facts WHERE commit_hash = ?1")
        .unwrap();
    let rows: Vec<(String, String, String, String)> = stmt
        .query_map([commit.to_string()], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert!(!rows.is_empty());
    for file in repo.files(commit).unwrap() {
        let file = file.unwrap();
        for (hash, _, blob, _) in rows.iter().filter(|(_, name, _, _)| *name == file.name) {
            assert_eq!(*hash, commit.to_string());
            assert_eq!(*blob, file.blob.to_string());
        }
    }
}

#[test]
fn glob_selects_exactly_the_matching_files() {
    let mut commit = None;
    let f = builtin(|b| commit = Some(service_tree(b)));
    let commit = commit.unwrap().to_string();
    let files = |pattern: &str| {
        strings(
            &f.conn,
            "SELECT file_name FROM facts WHERE commit_hash = ?1 AND file_name GLOB ?2 AND scanner = 'files' ORDER BY file_name",
            params![commit, pattern],
        )
        .unwrap()
    };

    assert_eq!(
        files("**/*.json"),
        vec!["package.json", "web/package.json", "web/tsconfig.json"]
    );
    assert_eq!(files("*.json"), vec!["package.json"]);
    assert_eq!(files("web/**"), vec!["web/package.json", "web/src/index.ts", "web/tsconfig.json"]);
    assert_eq!(files("**/*.{yaml,mod}"), vec!["deploy/app.yaml", "go.mod"]);
    assert!(files("*.rs").is_empty());

    let exact = strings(
        &f.conn,
        "SELECT key FROM facts WHERE commit_hash = ?1 AND file_name = 'web/package.json' ORDER BY key",
        [&commit],
    )
    .unwrap();
    assert_eq!(exact, vec!["@files/meta", "@node/npm/dependency"]);
}

#[test]
fn scanner_constraints_prune_dispatch() {
    let mut commit = None;
    let f = builtin(|b| commit = Some(service_tree(b)));
    let commit = commit.unwrap().to_string();

    let scanners = |sql: &str| {
        let mut names = strings(&f.conn, sql, [&commit]).unwrap();
        names.dedup();
        names
    };
    assert_eq!(
        scanners("SELECT scanner FROM facts WHERE commit_hash = ?1 AND scanner = 'golang/mod'"),
        vec!["golang/mod"]
    );
    assert_eq!(
        scanners("SELECT DISTINCT scanner FROM facts WHERE commit_hash = ?1 AND scanner LIKE 'NODE/%' ORDER BY 1"),
        vec!["node/npm/package-json"]
    );
}

#[test]
fn facts_join_commits() {
    let f = builtin(|b| {
        b.commit("one", T0, &[("go.mod", "module m\nrequire example.com/a v1.0.0\n")]).unwrap();
        b.commit("two", T0 + 60, &[("go.mod", "module m\nrequire example.com/a v1.1.0\n")]).unwrap();
    });
    let versions = strings(
        &f.conn,
        "SELECT json_extract(f.value, '$.version') FROM commits c \
         JOIN facts f ON f.commit_hash = c.hash \
         WHERE f.key = '@golang/mod/require' ORDER BY c.author_when",
        [],
    )
    .unwrap();
    assert_eq!(versions, vec!["v1.0.0", "v1.1.0"]);
}

#[test]
fn unknown_or_non_commit_hash_fails_the_facts_query() {
    let mut commit = None;
    let f = builtin(|b| commit = Some(service_tree(b)));
    let query = |hash: String| strings(&f.conn, "SELECT key FROM facts WHERE commit_hash = ?1", [hash]);

    let err = query("zz".into()).unwrap_err();
    assert!(err.to_string().contains("invalid hash"), "{err}");

    let err = query("1".repeat(40)).unwrap_err();
    assert!(err.to_string().contains("not found"), "{err}");

    let tree = Repository::open(f.dir.path()).unwrap();
    let blob = tree.files(commit.unwrap()).unwrap().next().unwrap().unwrap().blob;
    let err = query(blob.to_string()).unwrap_err();
    assert!(err.to_string().contains("is not a commit"), "{err}");
}

/// Fails on one file name.
struct Failing;

impl Scanner for Failing {
    fn name(&self) -> &str {
        "test/failing"
    }

    fn supports(&self, file: &File<'_>) -> bool {
        file.name == "bad.txt"
    }

    fn scan(&self, _ctx: &CancelToken, _file: &File<'_>) -> Result<Vec<Fact>, GitfactsError> {
        Err(GitfactsError::Parse("cannot read bad.txt".into()))
    }
}

#[test]
fn a_failing_scanner_aborts_the_query() {
    let mut registry = Registry::new();
    registry.register(Box::new(FileMetaScanner)).unwrap();
    registry.register(Box::new(GoModScanner)).unwrap();
    registry.register(Box::new(Failing)).unwrap();
    let mut commit = None;
    let f = fixture(registry, |b| {
        commit = Some(
            b.commit(
                "mixed",
                T0,
                &[("a.txt", "a"), ("bad.txt", "x"), ("go.mod", "module m\nrequire example.com/x v1.0.0\n")],
            )
            .unwrap(),
        )
    });

    let err = strings(
        &f.conn,
        "SELECT key FROM facts WHERE commit_hash = ?1",
        [commit.unwrap().to_string()],
    )
    .unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("test/failing"), "{msg}");
    assert!(msg.contains("bad.txt"), "{msg}");
}

/// Reports that the query reached the file it is offered, then steps aside.
struct Started {
    started: Sender<()>,
}

impl Scanner for Started {
    fn name(&self) -> &str {
        "test/started"
    }

    fn supports(&self, file: &File<'_>) -> bool {
        file.name == "Dockerfile"
    }

    fn scan(&self, _ctx: &CancelToken, _file: &File<'_>) -> Result<Vec<Fact>, GitfactsError> {
        let _ = self.started.send(());
        Ok(Vec::new())
    }
}

#[test]
fn interrupt_cancels_dockerfile_extraction() {
    let (started, started_rx) = crossbeam_channel::unbounded();
    let mut registry = Registry::new();
    registry.register(Box::new(Started { started })).unwrap();
    registry.register(Box::new(DockerfileScanner)).unwrap();
    let mut commit = None;
    let f = fixture(registry, |b| {
        let froms: String = (0..100_000).map(|i| format!("FROM image{i}:3\n")).collect();
        commit = Some(b.commit("big", T0, &[("Dockerfile", froms.as_str())]).unwrap())
    });

    let interrupt = f.interrupt.clone();
    let canceller = std::thread::spawn(move || {
        started_rx.recv_timeout(Duration::from_secs(30)).unwrap();
        interrupt.interrupt();
    });

    let started = std::time::Instant::now();
    let err = strings(
        &f.conn,
        "SELECT key FROM facts WHERE commit_hash = ?1",
        [commit.unwrap().to_string()],
    )
    .unwrap_err();
    canceller.join().unwrap();

    assert!(err.to_string().contains("cancelled"), "{err}");
    assert!(!err.to_string().contains("malformed"), "{err}");
    assert!(started.elapsed() < Duration::from_secs(10));

    // Later queries are unaffected.
    let err = strings(&f.conn, "SELECT key FROM facts WHERE commit_hash = ?1", ["x"]).unwrap_err();
    assert!(!err.to_string().contains("cancelled"), "{err}");
}

// ── functions ───────────────────────────────────────────────────────────────

#[test]
fn yaml_to_json_function() {
    let f = builtin(|b| {
        service_tree(b);
    });
    let json: String = f
        .conn
        .query_row("SELECT yaml_to_json('a: 1\nb: [x, y]')", [], |r| r.get(0))
        .unwrap();
    assert_eq!(serde_json::from_str::<Value>(&json).unwrap(), json!({"a": 1, "b": ["x", "y"]}));

    let err = f
        .conn
        .query_row("SELECT yaml_to_json('a: [')", [], |r| r.get::<_, String>(0))
        .unwrap_err();
    assert!(err.to_string().contains("invalid yaml"), "{err}");
}

#[test]
fn read_blob_function() {
    let mut commit = None;
    let f = builtin(|b| commit = Some(service_tree(b)));
    let commit = commit.unwrap();

    let (blob, content): (String, Vec<u8>) = f
        .conn
        .query_row(
            "SELECT file_blob, read_blob(file_blob) FROM facts \
             WHERE commit_hash = ?1 AND file_name = 'deploy/app.yaml' AND scanner = 'files'",
            [commit.to_string()],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .unwrap();
    assert_eq!(content, b"replicas: 2\n");

    let json: String = f
        .conn
        .query_row("SELECT yaml_to_json(CAST(read_blob(?1) AS TEXT))", [&blob], |r| r.get(0))
        .unwrap();
    assert_eq!(json, r#"{"replicas":2}"#);

    let read = |hash: String| {
        f.conn
            .query_row("SELECT read_blob(?1)", [hash], |r| r.get::<_, Vec<u8>>(0))
            .unwrap_err()
            .to_string()
    };
    let missing = "2".repeat(40);
    assert!(read(missing.clone()).contains(&format!("blob with hash \"{missing}\" not found")));
    assert!(read(commit.to_string()).contains("is not a blob"));
    assert!(read("nope".into()).contains("invalid hash"));
}
