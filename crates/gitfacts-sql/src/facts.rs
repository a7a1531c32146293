//! The `facts` eponymous virtual table.
//!
//! Every query names one commit. The filter resolves it, runs the
//! extraction pipeline over its tree and the cursor walks the collected rows.

use gitfacts_core::{FactRow, GitfactsError, ObjectId};
use gitfacts_scanner::{FilePredicate, FileRule, Pipeline, ScannerPredicate, ScannerRule};
use rusqlite::vtab::{Context, IndexInfo, VTab, VTabConnection, VTabCursor, Values};
use std::marker::PhantomData;
use std::os::raw::c_int;
use std::sync::Arc;

use crate::plan::{self, sql_err, Candidate, ConstraintOp, IndexPlan, Op, PlanError, PlanOutput};
use crate::Environment;

const SCHEMA: &str = "CREATE TABLE x(\
    commit_hash TEXT, \
    file_name TEXT, \
    file_blob TEXT, \
    scanner TEXT, \
    key TEXT, \
    value TEXT\
)";

pub const COL_COMMIT_HASH: c_int = 0;
pub const COL_FILE_NAME: c_int = 1;
pub const COL_FILE_BLOB: c_int = 2;
pub const COL_SCANNER: c_int = 3;
pub const COL_KEY: c_int = 4;
pub const COL_VALUE: c_int = 5;

const COMMIT_COST: f64 = 10_000.0;
const COMMIT_ROWS: i64 = 10_000;

/// Decide which predicates the pipeline evaluates itself.
///
/// `commit_hash = ?` is mandatory. File and scanner constraints narrow the
/// scan; operators the pipeline cannot evaluate on those columns reject the
/// query, except the range hints SQLite derives from `GLOB`.
pub fn plan_scan(candidates: &[Candidate]) -> Result<PlanOutput, PlanError> {
    let mut out = PlanOutput::new(candidates.len());
    let mut commit = None;
    let mut unusable_commit = false;
    let mut narrowing = 1.0;

    for (i, c) in candidates.iter().enumerate() {
        if c.op.is_pseudo() {
            continue;
        }
        match c.column {
            COL_COMMIT_HASH => {
                if c.op != ConstraintOp::Eq {
                    return Err(PlanError::Rejected(format!(
                        "commit_hash only supports the = operator, got {:?}",
                        c.op
                    )));
                }
                if !c.usable {
                    unusable_commit = true;
                } else if commit.is_none() {
                    commit = Some(i);
                }
            }
            COL_FILE_NAME => match c.op {
                ConstraintOp::Eq | ConstraintOp::Glob => {
                    if c.usable {
                        let op = if c.op == ConstraintOp::Eq { Op::Eq } else { Op::Glob };
                        out.consume(i, op, COL_FILE_NAME, true);
                        narrowing *= 0.1;
                    }
                }
                ConstraintOp::Lt | ConstraintOp::Ge => {}
                other => {
                    return Err(PlanError::Rejected(format!(
                        "file_name only supports = and GLOB, got {other:?}"
                    )))
                }
            },
            COL_SCANNER => match c.op {
                ConstraintOp::Eq => {
                    if c.usable {
                        out.consume(i, Op::Eq, COL_SCANNER, true);
                        narrowing *= 0.2;
                    }
                }
                ConstraintOp::Like => {
                    if c.usable {
                        out.consume(i, Op::Like, COL_SCANNER, false);
                        narrowing *= 0.5;
                    }
                }
                other => {
                    return Err(PlanError::Rejected(format!(
                        "scanner only supports = and LIKE, got {other:?}"
                    )))
                }
            },
            _ => {}
        }
    }

    let Some(commit) = commit else {
        return Err(if unusable_commit {
            PlanError::Unusable("commit_hash value is not available for this plan".into())
        } else {
            PlanError::Rejected("commit_hash is required".into())
        });
    };
    // The commit bound goes first so its slot is always 1.
    out.plan.args.insert(0, plan::Bound { op: Op::Eq, column: COL_COMMIT_HASH });
    for usage in out.usages.iter_mut().flatten() {
        usage.argv_index += 1;
    }
    out.usages[commit] = Some(plan::Usage { argv_index: 1, omit: true });

    out.estimated_cost = COMMIT_COST * narrowing;
    out.estimated_rows = ((COMMIT_ROWS as f64) * narrowing).max(1.0) as i64;
    Ok(out)
}

#[repr(C)]
pub struct FactsTab {
    base: rusqlite::ffi::sqlite3_vtab,
    env: Arc<Environment>,
}

unsafe impl<'vtab> VTab<'vtab> for FactsTab {
    type Aux = Arc<Environment>;
    type Cursor = FactsCursor<'vtab>;

    fn connect(
        _db: &mut VTabConnection,
        aux: Option<&Self::Aux>,
        _args: &[&[u8]],
    ) -> rusqlite::Result<(String, Self)> {
        let env = aux
            .cloned()
            .ok_or_else(|| rusqlite::Error::ModuleError("facts: missing environment".into()))?;
        Ok((
            SCHEMA.to_owned(),
            Self {
                base: Default::default(),
                env,
            },
        ))
    }

    fn best_index(&self, info: &mut IndexInfo) -> rusqlite::Result<()> {
        let output = plan_scan(&plan::candidates(info))?;
        plan::apply(info, &output)
    }

    fn open(&'vtab mut self) -> rusqlite::Result<FactsCursor<'vtab>> {
        Ok(FactsCursor {
            base: Default::default(),
            env: Arc::clone(&self.env),
            rows: Vec::new(),
            position: 0,
            phantom: PhantomData,
        })
    }
}

#[repr(C)]
pub struct FactsCursor<'vtab> {
    base: rusqlite::ffi::sqlite3_vtab_cursor,
    env: Arc<Environment>,
    rows: Vec<FactRow>,
    position: usize,
    phantom: PhantomData<&'vtab FactsTab>,
}

/// Arguments decoded against an [`IndexPlan`].
struct Filter {
    commit: Option<ObjectId>,
    files: FilePredicate,
    scanners: ScannerPredicate,
    /// Some argument was NULL, which no row can satisfy.
    empty: bool,
}

impl Filter {
    fn decode(plan: &IndexPlan, args: &Values<'_>) -> rusqlite::Result<Self> {
        if args.len() != plan.args.len() {
            return Err(sql_err(GitfactsError::Internal(format!(
                "facts: plan binds {} arguments, got {}",
                plan.args.len(),
                args.len()
            ))));
        }
        let mut filter = Filter {
            commit: None,
            files: FilePredicate::any(),
            scanners: ScannerPredicate::any(),
            empty: false,
        };
        let (mut files, mut scanners) = (Vec::new(), Vec::new());
        for (i, bound) in plan.args.iter().enumerate() {
            let Some(value) = args.get::<Option<String>>(i)? else {
                filter.empty = true;
                continue;
            };
            match (bound.column, bound.op) {
                (COL_COMMIT_HASH, Op::Eq) => filter.commit = Some(value.parse().map_err(sql_err)?),
                (COL_FILE_NAME, Op::Eq) => files.push(FileRule::Equals(value)),
                (COL_FILE_NAME, Op::Glob) => files.push(FileRule::glob(&value).map_err(sql_err)?),
                (COL_SCANNER, Op::Eq) => scanners.push(ScannerRule::Equals(value)),
                (COL_SCANNER, Op::Like) => scanners.push(ScannerRule::Like(value)),
                (column, op) => {
                    return Err(sql_err(GitfactsError::Internal(format!(
                        "facts: unexpected bound {op:?} on column {column}"
                    ))))
                }
            }
        }
        filter.files = files.into_iter().fold(filter.files, FilePredicate::and);
        filter.scanners = scanners.into_iter().fold(filter.scanners, ScannerPredicate::and);
        Ok(filter)
    }
}

unsafe impl VTabCursor for FactsCursor<'_> {
    fn filter(
        &mut self,
        _idx_num: c_int,
        idx_str: Option<&str>,
        args: &Values<'_>,
    ) -> rusqlite::Result<()> {
        let plan = IndexPlan::decode(idx_str).map_err(sql_err)?;
        let filter = Filter::decode(&plan, args)?;
        self.rows.clear();
        self.position = 0;
        if filter.empty {
            return Ok(());
        }
        let commit = filter.commit.ok_or_else(|| {
            sql_err(GitfactsError::Validation("commit_hash is required".into()))
        })?;

        let ctx = self.env.token();
        let repo = self.env.open_repository().map_err(sql_err)?;
        let record = repo.resolve_commit(commit).map_err(sql_err)?;
        let files = repo.files(record.hash).map_err(sql_err)?;
        self.rows = Pipeline::new(self.env.registry())
            .with_files(filter.files)
            .with_scanners(filter.scanners)
            .run(&ctx, record.hash, files)
            .map_err(sql_err)?;
        tracing::debug!("facts: commit {} produced {} rows", commit, self.rows.len());
        Ok(())
    }

    fn next(&mut self) -> rusqlite::Result<()> {
        self.position += 1;
        Ok(())
    }

    fn eof(&self) -> bool {
        self.position >= self.rows.len()
    }

    fn column(&self, ctx: &mut Context, i: c_int) -> rusqlite::Result<()> {
        let Some(row) = self.rows.get(self.position) else {
            return Ok(());
        };
        match i {
            COL_COMMIT_HASH => ctx.set_result(&row.commit.to_string()),
            COL_FILE_NAME => ctx.set_result(&row.file_name),
            COL_FILE_BLOB => ctx.set_result(&row.file_blob.to_string()),
            COL_SCANNER => ctx.set_result(&row.scanner),
            COL_KEY => ctx.set_result(&row.key),
            COL_VALUE => {
                let json = serde_json::to_string(&row.value)
                    .map_err(|e| sql_err(GitfactsError::from(e)))?;
                ctx.set_result(&json)?;
                set_json_subtype(ctx);
                Ok(())
            }
            _ => Err(sql_err(GitfactsError::Internal(format!("facts: no column {i}")))),
        }
    }

    fn rowid(&self) -> rusqlite::Result<i64> {
        Ok(self.position as i64)
    }
}

/// Subtype SQLite's JSON functions use to recognize JSON text (`'J'`).
const JSON_SUBTYPE: std::os::raw::c_uint = 74;

// `vtab::Context` is a newtype over the raw `sqlite3_context` pointer.
const _: () = assert!(
    std::mem::size_of::<Context>() == std::mem::size_of::<*mut rusqlite::ffi::sqlite3_context>()
);

/// Tag the result already set on `ctx` as JSON.
fn set_json_subtype(ctx: &mut Context) {
    // SAFETY: `Context` holds exactly the `sqlite3_context` pointer SQLite
    // passed to xColumn, valid for the duration of this call.
    unsafe {
        let raw = *(ctx as *mut Context as *const *mut rusqlite::ffi::sqlite3_context);
        rusqlite::ffi::sqlite3_result_subtype(raw, JSON_SUBTYPE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{Bound, Usage};

    fn usable(column: c_int, op: ConstraintOp) -> Candidate {
        Candidate { column, op, usable: true }
    }

    fn unusable(column: c_int, op: ConstraintOp) -> Candidate {
        Candidate { column, op, usable: false }
    }

    fn rejection(candidates: &[Candidate]) -> String {
        match plan_scan(candidates) {
            Err(PlanError::Rejected(msg)) => msg,
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn commit_hash_is_required() {
        assert_eq!(rejection(&[]), "commit_hash is required");
        assert_eq!(
            rejection(&[usable(COL_FILE_NAME, ConstraintOp::Eq)]),
            "commit_hash is required"
        );
        assert_eq!(
            rejection(&[usable(COL_KEY, ConstraintOp::Eq), usable(-1, ConstraintOp::Limit)]),
            "commit_hash is required"
        );
    }

    #[test]
    fn commit_hash_rejects_other_operators() {
        for op in [ConstraintOp::Gt, ConstraintOp::Le, ConstraintOp::Like, ConstraintOp::Glob, ConstraintOp::Other] {
            let msg = rejection(&[usable(COL_COMMIT_HASH, op)]);
            assert!(msg.contains("commit_hash"), "{msg}");
        }
        // Even alongside a valid equality.
        rejection(&[usable(COL_COMMIT_HASH, ConstraintOp::Eq), usable(COL_COMMIT_HASH, ConstraintOp::Lt)]);
    }

    #[test]
    fn unusable_commit_hash_discards_only_this_plan() {
        assert!(matches!(
            plan_scan(&[unusable(COL_COMMIT_HASH, ConstraintOp::Eq)]),
            Err(PlanError::Unusable(_))
        ));
        let out = plan_scan(&[
            unusable(COL_COMMIT_HASH, ConstraintOp::Eq),
            usable(COL_COMMIT_HASH, ConstraintOp::Eq),
        ])
        .unwrap();
        assert_eq!(out.usages[0], None);
        assert_eq!(out.usages[1], Some(Usage { argv_index: 1, omit: true }));
    }

    #[test]
    fn commit_bound_always_takes_the_first_slot() {
        let out = plan_scan(&[
            usable(COL_FILE_NAME, ConstraintOp::Glob),
            usable(COL_SCANNER, ConstraintOp::Like),
            usable(COL_COMMIT_HASH, ConstraintOp::Eq),
        ])
        .unwrap();
        assert_eq!(
            out.plan.args,
            vec![
                Bound { op: Op::Eq, column: COL_COMMIT_HASH },
                Bound { op: Op::Glob, column: COL_FILE_NAME },
                Bound { op: Op::Like, column: COL_SCANNER },
            ]
        );
        assert_eq!(out.usages[2], Some(Usage { argv_index: 1, omit: true }));
        assert_eq!(out.usages[0], Some(Usage { argv_index: 2, omit: true }));
        // LIKE is re-checked by SQLite.
        assert_eq!(out.usages[1], Some(Usage { argv_index: 3, omit: false }));
    }

    #[test]
    fn glob_range_hints_are_ignored() {
        let out = plan_scan(&[
            usable(COL_COMMIT_HASH, ConstraintOp::Eq),
            usable(COL_FILE_NAME, ConstraintOp::Ge),
            usable(COL_FILE_NAME, ConstraintOp::Lt),
        ])
        .unwrap();
        assert_eq!(out.plan.args.len(), 1);
        assert_eq!(out.usages[1], None);
        assert_eq!(out.usages[2], None);
    }

    #[test]
    fn unsupported_file_and_scanner_operators_are_rejected() {
        let commit = usable(COL_COMMIT_HASH, ConstraintOp::Eq);
        assert!(rejection(&[commit, usable(COL_FILE_NAME, ConstraintOp::Like)]).contains("file_name"));
        assert!(rejection(&[commit, usable(COL_FILE_NAME, ConstraintOp::Gt)]).contains("file_name"));
        assert!(rejection(&[commit, usable(COL_SCANNER, ConstraintOp::Glob)]).contains("scanner"));
    }

    #[test]
    fn unusable_optional_constraints_are_skipped() {
        let out = plan_scan(&[
            usable(COL_COMMIT_HASH, ConstraintOp::Eq),
            unusable(COL_FILE_NAME, ConstraintOp::Eq),
            unusable(COL_SCANNER, ConstraintOp::Like),
        ])
        .unwrap();
        assert_eq!(out.plan.args.len(), 1);
        assert!(out.usages[1..].iter().all(Option::is_none));
    }

    #[test]
    fn narrower_plans_are_cheaper() {
        let commit = usable(COL_COMMIT_HASH, ConstraintOp::Eq);
        let broad = plan_scan(&[commit]).unwrap();
        let narrow = plan_scan(&[commit, usable(COL_FILE_NAME, ConstraintOp::Eq)]).unwrap();
        assert!(narrow.estimated_cost < broad.estimated_cost);
        assert!(!broad.unique);
    }
}
