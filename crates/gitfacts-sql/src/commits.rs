//! The `commits` eponymous virtual table.

use chrono::{DateTime, FixedOffset, SecondsFormat};
use gitfacts_core::{CommitRecord, GitfactsError, ObjectId};
use gitfacts_git::{History, HistoryOptions};
use rusqlite::vtab::{Context, IndexInfo, VTab, VTabConnection, VTabCursor, Values};
use std::marker::PhantomData;
use std::os::raw::c_int;
use std::sync::Arc;

use crate::plan::{self, sql_err, Candidate, ConstraintOp, IndexPlan, Op, OrderBy, PlanError, PlanOutput};
use crate::Environment;

const SCHEMA: &str = "CREATE TABLE x(\
    hash TEXT, \
    message TEXT, \
    author_name TEXT, \
    author_email TEXT, \
    author_when TEXT, \
    parents INT, \
    PRIMARY KEY(hash)\
) WITHOUT ROWID";

pub const COL_HASH: c_int = 0;
pub const COL_MESSAGE: c_int = 1;
pub const COL_AUTHOR_NAME: c_int = 2;
pub const COL_AUTHOR_EMAIL: c_int = 3;
pub const COL_AUTHOR_WHEN: c_int = 4;
pub const COL_PARENTS: c_int = 5;

/// Guesses for the planner; only their relative size matters.
const FULL_WALK_COST: f64 = 1_000_000.0;
const FULL_WALK_ROWS: i64 = 1_000_000;
const RANGE_BOUND_FACTOR: f64 = 0.25;

/// Decide which predicates the walk evaluates itself.
pub fn plan_scan(candidates: &[Candidate], order_by: &[OrderBy]) -> Result<PlanOutput, PlanError> {
    let mut out = PlanOutput::new(candidates.len());
    let mut point = false;
    let mut bounds = 0;

    for (i, c) in candidates.iter().enumerate() {
        if !c.usable || c.op.is_pseudo() {
            continue;
        }
        match (c.column, c.op) {
            (COL_HASH, ConstraintOp::Eq) if !point => {
                out.consume(i, Op::Eq, COL_HASH, true);
                point = true;
            }
            (COL_AUTHOR_WHEN, ConstraintOp::Le) => {
                out.consume(i, Op::Le, COL_AUTHOR_WHEN, true);
                bounds += 1;
            }
            (COL_AUTHOR_WHEN, ConstraintOp::Ge) => {
                out.consume(i, Op::Ge, COL_AUTHOR_WHEN, true);
                bounds += 1;
            }
            _ => {}
        }
    }

    if point {
        out.estimated_cost = 1.0;
        out.estimated_rows = 1;
        out.unique = true;
    } else {
        let narrowing = RANGE_BOUND_FACTOR.powi(bounds);
        out.estimated_cost = FULL_WALK_COST * narrowing;
        out.estimated_rows = ((FULL_WALK_ROWS as f64) * narrowing).max(1.0) as i64;
    }

    // Honored by sorting the walk in the cursor, see `Rows::Sorted`.
    out.order_by_consumed = matches!(order_by, [OrderBy { column: COL_AUTHOR_WHEN, desc: true }]);
    out.plan.ordered = out.order_by_consumed && !point;
    Ok(out)
}

#[repr(C)]
pub struct CommitsTab {
    base: rusqlite::ffi::sqlite3_vtab,
    env: Arc<Environment>,
}

unsafe impl<'vtab> VTab<'vtab> for CommitsTab {
    type Aux = Arc<Environment>;
    type Cursor = CommitsCursor<'vtab>;

    fn connect(
        _db: &mut VTabConnection,
        aux: Option<&Self::Aux>,
        _args: &[&[u8]],
    ) -> rusqlite::Result<(String, Self)> {
        let env = aux
            .cloned()
            .ok_or_else(|| rusqlite::Error::ModuleError("commits: missing environment".into()))?;
        Ok((
            SCHEMA.to_owned(),
            Self {
                base: Default::default(),
                env,
            },
        ))
    }

    fn best_index(&self, info: &mut IndexInfo) -> rusqlite::Result<()> {
        let output = plan_scan(&plan::candidates(info), &plan::order_by(info))?;
        plan::apply(info, &output)
    }

    fn open(&'vtab mut self) -> rusqlite::Result<CommitsCursor<'vtab>> {
        Ok(CommitsCursor {
            base: Default::default(),
            env: Arc::clone(&self.env),
            rows: Rows::Single(None),
            current: None,
            position: 0,
            phantom: PhantomData,
        })
    }
}

/// Where the cursor's rows come from.
enum Rows {
    /// Point lookup, already resolved and bounded.
    Single(Option<CommitRecord>),
    Walk(History),
    /// The whole walk, newest author time first. Author time can grow along
    /// ancestry, so only a materialized walk can promise the order.
    Sorted(std::vec::IntoIter<CommitRecord>),
}

#[repr(C)]
pub struct CommitsCursor<'vtab> {
    base: rusqlite::ffi::sqlite3_vtab_cursor,
    env: Arc<Environment>,
    rows: Rows,
    current: Option<CommitRecord>,
    position: i64,
    phantom: PhantomData<&'vtab CommitsTab>,
}

/// Arguments decoded against an [`IndexPlan`].
#[derive(Debug, Default)]
struct Filter {
    hash: Option<ObjectId>,
    since: Option<DateTime<FixedOffset>>,
    until: Option<DateTime<FixedOffset>>,
    /// Some argument was NULL, which no row can satisfy.
    empty: bool,
}

impl Filter {
    fn decode(plan: &IndexPlan, args: &Values<'_>) -> rusqlite::Result<Self> {
        if args.len() != plan.args.len() {
            return Err(sql_err(GitfactsError::Internal(format!(
                "commits: plan binds {} arguments, got {}",
                plan.args.len(),
                args.len()
            ))));
        }
        let mut filter = Filter::default();
        for (i, bound) in plan.args.iter().enumerate() {
            let Some(value) = args.get::<Option<String>>(i)? else {
                filter.empty = true;
                continue;
            };
            match (bound.column, bound.op) {
                (COL_HASH, Op::Eq) => {
                    filter.hash = Some(value.parse().map_err(sql_err)?);
                }
                (COL_AUTHOR_WHEN, Op::Le) => {
                    let t = timestamp(&value).map_err(sql_err)?;
                    filter.until = Some(filter.until.map_or(t, |u| u.min(t)));
                }
                (COL_AUTHOR_WHEN, Op::Ge) => {
                    let t = timestamp(&value).map_err(sql_err)?;
                    filter.since = Some(filter.since.map_or(t, |s| s.max(t)));
                }
                (column, op) => {
                    return Err(sql_err(GitfactsError::Internal(format!(
                        "commits: unexpected bound {op:?} on column {column}"
                    ))))
                }
            }
        }
        Ok(filter)
    }

    fn admits(&self, record: &CommitRecord) -> bool {
        self.since.map_or(true, |s| record.author_when >= s)
            && self.until.map_or(true, |u| record.author_when <= u)
    }
}

fn timestamp(text: &str) -> Result<DateTime<FixedOffset>, GitfactsError> {
    DateTime::parse_from_rfc3339(text)
        .map_err(|e| GitfactsError::Validation(format!("invalid timestamp {text:?}: {e}")))
}

/// `author_when` as it appears in rows.
pub fn format_when(when: &DateTime<FixedOffset>) -> String {
    when.to_rfc3339_opts(SecondsFormat::Secs, true)
}

impl CommitsCursor<'_> {
    fn advance(&mut self) -> rusqlite::Result<()> {
        self.current = match &mut self.rows {
            Rows::Single(record) => record.take(),
            Rows::Walk(history) => history.next().transpose().map_err(sql_err)?,
            Rows::Sorted(records) => records.next(),
        };
        Ok(())
    }
}

unsafe impl VTabCursor for CommitsCursor<'_> {
    fn filter(
        &mut self,
        _idx_num: c_int,
        idx_str: Option<&str>,
        args: &Values<'_>,
    ) -> rusqlite::Result<()> {
        let plan = IndexPlan::decode(idx_str).map_err(sql_err)?;
        let filter = Filter::decode(&plan, args)?;
        self.position = 0;

        let repo = self.env.open_repository().map_err(sql_err)?;
        self.rows = if filter.empty {
            Rows::Single(None)
        } else if let Some(hash) = filter.hash {
            let record = repo
                .find_commit(hash)
                .map_err(sql_err)?
                .filter(|r| filter.admits(r));
            Rows::Single(record)
        } else {
            let options = HistoryOptions {
                from: None,
                since: filter.since,
                until: filter.until,
            };
            let history = repo.history(options).map_err(sql_err)?;
            if plan.ordered {
                let mut records = history.collect::<Result<Vec<_>, _>>().map_err(sql_err)?;
                records.sort_by(|a, b| b.author_when.cmp(&a.author_when));
                Rows::Sorted(records.into_iter())
            } else {
                Rows::Walk(history)
            }
        };
        tracing::debug!(
            "commits: filter point={} since={:?} until={:?}",
            filter.hash.is_some(),
            filter.since,
            filter.until
        );
        self.advance()
    }

    fn next(&mut self) -> rusqlite::Result<()> {
        self.position += 1;
        self.advance()
    }

    fn eof(&self) -> bool {
        self.current.is_none()
    }

    fn column(&self, ctx: &mut Context, i: c_int) -> rusqlite::Result<()> {
        let Some(record) = &self.current else {
            return Ok(());
        };
        match i {
            COL_HASH => ctx.set_result(&record.hash.to_string()),
            COL_MESSAGE => ctx.set_result(&record.message),
            COL_AUTHOR_NAME => ctx.set_result(&record.author_name),
            COL_AUTHOR_EMAIL => ctx.set_result(&record.author_email),
            COL_AUTHOR_WHEN => ctx.set_result(&format_when(&record.author_when)),
            COL_PARENTS => ctx.set_result(&(record.parents as i64)),
            _ => Err(sql_err(GitfactsError::Internal(format!("commits: no column {i}")))),
        }
    }

    fn rowid(&self) -> rusqlite::Result<i64> {
        Ok(self.position)
    }
}
