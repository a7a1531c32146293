//! Constraint pushdown shared by both virtual tables.
//!
//! Planning works on plain [`Candidate`]s so the per-table policies are pure
//! functions. The chosen bounds travel from `xBestIndex` to `xFilter` as an
//! [`IndexPlan`] serialized into `idx_str`; argument slots are assigned in
//! the order of [`IndexPlan::args`].

use gitfacts_core::GitfactsError;
use rusqlite::vtab::{IndexConstraintOp, IndexFlags, IndexInfo};
use serde::{Deserialize, Serialize};
use std::os::raw::c_int;

pub const PLAN_VERSION: u8 = 1;

/// Operator of a bound the table evaluates itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Op {
    Eq,
    Like,
    Glob,
    Le,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bound {
    pub op: Op,
    pub column: c_int,
}

/// Bounds accepted at plan time, in execution argument order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexPlan {
    pub version: u8,
    pub args: Vec<Bound>,
    /// Rows must come out in the order SQLite was told is consumed.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub ordered: bool,
}

impl Default for IndexPlan {
    fn default() -> Self {
        Self {
            version: PLAN_VERSION,
            args: Vec::new(),
            ordered: false,
        }
    }
}

impl IndexPlan {
    /// Append a bound and return its 1-based argument slot.
    pub fn push(&mut self, op: Op, column: c_int) -> c_int {
        self.args.push(Bound { op, column });
        self.args.len() as c_int
    }

    pub fn encode(&self) -> Result<String, GitfactsError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode the `idx_str` handed back by SQLite. A missing string is an
    /// empty plan.
    pub fn decode(idx_str: Option<&str>) -> Result<Self, GitfactsError> {
        let Some(text) = idx_str else {
            return Ok(Self::default());
        };
        let plan: IndexPlan = serde_json::from_str(text)
            .map_err(|e| GitfactsError::Internal(format!("undecodable index plan {text:?}: {e}")))?;
        if plan.version != PLAN_VERSION {
            return Err(GitfactsError::Internal(format!(
                "unsupported index plan version {}",
                plan.version
            )));
        }
        Ok(plan)
    }
}

/// Comparison operator of a candidate predicate, reduced to what the
/// planners distinguish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintOp {
    Eq,
    Gt,
    Le,
    Lt,
    Ge,
    Like,
    Glob,
    Limit,
    Offset,
    Other,
}

impl From<&IndexConstraintOp> for ConstraintOp {
    fn from(op: &IndexConstraintOp) -> Self {
        match op {
            IndexConstraintOp::SQLITE_INDEX_CONSTRAINT_EQ => ConstraintOp::Eq,
            IndexConstraintOp::SQLITE_INDEX_CONSTRAINT_GT => ConstraintOp::Gt,
            IndexConstraintOp::SQLITE_INDEX_CONSTRAINT_LE => ConstraintOp::Le,
            IndexConstraintOp::SQLITE_INDEX_CONSTRAINT_LT => ConstraintOp::Lt,
            IndexConstraintOp::SQLITE_INDEX_CONSTRAINT_GE => ConstraintOp::Ge,
            IndexConstraintOp::SQLITE_INDEX_CONSTRAINT_LIKE => ConstraintOp::Like,
            IndexConstraintOp::SQLITE_INDEX_CONSTRAINT_GLOB => ConstraintOp::Glob,
            IndexConstraintOp::SQLITE_INDEX_CONSTRAINT_LIMIT => ConstraintOp::Limit,
            IndexConstraintOp::SQLITE_INDEX_CONSTRAINT_OFFSET => ConstraintOp::Offset,
            _ => ConstraintOp::Other,
        }
    }
}

impl ConstraintOp {
    /// LIMIT and OFFSET arrive as constraints but name no real column.
    pub fn is_pseudo(self) -> bool {
        matches!(self, ConstraintOp::Limit | ConstraintOp::Offset)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub column: c_int,
    pub op: ConstraintOp,
    pub usable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderBy {
    pub column: c_int,
    pub desc: bool,
}

/// How one candidate is consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Usage {
    pub argv_index: c_int,
    pub omit: bool,
}

/// Everything a planner decides, written back by [`apply`].
#[derive(Debug, Clone, PartialEq)]
pub struct PlanOutput {
    /// One entry per candidate, `None` when left to SQLite.
    pub usages: Vec<Option<Usage>>,
    pub plan: IndexPlan,
    pub estimated_cost: f64,
    pub estimated_rows: i64,
    /// At most one row.
    pub unique: bool,
    pub order_by_consumed: bool,
}

impl PlanOutput {
    pub fn new(candidates: usize) -> Self {
        Self {
            usages: vec![None; candidates],
            plan: IndexPlan::default(),
            estimated_cost: 0.0,
            estimated_rows: 0,
            unique: false,
            order_by_consumed: false,
        }
    }

    /// Consume candidate `index` as a bound with `op` on `column`.
    pub fn consume(&mut self, index: usize, op: Op, column: c_int, omit: bool) {
        let argv_index = self.plan.push(op, column);
        self.usages[index] = Some(Usage { argv_index, omit });
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    /// The query can never be answered; reported to the caller.
    #[error("{0}")]
    Rejected(String),

    /// This candidate plan cannot be used, but another one might.
    #[error("{0}")]
    Unusable(String),
}

impl From<PlanError> for rusqlite::Error {
    fn from(e: PlanError) -> Self {
        match e {
            PlanError::Rejected(msg) => rusqlite::Error::ModuleError(msg),
            PlanError::Unusable(msg) => rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CONSTRAINT),
                Some(msg),
            ),
        }
    }
}

pub fn candidates(info: &IndexInfo) -> Vec<Candidate> {
    info.constraints()
        .map(|c| Candidate {
            column: c.column(),
            op: ConstraintOp::from(&c.operator()),
            usable: c.is_usable(),
        })
        .collect()
}

pub fn order_by(info: &IndexInfo) -> Vec<OrderBy> {
    info.order_bys()
        .map(|o| OrderBy {
            column: o.column(),
            desc: o.is_order_by_desc(),
        })
        .collect()
}

/// Write a planner's decision back into SQLite's index info.
pub fn apply(info: &mut IndexInfo, output: &PlanOutput) -> rusqlite::Result<()> {
    for (i, usage) in output.usages.iter().enumerate() {
        if let Some(usage) = usage {
            let mut slot = info.constraint_usage(i);
            slot.set_argv_index(usage.argv_index);
            slot.set_omit(usage.omit);
        }
    }
    let idx_str = output.plan.encode().map_err(|e| rusqlite::Error::ModuleError(e.to_string()))?;
    info.set_idx_str(&idx_str);
    info.set_estimated_cost(output.estimated_cost);
    info.set_estimated_rows(output.estimated_rows);
    if output.unique {
        info.set_idx_flags(IndexFlags::SQLITE_INDEX_SCAN_UNIQUE);
    }
    if output.order_by_consumed {
        info.set_order_by_consumed(true);
    }
    Ok(())
}

/// Map a library error raised while producing rows.
pub fn sql_err(e: GitfactsError) -> rusqlite::Error {
    rusqlite::Error::ModuleError(e.to_string())
}
