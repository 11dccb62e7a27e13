//! Index-selecting query planner.
//!
//! Every clause of a conjunctive group is classified into a candidate
//! access path with a priority:
//!
//! - **P1** primary key with `$eq`/`$in`
//! - **P2** any secondary index with `$eq`/`$in`/`$any`/`$all`
//! - **P3** primary key with range operators
//! - **P4** secondary index with range operators
//! - **P5** full collection scan between the collection's anchors
//!
//! The lowest-numbered candidate wins; ties go to the first eligible clause
//! in clause order, which is part of the query contract (it determines
//! which index a caller can rely on for pagination stability). Range
//! clauses on the chosen attribute are merged into one bounded scan; a
//! missing bound defaults to the attribute region's own begin/end anchor,
//! so the scan never spills into a neighboring region.
//!
//! The executor re-checks every clause of the group against the
//! materialized record, including the one the chosen index already
//! satisfies - that re-verification is what makes stale index pointers
//! harmless.

use crate::error::StoreResult;
use crate::query::{compare, Clause, Operator};
use crate::schema::Collection;
use lattice_codec::{fragment, Value};
use std::cmp::Ordering;

/// One endpoint of a range scan: operand value and inclusivity.
#[derive(Debug, Clone)]
pub(crate) struct RangeBound {
    pub value: Value,
    pub inclusive: bool,
}

/// The chosen access path for one conjunctive group.
#[derive(Debug, Clone)]
pub(crate) enum AccessPath {
    /// P1: record-region seek per primary value.
    PrimaryPoint {
        /// De-duplicated point values.
        values: Vec<Value>,
    },
    /// P2: secondary index seek per value.
    SecondaryPoint {
        attribute: String,
        unique: bool,
        /// De-duplicated point values ($all contributes only its first).
        values: Vec<Value>,
    },
    /// P3: bounded scan over the record region.
    PrimaryRange {
        lower: Option<RangeBound>,
        upper: Option<RangeBound>,
    },
    /// P4: bounded scan over a secondary index region.
    SecondaryRange {
        attribute: String,
        unique: bool,
        lower: Option<RangeBound>,
        upper: Option<RangeBound>,
    },
    /// P5: full scan between the collection anchors.
    FullScan,
}

impl AccessPath {
    /// The attribute whose natural order the scan follows: the plan's index
    /// attribute, or the primary key for record-region scans.
    pub(crate) fn order_attribute<'a>(&'a self, collection: &'a Collection) -> &'a str {
        match self {
            AccessPath::SecondaryPoint { attribute, .. }
            | AccessPath::SecondaryRange { attribute, .. } => attribute,
            _ => &collection.primary,
        }
    }
}

/// Plans one conjunctive clause group against a collection.
pub(crate) fn plan(collection: &Collection, group: &[Clause]) -> StoreResult<AccessPath> {
    let mut best: Option<(u8, usize)> = None;

    for (index, clause) in group.iter().enumerate() {
        let Some(priority) = classify(collection, clause) else {
            continue;
        };
        if best.map_or(true, |(p, _)| priority < p) {
            best = Some((priority, index));
        }
    }

    let Some((priority, index)) = best else {
        return Ok(AccessPath::FullScan);
    };
    let chosen = &group[index];

    let path = match priority {
        1 => AccessPath::PrimaryPoint {
            values: point_values(chosen)?,
        },
        2 => AccessPath::SecondaryPoint {
            attribute: chosen.attribute.clone(),
            unique: collection.is_unique(&chosen.attribute),
            values: point_values(chosen)?,
        },
        3 | 4 => {
            let (lower, upper) = merge_range(group, &chosen.attribute);
            if priority == 3 {
                AccessPath::PrimaryRange { lower, upper }
            } else {
                AccessPath::SecondaryRange {
                    attribute: chosen.attribute.clone(),
                    unique: collection.is_unique(&chosen.attribute),
                    lower,
                    upper,
                }
            }
        }
        _ => AccessPath::FullScan,
    };
    Ok(path)
}

/// Candidate priority of one clause, or `None` if it cannot drive a scan.
fn classify(collection: &Collection, clause: &Clause) -> Option<u8> {
    let is_primary = clause.attribute == collection.primary;
    let is_secondary =
        collection.is_unique(&clause.attribute) || collection.is_indexed(&clause.attribute);

    match clause.operator {
        Operator::Eq | Operator::In if is_primary => Some(1),
        Operator::Eq | Operator::In if is_secondary => Some(2),
        // $all with no values cannot anchor a scan; it is residual-only
        // (and vacuously true).
        Operator::All if is_secondary && clause.values.is_empty() => None,
        Operator::Any | Operator::All if is_secondary => Some(2),
        Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte if is_primary => Some(3),
        Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte if is_secondary => Some(4),
        _ => None,
    }
}

/// The point values a clause contributes: one sub-scan each. `$in`/`$any`
/// values are de-duplicated by their fragment encoding; `$all` scans only
/// its first value, the rest is containment-checked residually.
fn point_values(clause: &Clause) -> StoreResult<Vec<Value>> {
    let candidates: &[Value] = match clause.operator {
        Operator::All => &clause.values[..1],
        _ => &clause.values,
    };

    let mut seen = Vec::new();
    let mut values = Vec::new();
    for value in candidates {
        let frag = fragment::to_fragment(value)?;
        if !seen.contains(&frag) {
            seen.push(frag);
            values.push(value.clone());
        }
    }
    Ok(values)
}

/// Merges every range clause on `attribute` into one lower/upper bound
/// pair, keeping the tightest bound on each side.
fn merge_range(
    group: &[Clause],
    attribute: &str,
) -> (Option<RangeBound>, Option<RangeBound>) {
    let mut lower: Option<RangeBound> = None;
    let mut upper: Option<RangeBound> = None;

    for clause in group {
        if clause.attribute != attribute || !clause.operator.is_range() {
            continue;
        }
        let bound = RangeBound {
            value: clause.value().clone(),
            inclusive: matches!(clause.operator, Operator::Gte | Operator::Lte),
        };
        match clause.operator {
            Operator::Gt | Operator::Gte => {
                lower = Some(tighter(lower.take(), bound, Ordering::Greater));
            }
            Operator::Lt | Operator::Lte => {
                upper = Some(tighter(upper.take(), bound, Ordering::Less));
            }
            _ => unreachable!(),
        }
    }

    (lower, upper)
}

/// Keeps the tighter of two bounds on the same side; exclusive wins a tie.
fn tighter(current: Option<RangeBound>, candidate: RangeBound, prefer: Ordering) -> RangeBound {
    match current {
        None => candidate,
        Some(current) => match compare(&candidate.value, &current.value) {
            Some(ord) if ord == prefer => candidate,
            Some(Ordering::Equal) if !candidate.inclusive => candidate,
            _ => current,
        },
    }
}
