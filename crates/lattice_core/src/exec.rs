//! Scan executor.
//!
//! Turns a planned access path into bounded sub-scans, drives the backend
//! cursors, re-hydrates records, applies residual predicate checks, and
//! produces the de-duplicated, paginated match set.
//!
//! Every clause of the group is re-checked against the materialized record,
//! so an index pointer whose record has since changed (or disappeared) can
//! never produce a false positive.

use crate::entries::{self, AssembledRecord, RecordAssembler};
use crate::error::{StoreError, StoreResult};
use crate::keyspace;
use crate::plan::{self, AccessPath, RangeBound};
use crate::query::{Clause, Query};
use crate::schema::Collection;
use crate::store::{Seek, SearchOptions};
use lattice_codec::{fragment, key, storage};
use lattice_kv::KvBackend;
use std::collections::HashSet;

/// Result of executing a search: full match set plus the optional
/// pagination cursor.
pub(crate) struct ExecOutcome {
    /// Matched records, in scan order.
    pub matches: Vec<AssembledRecord>,
    /// Keyset cursor, present when the caller requested one. `None` with a
    /// requested cursor means the scan was exhausted.
    pub seek: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubScanKind {
    /// The scan walks a record region; entries are record fields.
    Region,
    /// The scan walks an index region; entry values are primary pointers.
    Pointer,
}

#[derive(Debug)]
struct SubScan {
    kind: SubScanKind,
    lower: Vec<u8>,
    upper: Vec<u8>,
}

/// Executes a query against one collection.
pub(crate) fn execute(
    backend: &dyn KvBackend,
    collection: &Collection,
    query: &Query,
    opts: &SearchOptions,
) -> StoreResult<ExecOutcome> {
    query.validate(collection)?;
    let groups = query.groups();
    if groups.len() > 1 && opts.seek.is_some() {
        return Err(StoreError::validation(
            "seek pagination is only defined for single-group queries",
        ));
    }

    let mut cx = ExecCx {
        backend,
        collection,
        accepted: HashSet::new(),
        matches: Vec::new(),
        last_key: None,
        skipped: 0,
        done: false,
        opts,
    };
    let mut reverse_used = false;

    for group in groups {
        if cx.done {
            break;
        }
        let path = plan::plan(collection, group)?;
        let reverse = opts
            .order_by
            .as_ref()
            .is_some_and(|o| o.descending && o.attribute == path.order_attribute(collection));
        reverse_used = reverse;

        let mut subscans = build_subscans(collection, &path)?;
        subscans.sort_by(|a, b| a.lower.cmp(&b.lower));
        if reverse {
            subscans.reverse();
        }
        if let Some(Seek::After(cursor)) = &opts.seek {
            clip_subscans(&mut subscans, cursor, reverse);
        }

        cx.run_group(group, &subscans, reverse)?;
    }

    let seek = if cx.opts.seek.is_some() {
        cx.last_key
            .map(|k| if reverse_used { k } else { key::successor(&k) })
    } else {
        None
    };

    Ok(ExecOutcome {
        matches: cx.matches,
        seek,
    })
}

struct ExecCx<'a> {
    backend: &'a dyn KvBackend,
    collection: &'a Collection,
    /// Primary fragments already counted toward the result set, across all
    /// groups of the disjunction.
    accepted: HashSet<Vec<u8>>,
    matches: Vec<AssembledRecord>,
    /// Raw key of the last entry consumed by any scan.
    last_key: Option<Vec<u8>>,
    skipped: usize,
    done: bool,
    opts: &'a SearchOptions,
}

impl ExecCx<'_> {
    fn run_group(
        &mut self,
        group: &[Clause],
        subscans: &[SubScan],
        reverse: bool,
    ) -> StoreResult<()> {
        // Sub-scans of one group ($in / $any expansions) may revisit the
        // same record; visit each at most once per group. Kept separate
        // from `accepted`: a record rejected by this group's residual
        // clauses must still be examined by later groups.
        let mut visited: HashSet<Vec<u8>> = HashSet::new();
        let assembler = RecordAssembler::new(self.collection);

        for scan in subscans {
            if self.done {
                break;
            }
            let mut cursor = self.backend.scan(&scan.lower, &scan.upper, reverse)?;
            match scan.kind {
                SubScanKind::Region => loop {
                    let assembled = if reverse {
                        assembler.next_record_reverse(cursor.as_mut())?
                    } else {
                        assembler.next_record(cursor.as_mut())?
                    };
                    let Some(assembled) = assembled else { break };
                    self.last_key = Some(assembled.last_key.clone());
                    if visited.insert(assembled.pk.clone()) {
                        self.offer(group, assembled);
                    }
                    if self.done {
                        break;
                    }
                },
                SubScanKind::Pointer => {
                    while let Some((raw_key, raw_value)) = cursor.next()? {
                        self.last_key = Some(raw_key);
                        let primary = storage::from_storage(&raw_value)?;
                        let pk = fragment::to_fragment(&primary)?;
                        if !visited.insert(pk.clone()) {
                            continue;
                        }
                        // A pointer without a live record is stale; the
                        // residual re-check below covers the value-changed
                        // case.
                        let Some(assembled) =
                            entries::fetch_record(self.backend, self.collection, &pk)?
                        else {
                            continue;
                        };
                        self.offer(group, assembled);
                        if self.done {
                            break;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Applies residual clauses, disjunction dedup, and offset/limit to one
    /// materialized record.
    fn offer(&mut self, group: &[Clause], assembled: AssembledRecord) {
        if !group.iter().all(|clause| clause.matches(&assembled.record)) {
            return;
        }
        if self.accepted.contains(&assembled.pk) {
            return;
        }
        if self.skipped < self.opts.offset {
            self.skipped += 1;
            self.accepted.insert(assembled.pk);
            return;
        }
        self.accepted.insert(assembled.pk.clone());
        self.matches.push(assembled);
        if self
            .opts
            .limit
            .is_some_and(|limit| self.matches.len() >= limit)
        {
            self.done = true;
        }
    }
}

fn build_subscans(collection: &Collection, path: &AccessPath) -> StoreResult<Vec<SubScan>> {
    let name = &collection.name;
    let scans = match path {
        AccessPath::PrimaryPoint { values } => values
            .iter()
            .map(|value| {
                let frag = fragment::to_fragment(value)?;
                Ok(SubScan {
                    kind: SubScanKind::Region,
                    lower: keyspace::record_key(name, &frag),
                    upper: keyspace::record_region_upper(name, &frag),
                })
            })
            .collect::<StoreResult<Vec<_>>>()?,
        AccessPath::SecondaryPoint {
            attribute,
            unique,
            values,
        } => values
            .iter()
            .map(|value| {
                let frag = fragment::to_fragment(value)?;
                let scan = if *unique {
                    let entry = keyspace::unique_entry(name, attribute, &frag);
                    SubScan {
                        kind: SubScanKind::Pointer,
                        upper: key::successor(&entry),
                        lower: entry,
                    }
                } else {
                    let value_key = keyspace::index_value_key(name, attribute, &frag);
                    SubScan {
                        kind: SubScanKind::Pointer,
                        lower: key::successor(&value_key),
                        upper: key::region_end(&value_key),
                    }
                };
                Ok(scan)
            })
            .collect::<StoreResult<Vec<_>>>()?,
        AccessPath::PrimaryRange { lower, upper } => {
            let lower_key = match lower {
                None => key::successor(&keyspace::collection_key(name)),
                Some(bound) => {
                    let frag = fragment::to_fragment(&bound.value)?;
                    if bound.inclusive {
                        keyspace::record_key(name, &frag)
                    } else {
                        keyspace::record_region_upper(name, &frag)
                    }
                }
            };
            let upper_key = match upper {
                None => keyspace::collection_end(name),
                Some(bound) => {
                    let frag = fragment::to_fragment(&bound.value)?;
                    if bound.inclusive {
                        keyspace::record_region_upper(name, &frag)
                    } else {
                        keyspace::record_key(name, &frag)
                    }
                }
            };
            vec![SubScan {
                kind: SubScanKind::Region,
                lower: lower_key,
                upper: upper_key,
            }]
        }
        AccessPath::SecondaryRange {
            attribute,
            unique,
            lower,
            upper,
        } => {
            let scan = if *unique {
                unique_range_scan(name, attribute, lower.as_ref(), upper.as_ref())?
            } else {
                index_range_scan(name, attribute, lower.as_ref(), upper.as_ref())?
            };
            vec![scan]
        }
        AccessPath::FullScan => vec![SubScan {
            kind: SubScanKind::Region,
            lower: key::successor(&keyspace::collection_key(name)),
            upper: keyspace::collection_end(name),
        }],
    };
    Ok(scans)
}

fn unique_range_scan(
    name: &str,
    attribute: &str,
    lower: Option<&RangeBound>,
    upper: Option<&RangeBound>,
) -> StoreResult<SubScan> {
    let lower_key = match lower {
        None => key::successor(&keyspace::unique_root(name, attribute)),
        Some(bound) => {
            let entry = keyspace::unique_entry(name, attribute, &fragment::to_fragment(&bound.value)?);
            if bound.inclusive {
                entry
            } else {
                key::successor(&entry)
            }
        }
    };
    let upper_key = match upper {
        None => keyspace::unique_end(name, attribute),
        Some(bound) => {
            let entry = keyspace::unique_entry(name, attribute, &fragment::to_fragment(&bound.value)?);
            if bound.inclusive {
                key::successor(&entry)
            } else {
                entry
            }
        }
    };
    Ok(SubScan {
        kind: SubScanKind::Pointer,
        lower: lower_key,
        upper: upper_key,
    })
}

fn index_range_scan(
    name: &str,
    attribute: &str,
    lower: Option<&RangeBound>,
    upper: Option<&RangeBound>,
) -> StoreResult<SubScan> {
    let lower_key = match lower {
        None => key::successor(&keyspace::index_root(name, attribute)),
        Some(bound) => {
            let value_key =
                keyspace::index_value_key(name, attribute, &fragment::to_fragment(&bound.value)?);
            if bound.inclusive {
                key::successor(&value_key)
            } else {
                key::region_end(&value_key)
            }
        }
    };
    let upper_key = match upper {
        None => keyspace::index_end(name, attribute),
        Some(bound) => {
            let value_key =
                keyspace::index_value_key(name, attribute, &fragment::to_fragment(&bound.value)?);
            if bound.inclusive {
                key::region_end(&value_key)
            } else {
                key::successor(&value_key)
            }
        }
    };
    Ok(SubScan {
        kind: SubScanKind::Pointer,
        lower: lower_key,
        upper: upper_key,
    })
}

/// Drops or narrows sub-scans already consumed by a previous page. The
/// cursor is a raw key boundary: the resume lower bound for forward scans,
/// the exclusive upper bound for reverse scans.
fn clip_subscans(subscans: &mut Vec<SubScan>, cursor: &[u8], reverse: bool) {
    if reverse {
        subscans.retain(|s| s.lower.as_slice() < cursor);
        for scan in subscans.iter_mut() {
            if scan.upper.as_slice() > cursor {
                scan.upper = cursor.to_vec();
            }
        }
    } else {
        subscans.retain(|s| s.upper.as_slice() > cursor);
        for scan in subscans.iter_mut() {
            if scan.lower.as_slice() < cursor {
                scan.lower = cursor.to_vec();
            }
        }
    }
}
