//! Query predicate language.
//!
//! A predicate map is either `{attr: literal}` (sugar for `$eq`) or
//! `{attr: {"$op": operand}}`. Scalar operators: `$eq`, `$ne`, `$in`,
//! `$nin`, `$gt`, `$gte`, `$lt`, `$lte`. Array-attribute operators: `$any`
//! (non-empty intersection) and `$all` (stored array is a superset).
//!
//! A [`Query`] is a disjunction of conjunctive clause groups. The common
//! case is a single group; [`Query::any_of`] unions several, with results
//! de-duplicated by primary key.
//!
//! Clause order is part of the contract: the planner breaks priority ties
//! by the first eligible clause, so which index serves a query is stable
//! for a fixed query shape. Builder clauses keep insertion order; clauses
//! parsed from a predicate map follow the map's sorted attribute order.

use crate::error::{StoreError, StoreResult};
use crate::schema::Collection;
use crate::Record;
use lattice_codec::Value;
use std::cmp::Ordering;

/// A predicate operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// Equality.
    Eq,
    /// Inequality.
    Ne,
    /// Membership in a value list.
    In,
    /// Absence from a value list.
    Nin,
    /// Strictly greater.
    Gt,
    /// Greater or equal.
    Gte,
    /// Strictly less.
    Lt,
    /// Less or equal.
    Lte,
    /// Array intersection is non-empty.
    Any,
    /// Array contains every given value.
    All,
}

impl Operator {
    /// Parses a `$op` key.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "$eq" => Some(Self::Eq),
            "$ne" => Some(Self::Ne),
            "$in" => Some(Self::In),
            "$nin" => Some(Self::Nin),
            "$gt" => Some(Self::Gt),
            "$gte" => Some(Self::Gte),
            "$lt" => Some(Self::Lt),
            "$lte" => Some(Self::Lte),
            "$any" => Some(Self::Any),
            "$all" => Some(Self::All),
            _ => None,
        }
    }

    /// The `$op` spelling.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Eq => "$eq",
            Self::Ne => "$ne",
            Self::In => "$in",
            Self::Nin => "$nin",
            Self::Gt => "$gt",
            Self::Gte => "$gte",
            Self::Lt => "$lt",
            Self::Lte => "$lte",
            Self::Any => "$any",
            Self::All => "$all",
        }
    }

    /// True for the operators whose operand is a value list.
    #[must_use]
    pub const fn takes_list(self) -> bool {
        matches!(self, Self::In | Self::Nin | Self::Any | Self::All)
    }

    /// True for `$gt`/`$gte`/`$lt`/`$lte`.
    #[must_use]
    pub const fn is_range(self) -> bool {
        matches!(self, Self::Gt | Self::Gte | Self::Lt | Self::Lte)
    }

    /// True for the operators only valid on array-typed attributes.
    #[must_use]
    pub const fn is_containment(self) -> bool {
        matches!(self, Self::Any | Self::All)
    }
}

/// One conjunctive predicate clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub(crate) attribute: String,
    pub(crate) operator: Operator,
    /// Exactly one value for scalar operators, the operand list for
    /// list-taking ones.
    pub(crate) values: Vec<Value>,
}

impl Clause {
    /// The single operand of a scalar clause.
    pub(crate) fn value(&self) -> &Value {
        &self.values[0]
    }

    /// Evaluates this clause against a record.
    ///
    /// An absent attribute fails every positive predicate and satisfies the
    /// negative ones (`$ne`, `$nin`).
    pub(crate) fn matches(&self, record: &Record) -> bool {
        let value = record.get(&self.attribute);
        match self.operator {
            Operator::Eq => value == Some(self.value()),
            Operator::Ne => value != Some(self.value()),
            Operator::In => value.is_some_and(|v| self.values.contains(v)),
            Operator::Nin => !value.is_some_and(|v| self.values.contains(v)),
            Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte => value
                .and_then(|v| compare(v, self.value()))
                .is_some_and(|ord| match self.operator {
                    Operator::Gt => ord == Ordering::Greater,
                    Operator::Gte => ord != Ordering::Less,
                    Operator::Lt => ord == Ordering::Less,
                    Operator::Lte => ord != Ordering::Greater,
                    _ => unreachable!(),
                }),
            Operator::Any => value
                .and_then(Value::as_array)
                .is_some_and(|items| items.iter().any(|item| self.values.contains(item))),
            Operator::All => value
                .and_then(Value::as_array)
                .is_some_and(|items| self.values.iter().all(|want| items.contains(want))),
        }
    }
}

/// Orders two values of the same kind; `None` for mixed or unordered kinds.
pub(crate) fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => Some(x.cmp(y)),
        (Value::Int(x), Value::Int(y)) => Some(x.cmp(y)),
        (Value::Float(x), Value::Float(y)) => x.partial_cmp(y),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Dict(_), Value::Dict(_)) => {
            let x = lattice_codec::storage::to_storage(a).ok()?;
            let y = lattice_codec::storage::to_storage(b).ok()?;
            Some(x.cmp(&y))
        }
        _ => None,
    }
}

/// A query: one or more conjunctive clause groups, matched as their union.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub(crate) groups: Vec<Vec<Clause>>,
}

impl Query {
    /// A query matching every record of a collection.
    #[must_use]
    pub fn all() -> Self {
        Self {
            groups: vec![Vec::new()],
        }
    }

    /// Adds a clause to the (single) conjunctive group, preserving insertion
    /// order. For list-taking operators the operand must be an array value;
    /// its elements become the operand list.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if a list-taking operator is given a non-array
    /// operand, or the query already holds multiple groups.
    pub fn with(
        mut self,
        attribute: impl Into<String>,
        operator: Operator,
        operand: impl Into<Value>,
    ) -> StoreResult<Self> {
        if self.groups.len() > 1 {
            return Err(StoreError::validation(
                "cannot add clauses to a multi-group query",
            ));
        }
        let clause = make_clause(attribute.into(), operator, operand.into())?;
        if self.groups.is_empty() {
            self.groups.push(Vec::new());
        }
        self.groups[0].push(clause);
        Ok(self)
    }

    /// Unions several queries into one disjunction. Matching records are
    /// de-duplicated by primary key.
    #[must_use]
    pub fn any_of(queries: impl IntoIterator<Item = Query>) -> Self {
        let groups = queries.into_iter().flat_map(|q| q.groups).collect();
        Self { groups }
    }

    /// Parses a predicate map: `{attr: literal}` or `{attr: {"$op": v}}`.
    /// An empty map matches everything.
    ///
    /// # Errors
    ///
    /// Returns `Validation` on a non-map predicate, an unknown `$` operator,
    /// a list operator with a non-array operand, or a map operand mixing
    /// `$` keys with plain keys.
    pub fn parse(predicate: &Value) -> StoreResult<Self> {
        let dict = predicate
            .as_dict()
            .ok_or_else(|| StoreError::validation("predicate is not a map"))?;

        let mut clauses = Vec::new();
        for (attribute, operand) in dict {
            match operand.as_dict() {
                Some(ops) if ops.keys().any(|k| k.starts_with('$')) => {
                    if !ops.keys().all(|k| k.starts_with('$')) {
                        return Err(StoreError::validation(format!(
                            "{attribute}: operator map mixes $-operators with plain keys"
                        )));
                    }
                    for (name, value) in ops {
                        let operator = Operator::parse(name).ok_or_else(|| {
                            StoreError::validation(format!("unknown operator {name}"))
                        })?;
                        clauses.push(make_clause(attribute.clone(), operator, value.clone())?);
                    }
                }
                _ => clauses.push(make_clause(
                    attribute.clone(),
                    Operator::Eq,
                    operand.clone(),
                )?),
            }
        }

        Ok(Self {
            groups: vec![clauses],
        })
    }

    /// The conjunctive groups of this query.
    pub(crate) fn groups(&self) -> &[Vec<Clause>] {
        &self.groups
    }

    /// Validates every clause against a collection's declared types.
    ///
    /// # Errors
    ///
    /// Returns `Validation` on an unknown attribute, a scalar operator
    /// applied to an array-typed attribute (or the converse), or an operand
    /// whose type does not match the attribute.
    pub(crate) fn validate(&self, collection: &Collection) -> StoreResult<()> {
        for group in &self.groups {
            for clause in group {
                validate_clause(collection, clause)?;
            }
        }
        Ok(())
    }
}

fn make_clause(attribute: String, operator: Operator, operand: Value) -> StoreResult<Clause> {
    let values = if operator.takes_list() {
        match operand {
            Value::Array(items) => items,
            other => {
                return Err(StoreError::validation(format!(
                    "{attribute}: {} takes an array operand, got {}",
                    operator.name(),
                    other.kind()
                )))
            }
        }
    } else {
        vec![operand]
    };
    Ok(Clause {
        attribute,
        operator,
        values,
    })
}

fn validate_clause(collection: &Collection, clause: &Clause) -> StoreResult<()> {
    let ty = collection
        .attribute_type(&clause.attribute)
        .ok_or_else(|| {
            StoreError::validation(format!(
                "{}: unknown attribute {:?}",
                collection.name, clause.attribute
            ))
        })?;

    if clause.operator.is_containment() {
        let element = ty.element().ok_or_else(|| {
            StoreError::validation(format!(
                "{}.{}: {} requires an array-typed attribute",
                collection.name,
                clause.attribute,
                clause.operator.name()
            ))
        })?;
        for value in &clause.values {
            if !value.matches(element.into()) {
                return Err(StoreError::validation(format!(
                    "{}.{}: operand {} does not match element type {element}",
                    collection.name,
                    clause.attribute,
                    value.kind()
                )));
            }
        }
        return Ok(());
    }

    if ty.is_array() {
        return Err(StoreError::validation(format!(
            "{}.{}: scalar operator {} is not valid on an array-typed attribute",
            collection.name,
            clause.attribute,
            clause.operator.name()
        )));
    }

    for value in &clause.values {
        if !value.matches(ty) {
            return Err(StoreError::validation(format!(
                "{}.{}: operand {} does not match attribute type {ty}",
                collection.name,
                clause.attribute,
                value.kind()
            )));
        }
    }
    Ok(())
}
