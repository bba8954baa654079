// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Identifier-set expressions.
//!
//! An expression selects observations along one dimension, e.g.
//! `visit=20..22^26..37` or `arm=b^r^n`. The grammar of the value is:
//!
//! - `A^B^C`: union of terms;
//! - `A..B`: inclusive range;
//! - `A..B:S`: stepped range (integer bounds only);
//! - anything else: a single value.
//!
//! Expressions are validated but never rewritten; the raw text is what ends up
//! on a legacy command line, because the external tasks interpret the syntax
//! themselves. For Butler-style tasks, expressions can also be rendered into a
//! boolean `--where` query with the help of a [`DimensionTable`].

mod error;

pub use error::IdSetError;

use std::fmt;

use indexmap::IndexMap;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString, IntoStaticStr};

/// The most values a stepped range may expand to in a query.
pub const MAX_STEPPED_VALUES: usize = 10_000;

/// One term of a `^`-separated union.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetTerm {
    Single(String),
    Range {
        start: String,
        stop: String,
        step: Option<i64>,
    },
}

/// A single `dimension=set-expression` constraint. The original text is kept
/// verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdExpression {
    raw: String,
    eq_pos: usize,
    terms: Vec<SetTerm>,
}

impl IdExpression {
    pub fn parse(s: &str) -> Result<IdExpression, IdSetError> {
        let eq_pos = match s.find('=') {
            Some(0) | None => return Err(IdSetError::NotKeyValue(s.to_string())),
            Some(i) => i,
        };
        if s.starts_with('-') || s[..eq_pos].trim().is_empty() {
            return Err(IdSetError::NotKeyValue(s.to_string()));
        }

        let value = &s[eq_pos + 1..];
        if value.trim().is_empty() {
            return Err(IdSetError::EmptyValue(s.to_string()));
        }

        let mut terms = Vec::new();
        for (position, term) in value.split('^').enumerate() {
            if term.trim().is_empty() {
                return Err(IdSetError::EmptyTerm {
                    expr: s.to_string(),
                    position,
                });
            }
            terms.push(parse_term(s, term)?);
        }

        Ok(IdExpression {
            raw: s.to_string(),
            eq_pos,
            terms,
        })
    }

    /// The dimension name, e.g. "visit".
    pub fn key(&self) -> &str {
        self.raw[..self.eq_pos].trim()
    }

    /// The set expression, e.g. "20..22^26..37".
    pub fn value(&self) -> &str {
        &self.raw[self.eq_pos + 1..]
    }

    pub fn terms(&self) -> &[SetTerm] {
        &self.terms
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Render this constraint as a Butler-style boolean expression.
    pub fn to_where(&self, dimensions: &DimensionTable) -> Result<String, IdSetError> {
        let dim = dimensions
            .get(self.key())
            .ok_or_else(|| IdSetError::UnknownDimension {
                dimension: self.key().to_string(),
                expr: self.raw.clone(),
                known: dimensions.keys().join(", "),
            })?;
        let name = dim.name.as_deref().unwrap_or_else(|| self.key());

        let mut alternatives = Vec::with_capacity(self.terms.len());
        for term in &self.terms {
            alternatives.push(self.term_to_where(term, name, dim.kind)?);
        }
        Ok(sql_any(&alternatives))
    }

    fn term_to_where(
        &self,
        term: &SetTerm,
        name: &str,
        kind: DimensionKind,
    ) -> Result<String, IdSetError> {
        match term {
            SetTerm::Single(v) => Ok(format!("{name} = {}", self.literal(v, name, kind)?)),

            SetTerm::Range {
                start,
                stop,
                step: None,
            } => Ok(format!(
                "{} <= {name} AND {name} <= {}",
                self.literal(start, name, kind)?,
                self.literal(stop, name, kind)?
            )),

            SetTerm::Range {
                start,
                stop,
                step: Some(step),
            } => {
                if kind != DimensionKind::Int {
                    return Err(IdSetError::BadStep {
                        expr: self.raw.clone(),
                        term: format!("{start}..{stop}:{step}"),
                    });
                }
                let (start, stop) = (self.int(start, name)?, self.int(stop, name)?);
                match *step {
                    1 => Ok(format!("{start} <= {name} AND {name} <= {stop}")),
                    -1 => Ok(format!("{stop} <= {name} AND {name} <= {start}")),
                    step => {
                        let values = stepped_range(start, stop, step).ok_or_else(|| {
                            IdSetError::TooManyValues {
                                expr: self.raw.clone(),
                                term: format!("{start}..{stop}:{step}"),
                                max: MAX_STEPPED_VALUES,
                            }
                        })?;
                        if values.is_empty() {
                            return Err(IdSetError::EmptyRange {
                                expr: self.raw.clone(),
                                term: format!("{start}..{stop}:{step}"),
                            });
                        }
                        Ok(format!("{name} IN ({})", values.iter().join(",")))
                    }
                }
            }
        }
    }

    fn literal(&self, v: &str, name: &str, kind: DimensionKind) -> Result<String, IdSetError> {
        let v = v.trim();
        match kind {
            DimensionKind::Int => self.int(v, name).map(|i| i.to_string()),
            DimensionKind::Float => match v.parse::<f64>() {
                Ok(_) => Ok(v.to_string()),
                Err(_) => Err(self.wrong_type(v, name, kind)),
            },
            DimensionKind::Str => Ok(sql_quote_literal(v)),
        }
    }

    fn int(&self, v: &str, name: &str) -> Result<i64, IdSetError> {
        v.trim()
            .parse()
            .map_err(|_| self.wrong_type(v, name, DimensionKind::Int))
    }

    fn wrong_type(&self, v: &str, name: &str, kind: DimensionKind) -> IdSetError {
        IdSetError::WrongValueType {
            value: v.to_string(),
            expr: self.raw.clone(),
            dimension: name.to_string(),
            kind: kind.into(),
        }
    }
}

impl fmt::Display for IdExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn parse_term(expr: &str, term: &str) -> Result<SetTerm, IdSetError> {
    let malformed = || IdSetError::MalformedRange {
        expr: expr.to_string(),
        term: term.to_string(),
    };

    let (start, rest) = match term.split_once("..") {
        None => return Ok(SetTerm::Single(term.to_string())),
        Some(pair) => pair,
    };
    if rest.contains("..") {
        return Err(malformed());
    }
    let (stop, step) = match rest.split_once(':') {
        None => (rest, None),
        Some((stop, step)) => (stop, Some(step)),
    };
    if start.trim().is_empty() || stop.trim().is_empty() {
        return Err(malformed());
    }

    let step = match step {
        None => None,
        Some(step) => {
            let bad_step = || IdSetError::BadStep {
                expr: expr.to_string(),
                term: term.to_string(),
            };
            let step: i64 = step.trim().parse().map_err(|_| bad_step())?;
            let integer_bounds =
                start.trim().parse::<i64>().is_ok() && stop.trim().parse::<i64>().is_ok();
            if step == 0 || !integer_bounds {
                return Err(bad_step());
            }
            Some(step)
        }
    };

    Ok(SetTerm::Range {
        start: start.to_string(),
        stop: stop.to_string(),
        step,
    })
}

/// Values of an inclusive stepped range. The step's sign sets the direction.
/// `None` if there would be more than [`MAX_STEPPED_VALUES`] of them.
fn stepped_range(start: i64, stop: i64, step: i64) -> Option<Vec<i64>> {
    let span = i128::from(stop) - i128::from(start);
    if span != 0 && (span < 0) != (step < 0) {
        return Some(vec![]);
    }
    let count = span / i128::from(step) + 1;
    if count > MAX_STEPPED_VALUES as i128 {
        return None;
    }

    let mut values = Vec::with_capacity(count as usize);
    let mut x = Some(start);
    while let Some(v) = x {
        if (step > 0 && v > stop) || (step < 0 && v < stop) {
            break;
        }
        values.push(v);
        x = v.checked_add(step);
    }
    Some(values)
}

/// A conjunction of identifier expressions, e.g. `["field=FLAT_ODD^FLAT_EVEN",
/// "arm=m"]`. Order is preserved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdFilter(Vec<IdExpression>);

impl IdFilter {
    pub fn parse<S: AsRef<str>>(exprs: &[S]) -> Result<IdFilter, IdSetError> {
        exprs
            .iter()
            .map(|s| IdExpression::parse(s.as_ref()))
            .collect::<Result<Vec<_>, _>>()
            .map(IdFilter)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, IdExpression> {
        self.0.iter()
    }

    /// The verbatim expressions, as they should follow an `--id` option.
    pub fn legacy_args(&self) -> Vec<String> {
        self.0.iter().map(|e| e.raw.clone()).collect()
    }

    /// All constraints AND-ed together as a Butler-style query.
    pub fn to_where(&self, dimensions: &DimensionTable) -> Result<String, IdSetError> {
        let parts = self
            .0
            .iter()
            .map(|e| e.to_where(dimensions))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sql_all(&parts))
    }
}

impl fmt::Display for IdFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.iter().join(" "))
    }
}

/// Value types of query dimensions.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, IntoStaticStr, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum DimensionKind {
    #[strum(serialize = "int")]
    Int,
    #[strum(serialize = "float")]
    Float,
    #[strum(serialize = "str")]
    Str,
}

/// How a legacy identifier key appears in a Butler query. If `name` is not
/// given, the key is used as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimension {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: DimensionKind,
}

impl Dimension {
    pub fn new(kind: DimensionKind) -> Dimension {
        Dimension { name: None, kind }
    }

    pub fn renamed(name: &str, kind: DimensionKind) -> Dimension {
        Dimension {
            name: Some(name.to_string()),
            kind,
        }
    }
}

/// Translation table from legacy identifier keys to Butler dimensions.
pub type DimensionTable = IndexMap<String, Dimension>;

/// The translation table used when none is configured.
pub fn default_dimension_table() -> DimensionTable {
    use DimensionKind::*;

    let mut t = DimensionTable::new();
    t.insert("arm".into(), Dimension::new(Str));
    t.insert("detector".into(), Dimension::new(Int));
    t.insert("dither".into(), Dimension::new(Float));
    t.insert("exposure".into(), Dimension::new(Int));
    t.insert("instrument".into(), Dimension::new(Str));
    t.insert("pfs_design_id".into(), Dimension::new(Int));
    t.insert("spectrograph".into(), Dimension::new(Int));
    t.insert("visit".into(), Dimension::new(Int));
    t.insert("field".into(), Dimension::renamed("exposure.target_name", Str));
    t.insert("pfsDesignId".into(), Dimension::renamed("pfs_design_id", Int));
    t
}

/// Join expressions with `AND`; a lone expression is left bare.
pub fn sql_all<S: AsRef<str>>(exprs: &[S]) -> String {
    match exprs {
        [] => "TRUE".to_string(),
        [e] => e.as_ref().to_string(),
        _ => exprs.iter().map(|e| format!("({})", e.as_ref())).join(" AND "),
    }
}

/// Join expressions with `OR`; a lone expression is left bare.
pub fn sql_any<S: AsRef<str>>(exprs: &[S]) -> String {
    match exprs {
        [] => "FALSE".to_string(),
        [e] => e.as_ref().to_string(),
        _ => exprs.iter().map(|e| format!("({})", e.as_ref())).join(" OR "),
    }
}

pub fn sql_quote_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}
