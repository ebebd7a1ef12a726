//! Filter pushdown: a tolerant decoder from the client's opaque JSON
//! expression-tree format (§3/§6) into a closed [`FilterExpr`] tree, and a
//! re-encoder that turns a tree back into a SQL `WHERE`-clause body for a
//! given [`SqlDialect`], honoring the narrowing-safety rules in §4.3/§8.

use std::collections::HashMap;

use data_types::Value as DataValue;
use data_types::LogicalTypeId;
use serde::Deserialize;
use serde_json::Value as Json;
use snafu::prelude::*;

#[derive(Debug, Snafu)]
pub enum DecodeError {
    #[snafu(display("filter payload is not valid JSON: {source}"))]
    InvalidJson { source: serde_json::Error },

    #[snafu(display("filter payload is missing required field '{field}'"))]
    MissingField { field: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    /// Right-hand operand is a [`FilterExpr::List`] of candidate values,
    /// not a single scalar.
    In,
    /// Right-hand operand is a [`FilterExpr::List`] of candidate values,
    /// not a single scalar.
    NotIn,
}

impl CompareOp {
    fn as_sql(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::NotEq => "<>",
            CompareOp::Lt => "<",
            CompareOp::LtEq => "<=",
            CompareOp::Gt => ">",
            CompareOp::GtEq => ">=",
            CompareOp::In => "IN",
            CompareOp::NotIn => "NOT IN",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConjunctionOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    IsNull,
    IsNotNull,
    Not,
}

/// A single entry in the client's column-binding table: which `(table
/// index, column index)` pair a `ColumnRef` refers to, and the column's
/// name in the table's own schema.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ColumnBinding {
    pub table_index: u32,
    pub column_index: u32,
    pub name: String,
}

/// A closed tagged sum of the filter expression shapes the client may send.
/// `Unsupported` is an explicit variant, not a parse failure: it carries the
/// raw JSON so sibling filters still encode even when one node's shape is
/// not recognized (§3, §4.3).
#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpr {
    Literal(DataValue),
    ColumnRef {
        table_index: u32,
        column_index: u32,
    },
    Comparison {
        op: CompareOp,
        left: Box<FilterExpr>,
        right: Box<FilterExpr>,
    },
    Conjunction {
        op: ConjunctionOp,
        children: Vec<FilterExpr>,
    },
    FunctionCall {
        name: String,
        args: Vec<FilterExpr>,
    },
    Cast {
        expr: Box<FilterExpr>,
        target_type: String,
        try_cast: bool,
    },
    Between {
        expr: Box<FilterExpr>,
        low: Box<FilterExpr>,
        high: Box<FilterExpr>,
        low_inclusive: bool,
        high_inclusive: bool,
        negated: bool,
    },
    Unary {
        op: UnaryOp,
        expr: Box<FilterExpr>,
    },
    Case {
        when_then: Vec<(FilterExpr, FilterExpr)>,
        else_expr: Option<Box<FilterExpr>>,
    },
    List(Vec<FilterExpr>),
    Unsupported {
        raw: Json,
    },
}

/// The decoded pushdown payload: an implicit AND of `filters`, plus the
/// binding table `ColumnRef`s resolve against.
#[derive(Debug, Clone, Default)]
pub struct FilterPushdown {
    pub filters: Vec<FilterExpr>,
    pub column_bindings: Vec<ColumnBinding>,
}

impl FilterPushdown {
    pub fn resolve_column(&self, table_index: u32, column_index: u32) -> Option<&str> {
        self.column_bindings
            .iter()
            .find(|b| b.table_index == table_index && b.column_index == column_index)
            .map(|b| b.name.as_str())
    }
}

/// Decodes the opaque bytes a client passes as `ScanOptions.filter`.
///
/// The outer envelope (`{"filters": [...], "column_bindings": [...]}`) must
/// be well-formed; individual expression nodes never fail to parse — an
/// unrecognized shape becomes `FilterExpr::Unsupported` instead.
pub fn decode_filters(bytes: &[u8]) -> Result<FilterPushdown, DecodeError> {
    let root: Json = serde_json::from_slice(bytes).context(InvalidJsonSnafu)?;
    let filters_json = root.get("filters").context(MissingFieldSnafu {
        field: "filters",
    })?;
    let filters = filters_json
        .as_array()
        .cloned()
        .unwrap_or_default()
        .iter()
        .map(parse_expr)
        .collect();

    let column_bindings = root
        .get("column_bindings")
        .and_then(Json::as_array)
        .cloned()
        .unwrap_or_default()
        .iter()
        .filter_map(|v| serde_json::from_value::<ColumnBinding>(v.clone()).ok())
        .collect();

    Ok(FilterPushdown {
        filters,
        column_bindings,
    })
}

fn parse_value(v: &Json) -> Option<DataValue> {
    let type_id = match v.get("type_id")?.as_str()? {
        "BOOLEAN" => LogicalTypeId::Boolean,
        "INTEGER" | "BIGINT" | "SMALLINT" | "TINYINT" => LogicalTypeId::Integer,
        "UBIGINT" | "UINTEGER" => LogicalTypeId::UnsignedInteger,
        "FLOAT" | "DOUBLE" => LogicalTypeId::Float,
        "VARCHAR" => LogicalTypeId::Utf8,
        "DATE" => LogicalTypeId::Date,
        "TIMESTAMP" => LogicalTypeId::Timestamp,
        "UUID" => LogicalTypeId::Uuid,
        other => LogicalTypeId::Unknown(other.parse().unwrap_or(-1)),
    };

    if v.get("is_null").and_then(Json::as_bool).unwrap_or(false) {
        return Some(DataValue::Null(type_id));
    }

    let raw = v.get("value")?;
    Some(match type_id {
        LogicalTypeId::Boolean => DataValue::Boolean(raw.as_bool()?),
        LogicalTypeId::Integer => DataValue::Integer(raw.as_i64()?),
        LogicalTypeId::UnsignedInteger => DataValue::UnsignedInteger(raw.as_u64()?),
        LogicalTypeId::Float => DataValue::Float(raw.as_f64()?.into()),
        LogicalTypeId::Utf8 => DataValue::Utf8(raw.as_str()?.to_string()),
        LogicalTypeId::Date => DataValue::Date(raw.as_str()?.parse().ok()?),
        LogicalTypeId::Timestamp => DataValue::Timestamp(raw.as_str()?.parse().ok()?),
        LogicalTypeId::Uuid => DataValue::Uuid(raw.as_str()?.parse().ok()?),
        LogicalTypeId::Unknown(_) => return None,
    })
}

fn parse_expr(v: &Json) -> FilterExpr {
    parse_expr_opt(v).unwrap_or_else(|| FilterExpr::Unsupported { raw: v.clone() })
}

fn parse_expr_opt(v: &Json) -> Option<FilterExpr> {
    match v.get("class")?.as_str()? {
        "BOUND_CONSTANT" => Some(FilterExpr::Literal(parse_value(v.get("value")?)?)),
        "BOUND_COLUMN_REF" => {
            let binding = v.get("binding")?;
            Some(FilterExpr::ColumnRef {
                table_index: binding.get("table_index")?.as_u64()? as u32,
                column_index: binding.get("column_index")?.as_u64()? as u32,
            })
        }
        "BOUND_COMPARISON" => {
            let op = match v.get("type")?.as_str()? {
                "COMPARE_EQUAL" => CompareOp::Eq,
                "COMPARE_NOTEQUAL" => CompareOp::NotEq,
                "COMPARE_LESSTHAN" => CompareOp::Lt,
                "COMPARE_LESSTHANOREQUALTO" => CompareOp::LtEq,
                "COMPARE_GREATERTHAN" => CompareOp::Gt,
                "COMPARE_GREATERTHANOREQUALTO" => CompareOp::GtEq,
                "COMPARE_IN" => CompareOp::In,
                "COMPARE_NOT_IN" => CompareOp::NotIn,
                _ => return None,
            };
            Some(FilterExpr::Comparison {
                op,
                left: Box::new(parse_expr(v.get("left")?)),
                right: Box::new(parse_expr(v.get("right")?)),
            })
        }
        "BOUND_CONJUNCTION" => {
            let op = match v.get("type")?.as_str()? {
                "CONJUNCTION_AND" => ConjunctionOp::And,
                "CONJUNCTION_OR" => ConjunctionOp::Or,
                _ => return None,
            };
            let children = v.get("children")?.as_array()?.iter().map(parse_expr).collect();
            Some(FilterExpr::Conjunction { op, children })
        }
        "BOUND_FUNCTION" => {
            let name = v.get("name")?.as_str()?.to_string();
            let args = v
                .get("children")
                .and_then(Json::as_array)
                .map(|a| a.iter().map(parse_expr).collect())
                .unwrap_or_default();
            Some(FilterExpr::FunctionCall { name, args })
        }
        "BOUND_CAST" => Some(FilterExpr::Cast {
            expr: Box::new(parse_expr(v.get("child")?)),
            target_type: v.get("target_type")?.as_str()?.to_string(),
            try_cast: v.get("try_cast").and_then(Json::as_bool).unwrap_or(false),
        }),
        "BOUND_BETWEEN" => Some(FilterExpr::Between {
            expr: Box::new(parse_expr(v.get("input")?)),
            low: Box::new(parse_expr(v.get("lower")?)),
            high: Box::new(parse_expr(v.get("upper")?)),
            low_inclusive: v
                .get("lower_inclusive")
                .and_then(Json::as_bool)
                .unwrap_or(true),
            high_inclusive: v
                .get("upper_inclusive")
                .and_then(Json::as_bool)
                .unwrap_or(true),
            negated: v.get("negated").and_then(Json::as_bool).unwrap_or(false),
        }),
        "BOUND_OPERATOR" => {
            let op = match v.get("type")?.as_str()? {
                "IS_NULL" => UnaryOp::IsNull,
                "IS_NOT_NULL" => UnaryOp::IsNotNull,
                "NOT" => UnaryOp::Not,
                _ => return None,
            };
            let child = v.get("children")?.as_array()?.first()?;
            Some(FilterExpr::Unary {
                op,
                expr: Box::new(parse_expr(child)),
            })
        }
        "BOUND_CASE" => {
            let when_then = v
                .get("when_then")?
                .as_array()?
                .iter()
                .filter_map(|pair| {
                    let pair = pair.as_array()?;
                    Some((parse_expr(pair.first()?), parse_expr(pair.get(1)?)))
                })
                .collect();
            let else_expr = v.get("else").map(|e| Box::new(parse_expr(e)));
            Some(FilterExpr::Case {
                when_then,
                else_expr,
            })
        }
        "BOUND_LIST" => {
            let items = v.get("children")?.as_array()?.iter().map(parse_expr).collect();
            Some(FilterExpr::List(items))
        }
        _ => None,
    }
}

/// A SQL dialect's literal/identifier quoting rules (§4.3).
pub trait SqlDialect {
    fn name(&self) -> &'static str;
    fn quote_identifier(&self, ident: &str) -> String;

    fn encode_literal(&self, value: &DataValue) -> String {
        match value {
            DataValue::Null(_) => "NULL".to_string(),
            DataValue::Boolean(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            DataValue::Integer(i) => i.to_string(),
            DataValue::UnsignedInteger(u) => u.to_string(),
            DataValue::Float(f) => format!("{}", f.into_inner()),
            DataValue::Utf8(s) => quote_string(s),
            DataValue::Date(d) => format!("CAST({} AS DATE)", quote_string(&d.to_string())),
            DataValue::Timestamp(ts) => {
                format!("CAST({} AS TIMESTAMP)", quote_string(&ts.to_string()))
            }
            DataValue::Uuid(u) => format!("CAST({} AS UUID)", quote_string(&u.to_string())),
        }
    }
}

fn quote_string(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// The client's native SQL dialect.
pub struct DuckDbDialect;

impl SqlDialect for DuckDbDialect {
    fn name(&self) -> &'static str {
        "duckdb"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }
}

/// Remaps for re-encoding: an absent key in either map means "use the
/// original column name" (§9 Open Questions). `column_expressions` takes
/// precedence over `column_mapping` when both have an entry for a column.
#[derive(Debug, Clone, Default)]
pub struct ColumnRemap<'a> {
    pub column_mapping: &'a HashMap<String, String>,
    pub column_expressions: &'a HashMap<String, String>,
}

struct Encoder<'a> {
    dialect: &'a dyn SqlDialect,
    bindings: &'a [ColumnBinding],
    remap: &'a ColumnRemap<'a>,
}

impl<'a> Encoder<'a> {
    fn resolve_column(&self, table_index: u32, column_index: u32) -> Option<String> {
        let name = self
            .bindings
            .iter()
            .find(|b| b.table_index == table_index && b.column_index == column_index)?
            .name
            .as_str();

        if let Some(expr) = self.remap.column_expressions.get(name) {
            return Some(expr.clone());
        }
        if let Some(mapped) = self.remap.column_mapping.get(name) {
            return Some(self.dialect.quote_identifier(mapped));
        }
        Some(self.dialect.quote_identifier(name))
    }

    /// Encodes one expression node. `None` means "not encodable" — the
    /// caller decides, based on whether its parent is an AND or an OR,
    /// whether that is survivable.
    fn encode(&self, expr: &FilterExpr) -> Option<String> {
        match expr {
            FilterExpr::Unsupported { .. } => None,
            FilterExpr::Literal(v) => Some(self.dialect.encode_literal(v)),
            FilterExpr::ColumnRef {
                table_index,
                column_index,
            } => self.resolve_column(*table_index, *column_index),
            FilterExpr::Comparison { op, left, right } => {
                let l = self.encode(left)?;
                let r = self.encode(right)?;
                Some(format!("{l} {} {r}", op.as_sql()))
            }
            FilterExpr::Conjunction { op, children } => self.encode_conjunction(*op, children),
            FilterExpr::FunctionCall { name, args } => {
                let parts = args
                    .iter()
                    .map(|a| self.encode(a))
                    .collect::<Option<Vec<_>>>()?;
                Some(format!("{name}({})", parts.join(", ")))
            }
            FilterExpr::Cast {
                expr,
                target_type,
                try_cast,
            } => {
                let inner = self.encode(expr)?;
                let func = if *try_cast { "TRY_CAST" } else { "CAST" };
                Some(format!("{func}({inner} AS {target_type})"))
            }
            FilterExpr::Between {
                expr,
                low,
                high,
                low_inclusive,
                high_inclusive,
                negated,
            } => {
                let e = self.encode(expr)?;
                let l = self.encode(low)?;
                let h = self.encode(high)?;
                let body = if *low_inclusive && *high_inclusive {
                    format!("{e} BETWEEN {l} AND {h}")
                } else {
                    let lower_op = if *low_inclusive { ">=" } else { ">" };
                    let upper_op = if *high_inclusive { "<=" } else { "<" };
                    format!("({e} {lower_op} {l} AND {e} {upper_op} {h})")
                };
                Some(if *negated {
                    format!("NOT ({body})")
                } else {
                    body
                })
            }
            FilterExpr::Unary { op, expr } => {
                let inner = self.encode(expr)?;
                Some(match op {
                    UnaryOp::IsNull => format!("{inner} IS NULL"),
                    UnaryOp::IsNotNull => format!("{inner} IS NOT NULL"),
                    UnaryOp::Not => format!("NOT ({inner})"),
                })
            }
            FilterExpr::Case {
                when_then,
                else_expr,
            } => {
                let mut arms = Vec::with_capacity(when_then.len());
                for (cond, result) in when_then {
                    arms.push(format!(
                        "WHEN {} THEN {}",
                        self.encode(cond)?,
                        self.encode(result)?
                    ));
                }
                let else_part = match else_expr {
                    Some(e) => format!(" ELSE {}", self.encode(e)?),
                    None => String::new(),
                };
                Some(format!("CASE {}{else_part} END", arms.join(" ")))
            }
            FilterExpr::List(items) => {
                let parts = items
                    .iter()
                    .map(|i| self.encode(i))
                    .collect::<Option<Vec<_>>>()?;
                Some(format!("({})", parts.join(", ")))
            }
        }
    }

    /// AND is safe to narrow: drop only the unsupported children. OR is
    /// not: if any child can't be encoded, the whole clause is dropped,
    /// since omitting it would make the filter broader than the client
    /// intended rather than narrower (§4.3, §8).
    fn encode_conjunction(&self, op: ConjunctionOp, children: &[FilterExpr]) -> Option<String> {
        match op {
            ConjunctionOp::And => {
                let parts: Vec<String> = children.iter().filter_map(|c| self.encode(c)).collect();
                if parts.is_empty() {
                    None
                } else {
                    Some(format!("({})", parts.join(" AND ")))
                }
            }
            ConjunctionOp::Or => {
                let parts = children
                    .iter()
                    .map(|c| self.encode(c))
                    .collect::<Option<Vec<_>>>()?;
                Some(format!("({})", parts.join(" OR ")))
            }
        }
    }
}

/// Re-encodes `pushdown` as a SQL `WHERE`-clause body (without the `WHERE`
/// keyword) for `dialect`. The top-level filter list is itself an implicit
/// AND, so it follows the AND narrowing rule: unsupported top-level filters
/// are dropped rather than failing the whole scan. Returns the empty string
/// when nothing is encodable.
pub fn encode_filters(
    pushdown: &FilterPushdown,
    dialect: &dyn SqlDialect,
    remap: &ColumnRemap<'_>,
) -> String {
    let encoder = Encoder {
        dialect,
        bindings: &pushdown.column_bindings,
        remap,
    };
    let parts: Vec<String> = pushdown
        .filters
        .iter()
        .filter_map(|f| encoder.encode(f))
        .collect();
    parts.join(" AND ")
}
