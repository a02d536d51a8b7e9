//! The small slice of OData the mock understands: `eq` filters joined with
//! `and`, `fields($select=..)` expansion and `$skiptoken` paging.

use serde_json::{json, Map, Value};
use url::form_urlencoded;

/// Query string as decoded pairs, in order.
pub fn pairs(raw: Option<&str>) -> Vec<(String, String)> {
    raw.map(|q| form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default()
}

pub fn param<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
}

/// One `path eq literal` clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub path: String,
    pub value: Value,
}

pub fn parse_filter(expr: &str) -> Result<Vec<Clause>, String> {
    expr.split(" and ")
        .map(|clause| -> Result<Clause, String> {
            let (path, literal) = clause
                .split_once(" eq ")
                .ok_or_else(|| format!("unsupported filter clause: {clause}"))?;
            Ok(Clause {
                path: path.trim().to_string(),
                value: parse_literal(literal.trim())?,
            })
        })
        .collect()
}

fn parse_literal(raw: &str) -> Result<Value, String> {
    if let Some(inner) = raw.strip_prefix('\'').and_then(|r| r.strip_suffix('\'')) {
        return Ok(Value::String(inner.replace("''", "'")));
    }
    match raw {
        "true" => Ok(Value::Bool(true)),
        "false" => Ok(Value::Bool(false)),
        "null" => Ok(Value::Null),
        _ => raw
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| format!("unsupported literal: {raw}")),
    }
}

/// Whether `object` satisfies every clause. Paths are `/`-separated.
pub fn matches(object: &Value, clauses: &[Clause]) -> bool {
    clauses.iter().all(|clause| {
        let found = clause
            .path
            .split('/')
            .try_fold(object, |node, key| node.get(key));
        found == Some(&clause.value)
    })
}

/// How list item `fields` are expanded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldsExpansion {
    None,
    All,
    Select(Vec<String>),
}

pub fn fields_expansion(expand: Option<&str>) -> FieldsExpansion {
    match expand.map(str::trim) {
        None => FieldsExpansion::None,
        Some("fields") => FieldsExpansion::All,
        Some(other) => match other
            .strip_prefix("fields($select=")
            .and_then(|rest| rest.strip_suffix(')'))
        {
            Some(list) => FieldsExpansion::Select(
                list.split(',').map(|f| f.trim().to_string()).collect(),
            ),
            None => FieldsExpansion::None,
        },
    }
}

pub fn project_fields(fields: &Map<String, Value>, expansion: &FieldsExpansion) -> Option<Value> {
    match expansion {
        FieldsExpansion::None => None,
        FieldsExpansion::All => Some(Value::Object(fields.clone())),
        FieldsExpansion::Select(names) => Some(Value::Object(
            fields
                .iter()
                .filter(|(k, _)| k.as_str() == "id" || names.iter().any(|n| n == *k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )),
    }
}

/// One page of `items` starting at the request's `$skiptoken`, with an
/// `@odata.nextLink` pointing at the rest.
pub fn page(
    items: Vec<Value>,
    page_size: usize,
    host: &str,
    path: &str,
    query: &[(String, String)],
) -> Value {
    let total = items.len();
    let skip = param(query, "$skiptoken")
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(0);
    let value: Vec<Value> = items.into_iter().skip(skip).take(page_size).collect();

    let mut body = json!({ "value": value });
    let next = skip + page_size;
    if next < total {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (k, v) in query.iter().filter(|(k, _)| k != "$skiptoken") {
            serializer.append_pair(k, v);
        }
        serializer.append_pair("$skiptoken", &next.to_string());
        body["@odata.nextLink"] = Value::String(format!("http://{host}{path}?{}", serializer.finish()));
    }
    body
}
