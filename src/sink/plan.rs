//! Execution-plan summary.
//!
//! Reads the three facts the aggregation needs out of an explain document,
//! in either the legacy layout (`cursor`, `indexOnly`, `millis`) or the
//! modern one (`queryPlanner.winningPlan` stage tree plus
//! `executionStats.executionTimeMillis`).

use serde_json::Value;

use super::SinkError;

/// Index identifier recorded for plans that scan the whole collection.
pub const COLLECTION_SCAN: &str = "$natural";

const LEGACY_INDEX_CURSOR: &str = "BtreeCursor";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanSummary {
    /// Name of the chosen access path.
    pub index: String,
    /// True when the index alone answered the query.
    pub covered: bool,
    /// Elapsed time in milliseconds.
    pub millis: u64,
}

impl PlanSummary {
    pub fn from_explain(explain: &Value) -> Result<Self, SinkError> {
        if let Some(cursor) = explain.get("cursor") {
            let cursor = cursor
                .as_str()
                .ok_or_else(|| SinkError::MalformedEvent("explain cursor is not a string".to_string()))?;
            return Ok(Self {
                index: legacy_index(cursor),
                covered: truthy(explain.get("indexOnly")),
                millis: millis(explain.get("millis"))?,
            });
        }

        if let Some(winning) = explain.pointer("/queryPlanner/winningPlan") {
            let mut stages = Vec::new();
            collect_stages(winning, &mut stages);
            let index = stages
                .iter()
                .find(|stage| stage.get("stage").and_then(Value::as_str) == Some("IXSCAN"))
                .and_then(|stage| stage.get("indexName"))
                .and_then(Value::as_str);
            let fetches = stages
                .iter()
                .any(|stage| matches!(stage.get("stage").and_then(Value::as_str), Some("FETCH" | "COLLSCAN")));

            return Ok(Self {
                index: index.unwrap_or(COLLECTION_SCAN).to_string(),
                covered: index.is_some() && !fetches,
                millis: millis(explain.pointer("/executionStats/executionTimeMillis"))?,
            });
        }

        Err(SinkError::MalformedEvent(
            "explain has no recognizable plan".to_string(),
        ))
    }
}

/// `BtreeCursor a_1_b_1 reverse` names index `a_1_b_1`; anything else is a
/// collection scan.
fn legacy_index(cursor: &str) -> String {
    let mut words = cursor.split_whitespace();
    match (words.next(), words.next()) {
        (Some(LEGACY_INDEX_CURSOR), Some(name)) => name.to_string(),
        _ => COLLECTION_SCAN.to_string(),
    }
}

fn collect_stages<'a>(stage: &'a Value, out: &mut Vec<&'a Value>) {
    out.push(stage);
    if let Some(child) = stage.get("inputStage") {
        collect_stages(child, out);
    }
    if let Some(Value::Array(children)) = stage.get("inputStages") {
        for child in children {
            collect_stages(child, out);
        }
    }
}

fn truthy(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map_or(false, |f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(map)) => !map.is_empty(),
        Some(Value::Null) | None => false,
    }
}

fn millis(value: Option<&Value>) -> Result<u64, SinkError> {
    let value = value.ok_or_else(|| SinkError::MalformedEvent("explain has no elapsed time".to_string()))?;
    value
        .as_u64()
        .or_else(|| value.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u64))
        .ok_or_else(|| SinkError::MalformedEvent(format!("elapsed time is not a duration: {}", value)))
}
