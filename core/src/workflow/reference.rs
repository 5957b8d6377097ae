use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

/// A `${step_id.path}` reference found in a step input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReference {
    pub step_id: String,
    pub path: Vec<String>,
}

fn reference_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\$\{\s*([A-Za-z0-9_\-]+)((?:\.[A-Za-z0-9_\-]+)*)\s*\}")
            .expect("reference regex is valid")
    })
}

fn parse_references(s: &str) -> Vec<StepReference> {
    reference_regex()
        .captures_iter(s)
        .map(|caps| StepReference {
            step_id: caps[1].to_string(),
            path: caps
                .get(2)
                .map(|m| {
                    m.as_str()
                        .split('.')
                        .filter(|seg| !seg.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
        })
        .collect()
}

/// Collect every step reference inside a JSON value (strings, arrays and objects, recursively).
pub fn find_references(value: &Value) -> Vec<StepReference> {
    let mut out = Vec::new();
    collect_references(value, &mut out);
    out
}

fn collect_references(value: &Value, out: &mut Vec<StepReference>) {
    match value {
        Value::String(s) => out.extend(parse_references(s)),
        Value::Array(items) => items.iter().for_each(|v| collect_references(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_references(v, out)),
        _ => {}
    }
}

/// Replace references with upstream values.
///
/// `lookup` returns the output of a step, or `None` when that step has no usable output.
/// A string consisting of exactly one reference becomes the referenced JSON value; references
/// embedded in longer text are interpolated.
pub fn resolve_value<F>(value: &Value, lookup: &F) -> Result<Value, String>
where
    F: Fn(&str) -> Option<Value>,
{
    match value {
        Value::String(s) => resolve_string(s, lookup),
        Value::Array(items) => items
            .iter()
            .map(|v| resolve_value(v, lookup))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), resolve_value(v, lookup)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

/// Resolve every input of a step.
pub fn resolve_inputs<F>(inputs: &Map<String, Value>, lookup: &F) -> Result<Map<String, Value>, String>
where
    F: Fn(&str) -> Option<Value>,
{
    let mut out = Map::with_capacity(inputs.len());
    for (name, value) in inputs {
        let resolved =
            resolve_value(value, lookup).map_err(|e| format!("input '{name}': {e}"))?;
        out.insert(name.clone(), resolved);
    }
    Ok(out)
}

fn resolve_string<F>(s: &str, lookup: &F) -> Result<Value, String>
where
    F: Fn(&str) -> Option<Value>,
{
    let re = reference_regex();

    if let Some(m) = re.find(s.trim()) {
        if m.start() == 0 && m.end() == s.trim().len() {
            let reference = parse_references(s.trim())
                .into_iter()
                .next()
                .ok_or_else(|| format!("malformed reference '{s}'"))?;
            return lookup_reference(&reference, lookup);
        }
    } else {
        return Ok(Value::String(s.to_string()));
    }

    let mut out = String::with_capacity(s.len());
    let mut last = 0;
    for caps in re.captures_iter(s) {
        let Some(whole) = caps.get(0) else { continue };
        out.push_str(&s[last..whole.start()]);
        let reference = parse_references(whole.as_str())
            .into_iter()
            .next()
            .ok_or_else(|| format!("malformed reference '{}'", whole.as_str()))?;
        match lookup_reference(&reference, lookup)? {
            Value::String(text) => out.push_str(&text),
            Value::Null => {}
            other => out.push_str(&other.to_string()),
        }
        last = whole.end();
    }
    out.push_str(&s[last..]);
    Ok(Value::String(out))
}

fn lookup_reference<F>(reference: &StepReference, lookup: &F) -> Result<Value, String>
where
    F: Fn(&str) -> Option<Value>,
{
    let root = lookup(&reference.step_id)
        .ok_or_else(|| format!("no output available from step '{}'", reference.step_id))?;

    let mut current = &root;
    for segment in &reference.path {
        current = match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            // `continue` policy hands out null for failed steps; fields of null stay null
            Value::Null => return Ok(Value::Null),
            _ => None,
        }
        .ok_or_else(|| {
            format!(
                "field '{}' not found in output of step '{}'",
                reference.path.join("."),
                reference.step_id
            )
        })?;
    }
    Ok(current.clone())
}
