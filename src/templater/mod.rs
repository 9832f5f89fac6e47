//! The `${path}` expression language (§6 "Template language", §9
//! "Templating"). A tiny interpreter: tokenize `${...}` spans, resolve
//! each via the header -> body-path -> property cascade, and coalesce
//! missing values per the caller's intent.

use crate::domain::ExecutionExchange;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

static TEMPLATE_RE_CELL: OnceLock<Regex> = OnceLock::new();

fn template_re() -> &'static Regex {
    TEMPLATE_RE_CELL.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("static template regex"))
}

/// How a missing value should be coalesced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coalesce {
    /// Destination is a template string: missing resolves to `""`.
    EmptyString,
    /// Destination is a typed parameter extraction: missing resolves to
    /// absence, distinguishing "empty" from "not provided".
    Absent,
}

/// Resolve a single dotted `path` against the header -> body -> property
/// cascade described in §6. Returns `None` only under `Coalesce::Absent`
/// when nothing in the cascade holds a non-null value.
pub fn resolve_path(exchange: &ExecutionExchange, path: &str, coalesce: Coalesce) -> Option<Value> {
    if let Some(v) = exchange.headers.get(path) {
        if !v.is_null() {
            return Some(v.clone());
        }
    }

    if let Some(v) = resolve_body_path(&exchange.body, path) {
        if !v.is_null() {
            return Some(v);
        }
    }

    if let Some(v) = exchange.properties.get(path) {
        if !v.is_null() {
            return Some(v.clone());
        }
    }

    match coalesce {
        Coalesce::EmptyString => Some(Value::String(String::new())),
        Coalesce::Absent => None,
    }
}

/// Walks a dotted JSON path (e.g. `order.customer.id`) into `body`.
pub fn resolve_body_path(body: &Value, path: &str) -> Option<Value> {
    let mut current = body;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current.clone())
}

/// Evaluates a `${...}`-templated string, substituting every span via
/// [`resolve_path`] with [`Coalesce::EmptyString`] and rendering the
/// resolved value as a display string (strings are unquoted, everything
/// else is JSON-rendered).
pub fn evaluate_template(exchange: &ExecutionExchange, template: &str) -> String {
    let mut out = String::with_capacity(template.len());
    let mut last_end = 0;

    for caps in template_re().captures_iter(template) {
        let whole = caps.get(0).expect("capture group 0 always present");
        out.push_str(&template[last_end..whole.start()]);

        let path = caps.get(1).map(|m| m.as_str().trim()).unwrap_or("");
        let resolved = resolve_path(exchange, path, Coalesce::EmptyString).unwrap_or(Value::String(String::new()));
        out.push_str(&render_display(&resolved));

        last_end = whole.end();
    }
    out.push_str(&template[last_end..]);
    out
}

/// Evaluates a single `${path}` expression as a typed value: if the
/// entire string is one template span, returns the resolved JSON value
/// directly (not stringified); otherwise falls back to string
/// interpolation via [`evaluate_template`].
pub fn evaluate_expression(exchange: &ExecutionExchange, expression: &str) -> Value {
    let trimmed = expression.trim();
    if trimmed.starts_with("${") && trimmed.ends_with('}') && template_re().find_iter(trimmed).count() == 1 {
        if let Some(caps) = template_re().captures(trimmed) {
            let path = caps.get(1).map(|m| m.as_str().trim()).unwrap_or("");
            return resolve_path(exchange, path, Coalesce::EmptyString).unwrap_or(Value::String(String::new()));
        }
    }
    Value::String(evaluate_template(exchange, expression))
}

/// Relational operators recognized in `filter`/`choice`/loop-condition
/// expressions, longest-match first so `>=` isn't split into `>` + `=`.
const CONDITION_OPERATORS: &[&str] = &["==", "!=", ">=", "<=", ">", "<"];

/// Evaluates a boolean condition expression. A bare `${path}` or literal
/// is resolved via [`evaluate_expression`] and truthiness-coerced; an
/// expression containing one of the relational operators above splits
/// into two operands, each resolved the same way, and compared
/// numerically when both sides parse as numbers, lexically otherwise.
pub fn evaluate_condition(exchange: &ExecutionExchange, expression: &str) -> bool {
    let trimmed = expression.trim();
    for op in CONDITION_OPERATORS {
        if let Some(idx) = trimmed.find(op) {
            let left = &trimmed[..idx];
            let right = &trimmed[idx + op.len()..];
            let lv = evaluate_operand(exchange, left);
            let rv = evaluate_operand(exchange, right);
            return compare(&lv, &rv, op);
        }
    }
    is_truthy(&evaluate_expression(exchange, trimmed))
}

fn evaluate_operand(exchange: &ExecutionExchange, operand: &str) -> Value {
    let trimmed = operand.trim();
    if trimmed.starts_with("${") && trimmed.ends_with('}') {
        return evaluate_expression(exchange, trimmed);
    }
    if let Some(unquoted) = strip_matching_quotes(trimmed) {
        return Value::String(unquoted.to_string());
    }
    if let Ok(n) = trimmed.parse::<f64>() {
        if let Some(num) = serde_json::Number::from_f64(n) {
            return Value::Number(num);
        }
    }
    match trimmed {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(trimmed.to_string()),
    }
}

fn strip_matching_quotes(s: &str) -> Option<&str> {
    if s.len() >= 2 {
        let bytes = s.as_bytes();
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'\'' || first == b'"') && first == last {
            return Some(&s[1..s.len() - 1]);
        }
    }
    None
}

fn compare(left: &Value, right: &Value, op: &str) -> bool {
    if let (Some(l), Some(r)) = (left.as_f64(), right.as_f64()) {
        return match op {
            "==" => l == r,
            "!=" => l != r,
            ">=" => l >= r,
            "<=" => l <= r,
            ">" => l > r,
            "<" => l < r,
            _ => false,
        };
    }
    let (l, r) = (render_display(left), render_display(right));
    match op {
        "==" => l == r,
        "!=" => l != r,
        ">=" => l >= r,
        "<=" => l <= r,
        ">" => l > r,
        "<" => l < r,
        _ => false,
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty() && s != "false" && s != "0",
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn render_display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Saga node parameter extraction order (§4.3 "Parameter extraction"):
/// (1) `properties[property_key]` (templated if it contains `${...}`),
/// (2) body dotted path `property_key`, (3) body dotted path
/// `alias_path`, (4) header `fallback_header_key`, (5) `default`. Empty
/// strings and literal `null` are treated as absent at every step.
pub fn extract_saga_param(
    exchange: &ExecutionExchange,
    properties: &std::collections::HashMap<String, Value>,
    property_key: &str,
    alias_path: Option<&str>,
    fallback_header_key: Option<&str>,
    default: Option<&str>,
) -> Option<String> {
    if let Some(raw) = properties.get(property_key) {
        if let Some(s) = non_empty_str(raw) {
            return Some(if s.contains("${") {
                evaluate_template(exchange, &s)
            } else {
                s
            });
        }
    }

    if let Some(v) = resolve_body_path(&exchange.body, property_key) {
        if let Some(s) = non_empty_str(&v) {
            return Some(s);
        }
    }

    if let Some(alias) = alias_path {
        if let Some(v) = resolve_body_path(&exchange.body, alias) {
            if let Some(s) = non_empty_str(&v) {
                return Some(s);
            }
        }
    }

    if let Some(header_key) = fallback_header_key {
        if let Some(v) = exchange.headers.get(header_key) {
            if let Some(s) = non_empty_str(v) {
                return Some(s);
            }
        }
    }

    default.map(|d| d.to_string())
}

fn non_empty_str(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(render_display(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn exchange() -> ExecutionExchange {
        let mut ex = ExecutionExchange::new("t1::r1", json!({"amount": 500, "order": {"customer": {"id": "c1"}}}));
        ex.headers.insert("priority".to_string(), json!("high"));
        ex
    }

    #[test]
    fn substitutes_body_dotted_path() {
        let ex = exchange();
        assert_eq!(evaluate_template(&ex, "id=${order.customer.id}"), "id=c1");
    }

    #[test]
    fn missing_path_coalesces_to_empty_string_in_template() {
        let ex = exchange();
        assert_eq!(evaluate_template(&ex, "x=${nope}"), "x=");
    }

    #[test]
    fn single_span_expression_returns_typed_value() {
        let ex = exchange();
        assert_eq!(evaluate_expression(&ex, "${amount}"), json!(500));
    }

    #[test]
    fn header_wins_over_body_when_both_present() {
        let mut ex = exchange();
        ex.headers.insert("amount".to_string(), json!(999));
        assert_eq!(evaluate_expression(&ex, "${amount}"), json!(999));
    }

    #[test]
    fn saga_param_falls_back_through_cascade() {
        let ex = exchange();
        let props = std::collections::HashMap::new();
        let resolved = extract_saga_param(&ex, &props, "sourceAccount", Some("order.customer.id"), Some("priority"), Some("ACC-DEFAULT"));
        assert_eq!(resolved.as_deref(), Some("c1"));
    }

    #[test]
    fn saga_param_property_key_is_templated() {
        let ex = exchange();
        let mut props = std::collections::HashMap::new();
        props.insert("sourceAccount".to_string(), json!("acct-${order.customer.id}"));
        let resolved = extract_saga_param(&ex, &props, "sourceAccount", None, None, None);
        assert_eq!(resolved.as_deref(), Some("acct-c1"));
    }

    #[test]
    fn condition_numeric_comparison() {
        let ex = exchange();
        assert!(!evaluate_condition(&ex, "${amount} > 1000"));
        assert!(evaluate_condition(&ex, "${amount} > 100"));
        assert!(evaluate_condition(&ex, "${amount} >= 500"));
        assert!(evaluate_condition(&ex, "${amount} == 500"));
    }

    #[test]
    fn condition_string_equality_with_quoted_literal() {
        let ex = exchange();
        assert!(evaluate_condition(&ex, "${priority}=='high'"));
        assert!(!evaluate_condition(&ex, "${priority}=='low'"));
    }

    #[test]
    fn condition_bare_expression_falls_back_to_truthiness() {
        let ex = exchange();
        assert!(evaluate_condition(&ex, "${priority}"));
        assert!(!evaluate_condition(&ex, "${missing}"));
    }
}
