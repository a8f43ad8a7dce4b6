use serde_json::Value;
use transport::{RawResponse, TransportResult};

use crate::{AdminError, AdminResult};

/// Classify a raw transport result and extract the operation's result value.
///
/// * transport failure → [`AdminError::Transport`]
/// * GraphQL `errors` (any HTTP status) or a console `err` → [`AdminError::Remote`]
/// * otherwise the value at `data.<path>` (GraphQL) or the console result
pub fn interpret(response: TransportResult<RawResponse>, path: &[&str]) -> AdminResult<Value> {
    match response? {
        RawResponse::Http { status, body } => interpret_graphql(status, body, path),
        RawResponse::Console { result, error } => match error {
            Some(error) => Err(AdminError::Remote(error_text(&error))),
            None => Ok(result),
        },
    }
}

fn interpret_graphql(status: u16, mut body: Value, path: &[&str]) -> AdminResult<Value> {
    if let Some(message) = first_error_message(&body) {
        return Err(AdminError::Remote(message));
    }
    if !(200..300).contains(&status) {
        return Err(AdminError::Remote(format!("HTTP {status}")));
    }

    let mut cursor = match body.get_mut("data") {
        Some(data) if !data.is_null() => data.take(),
        _ => return Err(AdminError::remote("Response is missing data")),
    };
    for (depth, key) in path.iter().enumerate() {
        cursor = match cursor.get_mut(*key) {
            Some(value) => value.take(),
            None => {
                return Err(AdminError::Remote(format!(
                    "Response is missing data.{}",
                    path[..=depth].join(".")
                )))
            }
        };
    }
    Ok(cursor)
}

fn first_error_message(body: &Value) -> Option<String> {
    let first = body.get("errors")?.as_array()?.first()?;
    Some(error_text(first))
}

/// Human-readable text of an error value: a plain string, or the `message` /
/// `err` field of an error object, or its JSON rendering.
pub fn error_text(error: &Value) -> String {
    match error {
        Value::String(text) => text.clone(),
        Value::Object(fields) => ["message", "err", "str"]
            .iter()
            .find_map(|key| fields.get(*key).and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string()),
        other => other.to_string(),
    }
}
