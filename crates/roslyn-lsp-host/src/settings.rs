//! Answers to `workspace/configuration` requests.
//!
//! The server asks for editor settings section by section. Nothing here is
//! user-configurable; the table pins the values the server behaves well
//! with when no editor is attached.

use std::path::Path;

use serde_json::{Value, json};

/// Section naming the solution the server should load.
const SOLUTION_SECTION: &str = "csharp.solution";

/// Answers every item of a `workspace/configuration` request, in order.
///
/// Malformed parameters produce an empty answer list.
#[must_use]
pub fn answer_configuration(params: &Value, solution: Option<&Path>) -> Value {
    let answers: Vec<Value> = params
        .get("items")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|item| {
                    let section = item.get("section").and_then(Value::as_str).unwrap_or("");
                    section_value(section, solution)
                })
                .collect()
        })
        .unwrap_or_default();
    Value::Array(answers)
}

/// Value reported for a single configuration section.
#[must_use]
pub fn section_value(section: &str, solution: Option<&Path>) -> Value {
    match section {
        SOLUTION_SECTION => solution.map_or(Value::Null, |path| json!(path.display().to_string())),
        "dotnet_member_insertion_location" => json!("with_other_members_of_the_same_kind"),
        "dotnet_property_generation_behavior" => json!("prefer_throwing_properties"),
        "tab_width" | "indent_size" => json!(4),
        "insert_final_newline" => json!(true),
        other if other.starts_with("dotnet") || other.starts_with("csharp") => {
            roslyn_option(other)
        }
        _ => Value::Null,
    }
}

/// Toggles read as `false` even when they also mention a scope.
fn roslyn_option(section: &str) -> Value {
    if ["enable", "show", "suppress", "navigate"]
        .iter()
        .any(|word| section.contains(word))
    {
        json!(false)
    } else if section.contains("scope") {
        json!("openFiles")
    } else {
        Value::Null
    }
}
