//! Flattens an [`AgentReply`] into display text.
//!
//! The function is total: every input yields a string, and shapes it cannot read
//! come back as a diagnostic naming the shape instead of an error.

use serde_json::Value;

use crate::llm::AgentReply;

const CONTENT_KEYS: [&str; 3] = ["content", "message", "text"];
const ELEMENT_TEXT_KEYS: [&str; 2] = ["text", "message"];

pub fn extract_text(reply: &AgentReply) -> String {
    let payload = match reply {
        AgentReply::Text(text) => return text.clone(),
        AgentReply::Message { content } => Some(content),
        AgentReply::Raw(Value::String(text)) => return text.clone(),
        AgentReply::Raw(Value::Object(object)) => {
            CONTENT_KEYS.iter().find_map(|key| object.get(*key))
        }
        AgentReply::Raw(_) => None,
    };

    match payload {
        Some(Value::Null) | None => unrecognized(reply),
        Some(payload) => flatten_payload(payload),
    }
}

fn flatten_payload(payload: &Value) -> String {
    match payload {
        Value::Array(items) if !items.is_empty() => flatten_element(&items[0]),
        Value::String(text) => text.trim().to_string(),
        other => other.to_string(),
    }
}

fn flatten_element(element: &Value) -> String {
    match element {
        Value::Object(object) => {
            if let Some(value) = ELEMENT_TEXT_KEYS.iter().find_map(|key| object.get(*key)) {
                return value_as_string(value).trim().to_string();
            }
            match object.values().next() {
                Some(first) => value_as_string(first),
                None => element.to_string(),
            }
        }
        other => value_as_string(other),
    }
}

fn value_as_string(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn unrecognized(reply: &AgentReply) -> String {
    let shape = match reply {
        AgentReply::Raw(value) | AgentReply::Message { content: value } => {
            format!("{}({})", reply.kind(), json_type_name(value))
        }
        AgentReply::Text(_) => reply.kind().to_string(),
    };
    format!("Error: No se pudo extraer el contenido. Tipo de respuesta recibido: {shape}")
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::extract_text;
    use crate::llm::AgentReply;

    #[test]
    fn reply_shapes_flatten_to_text() {
        let cases = [
            (AgentReply::text("hola"), "hola"),
            (AgentReply::Message { content: json!("  hola  ") }, "hola"),
            (AgentReply::Message { content: json!([{"type": "text", "text": " hola "}]) }, "hola"),
            (AgentReply::Message { content: json!([{"message": "desde message"}]) }, "desde message"),
            (AgentReply::Message { content: json!([{"type": "tool_use", "id": "t1"}]) }, "tool_use"),
            (AgentReply::Message { content: json!(["primero", "segundo"]) }, "primero"),
            (AgentReply::Message { content: json!([]) }, "[]"),
            (AgentReply::Message { content: json!(7) }, "7"),
            (AgentReply::Raw(json!({"message": "por message"})), "por message"),
            (AgentReply::Raw(json!({"text": "por text"})), "por text"),
            (AgentReply::Raw(json!("cadena suelta")), "cadena suelta"),
        ];

        for (reply, expected) in cases {
            assert_eq!(extract_text(&reply), expected, "reply: {reply:?}");
        }
    }

    #[test]
    fn unrecognized_shapes_return_a_diagnostic_naming_the_type() {
        let number = extract_text(&AgentReply::Raw(json!(42)));
        assert!(number.starts_with("Error:"));
        assert!(number.contains("raw(number)"));

        let object = extract_text(&AgentReply::Raw(json!({"choices": []})));
        assert!(object.contains("raw(object)"));

        let null_content = extract_text(&AgentReply::Message { content: json!(null) });
        assert!(null_content.contains("message(null)"));
    }
}
