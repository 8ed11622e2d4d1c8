use serde_json::{json, Map, Value};

use switchyard_core::tools::ParamSpec;

/// Derive a minimal JSON schema from a declared parameter list.
///
/// Every parameter becomes a typed property; parameters without a default
/// are listed under `required`, which is left out entirely when empty.
pub fn infer_schema(params: &[ParamSpec]) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();

    for p in params {
        properties.insert(p.name.clone(), json!({"type": p.ty.json_type()}));
        if !p.has_default {
            required.push(Value::String(p.name.clone()));
        }
    }

    let mut schema = json!({"type": "object", "properties": properties});
    if !required.is_empty() {
        schema["required"] = Value::Array(required);
    }
    schema
}
