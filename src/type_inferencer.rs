use crate::payload::Payload;
use crate::schema_merger::merge_into;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// JSON schema type names used in the document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaType {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
}

/// Structural description of one observed value.
///
/// An empty fragment (no type) describes the items of an array that has only
/// ever been observed empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaFragment {
    /// The type of the value (string, integer, object, array, etc.)
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<SchemaType>,
    /// First observed sample value (scalars only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<Value>,
    /// Properties for object types
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeMap<String, SchemaFragment>>,
    /// Items schema for array types
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<SchemaFragment>>,
}

impl SchemaFragment {
    /// A scalar fragment carrying its sample value
    pub fn scalar(schema_type: SchemaType, example: Value) -> Self {
        Self {
            schema_type: Some(schema_type),
            example: Some(example),
            properties: None,
            items: None,
        }
    }

    pub fn object(properties: BTreeMap<String, SchemaFragment>) -> Self {
        Self {
            schema_type: Some(SchemaType::Object),
            example: None,
            properties: Some(properties),
            items: None,
        }
    }

    pub fn array(items: SchemaFragment) -> Self {
        Self {
            schema_type: Some(SchemaType::Array),
            example: None,
            properties: None,
            items: Some(Box::new(items)),
        }
    }
}

/// Infers a schema fragment from a decoded value.
///
/// Returns `None` for `null`, which callers treat as "omit this field".
pub fn infer(value: &Payload) -> Option<SchemaFragment> {
    match value {
        Payload::Null => None,
        Payload::Bool(b) => Some(SchemaFragment::scalar(SchemaType::Boolean, Value::Bool(*b))),
        Payload::Int(i) => Some(SchemaFragment::scalar(SchemaType::Integer, Value::from(*i))),
        Payload::Float(f) => Some(infer_float(*f)),
        Payload::String(s) => Some(SchemaFragment::scalar(
            SchemaType::String,
            Value::String(s.clone()),
        )),
        Payload::Array(elements) => {
            // Shape of the first non-null element, widened by the ones after it
            let mut items = None;
            for element in elements {
                if let Some(fragment) = infer(element) {
                    merge_into(&mut items, fragment);
                }
            }
            Some(SchemaFragment::array(items.unwrap_or_default()))
        }
        Payload::Object(fields) => {
            let properties = fields
                .iter()
                .filter_map(|(key, value)| infer(value).map(|fragment| (key.clone(), fragment)))
                .collect();
            Some(SchemaFragment::object(properties))
        }
    }
}

fn infer_float(f: f64) -> SchemaFragment {
    let example = Payload::Float(f).to_json();
    if !f.is_finite() {
        SchemaFragment::scalar(SchemaType::String, example)
    } else if f.fract() == 0.0 {
        SchemaFragment::scalar(SchemaType::Integer, example)
    } else {
        SchemaFragment::scalar(SchemaType::Number, example)
    }
}

/// Infers a scalar fragment from a textual value such as a path segment or a
/// query string entry, coercing numbers and booleans.
pub fn infer_text(raw: &str) -> SchemaFragment {
    if let Ok(i) = raw.parse::<i64>() {
        return SchemaFragment::scalar(SchemaType::Integer, Value::from(i));
    }
    if let Ok(f) = raw.parse::<f64>() {
        if f.is_finite() {
            return infer_float(f);
        }
    }
    match raw {
        "true" => SchemaFragment::scalar(SchemaType::Boolean, Value::Bool(true)),
        "false" => SchemaFragment::scalar(SchemaType::Boolean, Value::Bool(false)),
        _ => SchemaFragment::scalar(SchemaType::String, Value::String(raw.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::decode_body;
    use serde_json::json;

    fn infer_json(raw: &str) -> Option<SchemaFragment> {
        infer(&decode_body(Some("application/json"), Some(raw)).unwrap())
    }

    #[test]
    fn test_infer_null_is_omitted() {
        assert!(infer(&Payload::Null).is_none());
    }

    #[test]
    fn test_infer_scalars() {
        let s = infer(&Payload::String("whatever".to_string())).unwrap();
        assert_eq!(s.schema_type, Some(SchemaType::String));
        assert_eq!(s.example, Some(json!("whatever")));

        let i = infer(&Payload::Int(42)).unwrap();
        assert_eq!(i.schema_type, Some(SchemaType::Integer));
        assert_eq!(i.example, Some(json!(42)));

        let n = infer(&Payload::Float(1.5)).unwrap();
        assert_eq!(n.schema_type, Some(SchemaType::Number));
        assert_eq!(n.example, Some(json!(1.5)));

        let b = infer(&Payload::Bool(false)).unwrap();
        assert_eq!(b.schema_type, Some(SchemaType::Boolean));
        assert_eq!(b.example, Some(json!(false)));
    }

    #[test]
    fn test_integer_valued_float_is_integer() {
        let fragment = infer_json("2.0").unwrap();
        assert_eq!(fragment.schema_type, Some(SchemaType::Integer));
    }

    #[test]
    fn test_non_finite_float_degrades_to_string() {
        let fragment = infer(&Payload::Float(f64::NAN)).unwrap();
        assert_eq!(fragment.schema_type, Some(SchemaType::String));
        assert_eq!(fragment.example, Some(json!("NaN")));
    }

    #[test]
    fn test_infer_object_skips_null_fields() {
        let fragment = infer_json(r#"{"result":"OK","missing":null}"#).unwrap();
        assert_eq!(fragment.schema_type, Some(SchemaType::Object));

        let properties = fragment.properties.unwrap();
        assert_eq!(properties.len(), 1);
        assert_eq!(properties["result"].example, Some(json!("OK")));
    }

    #[test]
    fn test_infer_empty_array_has_empty_items() {
        let fragment = infer_json("[]").unwrap();
        assert_eq!(fragment.schema_type, Some(SchemaType::Array));
        assert_eq!(*fragment.items.unwrap(), SchemaFragment::default());
    }

    #[test]
    fn test_infer_array_unions_element_shapes() {
        let fragment = infer_json(r#"[null, {"a": 1}, {"b": "x"}]"#).unwrap();
        let items = fragment.items.unwrap();
        let properties = items.properties.unwrap();
        assert!(properties.contains_key("a"));
        assert!(properties.contains_key("b"));
        assert_eq!(properties["a"].example, Some(json!(1)));
    }

    #[test]
    fn test_infer_text_coercion() {
        assert_eq!(infer_text("1"), SchemaFragment::scalar(SchemaType::Integer, json!(1)));
        assert_eq!(infer_text("2.5"), SchemaFragment::scalar(SchemaType::Number, json!(2.5)));
        assert_eq!(infer_text("true"), SchemaFragment::scalar(SchemaType::Boolean, json!(true)));
        assert_eq!(infer_text("abc"), SchemaFragment::scalar(SchemaType::String, json!("abc")));
        assert_eq!(infer_text("inf"), SchemaFragment::scalar(SchemaType::String, json!("inf")));
    }

    #[test]
    fn test_fragment_serialization_omits_empty_fields() {
        let fragment = SchemaFragment::scalar(SchemaType::String, json!("whatever"));
        let value = serde_json::to_value(&fragment).unwrap();
        assert_eq!(value, json!({"type": "string", "example": "whatever"}));

        let empty = serde_json::to_value(SchemaFragment::default()).unwrap();
        assert_eq!(empty, json!({}));
    }
}
