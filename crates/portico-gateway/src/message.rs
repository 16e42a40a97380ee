//! Messages the gateway can translate.

use base64::Engine as _;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::MarshalError;

/// Decoded `application/x-www-form-urlencoded` pairs, in body order.
pub type FormFields = [(String, String)];

/// A request or response message crossing the gateway.
///
/// Any `serde` type with a `Default` qualifies with an empty impl. The hooks
/// let a message take over form decoding or hand the gateway a raw body.
pub trait Message: Serialize + DeserializeOwned + Default + Send + Sync + 'static {
    /// Populates a message from form fields by name.
    ///
    /// Returning `None` makes the gateway build a JSON object from the
    /// fields (repeated keys become arrays) and decode that instead.
    fn from_form(_fields: &FormFields) -> Option<Result<Self, MarshalError>> {
        None
    }

    /// The raw body to write instead of an encoded message.
    fn as_http_body(&self) -> Option<&HttpBody> {
        None
    }
}

impl Message for serde_json::Value {}

/// A response written verbatim with its own content type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpBody {
    /// Content type of `data`.
    pub content_type: String,
    /// Body bytes, base64 in JSON form.
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

impl HttpBody {
    /// Create a body.
    pub fn new(content_type: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            content_type: content_type.into(),
            data: data.into(),
        }
    }
}

impl Message for HttpBody {
    fn as_http_body(&self) -> Option<&HttpBody> {
        Some(self)
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

/// JSON object built from form fields; repeated keys become arrays.
pub(crate) fn form_to_json(fields: &FormFields) -> serde_json::Value {
    let mut object = serde_json::Map::new();
    for (key, value) in fields {
        let value = serde_json::Value::String(value.clone());
        match object.get_mut(key) {
            Some(serde_json::Value::Array(values)) => values.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = serde_json::Value::Array(vec![first, value]);
            }
            None => {
                object.insert(key.clone(), value);
            }
        }
    }
    serde_json::Value::Object(object)
}

/// Sets `fields` on `message` by name.
///
/// Each value takes the JSON type of the field it replaces: numbers and
/// booleans are parsed, list fields collect every value given for them,
/// anything else is a string. Dotted names address nested objects.
pub(crate) fn merge_fields<'a, M, I>(message: M, fields: I) -> Result<M, MarshalError>
where
    M: Message,
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut grouped: Vec<(&str, Vec<&str>)> = Vec::new();
    for (name, raw) in fields {
        match grouped.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, values)) => values.push(raw),
            None => grouped.push((name, vec![raw])),
        }
    }
    if grouped.is_empty() {
        return Ok(message);
    }

    let mut value = serde_json::to_value(message).map_err(MarshalError::encode)?;
    if value.is_null() {
        value = serde_json::Value::Object(serde_json::Map::new());
    }
    for (name, raws) in grouped {
        let slot = field_slot(&mut value, name)
            .ok_or_else(|| MarshalError::decode(format!("{name} does not address a field")))?;
        if let serde_json::Value::Array(items) = slot {
            let template = items.first().cloned().unwrap_or(serde_json::Value::Null);
            *items = raws
                .iter()
                .map(|raw| coerce(&template, raw))
                .collect::<Result<_, _>>()?;
        } else if let Some(raw) = raws.last() {
            *slot = coerce(slot, raw)?;
        }
    }
    serde_json::from_value(value).map_err(MarshalError::decode)
}

fn text(raw: &str) -> serde_json::Value {
    serde_json::Value::String(raw.to_string())
}

fn coerce(existing: &serde_json::Value, raw: &str) -> Result<serde_json::Value, MarshalError> {
    use serde_json::Value;

    match existing {
        Value::Number(_) => raw
            .parse::<i64>()
            .map(Value::from)
            .or_else(|_| raw.parse::<u64>().map(Value::from))
            .or_else(|_| raw.parse::<f64>().map(Value::from))
            .map_err(|_| MarshalError::decode(format!("{raw:?} is not a number"))),
        Value::Bool(_) => raw
            .parse::<bool>()
            .map(Value::Bool)
            .map_err(|_| MarshalError::decode(format!("{raw:?} is not a boolean"))),
        _ => Ok(text(raw)),
    }
}

fn field_slot<'v>(value: &'v mut serde_json::Value, name: &str) -> Option<&'v mut serde_json::Value> {
    name.split('.').try_fold(value, |current, segment| {
        let object = current.as_object_mut()?;
        Some(object.entry(segment.to_string()).or_insert(serde_json::Value::Null))
    })
}

pub(crate) fn encode_base64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_form_to_json() {
        let fields = vec![
            ("name".to_string(), "ann".to_string()),
            ("tag".to_string(), "a".to_string()),
            ("tag".to_string(), "b".to_string()),
            ("tag".to_string(), "c".to_string()),
        ];
        assert_eq!(
            form_to_json(&fields),
            serde_json::json!({"name": "ann", "tag": ["a", "b", "c"]})
        );
    }

    #[test]
    fn test_http_body_json_form() {
        let body = HttpBody::new("application/pdf", b"%PDF".to_vec());
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["data"], "JVBERg==");

        let back: HttpBody = serde_json::from_value(json).unwrap();
        assert_eq!(back, body);
        assert!(back.as_http_body().is_some());
    }

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    struct ListItems {
        username: String,
        page: u32,
        exact: bool,
        tags: Vec<String>,
        filter: Filter,
    }

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    struct Filter {
        category: String,
    }

    impl Message for ListItems {}

    #[test]
    fn test_merge_fields_coerces_by_field_type() {
        let merged = merge_fields(
            ListItems::default(),
            [
                ("username", "ann"),
                ("page", "3"),
                ("exact", "true"),
                ("tags", "a"),
                ("tags", "b"),
                ("filter.category", "office"),
                ("unknown", "ignored"),
            ],
        )
        .unwrap();

        assert_eq!(merged.username, "ann");
        assert_eq!(merged.page, 3);
        assert!(merged.exact);
        assert_eq!(merged.tags, vec!["a", "b"]);
        assert_eq!(merged.filter.category, "office");
    }

    #[test]
    fn test_merge_fields_rejects_bad_values() {
        let err = merge_fields(ListItems::default(), [("page", "three")]).unwrap_err();
        assert!(err.is_client_error());

        let err = merge_fields(ListItems::default(), [("username.first", "ann")]).unwrap_err();
        assert!(err.is_client_error());
    }

    #[test]
    fn test_merge_into_untyped_message() {
        let merged = merge_fields(serde_json::Value::Null, [("id", "7")]).unwrap();
        assert_eq!(merged, serde_json::json!({"id": "7"}));
    }
}
