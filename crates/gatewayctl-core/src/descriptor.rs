use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Normalized view of one API (Kong service, WSO2 API, Tyk definition, ...).
///
/// The common fields are lifted out of the vendor payload; everything else is
/// kept verbatim in `vendor` for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiDescriptor {
    /// Vendor identifier of the API.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Version label, when the vendor versions APIs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Context or listen path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Remaining vendor fields.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub vendor: Map<String, Value>,
}

const VERSION_KEYS: [&str; 2] = ["version", "apiVersion"];

impl ApiDescriptor {
    /// Descriptor with only an id and a name.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: None,
            context: None,
            description: None,
            vendor: Map::new(),
        }
    }

    /// Lift the common fields out of a vendor object.
    ///
    /// `id_key` names the identifier field (`id`, `api_id`, `key`, ...).
    /// Returns `None` when `value` is not an object or has no usable id.
    pub fn from_vendor(value: Value, id_key: &str) -> Option<Self> {
        let Value::Object(mut fields) = value else {
            return None;
        };

        let id = scalar_to_string(fields.remove(id_key)?)?;
        let name = fields
            .remove("name")
            .and_then(scalar_to_string)
            .unwrap_or_default();
        let version = VERSION_KEYS
            .iter()
            .find_map(|key| fields.remove(*key).and_then(scalar_to_string));
        let context = fields
            .remove("context")
            .and_then(scalar_to_string)
            .or_else(|| {
                fields
                    .get("proxy")
                    .and_then(|p| p.get("listen_path"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
            });
        let description = fields.remove("description").and_then(scalar_to_string);

        Some(Self {
            id,
            name,
            version,
            context,
            description,
            vendor: fields,
        })
    }

    /// Normalize a list of vendor objects, dropping entries without an id.
    pub fn from_vendor_list(items: Vec<Value>, id_key: &str) -> Vec<Self> {
        items
            .into_iter()
            .filter_map(|item| Self::from_vendor(item, id_key))
            .collect()
    }

    /// Attach an extra vendor field.
    pub fn with_vendor_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.vendor.insert(key.into(), value);
        self
    }
}

fn scalar_to_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Normalized input for creating or updating an API.
///
/// Each adapter builds its vendor payload from the common fields and merges
/// `vendor` over its defaults, so vendor-only options pass straight through.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiDefinition {
    /// Display name. Required by every vendor on create.
    pub name: String,
    /// Version label.
    #[serde(default)]
    pub version: Option<String>,
    /// Context or listen path.
    #[serde(default)]
    pub context: Option<String>,
    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,
    /// Upstream service URL.
    #[serde(default)]
    pub backend_url: Option<String>,
    /// Request paths routed to the API.
    #[serde(default)]
    pub paths: Vec<String>,
    /// HTTP methods routed to the API.
    #[serde(default)]
    pub methods: Vec<String>,
    /// Existing route to update alongside the API (Kong).
    #[serde(default)]
    pub route_id: Option<String>,
    /// Vendor-specific fields merged into the payload.
    #[serde(default)]
    pub vendor: Map<String, Value>,
}

impl ApiDefinition {
    /// Definition with just a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Set the version label.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Set the context / listen path.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the upstream URL.
    pub fn with_backend_url(mut self, url: impl Into<String>) -> Self {
        self.backend_url = Some(url.into());
        self
    }

    /// Add a vendor-specific field.
    pub fn with_vendor_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.vendor.insert(key.into(), value.into());
        self
    }

    /// A vendor field as a JSON value, or `default` when absent.
    pub fn vendor_or(&self, key: &str, default: Value) -> Value {
        self.vendor.get(key).cloned().unwrap_or(default)
    }
}

/// Shallow-merge `overrides` into `base`, overriding existing keys.
pub fn merge_object(base: &mut Map<String, Value>, overrides: &Map<String, Value>) {
    for (key, value) in overrides {
        base.insert(key.clone(), value.clone());
    }
}
