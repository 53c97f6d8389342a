use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Rendered in place of any missing record field.
pub const PLACEHOLDER: &str = "N/A";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("expected a hospital object, got {kind}")]
    NotAnObject { kind: &'static str },

    #[error("expected a list of hospitals, got {kind}")]
    NotAList { kind: &'static str },
}

/// One hospital directory entry, in its canonical shape.
///
/// The backend hands out the identifier under `_id` (or `id` for older
/// documents) and sometimes as a number; [`HospitalRecord::try_from`] folds
/// every accepted shape into this one type. Fields the client does not edit
/// (`created_at`, `updated_at`, ...) ride along in `extra` so a record can be
/// written back out without loss.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value")]
pub struct HospitalRecord {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "nom_etablissement", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delegation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commune: Option<String>,
    #[serde(rename = "categorie", skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// Strings pass through, numbers are stringified, blanks and anything else
// count as absent.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn take_text(obj: &mut Map<String, Value>, key: &str) -> Option<String> {
    match obj.get(key).map(scalar_text) {
        Some(Some(text)) => {
            obj.remove(key);
            Some(text)
        }
        Some(None) => {
            if obj.get(key).is_some_and(|v| v.is_null() || v.as_str() == Some("")) {
                obj.remove(key);
            }
            None
        }
        None => None,
    }
}

impl TryFrom<Value> for HospitalRecord {
    type Error = ModelError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let mut obj = match value {
            Value::Object(obj) => obj,
            other => {
                return Err(ModelError::NotAnObject {
                    kind: value_kind(&other),
                })
            }
        };

        let id = take_text(&mut obj, "_id").or_else(|| take_text(&mut obj, "id"));
        let name = take_text(&mut obj, "nom_etablissement");
        let region = take_text(&mut obj, "region");
        let delegation = take_text(&mut obj, "delegation");
        let commune = take_text(&mut obj, "commune");
        let category = take_text(&mut obj, "categorie");

        Ok(HospitalRecord {
            id,
            name,
            region,
            delegation,
            commune,
            category,
            extra: obj,
        })
    }
}

impl HospitalRecord {
    pub fn display_id(&self) -> &str {
        self.id.as_deref().unwrap_or(PLACEHOLDER)
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(PLACEHOLDER)
    }

    pub fn display_region(&self) -> &str {
        self.region.as_deref().unwrap_or(PLACEHOLDER)
    }

    pub fn display_delegation(&self) -> &str {
        self.delegation.as_deref().unwrap_or(PLACEHOLDER)
    }

    pub fn display_commune(&self) -> &str {
        self.commune.as_deref().unwrap_or(PLACEHOLDER)
    }

    pub fn display_category(&self) -> &str {
        self.category.as_deref().unwrap_or(PLACEHOLDER)
    }

    /// Same record without the backend-managed fields.
    pub fn editable_fields(&self) -> HospitalRecord {
        HospitalRecord {
            extra: Map::new(),
            ..self.clone()
        }
    }
}

/// Normalizes a collection body into records.
pub fn records_from_value(value: Value) -> Result<Vec<HospitalRecord>, ModelError> {
    match value {
        Value::Array(items) => items.into_iter().map(HospitalRecord::try_from).collect(),
        other => Err(ModelError::NotAList {
            kind: value_kind(&other),
        }),
    }
}

/// Normalizes a single-record body.
///
/// A lookup by `_id` answers with the list of matching documents rather than
/// the document itself; that list collapses to its first entry and an empty
/// list means nothing was found.
pub fn record_from_value(value: Value) -> Result<Option<HospitalRecord>, ModelError> {
    match value {
        Value::Array(items) => match items.into_iter().next() {
            Some(first) => HospitalRecord::try_from(first).map(Some),
            None => Ok(None),
        },
        Value::Null => Ok(None),
        other => HospitalRecord::try_from(other).map(Some),
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SearchFilters {
    pub region: String,
    pub delegation: String,
    pub commune: String,
    pub category: String,
    pub name: String,
}

impl SearchFilters {
    /// Query parameters in the backend's vocabulary. Empty values are sent
    /// as-is; the backend skips them.
    pub fn query_pairs(&self) -> [(&'static str, &str); 5] {
        [
            ("region", self.region.as_str()),
            ("delegation", self.delegation.as_str()),
            ("commune", self.commune.as_str()),
            ("categorie", self.category.as_str()),
            ("nom_etablissement", self.name.as_str()),
        ]
    }

    pub fn is_empty(&self) -> bool {
        self.query_pairs().iter().all(|(_, v)| v.trim().is_empty())
    }

    pub fn clear(&mut self) {
        *self = SearchFilters::default();
    }

    pub fn set(&mut self, key: &str, value: &str) -> Result<(), String> {
        let slot = match key.trim().to_lowercase().as_str() {
            "region" => &mut self.region,
            "delegation" => &mut self.delegation,
            "commune" => &mut self.commune,
            "category" | "categorie" => &mut self.category,
            "name" | "nom" | "nom_etablissement" => &mut self.name,
            other => return Err(format!("unknown filter '{other}'")),
        };
        *slot = value.trim().to_string();
        Ok(())
    }
}

/// Label/count pairs in the order the backend produced them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "Map<String, Value>")]
pub struct CountMap(pub Vec<(String, u64)>);

impl From<Map<String, Value>> for CountMap {
    fn from(map: Map<String, Value>) -> Self {
        CountMap(
            map.into_iter()
                .map(|(label, count)| (label, count.as_u64().unwrap_or(0)))
                .collect(),
        )
    }
}

impl CountMap {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn labels(&self) -> Vec<String> {
        self.0.iter().map(|(label, _)| label.clone()).collect()
    }

    pub fn values(&self) -> Vec<u64> {
        self.0.iter().map(|(_, count)| *count).collect()
    }
}

// An explicit `null` reads the same as a missing member.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Statistics {
    #[serde(deserialize_with = "null_as_default")]
    pub total_hospitals: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub regions: CountMap,
    #[serde(deserialize_with = "null_as_default")]
    pub delegations: CountMap,
    #[serde(deserialize_with = "null_as_default")]
    pub categories: CountMap,
    #[serde(deserialize_with = "null_as_default")]
    pub communes: CountMap,
}
