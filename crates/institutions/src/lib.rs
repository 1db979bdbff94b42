//! Institution records for the institution catalog
//!
//! A type-safe model of the records served by the catalog, plus the casting
//! rules applied to drafts submitted by clients.
//!
//! The JSON wire format keeps the field names used by the catalog's clients
//! (`nombreInstitucion`, `nombreSede`, ...), while the Rust API uses English
//! names.
//!
//! # Example
//!
//! ```
//! use institutions::{Institution, NewInstitution};
//! use serde_json::json;
//!
//! let draft = NewInstitution::from_json(json!({
//!     "nombreInstitucion": "Colegio San José",
//!     "codigoDaneNit": 105001000123u64,
//!     "fotos": "portada.jpg",
//! }))?;
//!
//! assert_eq!(draft.dane_code.as_deref(), Some("105001000123"));
//! assert_eq!(draft.photos, vec!["portada.jpg".to_string()]);
//!
//! let record = Institution::from_draft("65f1c0ffee0000000000abcd", draft);
//! assert_eq!(record.id, "65f1c0ffee0000000000abcd");
//! # Ok::<(), institutions::Error>(())
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Wire name of the store-assigned identifier
pub const FIELD_ID: &str = "_id";
/// Wire name of the institution name
pub const FIELD_INSTITUTION_NAME: &str = "nombreInstitucion";
/// Wire name of the campus name
pub const FIELD_CAMPUS_NAME: &str = "nombreSede";
/// Wire name of the DANE code / NIT
pub const FIELD_DANE_CODE: &str = "codigoDaneNit";
/// Wire name of the contact email
pub const FIELD_EMAIL: &str = "correo";
/// Wire name of the city
pub const FIELD_CITY: &str = "ciudad";
/// Wire name of the department (region)
pub const FIELD_DEPARTMENT: &str = "departamento";
/// Wire name of the photo references
pub const FIELD_PHOTOS: &str = "fotos";

/// Errors raised while casting a client draft
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Institution draft must be a JSON object, got {0}")]
    NotAnObject(&'static str),

    #[error("Cast to {expected} failed for field \"{field}\" (got {found})")]
    Cast {
        field: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Cast to text failed for element {index} of \"{field}\" (got {found})")]
    CastElement {
        field: &'static str,
        index: usize,
        found: &'static str,
    },
}

/// Result type for draft casting
pub type Result<T> = std::result::Result<T, Error>;

/// A persisted institution record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Institution {
    /// Identifier assigned by the store
    #[serde(rename = "_id")]
    pub id: String,

    #[serde(
        rename = "nombreInstitucion",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub institution_name: Option<String>,

    #[serde(rename = "nombreSede", default, skip_serializing_if = "Option::is_none")]
    pub campus_name: Option<String>,

    /// DANE code or NIT
    #[serde(
        rename = "codigoDaneNit",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub dane_code: Option<String>,

    #[serde(rename = "correo", default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(rename = "ciudad", default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,

    #[serde(
        rename = "departamento",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub department: Option<String>,

    /// Photo references, in submission order
    #[serde(rename = "fotos", default)]
    pub photos: Vec<String>,
}

impl Institution {
    /// Build a record from a draft and the identifier the store assigned to it
    pub fn from_draft(id: impl Into<String>, draft: NewInstitution) -> Self {
        Self {
            id: id.into(),
            institution_name: draft.institution_name,
            campus_name: draft.campus_name,
            dane_code: draft.dane_code,
            email: draft.email,
            city: draft.city,
            department: draft.department,
            photos: draft.photos,
        }
    }

    /// Human-readable name, falling back to the identifier
    pub fn display_name(&self) -> &str {
        self.institution_name.as_deref().unwrap_or(&self.id)
    }
}

/// A partial record submitted for creation
///
/// Every attribute is optional; the store fills in the identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NewInstitution {
    #[serde(rename = "nombreInstitucion", skip_serializing_if = "Option::is_none")]
    pub institution_name: Option<String>,

    #[serde(rename = "nombreSede", skip_serializing_if = "Option::is_none")]
    pub campus_name: Option<String>,

    #[serde(rename = "codigoDaneNit", skip_serializing_if = "Option::is_none")]
    pub dane_code: Option<String>,

    #[serde(rename = "correo", skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(rename = "ciudad", skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,

    #[serde(rename = "departamento", skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,

    #[serde(rename = "fotos", skip_serializing_if = "Vec::is_empty")]
    pub photos: Vec<String>,
}

impl NewInstitution {
    /// Create a draft with just the institution name
    pub fn new(institution_name: impl Into<String>) -> Self {
        Self {
            institution_name: Some(institution_name.into()),
            ..Default::default()
        }
    }

    pub fn with_campus(mut self, campus_name: impl Into<String>) -> Self {
        self.campus_name = Some(campus_name.into());
        self
    }

    pub fn with_dane_code(mut self, code: impl Into<String>) -> Self {
        self.dane_code = Some(code.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_city(mut self, city: impl Into<String>) -> Self {
        self.city = Some(city.into());
        self
    }

    pub fn with_department(mut self, department: impl Into<String>) -> Self {
        self.department = Some(department.into());
        self
    }

    pub fn with_photo(mut self, photo: impl Into<String>) -> Self {
        self.photos.push(photo.into());
        self
    }

    /// Cast an arbitrary JSON body into a draft
    ///
    /// Casting is lenient the way document mappers usually are:
    /// - unknown keys (including a client-supplied `_id`) are ignored
    /// - text fields take strings, numbers and booleans; `null` leaves them unset
    /// - `fotos` takes a list of scalars, a single scalar, or `null`
    ///
    /// Objects and arrays where text is expected are rejected.
    pub fn from_json(body: Value) -> Result<Self> {
        let mut map = match body {
            Value::Object(map) => map,
            other => return Err(Error::NotAnObject(json_type(&other))),
        };

        Ok(Self {
            institution_name: take_text(&mut map, FIELD_INSTITUTION_NAME)?,
            campus_name: take_text(&mut map, FIELD_CAMPUS_NAME)?,
            dane_code: take_text(&mut map, FIELD_DANE_CODE)?,
            email: take_text(&mut map, FIELD_EMAIL)?,
            city: take_text(&mut map, FIELD_CITY)?,
            department: take_text(&mut map, FIELD_DEPARTMENT)?,
            photos: take_photos(&mut map)?,
        })
    }

    /// Parse and cast a JSON string into a draft
    pub fn from_json_str(body: &str) -> std::result::Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(body)?;
        Self::from_json(value).map_err(serde::de::Error::custom)
    }
}

fn take_text(map: &mut Map<String, Value>, field: &'static str) -> Result<Option<String>> {
    match map.remove(field) {
        None => Ok(None),
        Some(value) => scalar_to_text(value).map_err(|found| Error::Cast {
            field,
            expected: "text",
            found,
        }),
    }
}

fn take_photos(map: &mut Map<String, Value>) -> Result<Vec<String>> {
    match map.remove(FIELD_PHOTOS) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .into_iter()
            .enumerate()
            .map(|(index, item)| match scalar_to_text(item) {
                Ok(Some(text)) => Ok(text),
                Ok(None) => Err(Error::CastElement {
                    field: FIELD_PHOTOS,
                    index,
                    found: "null",
                }),
                Err(found) => Err(Error::CastElement {
                    field: FIELD_PHOTOS,
                    index,
                    found,
                }),
            })
            .collect(),
        Some(Value::Object(_)) => Err(Error::Cast {
            field: FIELD_PHOTOS,
            expected: "list of text",
            found: "object",
        }),
        Some(scalar) => Ok(scalar_to_text(scalar)
            .ok()
            .flatten()
            .into_iter()
            .collect()),
    }
}

/// Convert a scalar to text. `Err` carries the JSON type that could not be cast.
fn scalar_to_text(value: Value) -> std::result::Result<Option<String>, &'static str> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Bool(b) => Ok(Some(b.to_string())),
        other => Err(json_type(&other)),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
