//! Attribute schema of an exported shapefile and coercion of `GeoJSON`
//! property values into dBASE field text.

use std::collections::BTreeSet;

use geojson::Feature;
use serde_json::Value;

/// Longest dBASE field name, in bytes.
pub const MAX_FIELD_NAME_LEN: usize = 10;

/// Width of character fields.
pub const STRING_WIDTH: u8 = 255;

/// dBASE field type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// `C(length)`: text, left aligned.
    Character {
        /// Field width in bytes.
        length: u8,
    },
    /// `N(length, decimals)`: number, right aligned.
    Numeric {
        /// Field width in bytes.
        length: u8,
        /// Digits after the decimal point.
        decimals: u8,
    },
}

impl FieldKind {
    /// Text field of the default width.
    pub const STRING: Self = Self::Character {
        length: STRING_WIDTH,
    };

    /// Integer field.
    pub const INTEGER: Self = Self::Numeric {
        length: 18,
        decimals: 0,
    };

    /// Floating-point field.
    pub const FLOAT: Self = Self::Numeric {
        length: 24,
        decimals: 15,
    };

    /// dBASE type letter.
    #[must_use]
    pub const fn type_code(self) -> u8 {
        match self {
            Self::Character { .. } => b'C',
            Self::Numeric { .. } => b'N',
        }
    }

    /// Field width in bytes.
    #[must_use]
    pub const fn length(self) -> u8 {
        match self {
            Self::Character { length } | Self::Numeric { length, .. } => length,
        }
    }

    /// Digits after the decimal point.
    #[must_use]
    pub const fn decimals(self) -> u8 {
        match self {
            Self::Character { .. } => 0,
            Self::Numeric { decimals, .. } => decimals,
        }
    }
}

/// One attribute column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    /// Property key read from each feature.
    pub property: String,
    /// Column name written to the `.dbf`, at most 10 bytes.
    pub name: String,
    /// Column type.
    pub kind: FieldKind,
}

/// Ordered attribute columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    /// Columns in file order.
    pub fields: Vec<FieldDef>,
}

impl Schema {
    /// Columns used when there are no features to infer from.
    #[must_use]
    pub fn fallback() -> Self {
        Self::from_properties([
            ("ID".to_string(), FieldKind::Character { length: 20 }),
            ("Name".to_string(), FieldKind::STRING),
        ])
    }

    /// Builds a schema from property keys and kinds, deriving unique
    /// dBASE names.
    pub fn from_properties(properties: impl IntoIterator<Item = (String, FieldKind)>) -> Self {
        let mut used = BTreeSet::new();
        let fields = properties
            .into_iter()
            .map(|(property, kind)| {
                let name = unique_field_name(&property, &mut used);
                FieldDef {
                    property,
                    name,
                    kind,
                }
            })
            .collect();
        Self { fields }
    }

    /// Bytes of one `.dbf` record, including the deletion flag.
    #[must_use]
    pub fn record_length(&self) -> usize {
        1 + self
            .fields
            .iter()
            .map(|f| usize::from(f.kind.length()))
            .sum::<usize>()
    }
}

/// Infers columns from the properties of the first feature:
///
/// * strings become `C(255)`
/// * integers become `N(18,0)`
/// * other numbers become `N(24,15)`
/// * anything else becomes `C(255)`
///
/// Without features the [`Schema::fallback`] columns are used.
#[must_use]
pub fn infer_schema(features: &[Feature]) -> Schema {
    let Some(first) = features.first() else {
        log::warn!("No features to export; using the fallback schema");
        return Schema::fallback();
    };

    let schema = Schema::from_properties(first.properties.iter().flatten().map(|(key, value)| {
        let kind = match value {
            Value::Number(n) if n.is_i64() || n.is_u64() => FieldKind::INTEGER,
            Value::Number(_) => FieldKind::FLOAT,
            _ => FieldKind::STRING,
        };
        (key.clone(), kind)
    }));

    log::debug!(
        "Inferred shapefile schema: {}",
        schema
            .fields
            .iter()
            .map(|f| format!("{}={}({})", f.name, char::from(f.kind.type_code()), f.kind.length()))
            .collect::<Vec<_>>()
            .join(", ")
    );
    schema
}

/// Turns `property` into a dBASE name: characters other than ASCII
/// letters, digits and `_` become `_`, the result is cut to
/// [`MAX_FIELD_NAME_LEN`] bytes and collisions get `_1`, `_2`, ...
fn unique_field_name(property: &str, used: &mut BTreeSet<String>) -> String {
    let ascii: String = property
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    let base = truncate_bytes(&ascii, MAX_FIELD_NAME_LEN);
    let base = if base.is_empty() { "FIELD" } else { base };

    let mut candidate = base.to_string();
    let mut n = 1;
    while used.contains(&candidate.to_ascii_uppercase()) {
        let suffix = format!("_{n}");
        candidate = format!(
            "{}{suffix}",
            truncate_bytes(base, MAX_FIELD_NAME_LEN - suffix.len())
        );
        n += 1;
    }
    used.insert(candidate.to_ascii_uppercase());
    candidate
}

/// Longest prefix of `s` no longer than `max` bytes that ends on a char
/// boundary.
pub(crate) fn truncate_bytes(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Formats a property value for a field. Returns `None` when the value
/// cannot be represented; the field is then left blank.
#[must_use]
pub fn format_value(field: &FieldDef, value: Option<&Value>) -> Option<String> {
    let text = match field.kind {
        FieldKind::Character { length } => {
            let text = match value {
                None | Some(Value::Null) => String::new(),
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
            };
            return Some(truncate_bytes(&text, usize::from(length)).to_string());
        }
        FieldKind::Numeric { decimals: 0, .. } => match value {
            None | Some(Value::Null) => Some("0".to_string()),
            Some(Value::Number(n)) => n
                .as_i64()
                .map(|v| v.to_string())
                .or_else(|| n.as_u64().map(|v| v.to_string()))
                .or_else(|| n.as_f64().map(|v| format!("{:.0}", v.trunc()))),
            Some(Value::Bool(b)) => Some(u8::from(*b).to_string()),
            Some(Value::String(s)) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .map(|v| v.to_string())
                    .or_else(|| s.parse::<f64>().ok().filter(|v| v.is_finite()).map(|v| format!("{:.0}", v.trunc())))
            }
            Some(_) => None,
        },
        FieldKind::Numeric { decimals, .. } => {
            let number = match value {
                None | Some(Value::Null) => Some(0.0),
                Some(Value::Number(n)) => n.as_f64(),
                Some(Value::Bool(b)) => Some(f64::from(u8::from(*b))),
                Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
                Some(_) => None,
            };
            number
                .filter(|v| v.is_finite())
                .map(|v| format!("{v:.prec$}", prec = usize::from(decimals)))
        }
    };

    match text {
        Some(text) if text.len() <= usize::from(field.kind.length()) => Some(text),
        Some(text) => {
            log::warn!(
                "Value {text} does not fit field {} ({} bytes); leaving it blank",
                field.name,
                field.kind.length()
            );
            None
        }
        None => {
            log::warn!(
                "Could not convert property '{}' value {} to a number; leaving it blank",
                field.property,
                value.map_or_else(String::new, Value::to_string)
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn feature(properties: Value) -> Feature {
        Feature {
            bbox: None,
            geometry: None,
            id: None,
            properties: properties.as_object().cloned(),
            foreign_members: None,
        }
    }

    #[test]
    fn infers_kinds_from_first_feature() {
        let features = vec![
            feature(json!({"OFFENSE": "THEFT/OTHER", "WARD": 2, "SCORE": 0.5, "FLAG": true})),
            feature(json!({"OFFENSE": "ROBBERY", "WARD": "x"})),
        ];
        let schema = infer_schema(&features);
        let mut kinds: Vec<(&str, FieldKind)> = schema
            .fields
            .iter()
            .map(|f| (f.name.as_str(), f.kind))
            .collect();
        kinds.sort_by_key(|(name, _)| *name);
        assert_eq!(
            kinds,
            vec![
                ("FLAG", FieldKind::STRING),
                ("OFFENSE", FieldKind::STRING),
                ("SCORE", FieldKind::FLOAT),
                ("WARD", FieldKind::INTEGER),
            ]
        );
    }

    #[test]
    fn empty_input_uses_fallback() {
        let schema = infer_schema(&[]);
        let names: Vec<&str> = schema.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["ID", "Name"]);
        assert_eq!(schema.fields[0].kind, FieldKind::Character { length: 20 });
        assert_eq!(schema.record_length(), 1 + 20 + 255);
    }

    #[test]
    fn names_are_truncated_and_unique() {
        let schema = Schema::from_properties([
            ("offense_description".to_string(), FieldKind::STRING),
            ("offense_descriptor".to_string(), FieldKind::STRING),
            ("".to_string(), FieldKind::STRING),
        ]);
        let names: Vec<&str> = schema.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["offense_de", "offense__1", "FIELD"]);
        assert!(names.iter().all(|n| n.len() <= MAX_FIELD_NAME_LEN));
    }

    #[test]
    fn non_ascii_names_become_ascii() {
        let schema = Schema::from_properties([
            ("délit".to_string(), FieldKind::STRING),
            ("äöüäöüäöüäöü".to_string(), FieldKind::STRING),
            ("block name".to_string(), FieldKind::STRING),
        ]);
        let names: Vec<&str> = schema.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["d_lit", "__________", "block_name"]);
        assert!(names.iter().all(|n| n.is_ascii() && n.len() <= MAX_FIELD_NAME_LEN));
    }

    #[test]
    fn coerces_values() {
        let text = FieldDef {
            property: "a".to_string(),
            name: "a".to_string(),
            kind: FieldKind::Character { length: 5 },
        };
        assert_eq!(format_value(&text, None).as_deref(), Some(""));
        assert_eq!(format_value(&text, Some(&json!(12))).as_deref(), Some("12"));
        assert_eq!(format_value(&text, Some(&json!("abcdefgh"))).as_deref(), Some("abcde"));

        let int = FieldDef {
            property: "b".to_string(),
            name: "b".to_string(),
            kind: FieldKind::INTEGER,
        };
        assert_eq!(format_value(&int, Some(&Value::Null)).as_deref(), Some("0"));
        assert_eq!(format_value(&int, Some(&json!(" 42 "))).as_deref(), Some("42"));
        assert_eq!(format_value(&int, Some(&json!(3.9))).as_deref(), Some("3"));
        assert_eq!(format_value(&int, Some(&json!("n/a"))), None);

        let float = FieldDef {
            property: "c".to_string(),
            name: "c".to_string(),
            kind: FieldKind::FLOAT,
        };
        assert_eq!(
            format_value(&float, Some(&json!(1.5))).as_deref(),
            Some("1.500000000000000")
        );
        assert_eq!(format_value(&float, Some(&json!([1]))), None);
        assert_eq!(format_value(&float, Some(&json!(1e20))), None);
    }
}
