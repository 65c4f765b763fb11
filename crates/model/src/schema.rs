//! Record schema for single-subject prediction requests.
//!
//! Validation reports every problem in the request at once, using the
//! `{loc, msg, type}` issue shape HTTP clients of the service already expect.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as Json;
use thiserror::Error;

use crate::table::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Integer,
    Category,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

const fn required(name: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec {
        name,
        kind,
        required: true,
    }
}

/// Name of the optional outcome label; never used as a model input.
pub const OUTCOME_FIELD: &str = "HeartDisease";

/// Record fields in declaration order.
pub const RECORD_FIELDS: [FieldSpec; 12] = [
    required("Age", FieldKind::Integer),
    required("Sex", FieldKind::Category),
    required("ChestPainType", FieldKind::Category),
    required("RestingBP", FieldKind::Integer),
    required("Cholesterol", FieldKind::Integer),
    required("FastingBS", FieldKind::Integer),
    required("RestingECG", FieldKind::Category),
    required("MaxHR", FieldKind::Integer),
    required("ExerciseAngina", FieldKind::Category),
    required("Oldpeak", FieldKind::Integer),
    required("ST_Slope", FieldKind::Category),
    FieldSpec {
        name: OUTCOME_FIELD,
        kind: FieldKind::Category,
        required: false,
    },
];

/// One problem found while validating a request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldIssue {
    pub loc: Vec<String>,
    pub msg: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl FieldIssue {
    fn at_field(field: &str, msg: &str, kind: &str) -> Self {
        Self {
            loc: vec!["body".to_string(), field.to_string()],
            msg: msg.to_string(),
            kind: kind.to_string(),
        }
    }

    fn at_body(msg: impl Into<String>, kind: &str) -> Self {
        Self {
            loc: vec!["body".to_string()],
            msg: msg.into(),
            kind: kind.to_string(),
        }
    }

    pub fn missing(field: &str) -> Self {
        Self::at_field(field, "field required", "value_error.missing")
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{} validation error(s) for Record", .issues.len())]
pub struct ValidationError {
    pub issues: Vec<FieldIssue>,
}

impl ValidationError {
    /// The body was not parseable JSON at all.
    pub fn json_decode(message: impl Into<String>) -> Self {
        Self {
            issues: vec![FieldIssue::at_body(message, "value_error.jsondecode")],
        }
    }

    pub fn single(issue: FieldIssue) -> Self {
        Self {
            issues: vec![issue],
        }
    }
}

/// One subject's feature values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "Age")]
    pub age: i64,
    #[serde(rename = "Sex")]
    pub sex: String,
    #[serde(rename = "ChestPainType")]
    pub chest_pain_type: String,
    #[serde(rename = "RestingBP")]
    pub resting_bp: i64,
    #[serde(rename = "Cholesterol")]
    pub cholesterol: i64,
    #[serde(rename = "FastingBS")]
    pub fasting_bs: i64,
    #[serde(rename = "RestingECG")]
    pub resting_ecg: String,
    #[serde(rename = "MaxHR")]
    pub max_hr: i64,
    #[serde(rename = "ExerciseAngina")]
    pub exercise_angina: String,
    #[serde(rename = "Oldpeak")]
    pub oldpeak: i64,
    #[serde(rename = "ST_Slope")]
    pub st_slope: String,
    #[serde(
        rename = "HeartDisease",
        default,
        deserialize_with = "outcome_label",
        skip_serializing_if = "Option::is_none"
    )]
    pub heart_disease: Option<String>,
}

/// Outcome labels arrive as strings or as bare 0/1 integers.
fn outcome_label<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Json>::deserialize(deserializer)? {
        None | Some(Json::Null) => Ok(None),
        Some(Json::String(label)) => Ok(Some(label)),
        Some(Json::Number(number)) if number.is_i64() || number.is_u64() => {
            Ok(Some(number.to_string()))
        }
        Some(other) => Err(serde::de::Error::custom(format!(
            "invalid outcome label {other}"
        ))),
    }
}

impl Record {
    /// All record columns in declaration order, outcome included.
    pub fn column_names() -> Vec<String> {
        RECORD_FIELDS.iter().map(|f| f.name.to_string()).collect()
    }

    /// Names of the required (model input) fields.
    pub fn feature_names() -> Vec<&'static str> {
        RECORD_FIELDS
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name)
            .collect()
    }

    /// Row of cells aligned with [`Record::column_names`].
    pub fn into_row(self) -> Vec<Value> {
        vec![
            Value::Integer(self.age),
            Value::Text(self.sex),
            Value::Text(self.chest_pain_type),
            Value::Integer(self.resting_bp),
            Value::Integer(self.cholesterol),
            Value::Integer(self.fasting_bs),
            Value::Text(self.resting_ecg),
            Value::Integer(self.max_hr),
            Value::Text(self.exercise_angina),
            Value::Integer(self.oldpeak),
            Value::Text(self.st_slope),
            self.heart_disease.map(Value::Text).unwrap_or(Value::Missing),
        ]
    }
}

fn integer_issue(spec: &FieldSpec) -> FieldIssue {
    FieldIssue::at_field(spec.name, "value is not a valid integer", "type_error.integer")
}

fn str_issue(spec: &FieldSpec) -> FieldIssue {
    FieldIssue::at_field(spec.name, "str type expected", "type_error.str")
}

/// Coerce a present value to its declared kind.
///
/// Integer fields take integers, whole floats (`0.0`), booleans and
/// integer strings (`"54"`). Category fields take strings and stringify
/// numbers. Everything else is an issue.
fn coerce_value(spec: &FieldSpec, value: &Json) -> Result<Json, FieldIssue> {
    match (spec.kind, value) {
        (FieldKind::Integer, Json::Number(number)) => {
            if let Some(int) = number.as_i64() {
                return Ok(Json::from(int));
            }
            match number.as_f64() {
                Some(float) if float.fract() == 0.0 && float.abs() < i64::MAX as f64 => {
                    Ok(Json::from(float as i64))
                }
                _ => Err(integer_issue(spec)),
            }
        }
        (FieldKind::Integer, Json::Bool(flag)) => Ok(Json::from(i64::from(*flag))),
        (FieldKind::Integer, Json::String(text)) => text
            .trim()
            .parse::<i64>()
            .map(Json::from)
            .map_err(|_| integer_issue(spec)),
        (FieldKind::Integer, _) => Err(integer_issue(spec)),
        (FieldKind::Category, Json::String(_)) => Ok(value.clone()),
        (FieldKind::Category, Json::Number(number)) => Ok(Json::String(number.to_string())),
        (FieldKind::Category, _) => Err(str_issue(spec)),
    }
}

fn check_field(spec: &FieldSpec, value: Option<&Json>) -> Result<Option<Json>, FieldIssue> {
    match value {
        None | Some(Json::Null) if spec.required => Err(FieldIssue::missing(spec.name)),
        None | Some(Json::Null) => Ok(None),
        Some(value) => coerce_value(spec, value).map(Some),
    }
}

/// Validate one JSON value against [`RECORD_FIELDS`] and build a [`Record`].
///
/// Compatible values are coerced to the declared kind; unknown extra keys
/// are ignored.
pub fn validate_record(body: &Json) -> Result<Record, ValidationError> {
    let Some(object) = body.as_object() else {
        return Err(ValidationError::single(FieldIssue::at_body(
            "value is not a valid dict",
            "type_error.dict",
        )));
    };

    let mut normalized = serde_json::Map::new();
    let mut issues = Vec::new();
    for spec in &RECORD_FIELDS {
        match check_field(spec, object.get(spec.name)) {
            Ok(Some(value)) => {
                normalized.insert(spec.name.to_string(), value);
            }
            Ok(None) => {}
            Err(issue) => issues.push(issue),
        }
    }
    if !issues.is_empty() {
        return Err(ValidationError { issues });
    }

    Record::deserialize(Json::Object(normalized)).map_err(|err| {
        ValidationError::single(FieldIssue::at_body(err.to_string(), "value_error"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_body() -> Json {
        json!({
            "Age": 54,
            "Sex": "M",
            "ChestPainType": "ATA",
            "RestingBP": 130,
            "Cholesterol": 246,
            "FastingBS": 0,
            "RestingECG": "Normal",
            "MaxHR": 150,
            "ExerciseAngina": "N",
            "Oldpeak": 0,
            "ST_Slope": "Up"
        })
    }

    #[test]
    fn accepts_complete_record() {
        let record = validate_record(&valid_body()).unwrap();
        assert_eq!(record.age, 54);
        assert_eq!(record.st_slope, "Up");
        assert_eq!(record.heart_disease, None);
    }

    #[test]
    fn reports_every_missing_field() {
        let mut body = valid_body();
        let object = body.as_object_mut().unwrap();
        object.remove("Age");
        object.insert("Sex".into(), Json::Null);

        let err = validate_record(&body).unwrap_err();
        assert_eq!(
            err.issues,
            vec![FieldIssue::missing("Age"), FieldIssue::missing("Sex")]
        );
    }

    #[test]
    fn rejects_values_that_cannot_be_coerced() {
        let mut body = valid_body();
        body["MaxHR"] = json!("fast");
        body["Oldpeak"] = json!(1.5);
        body["RestingECG"] = json!(["Normal"]);
        body["Cholesterol"] = json!({"value": 246});

        let err = validate_record(&body).unwrap_err();
        let kinds: Vec<(&str, &str)> = err
            .issues
            .iter()
            .map(|issue| (issue.loc[1].as_str(), issue.kind.as_str()))
            .collect();
        assert_eq!(
            kinds,
            vec![
                ("Cholesterol", "type_error.integer"),
                ("RestingECG", "type_error.str"),
                ("MaxHR", "type_error.integer"),
                ("Oldpeak", "type_error.integer"),
            ]
        );
    }

    #[test]
    fn coerces_compatible_values() {
        let mut body = valid_body();
        body["Age"] = json!("54");
        body["FastingBS"] = json!(0.0);
        body["MaxHR"] = json!(" 150 ");
        body["Oldpeak"] = json!(true);
        body["RestingECG"] = json!(3);
        body["HeartDisease"] = json!(1.0);

        let record = validate_record(&body).unwrap();
        assert_eq!(record.age, 54);
        assert_eq!(record.fasting_bs, 0);
        assert_eq!(record.max_hr, 150);
        assert_eq!(record.oldpeak, 1);
        assert_eq!(record.resting_ecg, "3");
        assert_eq!(record.heart_disease.as_deref(), Some("1.0"));
    }

    #[test]
    fn outcome_is_optional_and_stringified() {
        let mut body = valid_body();
        body["HeartDisease"] = json!(1);
        assert_eq!(
            validate_record(&body).unwrap().heart_disease.as_deref(),
            Some("1")
        );

        body["HeartDisease"] = Json::Null;
        assert_eq!(validate_record(&body).unwrap().heart_disease, None);

        body["HeartDisease"] = json!([1]);
        assert!(validate_record(&body).is_err());
    }

    #[test]
    fn rejects_non_object_body() {
        let err = validate_record(&json!([1, 2, 3])).unwrap_err();
        assert_eq!(err.issues[0].kind, "type_error.dict");
    }

    #[test]
    fn row_matches_declared_columns() {
        let row = validate_record(&valid_body()).unwrap().into_row();
        assert_eq!(row.len(), Record::column_names().len());
        assert_eq!(row[0], Value::Integer(54));
        assert_eq!(row[10], Value::Text("Up".into()));
        assert_eq!(row[11], Value::Missing);
        assert_eq!(Record::feature_names().len(), 11);
    }

    #[test]
    fn issue_serializes_with_type_key() {
        let issue = serde_json::to_value(FieldIssue::missing("Age")).unwrap();
        assert_eq!(
            issue,
            json!({"loc": ["body", "Age"], "msg": "field required", "type": "value_error.missing"})
        );
    }
}
