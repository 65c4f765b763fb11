//! Loaded classification model
//!
//! A [`ModelArtifact`] is the JSON document produced by the offline training
//! pipeline. It declares the input features and how to encode them, one or
//! more GBDT boosters, and the class labels:
//!
//! ```json
//! {
//!   "version": 1,
//!   "name": "heart-disease-gbdt",
//!   "target": "HeartDisease",
//!   "features": [
//!     {"kind": "numeric", "name": "Age"},
//!     {"kind": "categorical", "name": "Sex", "categories": ["F", "M"]}
//!   ],
//!   "classes": ["0", "1"],
//!   "threshold": 0,
//!   "boosters": [{"version": 1, "scale": 1000000, "bias": 0, "trees": []}]
//! }
//! ```
//!
//! With two classes and a single booster the score is compared against
//! `threshold` (above selects `classes[1]`). With one booster per class the
//! highest score wins, ties going to the earlier class.
//!
//! A [`Classifier`] is immutable once loaded and is shared across request
//! handlers behind an `Arc`.

use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::{LoadError, PredictionError, Result};
use crate::fixed::parse_fixed;
use crate::gbdt::Booster;
use crate::serde_canon::hash_canonical_hex;
use crate::table::{Table, Value};

/// Supported artifact format version
pub const ARTIFACT_VERSION: i32 = 1;

/// File extension appended to model names given without one
pub const ARTIFACT_EXTENSION: &str = "json";

/// How one input column is turned into a fixed-point feature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeatureSpec {
    /// Integer or decimal value, scaled by the booster scale.
    Numeric { name: String },
    /// Category encoded as its position in `categories`.
    Categorical {
        name: String,
        categories: Vec<String>,
    },
}

impl FeatureSpec {
    pub fn name(&self) -> &str {
        match self {
            FeatureSpec::Numeric { name } | FeatureSpec::Categorical { name, .. } => name,
        }
    }

    /// Encode one cell, or describe why it cannot be encoded.
    fn encode(&self, value: &Value, scale: i64) -> std::result::Result<i64, String> {
        match (self, value) {
            (_, Value::Missing) => Err("value is missing".to_string()),
            (FeatureSpec::Numeric { .. }, Value::Integer(number)) => number
                .checked_mul(scale)
                .ok_or_else(|| format!("{number} is out of range")),
            (FeatureSpec::Numeric { .. }, Value::Text(text)) => {
                parse_fixed(text, scale).map_err(|err| err.to_string())
            }
            (FeatureSpec::Categorical { name, categories }, value) => {
                let label = value.to_string();
                match categories.iter().position(|category| *category == label) {
                    Some(code) => Ok(code as i64 * scale),
                    None => {
                        debug!(feature = %name, category = %label, "unseen category");
                        Ok(UNSEEN_CATEGORY * scale)
                    }
                }
            }
        }
    }
}

/// Code given to categories that were not present at training time.
pub const UNSEEN_CATEGORY: i64 = -1;

/// Serialized classifier as written by the training pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub version: i32,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    pub features: Vec<FeatureSpec>,
    pub classes: Vec<String>,
    pub boosters: Vec<Booster>,
    #[serde(default)]
    pub threshold: i64,
}

impl ModelArtifact {
    pub fn validate(&self) -> Result<()> {
        if self.version != ARTIFACT_VERSION {
            return Err(LoadError::Invalid(format!(
                "unsupported artifact version {}",
                self.version
            )));
        }
        if self.features.is_empty() {
            return Err(LoadError::Invalid("no input features declared".into()));
        }

        let mut names = HashSet::new();
        for feature in &self.features {
            if !names.insert(feature.name()) {
                return Err(LoadError::Invalid(format!(
                    "feature '{}' declared twice",
                    feature.name()
                )));
            }
        }

        if self.classes.len() < 2 {
            return Err(LoadError::Invalid(format!(
                "expected at least 2 classes, found {}",
                self.classes.len()
            )));
        }
        let binary = self.classes.len() == 2 && self.boosters.len() == 1;
        if !binary && self.boosters.len() != self.classes.len() {
            return Err(LoadError::Invalid(format!(
                "{} boosters cannot score {} classes",
                self.boosters.len(),
                self.classes.len()
            )));
        }

        for (index, booster) in self.boosters.iter().enumerate() {
            booster
                .validate(self.features.len())
                .map_err(|source| LoadError::Booster { index, source })?;
        }
        if self
            .boosters
            .windows(2)
            .any(|pair| pair[0].scale != pair[1].scale)
        {
            return Err(LoadError::Invalid("boosters use different scales".into()));
        }

        Ok(())
    }
}

/// The loaded, validated model used to label tables.
#[derive(Debug, Clone)]
pub struct Classifier {
    artifact: ModelArtifact,
    hash: String,
    scale: i64,
}

impl Classifier {
    /// Path of the artifact called `name` inside `models_dir`.
    pub fn artifact_path(models_dir: &Path, name: &str) -> PathBuf {
        let path = models_dir.join(name);
        if path.extension().is_some() {
            path
        } else {
            path.with_extension(ARTIFACT_EXTENSION)
        }
    }

    /// Load, validate and optionally verify the named artifact.
    pub fn load(models_dir: &Path, name: &str, expected_hash: Option<&str>) -> Result<Self> {
        let path = Self::artifact_path(models_dir, name);
        let json = fs::read_to_string(&path).map_err(|source| match source.kind() {
            ErrorKind::NotFound => LoadError::NotFound(path.clone()),
            _ => LoadError::Io {
                path: path.clone(),
                source,
            },
        })?;

        let classifier = Self::from_json_str(&json)?;
        if let Some(expected) = expected_hash {
            if !expected.trim().eq_ignore_ascii_case(&classifier.hash) {
                return Err(LoadError::HashMismatch {
                    expected: expected.trim().to_string(),
                    actual: classifier.hash.clone(),
                });
            }
        }

        info!(
            model = %classifier.name(),
            path = %path.display(),
            hash = %classifier.hash,
            "loaded model artifact"
        );
        Ok(classifier)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let artifact: ModelArtifact = serde_json::from_str(json)?;
        Self::from_artifact(artifact)
    }

    pub fn from_artifact(artifact: ModelArtifact) -> Result<Self> {
        artifact.validate()?;
        let hash = hash_canonical_hex(&artifact)?;
        let scale = artifact.boosters[0].scale;
        Ok(Self {
            artifact,
            hash,
            scale,
        })
    }

    /// Label every row of `table`, preserving row order.
    ///
    /// Columns are matched by name; columns the model does not use are
    /// ignored. All missing columns are reported together before any row is
    /// scored.
    pub fn predict(&self, table: &Table) -> Result<Vec<String>, PredictionError> {
        let positions = self.resolve_columns(table)?;

        table
            .rows()
            .iter()
            .enumerate()
            .map(|(index, row)| {
                let features = self.encode_row(index + 1, row, &positions)?;
                Ok(self.label_for(&features).to_string())
            })
            .collect()
    }

    fn resolve_columns(&self, table: &Table) -> Result<Vec<usize>, PredictionError> {
        let mut positions = Vec::with_capacity(self.artifact.features.len());
        let mut missing = Vec::new();

        for feature in &self.artifact.features {
            match table.column_index(feature.name()) {
                Some(position) => positions.push(position),
                None => missing.push(feature.name().to_string()),
            }
        }

        if missing.is_empty() {
            Ok(positions)
        } else {
            Err(PredictionError::MissingColumns(missing))
        }
    }

    fn encode_row(
        &self,
        row_number: usize,
        row: &[Value],
        positions: &[usize],
    ) -> Result<Vec<i64>, PredictionError> {
        self.artifact
            .features
            .iter()
            .zip(positions)
            .map(|(feature, &position)| {
                feature
                    .encode(&row[position], self.scale)
                    .map_err(|message| PredictionError::InvalidValue {
                        row: row_number,
                        column: feature.name().to_string(),
                        message,
                    })
            })
            .collect()
    }

    fn label_for(&self, features: &[i64]) -> &str {
        let classes = &self.artifact.classes;
        if let [booster] = self.artifact.boosters.as_slice() {
            let positive = booster.score(features) > self.artifact.threshold;
            return &classes[usize::from(positive)];
        }

        let mut best = 0;
        let mut best_score = i64::MIN;
        for (index, booster) in self.artifact.boosters.iter().enumerate() {
            let score = booster.score(features);
            if score > best_score {
                best = index;
                best_score = score;
            }
        }
        &classes[best]
    }

    pub fn name(&self) -> &str {
        &self.artifact.name
    }

    /// Blake3 hash of the canonical artifact JSON.
    pub fn hash_hex(&self) -> &str {
        &self.hash
    }

    pub fn classes(&self) -> &[String] {
        &self.artifact.classes
    }

    pub fn feature_names(&self) -> Vec<&str> {
        self.artifact.features.iter().map(FeatureSpec::name).collect()
    }

    pub fn artifact(&self) -> &ModelArtifact {
        &self.artifact
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gbdt::{Node, Tree, SCALE};

    fn numeric(name: &str) -> FeatureSpec {
        FeatureSpec::Numeric { name: name.into() }
    }

    /// Positive when `x > 10` or colour is "red".
    fn binary_artifact() -> ModelArtifact {
        let by_x = Tree::new(
            vec![
                Node::split(0, 10 * SCALE, 1, 2),
                Node::leaf(-SCALE),
                Node::leaf(2 * SCALE),
            ],
            SCALE,
        );
        let by_colour = Tree::new(
            vec![
                Node::split(1, SCALE / 2, 1, 2),
                Node::leaf(0),
                Node::leaf(3 * SCALE),
            ],
            SCALE,
        );

        ModelArtifact {
            version: ARTIFACT_VERSION,
            name: "toy".into(),
            target: Some("y".into()),
            features: vec![
                numeric("x"),
                FeatureSpec::Categorical {
                    name: "colour".into(),
                    categories: vec!["blue".into(), "red".into()],
                },
            ],
            classes: vec!["no".into(), "yes".into()],
            boosters: vec![Booster::new(vec![by_x, by_colour], 0)],
            threshold: 0,
        }
    }

    fn table(columns: &[&str], rows: Vec<Vec<Value>>) -> Table {
        let mut table = Table::new(columns.iter().map(|c| c.to_string()).collect()).unwrap();
        for row in rows {
            table.push_row(row).unwrap();
        }
        table
    }

    fn text(value: &str) -> Value {
        Value::Text(value.into())
    }

    #[test]
    fn predicts_one_label_per_row_in_order() {
        let classifier = Classifier::from_artifact(binary_artifact()).unwrap();
        let input = table(
            &["colour", "x", "ignored"],
            vec![
                vec![text("blue"), Value::Integer(3), Value::Missing],
                vec![text("blue"), text("10.5"), Value::Missing],
                vec![text("red"), Value::Integer(1), text("zzz")],
            ],
        );

        let labels = classifier.predict(&input).unwrap();
        assert_eq!(labels, vec!["no", "yes", "yes"]);
    }

    #[test]
    fn empty_table_yields_no_labels() {
        let classifier = Classifier::from_artifact(binary_artifact()).unwrap();
        let input = table(&["x", "colour"], vec![]);
        assert_eq!(classifier.predict(&input).unwrap(), Vec::<String>::new());
    }

    #[test]
    fn reports_all_missing_columns() {
        let classifier = Classifier::from_artifact(binary_artifact()).unwrap();
        let input = table(&["other"], vec![vec![Value::Integer(1)]]);
        assert_eq!(
            classifier.predict(&input),
            Err(PredictionError::MissingColumns(vec![
                "x".into(),
                "colour".into()
            ]))
        );
    }

    #[test]
    fn reports_bad_cells_with_position() {
        let classifier = Classifier::from_artifact(binary_artifact()).unwrap();
        let input = table(
            &["x", "colour"],
            vec![
                vec![Value::Integer(1), text("red")],
                vec![text("tall"), text("red")],
            ],
        );
        match classifier.predict(&input) {
            Err(PredictionError::InvalidValue { row, column, .. }) => {
                assert_eq!(row, 2);
                assert_eq!(column, "x");
            }
            other => panic!("expected InvalidValue, got {other:?}"),
        }

        let missing = table(&["x", "colour"], vec![vec![Value::Missing, text("red")]]);
        assert!(matches!(
            classifier.predict(&missing),
            Err(PredictionError::InvalidValue { .. })
        ));
    }

    #[test]
    fn unseen_category_uses_sentinel() {
        let classifier = Classifier::from_artifact(binary_artifact()).unwrap();
        let input = table(&["x", "colour"], vec![vec![Value::Integer(0), text("green")]]);
        assert_eq!(classifier.predict(&input).unwrap(), vec!["no"]);
    }

    #[test]
    fn one_vs_rest_picks_highest_score() {
        let constant = |value: i64| Booster::new(vec![Tree::new(vec![Node::leaf(value)], SCALE)], 0);
        let artifact = ModelArtifact {
            classes: vec!["a".into(), "b".into(), "c".into()],
            boosters: vec![constant(1), constant(5), constant(5)],
            ..binary_artifact()
        };
        let classifier = Classifier::from_artifact(artifact).unwrap();
        let input = table(&["x", "colour"], vec![vec![Value::Integer(0), text("red")]]);
        assert_eq!(classifier.predict(&input).unwrap(), vec!["b"]);
    }

    #[test]
    fn rejects_inconsistent_artifacts() {
        let mut one_class = binary_artifact();
        one_class.classes.truncate(1);
        assert!(matches!(
            Classifier::from_artifact(one_class),
            Err(LoadError::Invalid(_))
        ));

        let mut duplicate = binary_artifact();
        duplicate.features.push(numeric("x"));
        assert!(matches!(
            Classifier::from_artifact(duplicate),
            Err(LoadError::Invalid(_))
        ));

        let mut too_few_features = binary_artifact();
        too_few_features.features.truncate(1);
        assert!(matches!(
            Classifier::from_artifact(too_few_features),
            Err(LoadError::Booster { index: 0, .. })
        ));

        let mut booster_mismatch = binary_artifact();
        booster_mismatch.classes.push("maybe".into());
        assert!(matches!(
            Classifier::from_artifact(booster_mismatch),
            Err(LoadError::Invalid(_))
        ));
    }

    #[test]
    fn load_appends_extension_and_checks_hash() {
        let dir = tempfile::tempdir().unwrap();
        let json = serde_json::to_string_pretty(&binary_artifact()).unwrap();
        fs::write(dir.path().join("toy.json"), json).unwrap();

        let classifier = Classifier::load(dir.path(), "toy", None).unwrap();
        assert_eq!(classifier.name(), "toy");
        assert_eq!(classifier.hash_hex().len(), 64);

        let upper = classifier.hash_hex().to_uppercase();
        assert!(Classifier::load(dir.path(), "toy.json", Some(upper.as_str())).is_ok());
        assert!(matches!(
            Classifier::load(dir.path(), "toy", Some("00")),
            Err(LoadError::HashMismatch { .. })
        ));
    }

    #[test]
    fn load_reports_missing_and_corrupt_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Classifier::load(dir.path(), "absent", None),
            Err(LoadError::NotFound(path)) if path.ends_with("absent.json")
        ));

        fs::write(dir.path().join("broken.json"), "{ not json").unwrap();
        assert!(matches!(
            Classifier::load(dir.path(), "broken", None),
            Err(LoadError::Json(_))
        ));
    }

    #[test]
    fn hash_is_stable_across_formatting() {
        let compact = serde_json::to_string(&binary_artifact()).unwrap();
        let pretty = serde_json::to_string_pretty(&binary_artifact()).unwrap();
        let a = Classifier::from_json_str(&compact).unwrap();
        let b = Classifier::from_json_str(&pretty).unwrap();
        assert_eq!(a.hash_hex(), b.hash_hex());
    }
}
