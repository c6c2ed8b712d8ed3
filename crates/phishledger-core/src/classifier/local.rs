//! Pre-trained TF-IDF + linear model classifier.
//!
//! The model is a JSON artifact exported from a fitted vectorizer and a
//! linear classifier:
//!
//! ```json
//! {
//!   "vectorizer": {
//!     "vocabulary": { "verify": 0, "account": 1 },
//!     "idf": [1.7, 1.2],
//!     "sublinear_tf": false,
//!     "norm": "l2"
//!   },
//!   "model": { "coefficients": [2.1, 0.8], "intercept": -0.4 }
//! }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::request::EmailText;
use crate::{Error, Result};

#[allow(clippy::expect_used)]
static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\w\w+\b").expect("token pattern is valid"));

/// Vector normalization applied after weighting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Norm {
    /// Scale to unit Euclidean length.
    #[default]
    L2,
    /// Leave weights as they are.
    None,
}

/// A fitted term-frequency / inverse-document-frequency vectorizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TfidfVectorizer {
    /// Term to column index.
    pub vocabulary: HashMap<String, usize>,
    /// Inverse document frequency per column.
    pub idf: Vec<f64>,
    /// Lowercase tokens before lookup.
    #[serde(default = "default_lowercase")]
    pub lowercase: bool,
    /// Use `1 + ln(tf)` instead of raw counts.
    #[serde(default)]
    pub sublinear_tf: bool,
    /// Output normalization.
    #[serde(default)]
    pub norm: Norm,
}

const fn default_lowercase() -> bool {
    true
}

impl TfidfVectorizer {
    /// Number of feature columns.
    #[must_use]
    pub fn width(&self) -> usize {
        self.idf.len()
    }

    /// Transform text into a sparse feature vector keyed by column.
    #[must_use]
    pub fn transform(&self, text: &str) -> BTreeMap<usize, f64> {
        let text = if self.lowercase {
            text.to_lowercase()
        } else {
            text.to_string()
        };

        let mut counts: BTreeMap<usize, f64> = BTreeMap::new();
        for token in TOKEN.find_iter(&text) {
            if let Some(&column) = self.vocabulary.get(token.as_str()) {
                *counts.entry(column).or_default() += 1.0;
            }
        }

        for (column, weight) in &mut counts {
            let tf = if self.sublinear_tf {
                1.0 + weight.ln()
            } else {
                *weight
            };
            *weight = tf * self.idf[*column];
        }

        if self.norm == Norm::L2 {
            let length = counts.values().map(|w| w * w).sum::<f64>().sqrt();
            if length > 0.0 {
                for weight in counts.values_mut() {
                    *weight /= length;
                }
            }
        }

        counts
    }
}

/// A linear decision function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    /// Weight per feature column.
    pub coefficients: Vec<f64>,
    /// Bias term.
    pub intercept: f64,
}

impl LinearModel {
    /// Evaluate `w·x + b`.
    #[must_use]
    pub fn decision(&self, features: &BTreeMap<usize, f64>) -> f64 {
        features
            .iter()
            .map(|(&column, weight)| self.coefficients[column] * weight)
            .sum::<f64>()
            + self.intercept
    }
}

/// The serialized model file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    /// Fitted vectorizer.
    pub vectorizer: TfidfVectorizer,
    /// Trained classifier.
    pub model: LinearModel,
}

impl ModelArtifact {
    /// Check that the vectorizer and model agree on shape.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Model`] describing the first inconsistency.
    pub fn validate(&self) -> Result<()> {
        let width = self.vectorizer.width();
        if width == 0 {
            return Err(Error::Model("vectorizer has no features".into()));
        }
        if self.model.coefficients.len() != width {
            return Err(Error::Model(format!(
                "model has {} coefficients but vectorizer has {width} features",
                self.model.coefficients.len()
            )));
        }
        if let Some((term, index)) = self
            .vectorizer
            .vocabulary
            .iter()
            .find(|&(_, &index)| index >= width)
        {
            return Err(Error::Model(format!(
                "term {term:?} maps to column {index} outside width {width}"
            )));
        }
        let finite = self
            .vectorizer
            .idf
            .iter()
            .chain(&self.model.coefficients)
            .chain(std::iter::once(&self.model.intercept))
            .all(|value| value.is_finite());
        if !finite {
            return Err(Error::Model("model contains non-finite weights".into()));
        }
        Ok(())
    }
}

/// Lowercase and drop everything that is not alphanumeric or whitespace.
#[must_use]
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect()
}

/// Classifies emails with a model loaded once at startup.
#[derive(Debug, Clone)]
pub struct LocalClassifier {
    artifact: ModelArtifact,
}

impl LocalClassifier {
    /// Load a model artifact from disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid model.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = tokio::fs::read_to_string(path).await?;
        let classifier = Self::from_json(&json)?;
        info!(
            "Loaded local model from {} ({} features)",
            path.display(),
            classifier.artifact.vectorizer.width()
        );
        Ok(classifier)
    }

    /// Parse a model artifact.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Model`] if the JSON is malformed or inconsistent.
    pub fn from_json(json: &str) -> Result<Self> {
        let artifact: ModelArtifact =
            serde_json::from_str(json).map_err(|e| Error::Model(e.to_string()))?;
        Self::new(artifact)
    }

    /// Wrap a validated artifact.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Model`] if the artifact is inconsistent.
    pub fn new(artifact: ModelArtifact) -> Result<Self> {
        artifact.validate()?;
        Ok(Self { artifact })
    }

    /// Decision score for `text`; positive means phishing.
    #[must_use]
    pub fn score(&self, text: &EmailText) -> f64 {
        let combined = normalize(&format!("{} {} {}", text.sender, text.subject, text.content));
        let features = self.artifact.vectorizer.transform(&combined);
        self.artifact.model.decision(&features)
    }

    /// Classify an email.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ClassificationUnavailable`] if the model produces a
    /// non-finite score.
    pub fn classify(&self, text: &EmailText) -> Result<bool> {
        let score = self.score(text);
        if !score.is_finite() {
            return Err(Error::ClassificationUnavailable(format!(
                "local model produced score {score}"
            )));
        }
        debug!("Local model score for email from {}: {score:.4}", text.sender);
        Ok(score > 0.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const MODEL_JSON: &str = r#"{
        "vectorizer": {
            "vocabulary": { "verify": 0, "account": 1, "meeting": 2, "lunch": 3, "urgent": 4 },
            "idf": [1.0, 1.0, 1.0, 1.0, 2.0],
            "sublinear_tf": false,
            "norm": "l2"
        },
        "model": { "coefficients": [1.5, 1.0, -1.0, -1.5, 1.0], "intercept": -0.1 }
    }"#;

    fn text(subject: &str, content: &str) -> EmailText {
        EmailText {
            sender: "example.com".into(),
            subject: subject.into(),
            content: content.into(),
        }
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("URGENT!!! Verify@Now"), "urgent verifynow");
        assert_eq!(normalize("a.b-c\td"), "abc\td");
    }

    #[test]
    fn test_classifies_by_decision_sign() {
        let classifier = LocalClassifier::from_json(MODEL_JSON).unwrap();

        assert!(classifier.classify(&text("Urgent", "Verify your account")).unwrap());
        assert!(!classifier.classify(&text("Lunch", "Team meeting at noon")).unwrap());
    }

    #[test]
    fn test_unknown_words_fall_back_to_intercept() {
        let classifier = LocalClassifier::from_json(MODEL_JSON).unwrap();
        let score = classifier.score(&text("Hello", "Nothing here"));
        assert!((score - -0.1).abs() < 1e-12);
    }

    #[test]
    fn test_transform_l2_and_sublinear() {
        let mut vectorizer = LocalClassifier::from_json(MODEL_JSON)
            .unwrap()
            .artifact
            .vectorizer;

        let features = vectorizer.transform("verify verify account a");
        let length: f64 = features.values().map(|w| w * w).sum();
        assert!((length - 1.0).abs() < 1e-12);
        assert!(features[&0] > features[&1]);

        vectorizer.sublinear_tf = true;
        vectorizer.norm = Norm::None;
        let features = vectorizer.transform("verify verify");
        assert!((features[&0] - (1.0 + 2.0_f64.ln())).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_inconsistent_model() {
        let bad_width = r#"{
            "vectorizer": { "vocabulary": { "a": 0 }, "idf": [1.0] },
            "model": { "coefficients": [1.0, 2.0], "intercept": 0.0 }
        }"#;
        assert!(matches!(LocalClassifier::from_json(bad_width), Err(Error::Model(_))));

        let bad_index = r#"{
            "vectorizer": { "vocabulary": { "aa": 3 }, "idf": [1.0] },
            "model": { "coefficients": [1.0], "intercept": 0.0 }
        }"#;
        assert!(matches!(LocalClassifier::from_json(bad_index), Err(Error::Model(_))));

        assert!(matches!(
            LocalClassifier::from_json("not json"),
            Err(Error::Model(_))
        ));
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let err = LocalClassifier::load("/nonexistent/phishledger/model.json")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
