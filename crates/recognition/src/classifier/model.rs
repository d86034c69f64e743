//! Trained classifier artifacts.
//!
//! An artifact is a JSON document pairing a label encoder (identity label to
//! class index) with a probabilistic classifier (embedding to per-class
//! probabilities). Artifacts are validated once on load and read-only after.

use crate::error::{RecognitionError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Identity labels in class-index order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelEncoder {
    classes: Vec<String>,
}

impl LabelEncoder {
    pub fn new(classes: Vec<String>) -> Self {
        Self { classes }
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn inverse_transform(&self, index: usize) -> Option<&str> {
        self.classes.get(index).map(String::as_str)
    }

    pub fn transform(&self, label: &str) -> Option<usize> {
        self.classes.iter().position(|c| c == label)
    }
}

/// Node of a decision tree; leaves carry per-class sample counts or weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        distribution: Vec<f64>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    pub nodes: Vec<TreeNode>,
}

impl DecisionTree {
    /// Normalized class distribution of the leaf reached by `x`
    fn predict(&self, x: &[f64]) -> Result<Vec<f64>> {
        let mut index = 0;
        // A valid tree reaches a leaf in fewer steps than it has nodes
        for _ in 0..self.nodes.len() {
            match &self.nodes[index] {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if x[*feature] <= *threshold { *left } else { *right };
                }
                TreeNode::Leaf { distribution } => return Ok(normalize(distribution.clone())),
            }
        }

        Err(RecognitionError::Model("decision tree contains a cycle".to_string()))
    }
}

/// The probabilistic classifiers an artifact can carry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Classifier {
    /// One-vs-rest linear SVM with per-class Platt scaling
    LinearSvm {
        coef: Vec<Vec<f64>>,
        intercept: Vec<f64>,
        prob_a: Vec<f64>,
        prob_b: Vec<f64>,
    },
    /// One-vs-rest RBF-kernel SVM with per-class Platt scaling
    RadialSvm {
        support_vectors: Vec<Vec<f64>>,
        dual_coef: Vec<Vec<f64>>,
        intercept: Vec<f64>,
        gamma: f64,
        prob_a: Vec<f64>,
        prob_b: Vec<f64>,
    },
    /// Gaussian naive Bayes
    GaussianNb {
        theta: Vec<Vec<f64>>,
        var: Vec<Vec<f64>>,
        class_prior: Vec<f64>,
    },
    /// Random forest; the leaf distributions of all trees are averaged
    Forest { trees: Vec<DecisionTree> },
    /// Multinomial logistic regression
    Logistic {
        coef: Vec<Vec<f64>>,
        intercept: Vec<f64>,
    },
}

impl Classifier {
    /// Per-class probabilities summing to 1
    pub fn predict_proba(&self, x: &[f64]) -> Result<Vec<f64>> {
        let probabilities = match self {
            Classifier::LinearSvm {
                coef,
                intercept,
                prob_a,
                prob_b,
            } => {
                let scores = coef.iter().zip(intercept).map(|(w, b)| dot(w, x) + b);
                platt(scores, prob_a, prob_b)
            }
            Classifier::RadialSvm {
                support_vectors,
                dual_coef,
                intercept,
                gamma,
                prob_a,
                prob_b,
            } => {
                let kernel: Vec<f64> = support_vectors
                    .iter()
                    .map(|sv| (-gamma * squared_distance(sv, x)).exp())
                    .collect();
                let scores = dual_coef.iter().zip(intercept).map(|(alpha, b)| dot(alpha, &kernel) + b);
                platt(scores, prob_a, prob_b)
            }
            Classifier::GaussianNb {
                theta,
                var,
                class_prior,
            } => {
                let log_likelihood = theta.iter().zip(var).zip(class_prior).map(|((mean, var), prior)| {
                    let log_density: f64 = mean
                        .iter()
                        .zip(var)
                        .zip(x)
                        .map(|((m, v), xi)| {
                            -0.5 * (2.0 * std::f64::consts::PI * v).ln() - (xi - m).powi(2) / (2.0 * v)
                        })
                        .sum();
                    prior.ln() + log_density
                });
                softmax(log_likelihood.collect())
            }
            Classifier::Forest { trees } => {
                let mut sum: Vec<f64> = Vec::new();
                for tree in trees {
                    let distribution = tree.predict(x)?;
                    if sum.is_empty() {
                        sum = distribution;
                    } else {
                        for (acc, p) in sum.iter_mut().zip(distribution) {
                            *acc += p;
                        }
                    }
                }
                normalize(sum)
            }
            Classifier::Logistic { coef, intercept } => {
                softmax(coef.iter().zip(intercept).map(|(w, b)| dot(w, x) + b).collect())
            }
        };

        if probabilities.iter().any(|p| !p.is_finite()) {
            return Err(RecognitionError::Model(
                "classifier produced non-finite probabilities".to_string(),
            ));
        }

        Ok(probabilities)
    }

    /// Check shapes against the class count; returns the input dimension
    /// when the classifier fixes one
    fn validate(&self, n_classes: usize) -> std::result::Result<Option<usize>, String> {
        let rows = |name: &str, rows: &[Vec<f64>]| -> std::result::Result<Option<usize>, String> {
            if rows.len() != n_classes {
                return Err(format!("{} has {} rows for {} classes", name, rows.len(), n_classes));
            }
            let dim = rows.first().map(Vec::len);
            if rows.iter().any(|r| Some(r.len()) != dim) {
                return Err(format!("{} rows differ in length", name));
            }
            Ok(dim)
        };
        let per_class = |name: &str, values: &[f64]| -> std::result::Result<(), String> {
            if values.len() != n_classes {
                return Err(format!("{} has {} entries for {} classes", name, values.len(), n_classes));
            }
            Ok(())
        };

        match self {
            Classifier::LinearSvm {
                coef,
                intercept,
                prob_a,
                prob_b,
            } => {
                per_class("intercept", intercept)?;
                per_class("prob_a", prob_a)?;
                per_class("prob_b", prob_b)?;
                rows("coef", coef)
            }
            Classifier::RadialSvm {
                support_vectors,
                dual_coef,
                intercept,
                prob_a,
                prob_b,
                ..
            } => {
                per_class("intercept", intercept)?;
                per_class("prob_a", prob_a)?;
                per_class("prob_b", prob_b)?;
                let n_support = rows("dual_coef", dual_coef)?.unwrap_or(0);
                if n_support != support_vectors.len() {
                    return Err(format!(
                        "dual_coef covers {} support vectors, model has {}",
                        n_support,
                        support_vectors.len()
                    ));
                }
                let dim = support_vectors.first().map(Vec::len);
                if support_vectors.iter().any(|sv| Some(sv.len()) != dim) {
                    return Err("support vectors differ in length".to_string());
                }
                Ok(dim)
            }
            Classifier::GaussianNb {
                theta,
                var,
                class_prior,
            } => {
                per_class("class_prior", class_prior)?;
                if class_prior.iter().any(|p| *p <= 0.0) {
                    return Err("class priors must be positive".to_string());
                }
                if var.iter().flatten().any(|v| *v <= 0.0) {
                    return Err("variances must be positive".to_string());
                }
                let dim = rows("theta", theta)?;
                if rows("var", var)? != dim {
                    return Err("theta and var differ in dimension".to_string());
                }
                Ok(dim)
            }
            Classifier::Forest { trees } => {
                if trees.is_empty() {
                    return Err("forest has no trees".to_string());
                }
                for tree in trees {
                    if tree.nodes.is_empty() {
                        return Err("forest contains an empty tree".to_string());
                    }
                    for node in &tree.nodes {
                        match node {
                            TreeNode::Split { left, right, .. } => {
                                if *left >= tree.nodes.len() || *right >= tree.nodes.len() {
                                    return Err("tree node points outside the tree".to_string());
                                }
                            }
                            TreeNode::Leaf { distribution } => per_class("leaf distribution", distribution)?,
                        }
                    }
                }
                // Trees only bound the dimension from below, see `min_dimension`
                Ok(None)
            }
            Classifier::Logistic { coef, intercept } => {
                per_class("intercept", intercept)?;
                rows("coef", coef)
            }
        }
    }

    /// Smallest embedding a forest can index into
    fn min_dimension(&self) -> usize {
        match self {
            Classifier::Forest { trees } => trees
                .iter()
                .flat_map(|t| &t.nodes)
                .filter_map(|node| match node {
                    TreeNode::Split { feature, .. } => Some(feature + 1),
                    TreeNode::Leaf { .. } => None,
                })
                .max()
                .unwrap_or(0),
            _ => 0,
        }
    }
}

/// A named, versioned, read-only classifier artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierModel {
    pub name: String,
    #[serde(default)]
    pub version: String,
    pub labels: LabelEncoder,
    /// Expected embedding length; inferred from the classifier when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_dim: Option<usize>,
    pub classifier: Classifier,
}

impl ClassifierModel {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let model: ClassifierModel = serde_json::from_str(&raw)?;
        let model = model.validated()?;

        tracing::info!(
            name = %model.name,
            version = %model.version,
            classes = model.labels.len(),
            path = %path.display(),
            "Loaded classifier model"
        );
        Ok(model)
    }

    /// Check internal consistency and settle `embedding_dim`
    pub fn validated(mut self) -> Result<Self> {
        if self.labels.is_empty() {
            return Err(RecognitionError::invalid_model(&self.name, "no identity labels"));
        }

        let inferred = self
            .classifier
            .validate(self.labels.len())
            .map_err(|reason| RecognitionError::invalid_model(&self.name, reason))?;

        match (self.embedding_dim, inferred) {
            (Some(declared), Some(actual)) if declared != actual => {
                return Err(RecognitionError::invalid_model(
                    &self.name,
                    format!("declares {} dimensions, classifier uses {}", declared, actual),
                ));
            }
            (None, Some(actual)) => self.embedding_dim = Some(actual),
            _ => {}
        }

        let min_dim = self.classifier.min_dimension();
        if let Some(dim) = self.embedding_dim {
            if dim < min_dim {
                return Err(RecognitionError::invalid_model(
                    &self.name,
                    format!("trees split on feature {} of a {}-dimensional embedding", min_dim - 1, dim),
                ));
            }
        }

        Ok(self)
    }

    /// Arg-max identity and its probability
    pub fn predict(&self, embedding: &[f64]) -> Result<(String, f64)> {
        let expected = self
            .embedding_dim
            .unwrap_or_else(|| self.classifier.min_dimension());
        if (self.embedding_dim.is_some() && embedding.len() != expected) || embedding.len() < expected {
            return Err(RecognitionError::DimensionMismatch {
                expected,
                actual: embedding.len(),
            });
        }

        let probabilities = self.classifier.predict_proba(embedding)?;
        let (index, confidence) = probabilities
            .iter()
            .copied()
            .enumerate()
            .fold(None, |best: Option<(usize, f64)>, (i, p)| match best {
                Some((_, best_p)) if best_p >= p => best,
                _ => Some((i, p)),
            })
            .ok_or_else(|| RecognitionError::Model("classifier returned no probabilities".to_string()))?;

        let identity = self.labels.inverse_transform(index).ok_or_else(|| {
            RecognitionError::Model(format!("class index {} has no label", index))
        })?;

        Ok((identity.to_string(), confidence))
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

/// Platt-scaled one-vs-rest scores, renormalized across classes
fn platt(scores: impl Iterator<Item = f64>, prob_a: &[f64], prob_b: &[f64]) -> Vec<f64> {
    let raw = scores
        .zip(prob_a.iter().zip(prob_b))
        .map(|(f, (a, b))| 1.0 / (1.0 + (a * f + b).exp()))
        .collect();
    normalize(raw)
}

fn softmax(logits: Vec<f64>) -> Vec<f64> {
    let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    normalize(logits.into_iter().map(|l| (l - max).exp()).collect())
}

fn normalize(values: Vec<f64>) -> Vec<f64> {
    let total: f64 = values.iter().sum();
    if total > 0.0 {
        values.into_iter().map(|v| v / total).collect()
    } else {
        values
    }
}
