//! Majority vote over independently trained classifiers.

use super::model::ClassifierModel;
use crate::error::{RecognitionError, Result};
use common::faces::{IdentityResult, UNKNOWN_IDENTITY};
use std::collections::HashMap;
use std::path::Path;

/// Ensemble members and their own confidence thresholds, in voting order
pub const ENSEMBLE_VARIANTS: [(&str, f64); 5] = [
    ("LinearSvm", 0.45),
    ("RadialSvm", 0.4),
    ("GaussianNB", 0.9),
    ("Forest", 0.55),
    ("Logic", 0.5),
];

#[derive(Debug, Clone)]
pub struct EnsembleMember {
    pub model: ClassifierModel,
    pub threshold: f64,
}

#[derive(Debug, Clone)]
pub struct Ensemble {
    members: Vec<EnsembleMember>,
}

impl Ensemble {
    pub fn new(members: Vec<EnsembleMember>) -> Result<Self> {
        if members.is_empty() {
            return Err(RecognitionError::Model("ensemble has no members".to_string()));
        }
        Ok(Self { members })
    }

    /// Load `<variant>.json` for every known variant found in `dir`
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let mut members = Vec::new();

        for (variant, threshold) in ENSEMBLE_VARIANTS {
            let path = dir.join(format!("{}.json", variant));
            if !path.exists() {
                tracing::warn!(variant, path = %path.display(), "Ensemble member missing, skipping");
                continue;
            }
            members.push(EnsembleMember {
                model: ClassifierModel::load(&path)?,
                threshold,
            });
        }

        if members.is_empty() {
            return Err(RecognitionError::Model(format!(
                "no ensemble members found in {}",
                dir.display()
            )));
        }

        tracing::info!(members = members.len(), "Loaded classifier ensemble");
        Self::new(members)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Resolve one embedding by vote
    ///
    /// Each member votes its arg-max identity, or Unknown when its confidence
    /// is below the member's threshold; reaching the threshold is enough.
    /// The leading identity needs a strict majority of all members; a mere
    /// plurality yields Unknown with the dissenting fraction as confidence.
    pub fn predict(&self, embedding: &[f64]) -> Result<IdentityResult> {
        let mut votes: Vec<String> = Vec::with_capacity(self.members.len());
        for member in &self.members {
            let (identity, confidence) = member.model.predict(embedding)?;
            let vote = if confidence >= member.threshold {
                identity
            } else {
                UNKNOWN_IDENTITY.to_string()
            };
            tracing::debug!(member = %member.model.name, vote = %vote, confidence, "Ensemble vote");
            votes.push(vote);
        }

        Ok(tally(&votes))
    }
}

fn tally(votes: &[String]) -> IdentityResult {
    let n = votes.len();
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for vote in votes {
        *counts.entry(vote.as_str()).or_default() += 1;
    }

    // Ties resolve to the identity voted first
    let (leader, max_votes) = votes
        .iter()
        .map(|v| (v.as_str(), counts[v.as_str()]))
        .fold(("", 0), |best, candidate| if candidate.1 > best.1 { candidate } else { best });

    if 2 * max_votes > n {
        IdentityResult {
            identity: leader.to_string(),
            confidence: max_votes as f64 / n as f64,
        }
    } else {
        IdentityResult {
            identity: UNKNOWN_IDENTITY.to_string(),
            confidence: (n - max_votes) as f64 / n as f64,
        }
    }
}
