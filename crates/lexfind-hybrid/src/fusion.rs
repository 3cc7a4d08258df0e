// Weighted max-plus-bonus score fusion

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use lexfind_core::config::{MethodWeights, RetrievalSettings};
use lexfind_core::types::{Candidate, FusedResult};

#[derive(Debug, Clone, PartialEq)]
pub struct FusionPolicy {
    pub weights: MethodWeights,
    pub agreement_bonus: f32,
    pub limit: usize,
}

impl Default for FusionPolicy {
    fn default() -> Self { Self::from_settings(&RetrievalSettings::default()) }
}

impl FusionPolicy {
    pub fn from_settings(s: &RetrievalSettings) -> Self {
        Self { weights: s.weights, agreement_bonus: s.agreement_bonus, limit: s.fused_limit }
    }

    /// `max(a, b) + bonus * min(a, b)`. Monotonic in both inputs and never
    /// more than `bonus * min` above the larger one.
    pub fn combine(&self, existing: f32, incoming: f32) -> f32 {
        existing.max(incoming) + self.agreement_bonus * existing.min(incoming)
    }

    /// Group candidates by document and fold their weighted scores.
    ///
    /// Methods are folded in `MatchMethod` order (vector, fuzzy, text,
    /// legacy); within a method, in the order given. The result is sorted by
    /// score, ties by `doc_id`, and truncated to `limit`.
    pub fn fuse(&self, candidates: &[Candidate]) -> Vec<FusedResult> {
        let mut ordered: Vec<&Candidate> = candidates.iter().collect();
        ordered.sort_by_key(|c| c.method);

        let mut slots: HashMap<&str, usize> = HashMap::new();
        let mut fused: Vec<FusedResult> = Vec::new();
        for c in ordered {
            let weighted = c.raw_score * self.weights.weight(c.method);
            match slots.get(c.doc_id()) {
                Some(&i) => {
                    let entry = &mut fused[i];
                    entry.final_score = self.combine(entry.final_score, weighted);
                    entry.contributing_methods.insert(c.method);
                }
                None => {
                    slots.insert(c.doc_id(), fused.len());
                    fused.push(FusedResult {
                        doc_id: c.template.doc_id.clone(),
                        final_score: weighted,
                        contributing_methods: BTreeSet::from([c.method]),
                        title: c.template.title.clone(),
                        snippet: c.template.snippet.clone(),
                        storage_path: c.template.storage_path.clone(),
                    });
                }
            }
        }

        fused.sort_by(|a, b| b.final_score.partial_cmp(&a.final_score).unwrap_or(Ordering::Equal).then_with(|| a.doc_id.cmp(&b.doc_id)));
        fused.truncate(self.limit);
        fused
    }
}
