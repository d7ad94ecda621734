//! Candidate merging and reciprocal rank fusion.
//!
//! Lexical scores and vector distances live on unrelated scales, so they are
//! never combined arithmetically. Only rank positions are fused:
//! `score(d) = Σ 1 / (rank_b(d) + k)` over the backends `b` that returned `d`,
//! with ranks starting at 1.

use std::collections::{BTreeSet, HashMap};

use store::{LexicalHit, VectorHit};

use crate::types::{Candidate, Source};

pub const DEFAULT_RRF_K: f32 = 60.0;

/// A deduplicated first-pass hit, not yet hydrated.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedHit {
	pub doc_id: String,
	pub sources: BTreeSet<Source>,
	pub fusion_score: f32,
}

/// Contribution of a hit at 1-based `rank`.
pub fn reciprocal_rank(rank: usize, k: f32) -> f32 {
	1.0 / (rank as f32 + k)
}

/// Union both ranked lists by document id.
///
/// Each list must already be in its backend's order (best first). An id
/// repeated within one list only counts at its best rank. The result is
/// ordered by fusion score, ties by ascending id.
pub fn merge(lexical: &[LexicalHit], vector: &[VectorHit], k: f32) -> Vec<MergedHit> {
	let mut merged: HashMap<String, MergedHit> = HashMap::new();

	let lexical_ids = lexical.iter().map(|h| h.doc_id.as_str());
	let vector_ids = vector.iter().map(|h| h.doc_id.as_str());

	accumulate(&mut merged, lexical_ids, Source::Lexical, k);
	accumulate(&mut merged, vector_ids, Source::Vector, k);

	let mut hits: Vec<MergedHit> = merged.into_values().collect();
	hits.sort_by(|a, b| {
		b.fusion_score
			.total_cmp(&a.fusion_score)
			.then_with(|| a.doc_id.cmp(&b.doc_id))
	});
	hits
}

fn accumulate<'a>(
	merged: &mut HashMap<String, MergedHit>,
	ranked_ids: impl Iterator<Item = &'a str>,
	source: Source,
	k: f32,
) {
	let mut rank = 0;
	for doc_id in ranked_ids {
		let entry = merged.entry(doc_id.to_string()).or_insert_with(|| MergedHit {
			doc_id: doc_id.to_string(),
			sources: BTreeSet::new(),
			fusion_score: 0.0,
		});
		if !entry.sources.insert(source) {
			continue;
		}
		rank += 1;
		entry.fusion_score += reciprocal_rank(rank, k);
	}
}

/// Order by active score (descending), ties by ascending id.
pub fn sort_candidates(candidates: &mut [Candidate]) {
	candidates.sort_by(|a, b| {
		b.active_score()
			.total_cmp(&a.active_score())
			.then_with(|| a.doc_id.cmp(&b.doc_id))
	});
}

#[cfg(test)]
mod tests {
	use super::*;

	fn lex(ids: &[&str]) -> Vec<LexicalHit> {
		// Scores deliberately on a scale nothing like the vector distances.
		ids.iter()
			.enumerate()
			.map(|(i, id)| LexicalHit { doc_id: id.to_string(), score: 40.0 - i as f32 })
			.collect()
	}

	fn vec_hits(ids: &[&str]) -> Vec<VectorHit> {
		ids.iter()
			.enumerate()
			.map(|(i, id)| VectorHit { doc_id: id.to_string(), distance: 0.01 * (i + 1) as f32 })
			.collect()
	}

	fn ids(hits: &[MergedHit]) -> Vec<&str> {
		hits.iter().map(|h| h.doc_id.as_str()).collect()
	}

	#[test]
	fn cross_backend_agreement_ranks_first() {
		let merged = merge(&lex(&["A", "B", "C"]), &vec_hits(&["B", "D"]), DEFAULT_RRF_K);

		assert_eq!(merged.len(), 4);
		assert_eq!(merged[0].doc_id, "B");
		assert_eq!(
			merged[0].sources,
			BTreeSet::from([Source::Lexical, Source::Vector])
		);
		let expected_b = reciprocal_rank(2, 60.0) + reciprocal_rank(1, 60.0);
		assert!((merged[0].fusion_score - expected_b).abs() < 1e-6);
		assert!(merged[1..].iter().all(|h| h.fusion_score < merged[0].fusion_score));
	}

	#[test]
	fn equal_single_backend_ranks_tie_break_by_id() {
		// A is lexical rank 1, D is vector rank 2, C lexical rank 3
		let merged = merge(&lex(&["A", "B", "C"]), &vec_hits(&["B", "D"]), DEFAULT_RRF_K);
		assert_eq!(ids(&merged), vec!["B", "A", "D", "C"]);

		let merged = merge(&lex(&["Z"]), &vec_hits(&["Y"]), DEFAULT_RRF_K);
		assert_eq!(ids(&merged), vec!["Y", "Z"]);
	}

	#[test]
	fn overlap_of_two_yields_eight_candidates() {
		let merged = merge(
			&lex(&["l1", "l2", "s1", "l3", "s2"]),
			&vec_hits(&["v1", "s2", "v2", "s1", "v3"]),
			DEFAULT_RRF_K,
		);
		assert_eq!(merged.len(), 8);
		let shared: Vec<&str> = merged
			.iter()
			.filter(|h| h.sources.len() == 2)
			.map(|h| h.doc_id.as_str())
			.collect();
		assert_eq!(shared.len(), 2);
	}

	#[test]
	fn repeated_id_within_one_list_counts_once() {
		let merged = merge(&[], &vec_hits(&["x", "x", "y"]), DEFAULT_RRF_K);
		assert_eq!(merged.len(), 2);
		assert!((merged[0].fusion_score - reciprocal_rank(1, 60.0)).abs() < 1e-6);
		assert!((merged[1].fusion_score - reciprocal_rank(2, 60.0)).abs() < 1e-6);
	}

	#[test]
	fn single_backend_keeps_backend_order() {
		let merged = merge(&lex(&["q", "a", "m"]), &[], DEFAULT_RRF_K);
		assert_eq!(ids(&merged), vec!["q", "a", "m"]);
		assert!(merge(&[], &[], DEFAULT_RRF_K).is_empty());
	}
}
