//! Trigram similarity with pg_trgm semantics.
//!
//! Each alphanumeric word is lowercased and padded with two leading blanks
//! and one trailing blank before trigrams are taken. Similarity is the
//! Jaccard index of the two trigram sets.

use std::collections::BTreeSet;

pub fn trigrams(text: &str) -> BTreeSet<[char; 3]> {
	let mut out = BTreeSet::new();
	let lowered = text.to_lowercase();
	for word in lowered.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
		let padded: Vec<char> = "  ".chars().chain(word.chars()).chain(std::iter::once(' ')).collect();
		for w in padded.windows(3) { out.insert([w[0], w[1], w[2]]); }
	}
	out
}

pub fn similarity(a: &str, b: &str) -> f32 {
	let ta = trigrams(a);
	let tb = trigrams(b);
	if ta.is_empty() || tb.is_empty() { return 0.0; }
	let shared = ta.intersection(&tb).count();
	let union = ta.len() + tb.len() - shared;
	shared as f32 / union as f32
}
