use lexfind_text::TextIndex;

fn corpus() -> TextIndex {
	TextIndex::build([
		("lease-1", "Residential Lease Agreement for apartments and houses"),
		("poa-1", "Power of Attorney granting authority to an agent"),
		("nda-1", "Mutual Non-Disclosure Agreement between companies"),
	]).expect("index")
}

#[test]
fn stemmed_english_match() {
	let idx = corpus();
	let hits = idx.search("leasing apartment", "en", 10).expect("search");
	assert_eq!(hits.first().map(|h| h.0.as_str()), Some("lease-1"));
	assert!(hits[0].1 > 0.0);
}

#[test]
fn terms_are_ored_and_ranked() {
	let idx = corpus();
	let hits = idx.search("agreement attorney", "en", 10).expect("search");
	let ids: Vec<&str> = hits.iter().map(|h| h.0.as_str()).collect();
	assert_eq!(hits.len(), 3, "{ids:?}");
	for pair in hits.windows(2) { assert!(pair[0].1 >= pair[1].1); }
}

#[test]
fn punctuation_and_empty_queries_are_harmless() {
	let idx = corpus();
	assert!(idx.search("   ", "en", 10).unwrap().is_empty());
	assert!(idx.search("\"(lease) AND", "en", 10).unwrap().iter().any(|h| h.0 == "lease-1"));
}

#[test]
fn simple_config_does_not_stem() {
	let idx = corpus();
	assert!(idx.search("leasing", "de", 10).unwrap().is_empty());
	assert_eq!(idx.search("lease", "de", 10).unwrap()[0].0, "lease-1");
}

#[test]
fn limit_caps_results() {
	let idx = corpus();
	assert_eq!(idx.search("agreement", "en", 1).unwrap().len(), 1);
}
