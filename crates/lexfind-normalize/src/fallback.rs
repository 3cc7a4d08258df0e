/// Local keyword extraction used whenever the generative call is unusable:
/// lowercase, split on anything that is not alphanumeric, keep tokens of at
/// least `min_chars` characters, first occurrence only, at most `max_keywords`.
pub fn extract_keywords(raw: &str, min_chars: usize, max_keywords: usize) -> Vec<String> {
    let lowered = raw.to_lowercase();
    let mut out: Vec<String> = Vec::new();
    for token in lowered.split(|c: char| !c.is_alphanumeric()) {
        if out.len() >= max_keywords { break; }
        if token.chars().count() < min_chars { continue; }
        if out.iter().any(|t| t == token) { continue; }
        out.push(token.to_string());
    }
    out
}
