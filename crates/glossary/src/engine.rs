use std::collections::HashMap;

use {regex::Regex, tracing::debug};

use babelink_common::types::GlossaryTerm;

/// One protected occurrence: the placeholder inserted into the text and the
/// final destination string to restore in its place.
pub type ProtectedTag = (String, String);

struct Direction {
    pattern: Option<Regex>,
    /// Lowercased matched term → destination term.
    map: HashMap<String, String>,
}

/// Compiled bidirectional glossary for one language pair.
pub struct Glossary {
    lang_a: String,
    lang_b: String,
    /// Matches `term_src` occurrences when translating a → b.
    forward: Direction,
    /// Matches `term_dst` occurrences when translating b → a.
    reverse: Direction,
}

impl Glossary {
    /// Compile the enabled terms for the `lang_a` → `lang_b` pair.
    ///
    /// Active terms are ordered by priority (higher first), then by source
    /// length (longer first) so a short term never matches inside a longer
    /// one. Alphanumeric terms get exact word boundaries; anything else is
    /// matched as a plain substring.
    #[must_use]
    pub fn compile(terms: &[GlossaryTerm], lang_a: &str, lang_b: &str) -> Self {
        let mut active: Vec<&GlossaryTerm> = terms.iter().filter(|t| t.enabled).collect();
        active.sort_by_key(|t| (-t.priority, -(t.term_src.chars().count() as i64)));

        let forward = build_direction(active.iter().map(|t| (&t.term_src, &t.term_dst)));
        let reverse = build_direction(active.iter().map(|t| (&t.term_dst, &t.term_src)));
        debug!(terms = active.len(), lang_a, lang_b, "glossary compiled");

        Self {
            lang_a: lang_a.to_string(),
            lang_b: lang_b.to_string(),
            forward,
            reverse,
        }
    }

    /// An empty glossary that protects nothing.
    #[must_use]
    pub fn empty(lang_a: &str, lang_b: &str) -> Self {
        Self::compile(&[], lang_a, lang_b)
    }

    fn direction_for(&self, src_lang: &str, tgt_lang: &str) -> Option<&Direction> {
        if src_lang == self.lang_a && tgt_lang == self.lang_b {
            Some(&self.forward)
        } else if src_lang == self.lang_b && tgt_lang == self.lang_a {
            Some(&self.reverse)
        } else {
            None
        }
    }

    /// Replace every glossary term found in `text` with a placeholder.
    ///
    /// Returns the marked text plus the tags needed by [`Glossary::restore`].
    /// The destination string in each tag mirrors the casing pattern of the
    /// matched source text. No-op for unsupported language directions.
    #[must_use]
    pub fn protect(&self, text: &str, src_lang: &str, tgt_lang: &str) -> (String, Vec<ProtectedTag>) {
        if text.is_empty() {
            return (text.to_string(), Vec::new());
        }
        let Some(dir) = self.direction_for(src_lang, tgt_lang) else {
            return (text.to_string(), Vec::new());
        };
        let Some(pattern) = &dir.pattern else {
            return (text.to_string(), Vec::new());
        };

        let mut tags: Vec<ProtectedTag> = Vec::new();
        let marked = pattern.replace_all(text, |caps: &regex::Captures<'_>| {
            let found = &caps[0];
            match dir.map.get(&found.to_lowercase()) {
                Some(dst) => {
                    let placeholder = format!("__BLG{}__", tags.len());
                    tags.push((placeholder.clone(), mirror_case(dst, found)));
                    placeholder
                },
                // Shouldn't happen (pattern is built from the map), but keep
                // the original text rather than corrupting it.
                None => found.to_string(),
            }
        });
        (marked.into_owned(), tags)
    }

    /// Swap placeholders back for their final strings. Safe no-op on empty
    /// input or an empty tag list.
    #[must_use]
    pub fn restore(&self, text: &str, tags: &[ProtectedTag]) -> String {
        if text.is_empty() || tags.is_empty() {
            return text.to_string();
        }
        let mut out = text.to_string();
        for (placeholder, final_str) in tags {
            out = out.replace(placeholder, final_str);
        }
        out
    }
}

fn build_direction<'a>(pairs: impl Iterator<Item = (&'a String, &'a String)>) -> Direction {
    let mut map = HashMap::new();
    let mut terms: Vec<String> = Vec::new();
    for (src, dst) in pairs {
        map.insert(src.to_lowercase(), dst.clone());
        terms.push(src.clone());
    }
    // Longest first so alternation prefers the longer term at the same
    // position (the regex crate picks the earliest branch that matches).
    terms.sort_by_key(|t| std::cmp::Reverse(t.chars().count()));
    let pattern = compile_pattern(&terms);
    Direction { pattern, map }
}

fn compile_pattern(terms: &[String]) -> Option<Regex> {
    if terms.is_empty() {
        return None;
    }
    let tokens: Vec<String> = terms
        .iter()
        .map(|t| {
            let esc = regex::escape(t);
            if t.chars().any(char::is_alphanumeric) {
                format!(r"\b{esc}\b")
            } else {
                esc
            }
        })
        .collect();
    Regex::new(&format!("(?i){}", tokens.join("|"))).ok()
}

/// Reshape `dst` to mirror how `found` was cased in the source text:
/// all-upper → upper, all-lower → lower, Capitalized → Capitalized,
/// anything else unchanged.
fn mirror_case(dst: &str, found: &str) -> String {
    let letters: Vec<char> = found.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.is_empty() {
        return dst.to_string();
    }
    if letters.iter().all(|c| c.is_uppercase()) {
        return dst.to_uppercase();
    }
    if letters.iter().all(|c| c.is_lowercase()) {
        return dst.to_lowercase();
    }
    let mut chars = found.chars();
    let first_upper = chars.next().is_some_and(char::is_uppercase);
    let rest_lower = chars.all(|c| !c.is_alphabetic() || c.is_lowercase());
    if first_upper && rest_lower {
        let mut out = String::with_capacity(dst.len());
        let mut dst_chars = dst.chars();
        if let Some(first) = dst_chars.next() {
            out.extend(first.to_uppercase());
            out.extend(dst_chars.flat_map(char::to_lowercase));
        }
        return out;
    }
    dst.to_string()
}
