//! Stray code-fence removal for generated Markdown.
//!
//! Models often wrap a whole answer in a ```` ```markdown ```` fence. The
//! artifact is already Markdown, so those wrapper lines are dropped. Fences
//! carrying any other language tag are content and stay.

use std::sync::LazyLock;

use regex::Regex;

/// Remove every line whose trimmed content is exactly ```` ```markdown ```` or
/// ```` ``` ````. All other bytes, line endings included, are preserved.
pub fn clean(md: &str) -> String {
    let mut out = String::with_capacity(md.len());
    for line in md.split_inclusive('\n') {
        if !is_wrapper_fence(line) {
            out.push_str(line);
        }
    }
    out
}

fn is_wrapper_fence(line: &str) -> bool {
    static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"^\s*```(?:markdown)?\s*$").expect("valid regex")
    });

    FENCE_RE.is_match(line)
}

/// Approximate word count of a Markdown body.
pub fn count_words(md: &str) -> usize {
    md.split_whitespace()
        .filter(|w| !w.chars().all(|c| c.is_ascii_punctuation()))
        .count()
}
