//! Word normalization
//!
//! A token is a whitespace-separated run of characters. Normalization strips
//! the sentence punctuation `. ? ! : ; ,` wherever it occurs in the token,
//! lowercases the rest and trims it. Apostrophes, hyphens and every other
//! character are kept, so `don't` and `well-known` stay whole words.

/// Characters removed from every token
pub const STRIPPED_PUNCTUATION: [char; 6] = ['.', '?', '!', ':', ';', ','];

/// Normalize one raw token, returning `None` when nothing is left
#[inline]
pub fn normalize(token: &str) -> Option<String> {
    let stripped: String = token
        .chars()
        .filter(|c| !STRIPPED_PUNCTUATION.contains(c))
        .collect();
    let word = stripped.to_lowercase();
    let word = word.trim();
    if word.is_empty() {
        None
    } else {
        Some(word.to_string())
    }
}

/// Lazily split a line into normalized words
pub fn tokenize(line: &str) -> impl Iterator<Item = String> + '_ {
    line.split_whitespace().filter_map(normalize)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(line: &str) -> Vec<String> {
        tokenize(line).collect()
    }

    #[test]
    fn test_case_and_punctuation_fold_to_one_key() {
        assert_eq!(words("File. file FILE,"), vec!["file", "file", "file"]);
        assert_eq!(words("Second, file!"), vec!["second", "file"]);
    }

    #[test]
    fn test_inner_punctuation_is_stripped() {
        assert_eq!(normalize("e.g.").as_deref(), Some("eg"));
        assert_eq!(normalize("a:b;c").as_deref(), Some("abc"));
    }

    #[test]
    fn test_other_symbols_are_kept() {
        assert_eq!(normalize("Don't").as_deref(), Some("don't"));
        assert_eq!(normalize("well-known").as_deref(), Some("well-known"));
        assert_eq!(normalize("(paren)").as_deref(), Some("(paren)"));
        assert_eq!(normalize("\"quoted\"").as_deref(), Some("\"quoted\""));
    }

    #[test]
    fn test_punctuation_only_tokens_are_dropped() {
        assert_eq!(normalize("..."), None);
        assert_eq!(normalize("?!"), None);
        assert!(words(" , ; : ").is_empty());
    }

    #[test]
    fn test_blank_lines_yield_nothing() {
        assert!(words("").is_empty());
        assert!(words("   \t  ").is_empty());
    }

    #[test]
    fn test_unicode_lowercasing() {
        assert_eq!(words("ÉCOLE Straße"), vec!["école", "straße"]);
    }

    #[test]
    fn test_tokenize_is_idempotent() {
        let once = words("The quick, brown FOX! jumps: over... the lazy dog?");
        let twice: Vec<String> = once.iter().flat_map(|w| tokenize(w)).collect();
        assert_eq!(once, twice);
        assert_eq!(
            once,
            vec!["the", "quick", "brown", "fox", "jumps", "over", "the", "lazy", "dog"]
        );
    }
}
