//! Text normalization for matching.
//!
//! Raw titles and artist names arrive with platform noise: bracketed asides
//! ("[FULL SET]", "(Official)"), featuring abbreviations, inconsistent
//! punctuation. [`normalize`] folds all of that down to a canonical form so
//! the matcher and the catalog compare like with like. Raw strings are never
//! compared directly.
//!
//! The function is idempotent: `normalize(normalize(s)) == normalize(s)`.

/// Normalize a string for matching.
///
/// Steps, in order: lowercase; strip `(...)` and `[...]` asides; fold `&`
/// to `and`; fold remaining punctuation to spaces; canonicalize
/// `feat`/`ft` to `featuring` and `vs` to `versus`; collapse whitespace.
pub fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();
    let stripped = strip_asides(&lowered);

    let mut folded = String::with_capacity(stripped.len());
    for c in stripped.chars() {
        if c == '&' {
            folded.push_str(" and ");
        } else if c.is_alphanumeric() {
            folded.push(c);
        } else {
            folded.push(' ');
        }
    }

    let tokens: Vec<&str> = folded
        .split_whitespace()
        .map(|token| match token {
            "feat" | "ft" => "featuring",
            "vs" => "versus",
            other => other,
        })
        .collect();

    tokens.join(" ")
}

/// Tokens of the normalized form of `text`.
pub fn tokenize(text: &str) -> Vec<String> {
    normalize(text)
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Drop bracketed and parenthetical asides, keeping everything outside them.
///
/// Unbalanced closers are left for the punctuation fold; unbalanced openers
/// swallow the rest of the string, which is the safe direction for titles
/// like "Artist - Set (unfinished".
fn strip_asides(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut paren_depth = 0u32;
    let mut bracket_depth = 0u32;

    for c in text.chars() {
        match c {
            '(' => paren_depth += 1,
            ')' => {
                if paren_depth > 0 {
                    paren_depth -= 1;
                } else {
                    out.push(c);
                }
            }
            '[' => bracket_depth += 1,
            ']' => {
                if bracket_depth > 0 {
                    bracket_depth -= 1;
                } else {
                    out.push(c);
                }
            }
            _ if paren_depth == 0 && bracket_depth == 0 => out.push(c),
            _ => {}
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowercase_and_trim() {
        assert_eq!(normalize("  Lane 8  "), "lane 8");
    }

    #[test]
    fn test_strips_bracketed_asides() {
        assert_eq!(
            normalize("Tale Of Us [FULL SET] (Official Video)"),
            "tale of us"
        );
    }

    #[test]
    fn test_nested_asides() {
        assert_eq!(normalize("Set (live (extended)) B"), "set b");
    }

    #[test]
    fn test_featuring_canonicalization() {
        assert_eq!(normalize("A feat. B"), "a featuring b");
        assert_eq!(normalize("A ft B"), "a featuring b");
        assert_eq!(normalize("A featuring B"), "a featuring b");
    }

    #[test]
    fn test_versus_canonicalization() {
        assert_eq!(normalize("A vs. B"), "a versus b");
        assert_eq!(normalize("A VS B"), "a versus b");
    }

    #[test]
    fn test_ampersand_canonicalization() {
        assert_eq!(normalize("Above & Beyond"), "above and beyond");
    }

    #[test]
    fn test_punctuation_folds_to_spaces() {
        assert_eq!(normalize("Boiler-Room: Berlin!"), "boiler room berlin");
    }

    #[test]
    fn test_whitespace_collapse() {
        assert_eq!(normalize("a\t b \n c"), "a b c");
    }

    #[test]
    fn test_unbalanced_closer_is_dropped_as_punctuation() {
        assert_eq!(normalize("weird ) title"), "weird title");
    }

    #[test]
    fn test_unbalanced_opener_swallows_rest() {
        assert_eq!(normalize("Artist - Set (unfinished"), "artist set");
    }

    #[test]
    fn test_empty_and_noise_only() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("(...)[!!]"), "");
    }

    #[test]
    fn test_idempotence() {
        let samples = [
            "Lane 8 @ Red Rocks (Full Set) [4K]",
            "Armin van Buuren vs. Ferry Corsten",
            "A feat. B & C",
            "",
            "Plain title",
        ];
        for s in samples {
            let once = normalize(s);
            assert_eq!(normalize(&once), once, "not idempotent for {s:?}");
        }
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(tokenize("Lane 8 feat. RBBTS"), vec!["lane", "8", "featuring", "rbbts"]);
        assert!(tokenize("(aside only)").is_empty());
    }
}
