//! Profanity gate applied to post and comment text before it is written.

use std::path::Path;

use regex::{Regex, RegexBuilder};

const BUILTIN_LEXICON: &str = include_str!("lexicon.txt");

#[derive(Debug, thiserror::Error)]
pub enum LexiconError {
    #[error("failed to read word list {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to compile lexicon: {0}")]
    Pattern(#[from] regex::Error),
}

/// Case-insensitive, word-boundary aware matcher over a fixed lexicon.
/// Common character substitutions (`@` for `a`, `1` for `i`, `$` for `s`,
/// ...) count as the letter they stand for.
///
/// The gate never rewrites text. Callers reject the write when
/// [`ProfanityGate::check`] returns `true`.
#[derive(Debug, Clone)]
pub struct ProfanityGate {
    pattern: Option<Regex>,
    words: usize,
}

impl ProfanityGate {
    pub fn new<I, S>(words: I) -> Result<Self, LexiconError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut words: Vec<String> = words
            .into_iter()
            .map(|w| w.as_ref().trim().to_lowercase())
            .filter(|w| !w.is_empty())
            .collect();
        // Longest first so "fucker" wins over "fuck" inside the alternation.
        words.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        words.dedup();

        if words.is_empty() {
            return Ok(Self {
                pattern: None,
                words: 0,
            });
        }

        let alternation = words
            .iter()
            .map(|w| word_pattern(w))
            .collect::<Vec<_>>()
            .join("|");
        // `\b` cannot sit next to a symbol, so edges are matched explicitly.
        let pattern = RegexBuilder::new(&format!(r"(?:^|\W)(?:{alternation})(?:\W|$)"))
            .case_insensitive(true)
            .build()?;

        Ok(Self {
            pattern: Some(pattern),
            words: words.len(),
        })
    }

    /// Gate over the lexicon bundled with the crate.
    pub fn builtin() -> Result<Self, LexiconError> {
        Self::new(parse_word_list(BUILTIN_LEXICON))
    }

    /// Built-in lexicon extended with the words in `path`.
    pub fn with_word_list(path: &Path) -> Result<Self, LexiconError> {
        let extra = std::fs::read_to_string(path).map_err(|source| LexiconError::Io {
            path: path.display().to_string(),
            source,
        })?;

        Self::new(parse_word_list(BUILTIN_LEXICON).chain(parse_word_list(&extra)))
    }

    /// True if `text` contains a lexicon word.
    pub fn contains_forbidden_word(&self, text: &str) -> bool {
        self.pattern.as_ref().is_some_and(|re| re.is_match(text))
    }

    /// Precondition check used by the write path; same answer as
    /// [`ProfanityGate::contains_forbidden_word`].
    pub fn check(&self, text: &str) -> bool {
        self.contains_forbidden_word(text)
    }

    pub fn len(&self) -> usize {
        self.words
    }

    pub fn is_empty(&self) -> bool {
        self.words == 0
    }
}

/// Common look-alike spellings of a letter, as a character class.
fn substitutions(c: char) -> Option<&'static str> {
    match c {
        'a' => Some("[a@4]"),
        'e' => Some("[e3*]"),
        'i' => Some("[i1!*]"),
        'o' => Some("[o0*]"),
        's' => Some("[s$5]"),
        'u' => Some("[u*]"),
        _ => None,
    }
}

/// Pattern for one lexicon word that also accepts substituted letters,
/// so `sh1t` and `@sshole` are caught.
fn word_pattern(word: &str) -> String {
    word.chars()
        .map(|c| match substitutions(c) {
            Some(class) => class.to_string(),
            None => regex::escape(c.encode_utf8(&mut [0; 4])),
        })
        .collect()
}

/// One word per line; blank lines and `#` comments are skipped.
fn parse_word_list(source: &str) -> impl Iterator<Item = &str> {
    source
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLEAN_VOCABULARY: &[&str] = &[
        "hello", "world", "rust", "post", "comment", "thanks", "great", "article", "class",
        "passage", "scrap", "cockpit", "assume", "Scunthorpe", "grape", "shiitake",
    ];

    fn gate() -> ProfanityGate {
        ProfanityGate::builtin().unwrap()
    }

    #[test]
    fn builtin_lexicon_loads() {
        let gate = gate();
        assert!(!gate.is_empty());
        assert_eq!(gate.len(), parse_word_list(BUILTIN_LEXICON).count());
    }

    #[test]
    fn every_lexicon_word_matches_in_any_case() {
        let gate = gate();
        for word in parse_word_list(BUILTIN_LEXICON) {
            let variants = [
                word.to_string(),
                word.to_uppercase(),
                format!("{}{}", word[..1].to_uppercase(), &word[1..]),
            ];
            for variant in variants {
                let text = format!("well, {variant}! that was unexpected");
                assert!(gate.check(&text), "expected {text:?} to be flagged");
            }
        }
    }

    #[test]
    fn clean_vocabulary_never_matches() {
        let gate = gate();
        for a in CLEAN_VOCABULARY {
            for b in CLEAN_VOCABULARY {
                let text = format!("{a} {b}, {b}-{a}.");
                assert!(!gate.check(&text), "false positive on {text:?}");
            }
        }
    }

    #[test]
    fn matches_respect_word_boundaries() {
        let gate = gate();
        assert!(!gate.contains_forbidden_word("a classic assessment"));
        assert!(gate.contains_forbidden_word("what an ASS."));
        assert!(gate.contains_forbidden_word("(shit)"));
    }

    #[test]
    fn empty_lexicon_allows_everything() {
        let gate = ProfanityGate::new(Vec::<String>::new()).unwrap();
        assert!(gate.is_empty());
        assert!(!gate.check("anything goes"));
    }

    #[test]
    fn custom_words_are_escaped() {
        let gate = ProfanityGate::new(["c++", "darn"]).unwrap();
        assert!(gate.check("oh DARN it"));
        assert!(!gate.check("c"));
        assert!(!gate.check("cpp and c#"));
    }

    #[test]
    fn words_with_symbol_edges_match() {
        let gate = ProfanityGate::new(["c++", "a$$"]).unwrap();
        assert!(gate.check("I write c++"));
        assert!(gate.check("c++ rocks"));
        assert!(gate.check("(c++)"));
        assert!(gate.check("what an a$$."));
        assert!(!gate.check("abc++"));
    }

    #[test]
    fn substituted_letters_are_caught() {
        let gate = gate();
        for text in ["sh1t", "f*ck", "@sshole", "b1tch", "sh!t", "you 455"] {
            assert!(gate.check(text), "expected {text:?} to be flagged");
        }
        assert!(!gate.check("h3llo w0rld, I have 4 cats"));
        assert!(!gate.check("email me@ss.example"));
    }
}
