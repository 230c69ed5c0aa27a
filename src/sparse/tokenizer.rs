// Lexical tokenization for the sparse encoder:
// lowercase, word extraction, stop-word removal, then stemming or lemmatization.

use fancy_regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

/// Tokens are runs of two or more word characters.
static TOKEN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\w\w+\b").expect("regex is valid"));

/// English stop words (the Lucene/Elasticsearch `_english_` set).
pub const STOPWORDS_EN: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in", "into", "is", "it",
    "no", "not", "of", "on", "or", "such", "that", "the", "their", "then", "there", "these",
    "they", "this", "to", "was", "will", "with",
];

/// Irregular noun plurals that suffix rules cannot recover.
const NOUN_EXCEPTIONS: &[(&str, &str)] = &[
    ("analyses", "analysis"),
    ("children", "child"),
    ("criteria", "criterion"),
    ("data", "datum"),
    ("feet", "foot"),
    ("geese", "goose"),
    ("halves", "half"),
    ("indices", "index"),
    ("knives", "knife"),
    ("leaves", "leaf"),
    ("lives", "life"),
    ("matrices", "matrix"),
    ("men", "man"),
    ("mice", "mouse"),
    ("oxen", "ox"),
    ("phenomena", "phenomenon"),
    ("selves", "self"),
    ("teeth", "tooth"),
    ("vertices", "vertex"),
    ("wives", "wife"),
    ("wolves", "wolf"),
    ("women", "woman"),
];

/// Nouns whose singular form already ends in `s`.
const INVARIANT_NOUNS: &[&str] = &[
    "chaos",
    "cosmos",
    "diabetes",
    "ethos",
    "headquarters",
    "herpes",
    "kudos",
    "lens",
    "mathematics",
    "measles",
    "mumps",
    "news",
    "pathos",
    "rabies",
    "series",
    "species",
];

/// Suffix substitutions tried longest first.
const NOUN_SUFFIX_RULES: &[(&str, &str)] = &[
    ("shes", "sh"),
    ("ches", "ch"),
    ("sses", "ss"),
    ("ies", "y"),
    ("xes", "x"),
    ("s", ""),
];

/// Endings that look plural but are singular (`glass`, `status`, `axis`).
const SINGULAR_ENDINGS: &[&str] = &["ss", "us", "is"];

const MIN_LEMMA_LEN: usize = 3;

/// How tokens are reduced to their index form.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Normalization {
    /// Snowball English stemming
    Stem,
    /// Dictionary-free noun lemmatization
    #[default]
    Lemmatize,
}

impl fmt::Display for Normalization {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stem => write!(f, "stem"),
            Self::Lemmatize => write!(f, "lemmatize"),
        }
    }
}

pub struct Tokenizer {
    normalization: Normalization,
    stemmer: Option<Stemmer>,
}

impl fmt::Debug for Tokenizer {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tokenizer")
            .field("normalization", &self.normalization)
            .finish_non_exhaustive()
    }
}

impl Tokenizer {
    #[inline]
    pub fn new(normalization: Normalization) -> Self {
        let stemmer = match normalization {
            Normalization::Stem => Some(Stemmer::create(Algorithm::English)),
            Normalization::Lemmatize => None,
        };
        Self {
            normalization,
            stemmer,
        }
    }

    #[inline]
    pub fn normalization(&self) -> Normalization {
        self.normalization
    }

    /// Split `text` into normalized index terms, in document order.
    #[inline]
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let lowered = text.to_lowercase();
        TOKEN_PATTERN
            .find_iter(&lowered)
            .filter_map(Result::ok)
            .map(|m| m.as_str())
            .filter(|token| !is_stopword(token))
            .map(|token| self.normalize(token))
            .collect()
    }

    fn normalize(&self, token: &str) -> String {
        match &self.stemmer {
            Some(stemmer) => stemmer.stem(token).into_owned(),
            None => lemmatize(token),
        }
    }
}

#[inline]
pub fn is_stopword(token: &str) -> bool {
    STOPWORDS_EN.contains(&token)
}

/// Reduce a lowercase noun to its singular form.
///
/// Approximates WordNet's noun morphology without the dictionary: an
/// exceptions table, then the longest matching suffix rule whose result
/// keeps at least three characters.
#[inline]
pub fn lemmatize(word: &str) -> String {
    if let Some((_, lemma)) = NOUN_EXCEPTIONS.iter().find(|(plural, _)| *plural == word) {
        return (*lemma).to_string();
    }
    if INVARIANT_NOUNS.contains(&word)
        || SINGULAR_ENDINGS.iter().any(|ending| word.ends_with(ending))
    {
        return word.to_string();
    }

    for (suffix, replacement) in NOUN_SUFFIX_RULES {
        if let Some(stem) = word.strip_suffix(suffix) {
            let candidate = format!("{stem}{replacement}");
            if candidate.chars().count() >= MIN_LEMMA_LEN {
                return candidate;
            }
        }
    }
    word.to_string()
}
