//! Spam classifier: multinomial naive Bayes over words of normalized text.
//!
//! The score is the log-odds of spam vs ham. Positive means spam; ham scores
//! close to zero are the "low confidence" band the pipeline reports.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use tracing::{info, warn};

use crate::database::files::{append_line, read_lines};
use crate::error::StoreResult;
use crate::text::normalize;

static TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+").expect("static regex"));

/// Classifier output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verdict {
    pub is_spam: bool,
    pub score: f64,
}

impl Verdict {
    /// No opinion: the model has not seen both classes yet.
    const UNTRAINED: Verdict = Verdict {
        is_spam: false,
        score: f64::NEG_INFINITY,
    };
}

#[derive(Debug, Clone, Copy)]
enum Class {
    Spam = 0,
    Ham = 1,
}

#[derive(Debug, Default)]
struct Model {
    docs: [u64; 2],
    totals: [u64; 2],
    counts: [HashMap<String, u64>; 2],
    vocabulary: HashSet<String>,
}

impl Model {
    fn learn(&mut self, class: Class, normalized: &str) {
        let idx = class as usize;
        self.docs[idx] += 1;
        for token in tokens(normalized) {
            *self.counts[idx].entry(token.to_string()).or_default() += 1;
            self.totals[idx] += 1;
            if !self.vocabulary.contains(token) {
                self.vocabulary.insert(token.to_string());
            }
        }
    }

    fn score(&self, normalized: &str) -> Verdict {
        let [spam_docs, ham_docs] = self.docs;
        if spam_docs == 0 || ham_docs == 0 {
            return Verdict::UNTRAINED;
        }

        let vocab = self.vocabulary.len() as f64;
        let spam_denominator = self.totals[Class::Spam as usize] as f64 + vocab;
        let ham_denominator = self.totals[Class::Ham as usize] as f64 + vocab;

        let mut score = (spam_docs as f64).ln() - (ham_docs as f64).ln();
        for token in tokens(normalized).filter(|t| self.vocabulary.contains(*t)) {
            let spam = self.count(Class::Spam, token) + 1.0;
            let ham = self.count(Class::Ham, token) + 1.0;
            score += (spam / spam_denominator).ln() - (ham / ham_denominator).ln();
        }

        Verdict {
            is_spam: score > 0.0,
            score,
        }
    }

    fn count(&self, class: Class, token: &str) -> f64 {
        self.counts[class as usize].get(token).copied().unwrap_or(0) as f64
    }
}

fn tokens(normalized: &str) -> impl Iterator<Item = &str> {
    TOKEN
        .find_iter(normalized)
        .map(|m| m.as_str())
        .filter(|t| t.chars().count() >= 2)
}

#[derive(Debug, Clone)]
struct Datasets {
    spam: PathBuf,
    ham: PathBuf,
}

/// Trainable spam classifier, optionally backed by `spam.txt` / `ham.txt`.
pub struct SpamClassifier {
    model: RwLock<Model>,
    datasets: Option<Datasets>,
}

impl SpamClassifier {
    /// In-memory classifier trained on the given raw examples.
    #[cfg(test)]
    pub fn from_examples(spam: &[&str], ham: &[&str]) -> Self {
        let mut model = Model::default();
        for text in spam {
            model.learn(Class::Spam, &normalize(text));
        }
        for text in ham {
            model.learn(Class::Ham, &normalize(text));
        }

        Self {
            model: RwLock::new(model),
            datasets: None,
        }
    }

    /// Train from the dataset files; unreadable files are logged and skipped.
    pub async fn load(spam: impl Into<PathBuf>, ham: impl Into<PathBuf>) -> Self {
        let datasets = Datasets {
            spam: spam.into(),
            ham: ham.into(),
        };

        let mut model = Model::default();
        for (class, path) in [(Class::Spam, &datasets.spam), (Class::Ham, &datasets.ham)] {
            match read_lines(path).await {
                Ok(lines) => {
                    for line in &lines {
                        model.learn(class, &normalize(line));
                    }
                }
                Err(e) => warn!("Skipping {:?} examples: {}", class, e),
            }
        }
        info!(
            "Classifier trained on {} spam / {} ham examples",
            model.docs[Class::Spam as usize],
            model.docs[Class::Ham as usize]
        );

        Self {
            model: RwLock::new(model),
            datasets: Some(datasets),
        }
    }

    /// Score already-normalized text.
    pub fn classify(&self, normalized: &str) -> Verdict {
        self.model.read().score(normalized)
    }

    pub async fn add_spam_example(&self, text: &str) -> StoreResult<()> {
        self.add(Class::Spam, text).await
    }

    pub async fn add_ham_example(&self, text: &str) -> StoreResult<()> {
        self.add(Class::Ham, text).await
    }

    async fn add(&self, class: Class, text: &str) -> StoreResult<()> {
        let normalized = normalize(text);
        if normalized.is_empty() {
            return Ok(());
        }
        self.model.write().learn(class, &normalized);

        if let Some(datasets) = &self.datasets {
            let path = match class {
                Class::Spam => &datasets.spam,
                Class::Ham => &datasets.ham,
            };
            append_line(path, text).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) const SPAM_EXAMPLES: &[&str] = &[
    "earn money fast with crypto signals",
    "crypto investment earn money daily",
    "join crypto channel earn money",
];

#[cfg(test)]
pub(crate) const HAM_EXAMPLES: &[&str] = &[
    "hello everyone how are you",
    "see you at the meetup tomorrow",
    "thanks for the link to the docs",
    "how are you doing today",
    "the meetup is tomorrow evening",
];

#[cfg(test)]
mod tests {
    use super::*;

    fn trained() -> SpamClassifier {
        SpamClassifier::from_examples(SPAM_EXAMPLES, HAM_EXAMPLES)
    }

    #[test]
    fn untrained_model_has_no_opinion() {
        let verdict = SpamClassifier::from_examples(&[], &["hello"]).classify("hello");
        assert!(!verdict.is_spam);
        assert_eq!(verdict.score, f64::NEG_INFINITY);
    }

    #[test]
    fn separates_spam_from_ham() {
        let clf = trained();

        let spam = clf.classify(&normalize("Earn MONEY with crypto"));
        assert!(spam.is_spam, "score {}", spam.score);

        let ham = clf.classify(&normalize("hello how are you doing"));
        assert!(!ham.is_spam);
        assert!(ham.score < -0.7, "score {}", ham.score);
    }

    #[test]
    fn unknown_words_fall_back_to_the_prior() {
        let verdict = trained().classify("good morning friends");
        // 3 spam docs vs 5 ham docs
        assert!((verdict.score - (3f64 / 5f64).ln()).abs() < 1e-9);
        assert!(!verdict.is_spam);
    }

    #[tokio::test]
    async fn examples_are_learned_and_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let spam_path = dir.path().join("spam.txt");
        let ham_path = dir.path().join("ham.txt");

        let clf = SpamClassifier::load(&spam_path, &ham_path).await;
        assert_eq!(clf.classify("anything").score, f64::NEG_INFINITY);

        clf.add_spam_example("Win a free iPhone now").await.unwrap();
        clf.add_ham_example("lunch at noon?").await.unwrap();
        assert!(clf.classify(&normalize("free iphone")).is_spam);

        let reloaded = SpamClassifier::load(&spam_path, &ham_path).await;
        assert!(reloaded.classify(&normalize("free iphone")).is_spam);
        assert!(!reloaded.classify(&normalize("lunch at noon")).is_spam);
    }
}
