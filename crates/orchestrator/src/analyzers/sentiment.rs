use async_trait::async_trait;
use insights_core::SentimentReport;
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

use super::{AnalyzerResult, SentimentAnalyzer};
use crate::error::AnalyzerError;

static WORD: OnceLock<Option<Regex>> = OnceLock::new();

const POSITIVE: &[&str] = &[
    "amazing", "best", "delicious", "excellent", "fantastic", "fresh", "friendly", "good",
    "great", "love", "loved", "perfect", "tasty", "wonderful",
];

const NEGATIVE: &[&str] = &[
    "awful", "bad", "bland", "cold", "dirty", "disappointing", "expensive", "horrible", "rude",
    "slow", "stale", "terrible", "worst",
];

/// Word-list polarity. Each review counts as positive, negative or neutral by
/// the balance of its matched words.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexiconSentiment;

impl LexiconSentiment {
    pub fn score(&self, reviews: &[String]) -> AnalyzerResult<SentimentReport> {
        let word = WORD
            .get_or_init(|| Regex::new(r"[a-z']+").ok())
            .as_ref()
            .ok_or_else(|| AnalyzerError::Failed("word pattern unavailable".to_string()))?;

        let mut report = SentimentReport::default();
        let mut hits: HashMap<&'static str, usize> = HashMap::new();

        for review in reviews.iter().filter(|r| !r.trim().is_empty()) {
            let text = review.to_lowercase();
            let mut balance = 0i32;
            for m in word.find_iter(&text) {
                if let Some(w) = POSITIVE.iter().find(|w| **w == m.as_str()) {
                    balance += 1;
                    *hits.entry(*w).or_default() += 1;
                } else if let Some(w) = NEGATIVE.iter().find(|w| **w == m.as_str()) {
                    balance -= 1;
                    *hits.entry(*w).or_default() += 1;
                }
            }
            match balance {
                b if b > 0 => report.positive += 1,
                b if b < 0 => report.negative += 1,
                _ => report.neutral += 1,
            }
        }

        let total = report.positive + report.negative + report.neutral;
        if total == 0 {
            return Err(AnalyzerError::InvalidInput("no reviews to analyze".to_string()));
        }
        report.score = (report.positive as f64 - report.negative as f64) / total as f64;

        let mut themes: Vec<(&str, usize)> = hits.into_iter().collect();
        themes.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        report.themes = themes.into_iter().take(3).map(|(w, _)| w.to_string()).collect();

        Ok(report)
    }
}

#[async_trait]
impl SentimentAnalyzer for LexiconSentiment {
    async fn analyze(&self, reviews: &[String]) -> AnalyzerResult<SentimentReport> {
        self.score(reviews)
    }
}
