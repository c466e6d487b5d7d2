use async_trait::async_trait;
use insights_core::{BusinessContext, Stage};
use regex::Regex;
use std::sync::OnceLock;

use crate::error::StageError;
use crate::stage::{Requirement, StageContext, StageHandler};

static BUDGET: OnceLock<Option<Regex>> = OnceLock::new();
static PERCENT: OnceLock<Option<Regex>> = OnceLock::new();

const GOAL_WORDS: &[&str] = &[
    "increase", "grow", "boost", "improve", "attract", "expand", "launch", "raise", "want",
    "goal",
];

const CONSTRAINT_WORDS: &[&str] = &[
    "no ", "not ", "without", "limited", "only", "must", "can't", "cannot", "avoid", "budget",
];

fn budget_pattern() -> Option<&'static Regex> {
    BUDGET
        .get_or_init(|| {
            Regex::new(r"(?i)(?:budget|spend)\D{0,20}?[$€£]?\s*(\d[\d,]*(?:\.\d+)?)\s*(k\b)?").ok()
        })
        .as_ref()
}

fn percent_pattern() -> Option<&'static Regex> {
    PERCENT
        .get_or_init(|| Regex::new(r"(\d+(?:\.\d+)?)\s*%").ok())
        .as_ref()
}

/// Splits free text into goals and constraints and pulls out a budget figure.
pub fn extract_context(raw: &str) -> BusinessContext {
    let mut context = BusinessContext {
        raw: raw.to_string(),
        ..Default::default()
    };

    for sentence in raw
        .split(['.', ';', '!', '?', '\n'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        let lower = format!("{} ", sentence.to_lowercase());
        if CONSTRAINT_WORDS.iter().any(|w| lower.contains(w)) {
            context.constraints.push(sentence.to_string());
        } else if GOAL_WORDS.iter().any(|w| lower.contains(w)) {
            context.goals.push(sentence.to_string());
        }
    }

    context.budget = budget_pattern()
        .and_then(|re| re.captures(raw))
        .and_then(|caps| {
            let amount: f64 = caps.get(1)?.as_str().replace(',', "").parse().ok()?;
            let scale = if caps.get(2).is_some() { 1000.0 } else { 1.0 };
            Some(amount * scale)
        })
        .filter(|budget| budget.is_finite());

    context
}

#[derive(Debug, Clone, Copy)]
pub struct ContextProcessingStage;

#[async_trait]
impl StageHandler for ContextProcessingStage {
    fn stage(&self) -> Stage {
        Stage::ContextProcessing
    }

    fn requirement(&self) -> Requirement {
        Requirement::BusinessContext
    }

    async fn execute(&self, ctx: &mut StageContext<'_>) -> Result<(), StageError> {
        let raw = ctx.inputs.business_context.as_deref().unwrap_or_default();
        let context = extract_context(raw);

        let mut observations = Vec::new();
        if let Some(budget) = context.budget {
            observations.push(format!("budget of {budget:.0}"));
        }
        if let Some(re) = percent_pattern() {
            observations.extend(
                re.find_iter(raw)
                    .map(|m| format!("target figure {}", m.as_str().replace(' ', ""))),
            );
        }
        let reasoning = format!(
            "Read {} goals and {} constraints from the business context",
            context.goals.len(),
            context.constraints.len()
        );
        let confidence = if context.goals.is_empty() && context.constraints.is_empty() {
            0.3
        } else {
            0.7
        };

        ctx.session.data.business_context = Some(context);
        ctx.think(reasoning, observations, vec![], confidence);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::test_support::Harness;
    use insights_core::StageInputs;

    #[test]
    fn test_extract_goals_constraints_budget() {
        let context = extract_context(
            "We want to increase weekday lunch traffic by 15%. Marketing budget is $2,500 per month. No discounts on signature dishes!",
        );

        assert_eq!(
            context.goals,
            vec!["We want to increase weekday lunch traffic by 15%"]
        );
        assert_eq!(context.constraints.len(), 2);
        assert_eq!(context.budget, Some(2500.0));
    }

    #[test]
    fn test_budget_in_thousands() {
        let context = extract_context("We can spend about 3k on ads");
        assert_eq!(context.budget, Some(3000.0));
    }

    #[test]
    fn test_unbounded_budget_is_dropped() {
        let text = format!("Budget is ${}", "9".repeat(400));
        let context = extract_context(&text);
        assert_eq!(context.budget, None);
        assert_eq!(context.constraints.len(), 1);
    }

    #[tokio::test]
    async fn test_stage_records_percentages() {
        let mut harness = Harness::new();
        harness.inputs =
            StageInputs::default().with_business_context("Grow catering revenue 20 % this year");

        harness.run(&ContextProcessingStage).await.unwrap();

        let context = harness.session.data.business_context.as_ref().unwrap();
        assert_eq!(context.goals.len(), 1);
        assert!(harness.session.thought_traces[0]
            .observations
            .contains(&"target figure 20%".to_string()));
    }
}
