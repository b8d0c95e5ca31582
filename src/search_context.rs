//! Trip/occasion context extraction from free-text search queries

use crate::completion::{CompletionClient, CompletionRequest};
use crate::error::{Result, ServiceError};
use crate::json_extract::extract_json;
use crate::metadata::Season;
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

const SYSTEM_PROMPT: &str = "You extract shopping context from e-commerce search queries. \
Respond with ONLY a JSON object and no additional text.";

/// Relative time window mentioned in a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TimePeriod {
    CurrentMonth,
    NextMonth,
    NextTwoMonths,
    NextThreeMonths,
    SpecificMonths,
}

impl TimePeriod {
    pub const ALL: [TimePeriod; 5] = [
        TimePeriod::CurrentMonth,
        TimePeriod::NextMonth,
        TimePeriod::NextTwoMonths,
        TimePeriod::NextThreeMonths,
        TimePeriod::SpecificMonths,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TimePeriod::CurrentMonth => "currentMonth",
            TimePeriod::NextMonth => "nextMonth",
            TimePeriod::NextTwoMonths => "nextTwoMonths",
            TimePeriod::NextThreeMonths => "nextThreeMonths",
            TimePeriod::SpecificMonths => "specificMonths",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        Self::ALL.into_iter().find(|p| p.as_str().eq_ignore_ascii_case(raw))
    }
}

/// Structured context inferred from a search query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchContext {
    pub destination: Option<String>,
    pub occasion: Option<String>,
    pub time_period: Option<TimePeriod>,
    pub season: Option<Season>,
    pub specific_months: Option<Vec<u8>>,
    pub original_query: String,
    pub context_explanation: String,
}

impl SearchContext {
    /// Passthrough context used whenever extraction is unavailable or fails
    pub fn degraded(query: &str) -> Self {
        Self {
            destination: None,
            occasion: None,
            time_period: None,
            season: None,
            specific_months: None,
            original_query: query.to_string(),
            context_explanation: fallback_explanation(query),
        }
    }

    /// Coerces a model reply into a context, dropping values outside their enumerations.
    fn from_model_value(value: &Value, query: &str) -> Result<Self> {
        let obj = value.as_object().ok_or_else(|| {
            ServiceError::UnexpectedShape("expected a JSON object".to_string())
        })?;

        let text = |key: &str| {
            obj.get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("null"))
                .map(str::to_string)
        };

        let specific_months = obj
            .get("specificMonths")
            .and_then(Value::as_array)
            .map(|months| {
                let mut out: Vec<u8> = Vec::new();
                for month in months.iter().filter_map(Value::as_u64) {
                    if (1..=12).contains(&month) && !out.contains(&(month as u8)) {
                        out.push(month as u8);
                    }
                }
                out
            })
            .filter(|months| !months.is_empty());

        Ok(Self {
            destination: text("destination"),
            occasion: text("occasion"),
            time_period: text("timePeriod").and_then(|s| TimePeriod::parse(&s)),
            season: text("season").and_then(|s| Season::parse(&s)),
            specific_months,
            original_query: query.to_string(),
            context_explanation: text("contextExplanation")
                .unwrap_or_else(|| fallback_explanation(query)),
        })
    }
}

fn fallback_explanation(query: &str) -> String {
    format!("Showing results for \"{}\"", query)
}

/// Builds the user prompt, grounding relative dates in `now`.
pub fn build_context_prompt(query: &str, now: DateTime<Utc>) -> String {
    let periods: Vec<&str> = TimePeriod::ALL.iter().map(TimePeriod::as_str).collect();
    let seasons: Vec<&str> = Season::ALL.iter().map(Season::as_str).collect();

    format!(
        r#"Analyze this search query and extract trip or occasion context.

Today is {month_name} {year} (month {month} of the year). Resolve relative expressions like "next month" or "this summer" against this date.

Query: "{query}"

Return ONLY a JSON object with exactly these fields:
{{
  "destination": "place the shopper is going, or null",
  "occasion": "event or activity (e.g. wedding, hiking trip), or null",
  "timePeriod": one of [{periods}] or null,
  "season": one of [{seasons}] or null (infer from destination and dates),
  "specificMonths": [month numbers 1-12] or null,
  "contextExplanation": "one short sentence explaining what the shopper needs"
}}"#,
        month_name = now.format("%B"),
        year = now.year(),
        month = now.month(),
        query = query,
        periods = quoted_list(&periods),
        seasons = quoted_list(&seasons),
    )
}

fn quoted_list(values: &[&str]) -> String {
    values
        .iter()
        .map(|v| format!("\"{}\"", v))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Turns queries into [`SearchContext`] values, never failing outright.
pub struct ContextExtractor {
    client: Option<Arc<dyn CompletionClient>>,
}

impl ContextExtractor {
    pub fn new(client: Option<Arc<dyn CompletionClient>>) -> Self {
        Self { client }
    }

    /// Extracts context for `query`; any failure yields [`SearchContext::degraded`].
    pub async fn extract(&self, query: &str, now: DateTime<Utc>) -> SearchContext {
        match self.try_extract(query, now).await {
            Ok(context) => {
                info!(
                    destination = ?context.destination,
                    occasion = ?context.occasion,
                    "Search context extracted"
                );
                context
            }
            Err(e) => {
                warn!(error = %e, "Context extraction failed, returning passthrough context");
                SearchContext::degraded(query)
            }
        }
    }

    async fn try_extract(&self, query: &str, now: DateTime<Utc>) -> Result<SearchContext> {
        let client = self.client.as_ref().ok_or(ServiceError::MissingApiKey)?;

        let reply = client
            .complete(CompletionRequest {
                system: SYSTEM_PROMPT.to_string(),
                user: build_context_prompt(query, now),
                temperature: 0.3,
                max_tokens: 500,
            })
            .await?;

        let value: Value = extract_json(&reply)?;
        SearchContext::from_model_value(&value, query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedClient;
    use chrono::TimeZone;

    fn october() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap()
    }

    #[test]
    fn prompt_grounds_current_date() {
        let prompt = build_context_prompt("wedding in Paris next month", october());
        assert!(prompt.contains("October 2026"));
        assert!(prompt.contains("month 10"));
        assert!(prompt.contains("\"nextTwoMonths\""));
        assert!(prompt.contains("wedding in Paris next month"));
    }

    #[tokio::test]
    async fn wedding_in_paris() {
        let reply = r#"```json
{"destination": "Paris", "occasion": "wedding", "timePeriod": "nextMonth",
 "season": "ALL_SEASON", "specificMonths": [11],
 "contextExplanation": "Outfits for a wedding in Paris next month"}
```"#;
        let client = Arc::new(ScriptedClient::replying(reply));
        let extractor = ContextExtractor::new(Some(client.clone() as Arc<dyn CompletionClient>));

        let ctx = extractor.extract("wedding in Paris next month", october()).await;

        assert_eq!(ctx.destination.as_deref(), Some("Paris"));
        assert_eq!(ctx.occasion.as_deref(), Some("wedding"));
        assert_eq!(ctx.time_period, Some(TimePeriod::NextMonth));
        assert_eq!(ctx.season, Some(Season::AllSeason));
        assert_eq!(ctx.specific_months, Some(vec![11]));
        assert_eq!(ctx.original_query, "wedding in Paris next month");
        assert!(ctx.context_explanation.contains("Paris"));
        assert_eq!(client.prompts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn out_of_range_values_are_dropped() {
        let reply = r#"{"destination": "  ", "occasion": null, "timePeriod": "someday",
            "season": "monsoon", "specificMonths": [0, 7, 7, 13, "8"]}"#;
        let extractor = ContextExtractor::new(Some(Arc::new(ScriptedClient::replying(reply))));

        let ctx = extractor.extract("beach trip", october()).await;

        assert_eq!(ctx.destination, None);
        assert_eq!(ctx.occasion, None);
        assert_eq!(ctx.time_period, None);
        assert_eq!(ctx.season, None);
        assert_eq!(ctx.specific_months, Some(vec![7]));
        assert_eq!(ctx.context_explanation, "Showing results for \"beach trip\"");
    }

    #[tokio::test]
    async fn missing_client_degrades() {
        let extractor = ContextExtractor::new(None);
        let ctx = extractor.extract("ski jacket", october()).await;
        assert_eq!(ctx, SearchContext::degraded("ski jacket"));
    }

    #[tokio::test]
    async fn api_error_degrades() {
        let client = ScriptedClient::new(|_| {
            Err(ServiceError::CompletionStatus {
                status: 429,
                body: "rate limited".to_string(),
            })
        });
        let extractor = ContextExtractor::new(Some(Arc::new(client)));
        let ctx = extractor.extract("ski jacket", october()).await;
        assert_eq!(ctx.original_query, "ski jacket");
        assert_eq!(ctx.destination, None);
    }

    #[tokio::test]
    async fn non_object_reply_degrades() {
        let extractor =
            ContextExtractor::new(Some(Arc::new(ScriptedClient::replying("[1, 2, 3]"))));
        let ctx = extractor.extract("sandals", october()).await;
        assert_eq!(ctx, SearchContext::degraded("sandals"));
    }

    #[test]
    fn serializes_camel_case_with_nulls() {
        let json = serde_json::to_value(SearchContext::degraded("hat")).unwrap();
        assert_eq!(json["originalQuery"], "hat");
        assert!(json["timePeriod"].is_null());
        assert!(json["specificMonths"].is_null());
        assert!(json.get("contextExplanation").is_some());
    }
}
