//! AI-generated product tags: prompt construction and output validation

use crate::completion::{CompletionClient, CompletionRequest};
use crate::error::{Result, ServiceError};
use crate::json_extract::extract_json;
use crate::store::Product;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Maximum number of keywords kept per product
pub const MAX_KEYWORDS: usize = 15;

/// Maximum number of use-case tags kept per product
pub const MAX_BEST_FOR: usize = 5;

/// Description characters sent to the model
const MAX_DESCRIPTION_CHARS: usize = 500;

const SYSTEM_PROMPT: &str = "You are a product tagging assistant for an online store. \
Respond with ONLY valid JSON and no additional text.";

/// Season a product or trip belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Season {
    Summer,
    Winter,
    AllSeason,
}

impl Season {
    pub const ALL: [Season; 3] = [Season::Summer, Season::Winter, Season::AllSeason];

    pub fn as_str(&self) -> &'static str {
        match self {
            Season::Summer => "SUMMER",
            Season::Winter => "WINTER",
            Season::AllSeason => "ALL_SEASON",
        }
    }

    /// Case-insensitive match against the enumeration
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        Self::ALL.into_iter().find(|s| s.as_str().eq_ignore_ascii_case(raw))
    }
}

/// Use case a product is suited for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BestFor {
    Casual,
    Formal,
    Outdoor,
    Athletic,
    Travel,
}

impl BestFor {
    pub const ALL: [BestFor; 5] = [
        BestFor::Casual,
        BestFor::Formal,
        BestFor::Outdoor,
        BestFor::Athletic,
        BestFor::Travel,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BestFor::Casual => "CASUAL",
            BestFor::Formal => "FORMAL",
            BestFor::Outdoor => "OUTDOOR",
            BestFor::Athletic => "ATHLETIC",
            BestFor::Travel => "TRAVEL",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        Self::ALL.into_iter().find(|b| b.as_str().eq_ignore_ascii_case(raw))
    }
}

/// Validated tags written back onto a product record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductMetadata {
    pub keywords: Vec<String>,
    pub season: Season,
    pub best_for: Vec<BestFor>,
}

impl ProductMetadata {
    /// Validates a raw model reply.
    ///
    /// Keywords are lower-cased, blanks and non-strings dropped, capped at
    /// [`MAX_KEYWORDS`]. An unknown season becomes `ALL_SEASON`. `bestFor`
    /// keeps distinct known values up to [`MAX_BEST_FOR`] and falls back to
    /// `[CASUAL]`.
    pub fn from_model_value(value: &Value) -> Result<Self> {
        let obj = value.as_object().ok_or_else(|| {
            ServiceError::UnexpectedShape("expected a JSON object".to_string())
        })?;

        let keywords = obj
            .get("keywords")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(|k| k.trim().to_lowercase())
                    .filter(|k| !k.is_empty())
                    .take(MAX_KEYWORDS)
                    .collect()
            })
            .unwrap_or_default();

        let season = obj
            .get("season")
            .and_then(Value::as_str)
            .and_then(Season::parse)
            .unwrap_or(Season::AllSeason);

        let mut best_for: Vec<BestFor> = Vec::new();
        if let Some(items) = obj.get("bestFor").and_then(Value::as_array) {
            for tag in items.iter().filter_map(Value::as_str).filter_map(BestFor::parse) {
                if best_for.len() == MAX_BEST_FOR {
                    break;
                }
                if !best_for.contains(&tag) {
                    best_for.push(tag);
                }
            }
        }
        if best_for.is_empty() {
            best_for.push(BestFor::Casual);
        }

        Ok(Self {
            keywords,
            season,
            best_for,
        })
    }
}

/// First `max` characters of `text`, on a char boundary.
fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Builds the tagging prompt for one product.
pub fn build_metadata_prompt(product: &Product) -> String {
    let seasons: Vec<&str> = Season::ALL.iter().map(Season::as_str).collect();
    let uses: Vec<&str> = BestFor::ALL.iter().map(BestFor::as_str).collect();

    format!(
        r#"Generate search metadata for this product.

Name: {name}
Category: {category}
Description: {description}

Return ONLY a JSON object with these fields:
{{
  "keywords": [up to {max_keywords} lowercase search terms a shopper might type, including synonyms, materials, and occasions],
  "season": one of {seasons},
  "bestFor": [1 to {max_best_for} values from {uses}]
}}"#,
        name = product.name,
        category = product.category,
        description = truncate_chars(&product.description, MAX_DESCRIPTION_CHARS),
        max_keywords = MAX_KEYWORDS,
        seasons = seasons.join(" | "),
        max_best_for = MAX_BEST_FOR,
        uses = uses.join(", "),
    )
}

/// Asks the completion API for tags and validates the reply.
pub async fn generate_metadata(
    client: &dyn CompletionClient,
    product: &Product,
) -> Result<ProductMetadata> {
    let reply = client
        .complete(CompletionRequest {
            system: SYSTEM_PROMPT.to_string(),
            user: build_metadata_prompt(product),
            temperature: 0.5,
            max_tokens: 300,
        })
        .await?;

    let value: Value = extract_json(&reply)?;
    ProductMetadata::from_model_value(&value)
}
