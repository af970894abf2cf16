//! Enrichment collaborators.
//!
//! An [`Enricher`] turns a transcript into an [`Extraction`]. The local
//! enricher is a deterministic keyword heuristic; remote enrichers call a
//! hosted model over blocking HTTP and expect a JSON object back. Any
//! failure surfaces as `SyncError::EnrichmentFailure` and the caller leaves
//! the transcript unprocessed.

use crate::error::SyncError;
use crate::granola::config::EnrichConfig;
use crate::granola::router::keyword_matches;
use crate::granola::util::{normalize_whitespace, truncate_with_ellipsis};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use reqwest::blocking::Client;
use serde::Serialize;
use serde_json::Value;
use std::env;
use std::time::Duration;

const ACTION_CUES: [&str; 14] = [
    "action item",
    "todo",
    "to-do",
    "follow up",
    "follow-up",
    "next step",
    "i will",
    "i'll",
    "we will",
    "we'll",
    "need to",
    "needs to",
    "let's",
    "assigned to",
];
const DECISION_CUES: [&str; 6] = [
    "decided",
    "decision",
    "agreed",
    "approved",
    "signed off",
    "go with",
];
const METRIC_CUES: [&str; 8] = [
    "percent",
    "revenue",
    "metric",
    "kpi",
    "conversion",
    "users",
    "growth",
    "churn",
];
const MAX_ITEM_CHARS: usize = 200;
const MAX_LOCAL_DECISIONS: usize = 5;
const MAX_LOCAL_METRICS: usize = 5;
const LOCAL_SUMMARY_SENTENCES: usize = 3;
const MIN_SENTENCE_CHARS: usize = 8;
const MAX_REPLY_TOKENS: u32 = 2000;

#[derive(Debug, Clone)]
pub struct EnrichInput {
    pub title: String,
    pub date: NaiveDate,
    pub attendees: Vec<String>,
    pub transcript: String,
}

impl EnrichInput {
    pub fn new(
        title: &str,
        date: NaiveDate,
        attendees: &[String],
        transcript: &str,
        max_chars: usize,
    ) -> Self {
        let transcript = if transcript.chars().count() > max_chars {
            transcript.chars().take(max_chars).collect()
        } else {
            transcript.to_string()
        };
        Self {
            title: title.to_string(),
            date,
            attendees: attendees.to_vec(),
            transcript,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Extraction {
    pub action_items: Vec<String>,
    pub decisions: Vec<String>,
    pub metrics: Vec<String>,
    pub summary: Vec<String>,
}

impl Extraction {
    /// Free text handed to the project router.
    pub fn routing_text(&self) -> String {
        self.summary
            .iter()
            .chain(&self.action_items)
            .chain(&self.decisions)
            .chain(&self.metrics)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Bullet lines for a routed project block.
    pub fn routed_lines(&self) -> Vec<String> {
        let mut lines: Vec<String> = self.summary.iter().map(|s| format!("- {s}")).collect();
        lines.extend(self.decisions.iter().map(|d| format!("- Decision: {d}")));
        lines.extend(self.metrics.iter().map(|m| format!("- Metric: {m}")));
        lines
    }
}

pub trait Enricher {
    fn label(&self) -> String;
    fn enrich(&self, input: &EnrichInput) -> Result<Extraction>;
}

pub struct LocalEnricher;

pub struct AnthropicEnricher {
    pub api_key: String,
    pub model: String,
    pub timeout: Duration,
}

pub struct OpenAiEnricher {
    pub api_key: String,
    pub model: String,
    pub timeout: Duration,
}

pub struct GeminiEnricher {
    pub api_key: String,
    pub model: String,
    pub timeout: Duration,
}

pub struct OpenAiCompatEnricher {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RemoteProvider {
    Anthropic,
    OpenAi,
    Gemini,
    OpenAiCompatible,
}

impl RemoteProvider {
    fn label(self) -> &'static str {
        match self {
            RemoteProvider::Anthropic => "anthropic",
            RemoteProvider::OpenAi => "openai",
            RemoteProvider::Gemini => "gemini",
            RemoteProvider::OpenAiCompatible => "openai-compatible",
        }
    }

    fn key_var(self) -> &'static str {
        match self {
            RemoteProvider::Anthropic => "ANTHROPIC_API_KEY",
            RemoteProvider::OpenAi => "OPENAI_API_KEY",
            RemoteProvider::Gemini => "GEMINI_API_KEY",
            RemoteProvider::OpenAiCompatible => "AI_API_KEY",
        }
    }
}

fn env_non_empty(var: &str) -> Option<String> {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => None,
    }
}

fn parse_provider(raw: &str) -> Option<RemoteProvider> {
    match raw {
        "anthropic" => Some(RemoteProvider::Anthropic),
        "openai" => Some(RemoteProvider::OpenAi),
        "gemini" => Some(RemoteProvider::Gemini),
        "openai-compatible" => Some(RemoteProvider::OpenAiCompatible),
        _ => None,
    }
}

fn first_available_provider() -> Option<RemoteProvider> {
    if env_non_empty("AI_BASE_URL").is_some() && env_non_empty("AI_API_KEY").is_some() {
        return Some(RemoteProvider::OpenAiCompatible);
    }
    [
        RemoteProvider::Anthropic,
        RemoteProvider::OpenAi,
        RemoteProvider::Gemini,
    ]
    .into_iter()
    .find(|provider| env_non_empty(provider.key_var()).is_some())
}

fn default_model_for_provider(provider: RemoteProvider) -> &'static str {
    match provider {
        RemoteProvider::Anthropic => "claude-sonnet-4-20250514",
        RemoteProvider::OpenAi => "gpt-4.1-mini",
        RemoteProvider::Gemini => "gemini-2.5-flash",
        RemoteProvider::OpenAiCompatible => "deepseek-chat",
    }
}

fn build_remote(provider: RemoteProvider, cfg: &EnrichConfig) -> Result<Box<dyn Enricher>> {
    let api_key = env_non_empty(provider.key_var()).ok_or_else(|| {
        SyncError::InvalidConfig(format!(
            "enrich provider `{}` requires {}",
            provider.label(),
            provider.key_var()
        ))
    })?;
    let model = cfg
        .model
        .clone()
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| default_model_for_provider(provider).to_string());
    let timeout = Duration::from_secs(cfg.timeout_secs);

    let enricher: Box<dyn Enricher> = match provider {
        RemoteProvider::Anthropic => Box::new(AnthropicEnricher {
            api_key,
            model,
            timeout,
        }),
        RemoteProvider::OpenAi => Box::new(OpenAiEnricher {
            api_key,
            model,
            timeout,
        }),
        RemoteProvider::Gemini => Box::new(GeminiEnricher {
            api_key,
            model,
            timeout,
        }),
        RemoteProvider::OpenAiCompatible => {
            let base_url = env_non_empty("AI_BASE_URL").ok_or_else(|| {
                SyncError::InvalidConfig(
                    "enrich provider `openai-compatible` requires AI_BASE_URL".to_string(),
                )
            })?;
            Box::new(OpenAiCompatEnricher {
                api_key,
                model,
                base_url,
                timeout,
            })
        }
    };
    Ok(enricher)
}

/// Pick the enricher named by config; `auto` uses the first provider with
/// credentials in the environment and falls back to the local heuristic.
pub fn resolve_enricher(cfg: &EnrichConfig) -> Result<Box<dyn Enricher>> {
    match cfg.provider.as_str() {
        "local" => Ok(Box::new(LocalEnricher)),
        "auto" => match first_available_provider() {
            Some(provider) => build_remote(provider, cfg),
            None => Ok(Box::new(LocalEnricher)),
        },
        other => match parse_provider(other) {
            Some(provider) => build_remote(provider, cfg),
            None => Err(SyncError::InvalidConfig(format!("unknown enrich provider `{other}`")).into()),
        },
    }
}

fn sentences(text: &str) -> Vec<String> {
    text.split(['.', '!', '?', '\n'])
        .map(normalize_whitespace)
        .filter(|s| s.chars().count() >= MIN_SENTENCE_CHARS)
        .collect()
}

fn has_cue(sentence_lower: &str, cues: &[&str]) -> bool {
    cues.iter().any(|cue| keyword_matches(sentence_lower, cue))
}

fn push_distinct(out: &mut Vec<String>, item: &str, limit: usize) {
    if out.len() >= limit || out.iter().any(|seen| seen == item) {
        return;
    }
    out.push(truncate_with_ellipsis(item, MAX_ITEM_CHARS));
}

fn has_number(sentence: &str) -> bool {
    sentence.chars().any(|c| c.is_ascii_digit())
}

impl Enricher for LocalEnricher {
    fn label(&self) -> String {
        "local".to_string()
    }

    fn enrich(&self, input: &EnrichInput) -> Result<Extraction> {
        let mut extraction = Extraction::default();
        for sentence in sentences(&input.transcript) {
            let lower = sentence.to_lowercase();
            if has_cue(&lower, &ACTION_CUES) {
                push_distinct(&mut extraction.action_items, &sentence, usize::MAX);
            }
            if has_cue(&lower, &DECISION_CUES) {
                push_distinct(&mut extraction.decisions, &sentence, MAX_LOCAL_DECISIONS);
            }
            if has_number(&sentence)
                && (sentence.contains('%') || sentence.contains('$') || has_cue(&lower, &METRIC_CUES))
            {
                push_distinct(&mut extraction.metrics, &sentence, MAX_LOCAL_METRICS);
            }
            push_distinct(&mut extraction.summary, &sentence, LOCAL_SUMMARY_SENTENCES);
        }
        Ok(extraction)
    }
}

fn build_prompt(input: &EnrichInput) -> String {
    let attendees = if input.attendees.is_empty() {
        "unknown".to_string()
    } else {
        input.attendees.join(", ")
    };
    format!(
        "Analyze this meeting transcript and extract structured information.\n\n\
         Meeting title: {}\nDate: {}\nAttendees: {}\n\n\
         ## Transcript\n{}\n\n---\n\n\
         Return ONLY a JSON object with these keys:\n\
         - \"action_items\": concrete tasks, formatted \"Person: Task\" when the owner is clear (max 10)\n\
         - \"decisions\": decisions that were made\n\
         - \"metrics\": any numbers, KPIs or metric mentions with their context\n\
         - \"summary\": 3-5 short bullet strings summarising the meeting\n\
         No markdown, no explanation.",
        input.title,
        input.date.format("%Y-%m-%d"),
        attendees,
        input.transcript
    )
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let inner = if let Some((_, rest)) = trimmed.split_once("```json") {
        rest
    } else if let Some((_, rest)) = trimmed.split_once("```") {
        rest
    } else {
        return trimmed;
    };
    inner.split("```").next().unwrap_or(inner).trim()
}

fn clean_item(raw: &str) -> Option<String> {
    let cleaned = normalize_whitespace(
        raw.trim()
            .trim_start_matches(['-', '*', '•'])
            .trim_start()
            .trim_start_matches("[ ]")
            .trim(),
    );
    (!cleaned.is_empty()).then(|| truncate_with_ellipsis(&cleaned, MAX_ITEM_CHARS))
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(text)) => text.lines().filter_map(clean_item).collect(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.as_str()),
                Value::Object(obj) => ["text", "task", "item", "summary"]
                    .iter()
                    .find_map(|key| obj.get(*key).and_then(Value::as_str)),
                _ => None,
            })
            .filter_map(clean_item)
            .collect(),
        _ => Vec::new(),
    }
}

/// Decode a model reply into an [`Extraction`]. Code fences are tolerated;
/// anything that is not a JSON object is rejected.
pub fn parse_extraction(reply: &str) -> Result<Extraction, SyncError> {
    let body = strip_code_fence(reply);
    let value: Value = serde_json::from_str(body)
        .map_err(|err| SyncError::EnrichmentFailure(format!("reply is not JSON: {err}")))?;
    let Value::Object(obj) = value else {
        return Err(SyncError::EnrichmentFailure(
            "reply is not a JSON object".to_string(),
        ));
    };
    Ok(Extraction {
        action_items: string_list(obj.get("action_items")),
        decisions: string_list(obj.get("decisions")),
        metrics: string_list(obj.get("metrics").or_else(|| obj.get("metric_mentions"))),
        summary: string_list(obj.get("summary")),
    })
}

fn extract_openai_text(json: &Value) -> Option<String> {
    if let Some(text) = json.get("output_text").and_then(Value::as_str) {
        return Some(text.to_string());
    }
    let mut chunks = Vec::new();
    for item in json.get("output").and_then(Value::as_array)? {
        let Some(content) = item.get("content").and_then(Value::as_array) else {
            continue;
        };
        chunks.extend(
            content
                .iter()
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .map(str::to_string),
        );
    }
    (!chunks.is_empty()).then(|| chunks.join("\n"))
}

fn extract_anthropic_text(json: &Value) -> Option<String> {
    let chunks: Vec<&str> = json
        .get("content")
        .and_then(Value::as_array)?
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();
    (!chunks.is_empty()).then(|| chunks.join("\n"))
}

fn extract_openai_compatible_text(json: &Value) -> Option<String> {
    let content = json
        .get("choices")
        .and_then(Value::as_array)?
        .first()?
        .get("message")?
        .get("content")?;
    match content {
        Value::String(s) => Some(s.to_string()),
        Value::Array(parts) => {
            let chunks: Vec<&str> = parts
                .iter()
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect();
            (!chunks.is_empty()).then(|| chunks.join("\n"))
        }
        _ => None,
    }
}

fn extract_gemini_text(json: &Value) -> Option<String> {
    json.get("candidates")
        .and_then(Value::as_array)?
        .first()?
        .get("content")?
        .get("parts")
        .and_then(Value::as_array)?
        .first()?
        .get("text")
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn post_json(
    timeout: Duration,
    provider: &str,
    request: impl FnOnce(&Client) -> reqwest::blocking::RequestBuilder,
) -> Result<Value> {
    let client = Client::builder().timeout(timeout).build()?;
    let response = request(&client)
        .send()
        .with_context(|| format!("{provider} request failed"))?;
    if !response.status().is_success() {
        anyhow::bail!("{provider} call failed with status {}", response.status());
    }
    Ok(response.json()?)
}

fn finish(provider: &str, reply: Result<String>) -> Result<Extraction> {
    let text = reply.map_err(|err| SyncError::EnrichmentFailure(format!("{provider}: {err:#}")))?;
    Ok(parse_extraction(&text)?)
}

impl Enricher for AnthropicEnricher {
    fn label(&self) -> String {
        format!("anthropic:{}", self.model)
    }

    fn enrich(&self, input: &EnrichInput) -> Result<Extraction> {
        let payload = serde_json::json!({
            "model": self.model,
            "max_tokens": MAX_REPLY_TOKENS,
            "temperature": 0.2,
            "messages": [{"role": "user", "content": build_prompt(input)}]
        });
        let reply = post_json(self.timeout, "anthropic", |client| {
            client
                .post("https://api.anthropic.com/v1/messages")
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", "2023-06-01")
                .json(&payload)
        })
        .and_then(|json| {
            extract_anthropic_text(&json).context("anthropic response missing text content")
        });
        finish("anthropic", reply)
    }
}

impl Enricher for OpenAiEnricher {
    fn label(&self) -> String {
        format!("openai:{}", self.model)
    }

    fn enrich(&self, input: &EnrichInput) -> Result<Extraction> {
        let payload = serde_json::json!({
            "model": self.model,
            "input": build_prompt(input),
            "temperature": 0.2
        });
        let reply = post_json(self.timeout, "openai", |client| {
            client
                .post("https://api.openai.com/v1/responses")
                .bearer_auth(&self.api_key)
                .json(&payload)
        })
        .and_then(|json| extract_openai_text(&json).context("openai response missing text content"));
        finish("openai", reply)
    }
}

impl Enricher for GeminiEnricher {
    fn label(&self) -> String {
        format!("gemini:{}", self.model)
    }

    fn enrich(&self, input: &EnrichInput) -> Result<Extraction> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent",
            self.model
        );
        let payload = serde_json::json!({
            "contents": [{"parts": [{"text": build_prompt(input)}]}]
        });
        let reply = post_json(self.timeout, "gemini", |client| {
            client
                .post(&url)
                .header("x-goog-api-key", &self.api_key)
                .json(&payload)
        })
        .and_then(|json| extract_gemini_text(&json).context("gemini response missing text content"));
        finish("gemini", reply)
    }
}

impl Enricher for OpenAiCompatEnricher {
    fn label(&self) -> String {
        format!("openai-compatible:{}", self.model)
    }

    fn enrich(&self, input: &EnrichInput) -> Result<Extraction> {
        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));
        let payload = serde_json::json!({
            "model": self.model,
            "messages": [{"role": "user", "content": build_prompt(input)}],
            "temperature": 0.2
        });
        let reply = post_json(self.timeout, "openai-compatible", |client| {
            client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&payload)
        })
        .and_then(|json| {
            extract_openai_compatible_text(&json)
                .context("openai-compatible response missing text content")
        });
        finish("openai-compatible", reply)
    }
}

#[cfg(test)]
mod tests {
    use super::{
        EnrichInput, Enricher, Extraction, LocalEnricher, extract_anthropic_text,
        extract_openai_compatible_text, parse_extraction, resolve_enricher, strip_code_fence,
    };
    use crate::error::SyncError;
    use crate::granola::config::EnrichConfig;
    use chrono::NaiveDate;
    use serde_json::json;

    fn input(transcript: &str) -> EnrichInput {
        EnrichInput::new(
            "Team Standup",
            NaiveDate::from_ymd_opt(2026, 1, 15).expect("date"),
            &["kevin@example.com".to_string()],
            transcript,
            15_000,
        )
    }

    #[test]
    fn local_enricher_is_deterministic() {
        let transcript = "Morning everyone and welcome back. Kevin will need to send the recap by Friday. \
                          We agreed to go with the new vendor. Conversion is up 12% this week. \
                          Nothing else today";
        let first = LocalEnricher.enrich(&input(transcript)).expect("enrich");
        let second = LocalEnricher.enrich(&input(transcript)).expect("enrich");
        assert_eq!(first, second);
        assert_eq!(
            first.action_items,
            vec!["Kevin will need to send the recap by Friday"]
        );
        assert_eq!(first.decisions, vec!["We agreed to go with the new vendor"]);
        assert_eq!(first.metrics, vec!["Conversion is up 12% this week"]);
        assert_eq!(first.summary.len(), 3);
        assert!(first.routing_text().contains("new vendor"));
    }

    #[test]
    fn input_truncates_transcript_by_chars() {
        let long = "é".repeat(20);
        let got = EnrichInput::new(
            "t",
            NaiveDate::from_ymd_opt(2026, 1, 15).expect("date"),
            &[],
            &long,
            5,
        );
        assert_eq!(got.transcript.chars().count(), 5);
    }

    #[test]
    fn parses_fenced_json_replies() {
        let reply = "Here you go:\n```json\n{\"action_items\": [\"- Kevin: send recap\", {\"task\": \"Book room\"}], \"summary\": \"- Shipped v2\\n- Hiring on track\", \"decisions\": []}\n```";
        let extraction = parse_extraction(reply).expect("parse");
        assert_eq!(
            extraction,
            Extraction {
                action_items: vec!["Kevin: send recap".to_string(), "Book room".to_string()],
                decisions: vec![],
                metrics: vec![],
                summary: vec!["Shipped v2".to_string(), "Hiring on track".to_string()],
            }
        );
        assert_eq!(strip_code_fence("```\n{}\n```"), "{}");
    }

    #[test]
    fn non_json_reply_is_enrichment_failure() {
        let err = parse_extraction("I could not analyse this meeting.").expect_err("prose");
        assert!(matches!(err, SyncError::EnrichmentFailure(_)));
        assert!(parse_extraction("[1, 2]").is_err());
    }

    #[test]
    fn provider_payload_extraction() {
        let anthropic = json!({"content": [{"type": "text", "text": "{}"}]});
        assert_eq!(extract_anthropic_text(&anthropic).as_deref(), Some("{}"));
        let compat = json!({"choices": [{"message": {"content": "{\"summary\": []}"}}]});
        assert_eq!(
            extract_openai_compatible_text(&compat).as_deref(),
            Some("{\"summary\": []}")
        );
    }

    #[test]
    fn local_provider_resolves_without_network() {
        let cfg = EnrichConfig {
            provider: "local".to_string(),
            ..EnrichConfig::default()
        };
        let enricher = resolve_enricher(&cfg).expect("resolve");
        assert_eq!(enricher.label(), "local");
    }
}
