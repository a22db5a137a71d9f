//! OpenAI-compatible chat completion client, plus the prompt templates and
//! tolerant JSON parsing the synthesis step needs (spec.md §4.8).
//!
//! Grounded directly on the teacher's `OpenAiCompatClient` (base url / api
//! key / model read from env, a single `reqwest::Client`, `chat`/`chat_json`
//! plus `_with_options` variants for per-call overrides).

use serde::{Deserialize, Serialize};
use std::time::Duration;
use websynth_core::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionsRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionsResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct ChatOptions {
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub json_mode: bool,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_tokens: Some(1024),
            json_mode: false,
        }
    }
}

pub struct OpenAiCompatClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiCompatClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("reqwest client builds");
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("LLM_API_BASE")
            .map_err(|_| Error::NotConfigured("LLM_API_BASE is not set".to_string()))?;
        let api_key = std::env::var("LLM_API_KEY").unwrap_or_default();
        let model = std::env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
        Ok(Self::new(base_url, api_key, model))
    }

    pub async fn chat(&self, messages: Vec<ChatMessage>) -> Result<String> {
        self.chat_with_options(messages, ChatOptions::default()).await
    }

    pub async fn chat_json(&self, messages: Vec<ChatMessage>) -> Result<String> {
        self.chat_with_options(
            messages,
            ChatOptions {
                json_mode: true,
                ..ChatOptions::default()
            },
        )
        .await
    }

    pub async fn chat_with_options(
        &self,
        messages: Vec<ChatMessage>,
        opts: ChatOptions,
    ) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let req = ChatCompletionsRequest {
            model: self.model.clone(),
            messages,
            temperature: opts.temperature,
            max_tokens: opts.max_tokens,
            response_format: opts.json_mode.then(|| ResponseFormat {
                kind: "json_object".to_string(),
            }),
        };

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .map_err(|e| Error::Llm(format!("request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Llm(format!("returned {status}: {body}")));
        }

        let parsed: ChatCompletionsResponse = resp
            .json()
            .await
            .map_err(|e| Error::Llm(format!("response decode failed: {e}")))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        Ok(content)
    }
}

/// Strips a leading/trailing fenced code block (```` ```json ```` or ```` ``` ````)
/// from a raw model response, per spec.md §4.8.
pub fn strip_code_fence(s: &str) -> &str {
    let s = s.trim();
    let Some(rest) = s.strip_prefix("```") else {
        return s;
    };
    let rest = rest
        .strip_prefix("json")
        .or_else(|| rest.strip_prefix("JSON"))
        .unwrap_or(rest);
    let rest = rest.strip_prefix('\n').unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Tolerant "salvage" extraction of the `answer` field from a possibly
/// malformed JSON object (spec.md §4.8 / §8 scenario 8): a normal
/// `serde_json` parse is tried first; on failure this falls back to a
/// linear scan for the literal field name and reads a JSON string value by
/// hand, honoring `\"` and `\n` escapes, tolerating an unterminated string
/// (the value runs to the end of input).
pub fn salvage_answer(raw: &str) -> String {
    let cleaned = strip_code_fence(raw);

    if let Ok(v) = serde_json::from_str::<serde_json::Value>(cleaned) {
        if let Some(s) = v.get("answer").and_then(|a| a.as_str()) {
            return s.to_string();
        }
        return String::new();
    }

    let needle = "\"answer\"";
    let Some(field_pos) = cleaned.find(needle) else {
        return String::new();
    };
    let after_field = &cleaned[field_pos + needle.len()..];
    let Some(colon_rel) = after_field.find(':') else {
        return String::new();
    };
    let after_colon = after_field[colon_rel + 1..].trim_start();
    let Some(quote_rel) = after_colon.find('"') else {
        return String::new();
    };
    let value_start = &after_colon[quote_rel + 1..];

    let mut out = String::new();
    let mut chars = value_start.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('"') => out.push('"'),
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('\\') => out.push('\\'),
                Some(other) => out.push(other),
                None => break,
            },
            '"' => break,
            other => out.push(other),
        }
    }
    out
}

pub fn rewrite_query_prompt(query: &str) -> String {
    format!(
        "Rewrite the following search query to be more effective for a web search \
         engine. Keep it short and keyword-focused. Return only the rewritten query, \
         no explanation.\n\nQuery: {query}"
    )
}

pub fn expand_query_prompt(query: &str) -> String {
    format!(
        "Generate 2-3 alternate phrasings of the following search query that would \
         surface complementary results. Return one per line, no numbering.\n\nQuery: {query}"
    )
}

fn iso8601_date_now_hint() -> &'static str {
    "today's date, if relevant to the query, should be taken from context you are given"
}

pub fn synthesis_system_prompt(deep: bool, domain_instruction: Option<&str>) -> String {
    let (answer_len, fact_count) = if deep {
        ("3-5 sentences", "8-15")
    } else {
        ("2-3 sentences", "4-8")
    };
    let domain = domain_instruction.unwrap_or("");
    format!(
        "You are a research assistant that synthesizes web search results into a \
         concise answer. Respond with a single JSON object with exactly two fields: \
         \"answer\" (a {answer_len} synthesis of the sources) and \"facts\" (an array \
         of {fact_count} short standalone factual statements drawn from the sources). \
         Cite nothing inline; source attribution is handled separately. \
         {domain} Note that {hint}.",
        hint = iso8601_date_now_hint()
    )
}

pub fn domain_instruction(hint: websynth_core::DomainHint) -> Option<&'static str> {
    use websynth_core::DomainHint::*;
    match hint {
        CodeHostingRepo => Some(
            "Favor mentioning the repository name, primary language, and install \
             instructions if present in the sources.",
        ),
        WordPress => Some("Favor plugin/theme names and compatible WordPress versions if present."),
        HuggingFace => Some("Favor model name, task type, and license if present."),
        LibraryDocs => Some("Favor exact API names, function signatures, and version numbers if present."),
        Jobs => Some("Favor role title, company, location, and compensation if present."),
        Freelance => Some("Favor project scope, budget, and required skills if present."),
        RemoteWork => Some("Favor remote policy details and timezone requirements if present."),
        Video => Some("Favor video title, channel, and duration if present."),
        Docs => Some("Favor exact section headings and version numbers if present."),
        General => None,
    }
}
