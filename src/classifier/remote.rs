use super::prompt::{
    MAX_PATH_RETRIES, build_analysis_prompt, build_compare_prompt, build_duplicate_prompt,
    build_folder_match_prompt, parse_analysis_response, parse_compare_response,
    parse_duplicate_response, parse_folder_match_response, path_feedback,
};
use super::{AnalysisRequest, Classifier, ClassifierError, DocumentAnalysis};
use crate::papersort::config::LlmConfig;
use crate::papersort::retry::RetryPolicy;
use anyhow::{Context, Result};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use reqwest::blocking::Client;
use serde_json::{Value, json};
use std::env;
use std::fs;
use std::time::Duration;

const BYTES_PER_MB: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    Mistral,
    OpenAiCompatible,
}

impl Provider {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "openai" => Some(Self::OpenAi),
            "mistral" => Some(Self::Mistral),
            "openai-compatible" | "compatible" => Some(Self::OpenAiCompatible),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Mistral => "mistral",
            Self::OpenAiCompatible => "openai-compatible",
        }
    }

    fn default_model(self) -> &'static str {
        match self {
            Self::OpenAi => "gpt-4o",
            Self::Mistral => "mistral-small-latest",
            Self::OpenAiCompatible => "gpt-4o",
        }
    }

    fn default_base_url(self) -> Option<&'static str> {
        match self {
            Self::OpenAi => Some("https://api.openai.com"),
            Self::Mistral => Some("https://api.mistral.ai"),
            Self::OpenAiCompatible => None,
        }
    }

    fn api_key_vars(self) -> &'static [&'static str] {
        match self {
            Self::OpenAi => &["PAPERSORT_LLM_API_KEY", "OPENAI_API_KEY"],
            Self::Mistral => &["PAPERSORT_LLM_API_KEY", "MISTRAL_API_KEY"],
            Self::OpenAiCompatible => &["PAPERSORT_LLM_API_KEY", "AI_API_KEY", "OPENAI_API_KEY"],
        }
    }
}

fn env_non_empty(var: &str) -> Option<String> {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => None,
    }
}

fn extract_chat_text(json: &Value) -> Option<String> {
    let choices = json.get("choices").and_then(Value::as_array)?;
    let content = choices.first()?.get("message")?.get("content")?;
    match content {
        Value::String(s) => Some(s.to_string()),
        Value::Array(parts) => {
            let chunks: Vec<&str> = parts
                .iter()
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect();
            if chunks.is_empty() {
                None
            } else {
                Some(chunks.join("\n"))
            }
        }
        _ => None,
    }
}

/// Chat-completions classifier for OpenAI, Mistral and compatible endpoints.
pub struct RemoteClassifier {
    provider: Provider,
    model: String,
    api_key: String,
    base_url: String,
    max_file_bytes: u64,
    client: Client,
    retry: RetryPolicy,
}

impl RemoteClassifier {
    pub fn new(
        provider: Provider,
        model: String,
        api_key: String,
        base_url: String,
        cfg: &LlmConfig,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            provider,
            model,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_file_bytes: cfg.max_file_mb.saturating_mul(BYTES_PER_MB),
            client,
            retry,
        })
    }

    pub fn from_config(cfg: &LlmConfig, retry: RetryPolicy) -> Result<Self> {
        let provider = Provider::parse(&cfg.provider).ok_or_else(|| {
            crate::error::PaperSortError::InvalidConfig(format!(
                "unknown llm provider `{}`",
                cfg.provider
            ))
        })?;
        let vars = provider.api_key_vars();
        let api_key = vars
            .iter()
            .find_map(|var| env_non_empty(var))
            .ok_or_else(|| ClassifierError::MissingCredentials(vars.join(" or ")))?;
        let base_url = cfg
            .base_url
            .clone()
            .or_else(|| env_non_empty("AI_BASE_URL"))
            .or_else(|| provider.default_base_url().map(str::to_string))
            .ok_or_else(|| ClassifierError::MissingCredentials("PAPERSORT_LLM_BASE_URL".into()))?;
        let model = cfg
            .model
            .clone()
            .unwrap_or_else(|| provider.default_model().to_string());
        Self::new(provider, model, api_key, base_url, cfg, retry)
    }

    fn document_content(&self, prompt: &str, filename: &str, encoded_pdf: &str) -> Value {
        let data_url = format!("data:application/pdf;base64,{encoded_pdf}");
        let document = match self.provider {
            Provider::Mistral => json!({"type": "document_url", "document_url": data_url}),
            Provider::OpenAi | Provider::OpenAiCompatible => json!({
                "type": "file",
                "file": {"filename": filename, "file_data": data_url}
            }),
        };
        json!([{"type": "text", "text": prompt}, document])
    }

    fn chat_once(&self, messages: &[Value]) -> Result<String, ClassifierError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let payload = json!({
            "model": self.model,
            "messages": messages,
        });
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .map_err(|err| ClassifierError::Transport(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClassifierError::Http {
                status: status.as_u16(),
            });
        }
        let json: Value = response
            .json()
            .map_err(|err| ClassifierError::Parse(err.to_string()))?;
        extract_chat_text(&json).ok_or_else(|| {
            ClassifierError::Parse(format!("{} response missing text content", self.provider.label()))
        })
    }

    fn chat(&self, messages: &[Value]) -> Result<String, ClassifierError> {
        self.retry
            .run(ClassifierError::is_transient, || self.chat_once(messages))
    }

    fn ask(&self, prompt: String) -> Result<String, ClassifierError> {
        self.chat(&[json!({"role": "user", "content": prompt})])
    }

    fn check_size(&self, request: &AnalysisRequest<'_>) -> Result<(), ClassifierError> {
        let size = fs::metadata(request.pdf_path)
            .map_err(|err| ClassifierError::Transport(err.to_string()))?
            .len();
        if size > self.max_file_bytes {
            return Err(ClassifierError::TooLarge {
                size_mb: size as f64 / BYTES_PER_MB as f64,
                limit_mb: self.max_file_bytes / BYTES_PER_MB,
            });
        }
        Ok(())
    }
}

impl Classifier for RemoteClassifier {
    fn name(&self) -> &str {
        self.provider.label()
    }

    fn analyze_document(
        &self,
        request: &AnalysisRequest<'_>,
        path_is_valid: &dyn Fn(&str) -> bool,
    ) -> Option<DocumentAnalysis> {
        if let Err(err) = self.check_size(request) {
            tracing::warn!("not sending {} to classifier: {err}", request.pdf_path.display());
            return None;
        }
        let bytes = match fs::read(request.pdf_path) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!("failed to read {}: {err}", request.pdf_path.display());
                return None;
            }
        };
        let filename = request
            .pdf_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document.pdf".to_string());
        let prompt = build_analysis_prompt(request.layout_text, request.hint, request.inbox_path);
        let mut messages = vec![json!({
            "role": "user",
            "content": self.document_content(&prompt, &filename, &STANDARD.encode(bytes)),
        })];

        for attempt in 1..=MAX_PATH_RETRIES {
            let text = match self.chat(&messages) {
                Ok(text) => text,
                Err(err) => {
                    tracing::warn!("{} analysis failed: {err}", self.provider.label());
                    return None;
                }
            };
            let analysis = match parse_analysis_response(&text) {
                Ok(analysis) => analysis,
                Err(err) => {
                    tracing::warn!("{} analysis unusable: {err}", self.provider.label());
                    return None;
                }
            };
            if path_is_valid(&analysis.suggested_path) {
                return Some(analysis);
            }
            tracing::info!(
                "invalid path '{}', asking classifier to retry ({attempt}/{MAX_PATH_RETRIES})",
                analysis.suggested_path
            );
            messages.push(json!({"role": "assistant", "content": text}));
            messages.push(json!({"role": "user", "content": path_feedback(&analysis.suggested_path)}));
        }

        tracing::warn!("no valid path after {MAX_PATH_RETRIES} attempts");
        None
    }

    fn compare_names(&self, a: &str, b: &str) -> bool {
        match self.ask(build_compare_prompt(a, b)) {
            Ok(text) => parse_compare_response(&text),
            Err(err) => {
                tracing::warn!("name comparison failed: {err}");
                false
            }
        }
    }

    fn find_duplicate_pair(&self, names: &[String]) -> Option<(String, String)> {
        if names.len() < 2 {
            return None;
        }
        match self.ask(build_duplicate_prompt(names)) {
            Ok(text) => parse_duplicate_response(&text, names),
            Err(err) => {
                tracing::warn!("duplicate detection failed: {err}");
                None
            }
        }
    }

    fn find_matching_folder(&self, new_name: &str, existing: &[String]) -> Option<String> {
        if existing.is_empty() {
            return None;
        }
        match self.ask(build_folder_match_prompt(new_name, existing)) {
            Ok(text) => parse_folder_match_response(&text, existing),
            Err(err) => {
                tracing::warn!("folder matching failed: {err}");
                None
            }
        }
    }
}
