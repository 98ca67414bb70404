use crate::error::PaperSortError;
use crate::papersort::retry::RetryPolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_FALLBACK_FOLDER: &str = "Unsortable & Other";
pub const KNOWN_PROVIDERS: [&str; 4] = ["openai", "mistral", "openai-compatible", "offline"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: String,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub max_file_mb: u64,
    pub request_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "mistral".to_string(),
            model: None,
            base_url: None,
            max_file_mb: 50,
            request_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_retries: policy.max_retries,
            base_delay_ms: policy.base_delay.as_millis() as u64,
            max_delay_ms: policy.max_delay.as_millis() as u64,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilingConfig {
    pub fallback_folder: String,
}

impl Default for FilingConfig {
    fn default() -> Self {
        Self {
            fallback_folder: DEFAULT_FALLBACK_FOLDER.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PaperSortConfig {
    pub docstore: Option<String>,
    pub inbox: Option<String>,
    pub llm: LlmConfig,
    pub retry: RetryConfig,
    pub filing: FilingConfig,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct PartialPaperSortConfig {
    docstore: Option<String>,
    inbox: Option<String>,
    llm: Option<LlmConfig>,
    retry: Option<RetryConfig>,
    filing: Option<FilingConfig>,
}

fn env_non_empty(var: &str) -> Option<String> {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => None,
    }
}

fn env_or_u64(var: &str, fallback: u64) -> u64 {
    match env::var(var) {
        Ok(v) => v.trim().parse::<u64>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_string(var: &str, fallback: &str) -> String {
    env_non_empty(var).unwrap_or_else(|| fallback.to_string())
}

pub fn validate(cfg: &PaperSortConfig) -> Result<(), PaperSortError> {
    if !KNOWN_PROVIDERS.contains(&cfg.llm.provider.as_str()) {
        return Err(PaperSortError::InvalidConfig(format!(
            "unknown llm provider `{}`; use one of {}",
            cfg.llm.provider,
            KNOWN_PROVIDERS.join(", ")
        )));
    }
    if cfg.llm.max_file_mb == 0 {
        return Err(PaperSortError::InvalidConfig(
            "llm max_file_mb must be >= 1".to_string(),
        ));
    }
    if cfg.retry.base_delay_ms == 0 {
        return Err(PaperSortError::InvalidConfig(
            "retry base delay must be >= 1ms".to_string(),
        ));
    }
    if cfg.retry.base_delay_ms > cfg.retry.max_delay_ms {
        return Err(PaperSortError::InvalidConfig(
            "retry base delay cannot exceed max delay".to_string(),
        ));
    }
    if cfg.filing.fallback_folder.trim().is_empty() {
        return Err(PaperSortError::InvalidConfig(
            "fallback folder cannot be empty".to_string(),
        ));
    }
    Ok(())
}

pub fn resolve_config_path() -> Option<PathBuf> {
    if let Some(custom) = env_non_empty("PAPERSORT_CONFIG_PATH") {
        return Some(PathBuf::from(custom));
    }
    if let Some(home) = env_non_empty("PAPERSORT_HOME") {
        return Some(PathBuf::from(home).join("papersort.toml"));
    }
    let home = dirs::home_dir()?;
    Some(home.join(".papersort").join("papersort.toml"))
}

fn apply_file_config(base: &mut PaperSortConfig, raw: &str, path: &Path) -> Result<()> {
    let parsed: PartialPaperSortConfig = toml::from_str(raw).map_err(|err| {
        PaperSortError::InvalidConfig(format!("failed to parse {}: {err}", path.display()))
    })?;
    if parsed.docstore.is_some() {
        base.docstore = parsed.docstore;
    }
    if parsed.inbox.is_some() {
        base.inbox = parsed.inbox;
    }
    if let Some(llm) = parsed.llm {
        base.llm = llm;
    }
    if let Some(retry) = parsed.retry {
        base.retry = retry;
    }
    if let Some(filing) = parsed.filing {
        base.filing = filing;
    }
    Ok(())
}

fn merge_file_config(base: &mut PaperSortConfig) -> Result<()> {
    let Some(path) = resolve_config_path() else {
        return Ok(());
    };
    if !path.exists() {
        return Ok(());
    }
    let raw =
        fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?;
    apply_file_config(base, &raw, &path)
}

fn apply_env_overrides(cfg: &mut PaperSortConfig) {
    if let Some(docstore) = env_non_empty("DOCSTORE") {
        cfg.docstore = Some(docstore);
    }
    if let Some(inbox) = env_non_empty("INBOX") {
        cfg.inbox = Some(inbox);
    }
    if let Some(provider) =
        env_non_empty("PAPERSORT_LLM_PROVIDER").or_else(|| env_non_empty("LLM_PROVIDER"))
    {
        cfg.llm.provider = provider.to_ascii_lowercase();
    }
    if let Some(model) = env_non_empty("PAPERSORT_LLM_MODEL") {
        cfg.llm.model = Some(model);
    }
    if let Some(base_url) = env_non_empty("PAPERSORT_LLM_BASE_URL") {
        cfg.llm.base_url = Some(base_url);
    }
    cfg.llm.max_file_mb = env_or_u64("PAPERSORT_MAX_FILE_MB", cfg.llm.max_file_mb);
    cfg.retry.max_retries =
        u32::try_from(env_or_u64("PAPERSORT_RETRY_MAX", u64::from(cfg.retry.max_retries)))
            .unwrap_or(u32::MAX);
    cfg.retry.base_delay_ms = env_or_u64("PAPERSORT_RETRY_BASE_MS", cfg.retry.base_delay_ms);
    cfg.retry.max_delay_ms = env_or_u64("PAPERSORT_RETRY_MAX_DELAY_MS", cfg.retry.max_delay_ms);
    cfg.filing.fallback_folder =
        env_or_string("PAPERSORT_FALLBACK_FOLDER", &cfg.filing.fallback_folder);
}

pub fn load_config() -> Result<PaperSortConfig> {
    let mut cfg = PaperSortConfig::default();
    merge_file_config(&mut cfg)?;
    apply_env_overrides(&mut cfg);
    validate(&cfg)?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = PaperSortConfig::default();
        assert!(validate(&cfg).is_ok());
        assert_eq!(cfg.filing.fallback_folder, "Unsortable & Other");
        assert_eq!(cfg.retry.policy(), RetryPolicy::default());
    }

    #[test]
    fn partial_file_sections_keep_other_defaults() {
        let mut cfg = PaperSortConfig::default();
        let raw = r#"
docstore = "local:/srv/docs"

[llm]
provider = "openai"

[retry]
max_retries = 2
"#;
        apply_file_config(&mut cfg, raw, Path::new("papersort.toml")).expect("apply");
        assert_eq!(cfg.docstore.as_deref(), Some("local:/srv/docs"));
        assert_eq!(cfg.inbox, None);
        assert_eq!(cfg.llm.provider, "openai");
        assert_eq!(cfg.llm.max_file_mb, 50);
        assert_eq!(cfg.retry.max_retries, 2);
        assert_eq!(cfg.retry.base_delay_ms, 1_000);
        assert_eq!(cfg.filing.fallback_folder, DEFAULT_FALLBACK_FOLDER);
    }

    #[test]
    fn malformed_file_is_invalid_config() {
        let mut cfg = PaperSortConfig::default();
        let err = apply_file_config(&mut cfg, "docstore = [", Path::new("bad.toml"))
            .expect_err("must fail");
        assert!(matches!(
            err.downcast_ref::<PaperSortError>(),
            Some(PaperSortError::InvalidConfig(_))
        ));
    }

    #[test]
    fn validate_rejects_nonsense() {
        let mut cfg = PaperSortConfig::default();
        cfg.llm.provider = "gemini".to_string();
        assert!(validate(&cfg).is_err());

        let mut cfg = PaperSortConfig::default();
        cfg.retry.base_delay_ms = 0;
        assert!(validate(&cfg).is_err());

        let mut cfg = PaperSortConfig::default();
        cfg.retry.base_delay_ms = 90_000;
        assert!(validate(&cfg).is_err());

        let mut cfg = PaperSortConfig::default();
        cfg.filing.fallback_folder = "  ".to_string();
        assert!(validate(&cfg).is_err());
    }
}
