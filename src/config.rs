//! Configuration types.
//!
//! Everything is read from environment variables. `AppConfig::from_lookup`
//! takes the lookup as a closure so tests can supply a map.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::complaint::{DEFAULT_SIGNATURE, PolicyTable};
use crate::error::ConfigError;
use crate::llm::{LlmBackend, LlmConfig};
use crate::mail::EmailConfig;
use crate::pipeline::screening::ScreeningRules;
use crate::pipeline::types::{DEFAULT_LLM_TIMEOUT, DEFAULT_MIN_WORDS, PipelineConfig};
use crate::transcribe::{DEFAULT_TRANSCRIBE_MODEL, DEFAULT_TRANSCRIBE_URL};

const DEFAULT_DB_PATH: &str = "./data/complaints.db";

/// Speech-to-text endpoint settings.
#[derive(Debug, Clone)]
pub struct TranscribeConfig {
    pub url: String,
    pub model: String,
    pub api_key: SecretString,
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub llm: LlmConfig,
    /// Bound on a single LLM call.
    pub llm_timeout: Duration,
    pub email: EmailConfig,
    pub db_path: PathBuf,
    /// TOML file with policy overrides.
    pub policy_file: Option<PathBuf>,
    /// `None` when no key is available for the transcription endpoint.
    pub transcribe: Option<TranscribeConfig>,
    pub min_words: usize,
    pub signature: String,
    /// Poll interval; `None` runs a single cycle and exits.
    pub watch_interval: Option<Duration>,
    /// Directory for daily log files; `None` logs to stderr only.
    pub log_dir: Option<PathBuf>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let backend = match get("COMPLAINT_DESK_LLM_BACKEND") {
            Some(raw) => raw
                .parse::<LlmBackend>()
                .map_err(|message| ConfigError::InvalidValue {
                    key: "COMPLAINT_DESK_LLM_BACKEND".to_string(),
                    message,
                })?,
            None => LlmBackend::OpenAi,
        };
        let api_key = get(backend.api_key_var())
            .ok_or_else(|| ConfigError::MissingEnvVar(backend.api_key_var().to_string()))?;
        let model = get("COMPLAINT_DESK_MODEL").unwrap_or_else(|| backend.default_model().to_string());
        let llm = LlmConfig {
            backend,
            api_key: SecretString::from(api_key),
            model,
        };

        let llm_timeout = parse_number::<u64>(&get, "COMPLAINT_DESK_LLM_TIMEOUT_SECS")?
            .map_or(DEFAULT_LLM_TIMEOUT, Duration::from_secs);

        let email = EmailConfig::from_lookup(&get)?;

        // Transcription reuses the OpenAI key whatever the chat backend is.
        let transcribe = get("OPENAI_API_KEY").map(|key| TranscribeConfig {
            url: get("COMPLAINT_DESK_TRANSCRIBE_URL")
                .unwrap_or_else(|| DEFAULT_TRANSCRIBE_URL.to_string()),
            model: get("COMPLAINT_DESK_TRANSCRIBE_MODEL")
                .unwrap_or_else(|| DEFAULT_TRANSCRIBE_MODEL.to_string()),
            api_key: SecretString::from(key),
        });

        let watch_interval = match parse_number::<u64>(&get, "COMPLAINT_DESK_WATCH_SECS")? {
            Some(0) => {
                return Err(ConfigError::InvalidValue {
                    key: "COMPLAINT_DESK_WATCH_SECS".to_string(),
                    message: "must be greater than zero".to_string(),
                });
            }
            other => other.map(Duration::from_secs),
        };

        Ok(Self {
            llm,
            llm_timeout,
            email,
            db_path: get("COMPLAINT_DESK_DB_PATH")
                .map_or_else(|| PathBuf::from(DEFAULT_DB_PATH), PathBuf::from),
            policy_file: get("COMPLAINT_DESK_POLICY_FILE").map(PathBuf::from),
            transcribe,
            min_words: parse_number(&get, "COMPLAINT_DESK_MIN_WORDS")?.unwrap_or(DEFAULT_MIN_WORDS),
            signature: get("COMPLAINT_DESK_SIGNATURE")
                .map(|s| s.replace("\\n", "\n"))
                .unwrap_or_else(|| DEFAULT_SIGNATURE.to_string()),
            watch_interval,
            log_dir: get("COMPLAINT_DESK_LOG_DIR").map(PathBuf::from),
        })
    }

    /// Pipeline tunables. Loads the policy file when one is configured and
    /// screens out mail from our own from-address.
    pub fn pipeline_config(&self) -> Result<PipelineConfig, ConfigError> {
        let policy = match &self.policy_file {
            Some(path) => PolicyTable::load(path)?,
            None => PolicyTable::default(),
        };
        Ok(PipelineConfig {
            llm_timeout: self.llm_timeout,
            min_words: self.min_words,
            signature: self.signature.clone(),
            policy,
            screening: ScreeningRules::default_rules().with_own_address(&self.email.from_address),
        })
    }
}

fn parse_number<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    get(key)
        .map(|raw| {
            raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("'{raw}' is not a valid number"),
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use secrecy::ExposeSecret;

    use super::*;
    use crate::complaint::IssueCategory;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let mut map: HashMap<String, String> = [
            ("OPENAI_API_KEY", "sk-test"),
            ("EMAIL_IMAP_HOST", "imap.shop.example"),
            ("EMAIL_USERNAME", "desk@shop.example"),
            ("EMAIL_PASSWORD", "secret"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        for (k, v) in pairs {
            map.insert(k.to_string(), v.to_string());
        }
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.llm.backend, LlmBackend::OpenAi);
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.llm_timeout, Duration::from_secs(60));
        assert_eq!(config.db_path, PathBuf::from("./data/complaints.db"));
        assert_eq!(config.min_words, 5);
        assert!(config.watch_interval.is_none());
        assert!(config.log_dir.is_none());
        let transcribe = config.transcribe.unwrap();
        assert_eq!(transcribe.model, "whisper-1");
        assert_eq!(transcribe.api_key.expose_secret(), "sk-test");
    }

    #[test]
    fn anthropic_backend_needs_its_own_key() {
        let err = AppConfig::from_lookup(lookup(&[("COMPLAINT_DESK_LLM_BACKEND", "anthropic")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(k) if k == "ANTHROPIC_API_KEY"));

        let config = AppConfig::from_lookup(lookup(&[
            ("COMPLAINT_DESK_LLM_BACKEND", "Anthropic"),
            ("ANTHROPIC_API_KEY", "sk-ant"),
        ]))
        .unwrap();
        assert_eq!(config.llm.backend, LlmBackend::Anthropic);
        assert_eq!(config.llm.api_key.expose_secret(), "sk-ant");
    }

    #[test]
    fn overrides_are_parsed() {
        let config = AppConfig::from_lookup(lookup(&[
            ("COMPLAINT_DESK_LLM_TIMEOUT_SECS", "15"),
            ("COMPLAINT_DESK_MIN_WORDS", "8"),
            ("COMPLAINT_DESK_WATCH_SECS", "300"),
            ("COMPLAINT_DESK_SIGNATURE", "Thanks,\\nThe Desk"),
            ("COMPLAINT_DESK_LOG_DIR", "/var/log/desk"),
        ]))
        .unwrap();
        assert_eq!(config.llm_timeout, Duration::from_secs(15));
        assert_eq!(config.min_words, 8);
        assert_eq!(config.watch_interval, Some(Duration::from_secs(300)));
        assert_eq!(config.signature, "Thanks,\nThe Desk");
        assert_eq!(config.log_dir, Some(PathBuf::from("/var/log/desk")));
    }

    #[test]
    fn blank_mail_settings_use_defaults() {
        let config = AppConfig::from_lookup(lookup(&[
            ("EMAIL_SMTP_HOST", ""),
            ("EMAIL_FROM", " "),
            ("EMAIL_IMAP_PORT", ""),
        ]))
        .unwrap();
        assert_eq!(config.email.smtp_host, "smtp.shop.example");
        assert_eq!(config.email.from_address, "desk@shop.example");
        assert_eq!(config.email.imap_port, 993);
    }

    #[test]
    fn invalid_numbers_are_rejected() {
        let err = AppConfig::from_lookup(lookup(&[("COMPLAINT_DESK_MIN_WORDS", "few")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key, .. } if key == "COMPLAINT_DESK_MIN_WORDS"));

        let err = AppConfig::from_lookup(lookup(&[("COMPLAINT_DESK_WATCH_SECS", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key, .. } if key == "COMPLAINT_DESK_WATCH_SECS"));
    }

    #[test]
    fn pipeline_config_loads_policy_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[rules.late_delivery]\nrefundable = true\nrefund_window_days = 14\n"
        )
        .unwrap();

        let path = file.path().to_string_lossy().to_string();
        let config =
            AppConfig::from_lookup(lookup(&[("COMPLAINT_DESK_POLICY_FILE", path.as_str())])).unwrap();
        let pipeline = config.pipeline_config().unwrap();
        let rule = pipeline.policy.rule_for(IssueCategory::LateDelivery);
        assert!(rule.refundable);
        assert_eq!(rule.refund_window_days, Some(14));
    }

    #[test]
    fn missing_policy_file_is_an_error() {
        let config = AppConfig::from_lookup(lookup(&[(
            "COMPLAINT_DESK_POLICY_FILE",
            "/nonexistent/policy.toml",
        )]))
        .unwrap();
        assert!(matches!(
            config.pipeline_config(),
            Err(ConfigError::ReadFile { .. })
        ));
    }
}
