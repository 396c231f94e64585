//! Configuration types.
//!
//! Every scoring constant used by the classifier and analyzers lives here so
//! it can be tuned without touching the decision code. Defaults match the
//! reference behavior; `AppConfig::from_env()` overrides a subset from the
//! environment.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Classifier thresholds.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Minimum weighted signal a format family needs before it is chosen.
    pub min_format_signal: f64,
    /// Divisor turning a format signal score into a confidence.
    pub format_score_divisor: f64,
    /// Divisor turning an intent score into a confidence.
    pub intent_score_divisor: f64,
    /// Content confidence below this lets a filename hint override the format.
    pub low_confidence_threshold: f64,
    /// Confidence assigned when the filename decides the format.
    pub filename_override_confidence: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            min_format_signal: 1.0,
            format_score_divisor: 3.0,
            intent_score_divisor: 3.0,
            low_confidence_threshold: 0.5,
            filename_override_confidence: 0.7,
        }
    }
}

/// Email analyzer tuning.
#[derive(Debug, Clone)]
pub struct EmailRules {
    /// Number of keywords returned.
    pub keyword_limit: usize,
    /// Uppercase/alphabetic ratio above which the text counts as shouting.
    pub shouting_ratio: f64,
    /// Texts with fewer letters than this never count as shouting.
    pub min_shouting_letters: usize,
    /// Exclamation marks above this count add anger weight.
    pub exclamation_threshold: usize,
    /// Lines scanned for headers when the content is not a parseable message.
    pub header_scan_lines: usize,
}

impl Default for EmailRules {
    fn default() -> Self {
        Self {
            keyword_limit: 10,
            shouting_ratio: 0.30,
            min_shouting_letters: 20,
            exclamation_threshold: 3,
            header_scan_lines: 20,
        }
    }
}

/// JSON analyzer business rules.
#[derive(Debug, Clone)]
pub struct JsonRules {
    pub max_amount: f64,
    pub suspicious_amounts: Vec<f64>,
    pub suspicious_substrings: Vec<String>,
    pub max_string_length: usize,
    pub allowed_transaction_flags: Vec<String>,
    /// Number of top-level keys kept in the extracted preview.
    pub preview_keys: usize,
}

impl Default for JsonRules {
    fn default() -> Self {
        Self {
            max_amount: 10_000.0,
            suspicious_amounts: vec![5_000.0, 9_999.0, 9_999.99, 10_000.0],
            suspicious_substrings: ["test", "admin", "guest", "demo", "fake", "dummy", "root"]
                .into_iter()
                .map(String::from)
                .collect(),
            max_string_length: 1_000,
            allowed_transaction_flags: ["high_amount", "suspicious_user", "new_device", "foreign_ip"]
                .into_iter()
                .map(String::from)
                .collect(),
            preview_keys: 10,
        }
    }
}

/// PDF-text analyzer rules.
#[derive(Debug, Clone)]
pub struct PdfRules {
    pub max_invoice_amount: f64,
    pub suspicious_amounts: Vec<f64>,
    pub invoice_multiplier: f64,
    pub policy_multiplier: f64,
    pub contract_multiplier: f64,
    pub regulation_multiplier: f64,
    pub unknown_multiplier: f64,
    /// Characters of extracted text kept in the result.
    pub text_preview_chars: usize,
}

impl Default for PdfRules {
    fn default() -> Self {
        Self {
            max_invoice_amount: 10_000.0,
            suspicious_amounts: vec![5_000.0, 9_999.0, 9_999.99, 10_000.0],
            invoice_multiplier: 1.2,
            policy_multiplier: 1.1,
            contract_multiplier: 1.1,
            regulation_multiplier: 1.3,
            unknown_multiplier: 0.8,
            text_preview_chars: 1_000,
        }
    }
}

/// Largest accepted backoff unit.
pub const MAX_BACKOFF_UNIT: Duration = Duration::from_secs(60 * 60);

/// Dispatch retry policy.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub max_retries: u32,
    /// One backoff time unit; the sleep before retry `n` is `2^n` units.
    pub backoff_unit: Duration,
    /// Relative jitter applied to each backoff sleep (0.1 = ±10%).
    pub backoff_jitter: f64,
    /// Upper bound for a single attempt against a target.
    pub attempt_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_unit: Duration::from_secs(1),
            backoff_jitter: 0.1,
            attempt_timeout: Duration::from_secs(30),
        }
    }
}

/// Simulated action target behavior.
#[derive(Debug, Clone)]
pub struct TargetConfig {
    pub latency: Duration,
    pub failure_probability: f64,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            latency: Duration::from_millis(100),
            failure_probability: 0.1,
        }
    }
}

/// Full application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub classifier: ClassifierConfig,
    pub email: EmailRules,
    pub json: JsonRules,
    pub pdf: PdfRules,
    pub dispatch: DispatchConfig,
    pub targets: TargetConfig,
    pub port: u16,
    /// Trace database path; `:memory:` selects the in-memory store.
    pub db_path: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            classifier: ClassifierConfig::default(),
            email: EmailRules::default(),
            json: JsonRules::default(),
            pdf: PdfRules::default(),
            dispatch: DispatchConfig::default(),
            targets: TargetConfig::default(),
            port: 8000,
            db_path: PathBuf::from("./data/docroute.db"),
        }
    }
}

impl AppConfig {
    /// Build config from `DOCROUTE_*` environment variables. Unset variables
    /// keep their defaults; a value that does not parse is an error.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(v) = env_parse("DOCROUTE_MIN_FORMAT_SIGNAL")? {
            config.classifier.min_format_signal = v;
        }
        if let Some(v) = env_parse("DOCROUTE_JSON_MAX_AMOUNT")? {
            config.json.max_amount = v;
        }
        if let Some(v) = env_parse("DOCROUTE_PDF_MAX_AMOUNT")? {
            config.pdf.max_invoice_amount = v;
        }
        if let Some(v) = env_parse("DOCROUTE_MAX_RETRIES")? {
            config.dispatch.max_retries = v;
        }
        if let Some(ms) = env_parse::<u64>("DOCROUTE_BACKOFF_UNIT_MS")? {
            config.dispatch.backoff_unit = Duration::from_millis(ms);
        }
        if let Some(secs) = env_parse::<u64>("DOCROUTE_ATTEMPT_TIMEOUT_SECS")? {
            config.dispatch.attempt_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = env_parse::<u64>("DOCROUTE_TARGET_LATENCY_MS")? {
            config.targets.latency = Duration::from_millis(ms);
        }
        if let Some(v) = env_parse("DOCROUTE_TARGET_FAILURE_RATE")? {
            config.targets.failure_probability = v;
        }
        if let Some(v) = env_parse("DOCROUTE_PORT")? {
            config.port = v;
        }
        if let Ok(path) = std::env::var("DOCROUTE_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values that would break the [0,1] score invariants or the
    /// retry loop.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks: [(&str, bool, &str); 8] = [
            (
                "classifier.format_score_divisor",
                self.classifier.format_score_divisor > 0.0,
                "must be positive",
            ),
            (
                "classifier.intent_score_divisor",
                self.classifier.intent_score_divisor > 0.0,
                "must be positive",
            ),
            (
                "classifier.filename_override_confidence",
                (0.0..=1.0).contains(&self.classifier.filename_override_confidence),
                "must be within [0, 1]",
            ),
            (
                "targets.failure_probability",
                (0.0..=1.0).contains(&self.targets.failure_probability),
                "must be within [0, 1]",
            ),
            (
                "dispatch.backoff_jitter",
                (0.0..1.0).contains(&self.dispatch.backoff_jitter),
                "must be within [0, 1)",
            ),
            (
                "dispatch.backoff_unit",
                self.dispatch.backoff_unit <= MAX_BACKOFF_UNIT,
                "must be at most one hour",
            ),
            (
                "dispatch.attempt_timeout",
                !self.dispatch.attempt_timeout.is_zero(),
                "must be non-zero",
            ),
            (
                "json.max_amount",
                self.json.max_amount > 0.0,
                "must be positive",
            ),
        ];

        for (key, ok, message) in checks {
            if !ok {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: message.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Whether the trace store should be kept in memory.
    pub fn in_memory_store(&self) -> bool {
        self.db_path.as_os_str() == ":memory:"
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    parse_value(key, std::env::var(key).ok())
}

fn parse_value<T: std::str::FromStr>(
    key: &str,
    raw: Option<String>,
) -> Result<Option<T>, ConfigError> {
    match raw {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::ParseError(format!("{key}={raw:?} is not a valid value"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_failure_probability_above_one() {
        let mut config = AppConfig::default();
        config.targets.failure_probability = 1.5;
        match config.validate() {
            Err(ConfigError::InvalidValue { key, .. }) => {
                assert_eq!(key, "targets.failure_probability");
            }
            other => panic!("Expected InvalidValue, got {:?}", other),
        }
    }

    #[test]
    fn rejects_zero_divisor() {
        let mut config = AppConfig::default();
        config.classifier.intent_score_divisor = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_oversized_backoff_unit() {
        let mut config = AppConfig::default();
        config.dispatch.backoff_unit = Duration::from_millis(u64::MAX);
        match config.validate() {
            Err(ConfigError::InvalidValue { key, .. }) => assert_eq!(key, "dispatch.backoff_unit"),
            other => panic!("Expected InvalidValue, got {:?}", other),
        }
    }

    #[test]
    fn unparseable_env_value_is_an_error() {
        let err = parse_value::<u32>("DOCROUTE_MAX_RETRIES", Some("three".into())).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(ref m) if m.contains("DOCROUTE_MAX_RETRIES")));
        assert_eq!(
            parse_value::<u32>("DOCROUTE_MAX_RETRIES", Some(" 5 ".into())).unwrap(),
            Some(5)
        );
        assert_eq!(parse_value::<u32>("DOCROUTE_MAX_RETRIES", None).unwrap(), None);
    }

    #[test]
    fn memory_store_marker() {
        let mut config = AppConfig::default();
        assert!(!config.in_memory_store());
        config.db_path = PathBuf::from(":memory:");
        assert!(config.in_memory_store());
    }

    #[test]
    fn dispatch_defaults_match_reference() {
        let dispatch = DispatchConfig::default();
        assert_eq!(dispatch.max_retries, 3);
        assert_eq!(dispatch.backoff_unit, Duration::from_secs(1));
    }
}
