//! JSON webhook analyzer.
//!
//! Parses the payload, infers (or takes) a schema, validates it, then runs
//! amount/identifier/length business rules. Risk is the mean severity weight.

use serde_json::{Map, Value, json};
use tracing::debug;

use crate::analyzers::Analyzer;
use crate::config::JsonRules;
use crate::pipeline::types::{
    AgentKind, AnalysisResult, Finding, FindingKind, Severity, SuggestedAction, count_high,
    mean_severity,
};

const AMOUNT_FIELDS: &[&str] = &["amount", "total", "total_amount", "price", "value"];
const IDENTIFIER_FIELDS: &[&str] = &["user_id", "customer_id", "username", "email", "account_id"];
/// Copied verbatim into the extracted fields when present.
const KEY_FIELDS: &[&str] = &[
    "transaction_id",
    "order_id",
    "user_id",
    "customer_id",
    "event_type",
    "amount",
    "total",
    "currency",
    "flags",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldType {
    String,
    Number,
}

impl FieldType {
    fn matches(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
        }
    }
}

/// Known payload schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schema {
    Transaction,
    Order,
    UserEvent,
}

impl Schema {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Transaction => "transaction",
            Self::Order => "order",
            Self::UserEvent => "user_event",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "transaction" => Some(Self::Transaction),
            "order" => Some(Self::Order),
            "user_event" => Some(Self::UserEvent),
            _ => None,
        }
    }

    /// Infer from identifying fields.
    fn infer(object: &Map<String, Value>) -> Option<Self> {
        let has = |k: &str| object.contains_key(k);
        if has("transaction_id") && has("amount") {
            Some(Self::Transaction)
        } else if has("order_id") && has("customer_id") {
            Some(Self::Order)
        } else if has("user_id") && has("event_type") {
            Some(Self::UserEvent)
        } else {
            None
        }
    }

    fn fields(&self) -> &'static [(&'static str, FieldType)] {
        match self {
            Self::Transaction => &[
                ("transaction_id", FieldType::String),
                ("amount", FieldType::Number),
                ("user_id", FieldType::String),
                ("timestamp", FieldType::String),
            ],
            Self::Order => &[
                ("order_id", FieldType::String),
                ("customer_id", FieldType::String),
                ("total", FieldType::Number),
            ],
            Self::UserEvent => &[
                ("user_id", FieldType::String),
                ("event_type", FieldType::String),
                ("timestamp", FieldType::String),
            ],
        }
    }
}

/// JSON payload analyzer.
pub struct JsonAnalyzer {
    rules: JsonRules,
}

impl JsonAnalyzer {
    pub fn new(rules: JsonRules) -> Self {
        Self { rules }
    }

    /// Analyze with an optional schema name overriding inference.
    pub fn analyze_with_hint(&self, content: &str, schema_hint: Option<&str>) -> AnalysisResult {
        let data: Value = match serde_json::from_str(content) {
            Ok(v) => v,
            Err(e) => return invalid_json(&e.to_string()),
        };

        let mut findings = Vec::new();
        let mut schema = None;

        match &data {
            Value::Object(object) => {
                schema = match schema_hint {
                    Some(hint) => {
                        let named = Schema::from_name(hint);
                        if named.is_none() {
                            findings.push(Finding::new(
                                FindingKind::UnknownSchema,
                                Severity::Medium,
                                format!("schema '{hint}' is not known"),
                            ));
                        }
                        named
                    }
                    None => Schema::infer(object),
                };
                if let Some(schema) = schema {
                    self.validate(object, schema, &mut findings);
                }
                self.business_rules(object, schema, &mut findings);
            }
            other => findings.push(Finding::new(
                FindingKind::UnexpectedStructure,
                Severity::Medium,
                format!("top-level value is {}, expected an object", type_name(other)),
            )),
        }
        self.check_lengths(&data, "$", &mut findings);

        let risk = mean_severity(&findings);
        let action = self.decide_action(risk, count_high(&findings));
        let schema_validated = schema.is_some()
            && !findings.iter().any(|f| {
                matches!(f.kind, FindingKind::FieldMissing | FindingKind::TypeMismatch)
            });

        let mut fields = Map::new();
        fields.insert("is_valid_json".into(), json!(true));
        fields.insert(
            "schema".into(),
            json!(schema.map(|s| s.name()).unwrap_or("none")),
        );
        fields.insert("schema_validated".into(), json!(schema_validated));
        if let Value::Object(object) = &data {
            for key in KEY_FIELDS {
                if let Some(v) = object.get(*key) {
                    fields.insert((*key).to_string(), v.clone());
                }
            }
            fields.insert("data_preview".into(), self.preview(object));
        }

        let mut metadata = Map::new();
        metadata.insert("anomaly_count".into(), json!(findings.len()));
        metadata.insert("high_severity_count".into(), json!(count_high(&findings)));
        metadata.insert("top_level_type".into(), json!(type_name(&data)));
        if let Value::Object(object) = &data {
            metadata.insert("field_count".into(), json!(object.len()));
        }

        debug!(
            schema = schema.map(|s| s.name()).unwrap_or("none"),
            anomalies = findings.len(),
            risk,
            action = %action,
            "JSON analyzed"
        );

        AnalysisResult::new(AgentKind::Json, fields, findings, risk, action).with_metadata(metadata)
    }

    fn validate(&self, object: &Map<String, Value>, schema: Schema, findings: &mut Vec<Finding>) {
        for (name, expected) in schema.fields() {
            match object.get(*name) {
                None => findings.push(
                    Finding::new(
                        FindingKind::FieldMissing,
                        Severity::High,
                        format!("missing required field '{name}'"),
                    )
                    .on_field(*name),
                ),
                Some(value) if !expected.matches(value) => findings.push(
                    Finding::new(
                        FindingKind::TypeMismatch,
                        Severity::Medium,
                        format!(
                            "field '{name}' should be {}, got {}",
                            expected.as_str(),
                            type_name(value)
                        ),
                    )
                    .on_field(*name),
                ),
                Some(_) => {}
            }
        }
    }

    fn business_rules(
        &self,
        object: &Map<String, Value>,
        schema: Option<Schema>,
        findings: &mut Vec<Finding>,
    ) {
        for name in AMOUNT_FIELDS {
            let Some(amount) = object.get(*name).and_then(Value::as_f64) else {
                continue;
            };
            if amount > self.rules.max_amount {
                findings.push(
                    Finding::new(
                        FindingKind::ValueOutOfRange,
                        Severity::High,
                        format!("{name} {amount} exceeds maximum {}", self.rules.max_amount),
                    )
                    .on_field(*name),
                );
            } else if amount < 0.0 {
                findings.push(
                    Finding::new(
                        FindingKind::ValueOutOfRange,
                        Severity::High,
                        format!("{name} {amount} is negative"),
                    )
                    .on_field(*name),
                );
            }
            if self
                .rules
                .suspicious_amounts
                .iter()
                .any(|s| (s - amount).abs() < 1e-9)
            {
                findings.push(
                    Finding::new(
                        FindingKind::SuspiciousPattern,
                        Severity::Medium,
                        format!("{name} {amount} matches a known test amount"),
                    )
                    .on_field(*name),
                );
            }
        }

        for name in IDENTIFIER_FIELDS {
            let Some(value) = object.get(*name).and_then(Value::as_str) else {
                continue;
            };
            let lower = value.to_lowercase();
            if let Some(hit) = self
                .rules
                .suspicious_substrings
                .iter()
                .find(|s| lower.contains(s.as_str()))
            {
                findings.push(
                    Finding::new(
                        FindingKind::SuspiciousPattern,
                        Severity::High,
                        format!("{name} '{value}' contains suspicious token '{hit}'"),
                    )
                    .on_field(*name),
                );
            }
        }

        if schema == Some(Schema::Transaction) {
            if let Some(flags) = object.get("flags").and_then(Value::as_array) {
                for flag in flags {
                    let allowed = flag
                        .as_str()
                        .is_some_and(|f| self.rules.allowed_transaction_flags.iter().any(|a| a == f));
                    if !allowed {
                        findings.push(
                            Finding::new(
                                FindingKind::UnexpectedValue,
                                Severity::Low,
                                format!("transaction flag {flag} is not recognised"),
                            )
                            .on_field("flags"),
                        );
                    }
                }
            }
        }
    }

    /// Flag every string longer than the limit, anywhere in the document.
    fn check_lengths(&self, value: &Value, path: &str, findings: &mut Vec<Finding>) {
        match value {
            Value::String(s) if s.chars().count() > self.rules.max_string_length => {
                findings.push(
                    Finding::new(
                        FindingKind::FieldTooLong,
                        Severity::Low,
                        format!(
                            "string of {} characters exceeds {}",
                            s.chars().count(),
                            self.rules.max_string_length
                        ),
                    )
                    .on_field(path),
                );
            }
            Value::Object(map) => {
                for (k, v) in map {
                    self.check_lengths(v, &format!("{path}.{k}"), findings);
                }
            }
            Value::Array(items) => {
                for (i, v) in items.iter().enumerate() {
                    self.check_lengths(v, &format!("{path}[{i}]"), findings);
                }
            }
            _ => {}
        }
    }

    fn decide_action(&self, risk: f64, high: usize) -> SuggestedAction {
        if risk >= 0.8 || high >= 2 {
            SuggestedAction::BlockAndAlert
        } else if risk >= 0.5 || high >= 1 {
            SuggestedAction::FlagForReview
        } else if risk >= 0.3 {
            SuggestedAction::LogWarning
        } else {
            SuggestedAction::ProcessNormally
        }
    }

    fn preview(&self, object: &Map<String, Value>) -> Value {
        let mut preview: Map<String, Value> = object
            .iter()
            .take(self.rules.preview_keys)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if object.len() > self.rules.preview_keys {
            preview.insert(
                "...".into(),
                json!(format!("{} more fields", object.len() - self.rules.preview_keys)),
            );
        }
        Value::Object(preview)
    }
}

impl Analyzer for JsonAnalyzer {
    fn kind(&self) -> AgentKind {
        AgentKind::Json
    }

    fn analyze(&self, content: &str) -> AnalysisResult {
        self.analyze_with_hint(content, None)
    }
}

fn invalid_json(error: &str) -> AnalysisResult {
    let mut fields = Map::new();
    fields.insert("is_valid_json".into(), json!(false));
    fields.insert("error".into(), json!(error));
    AnalysisResult::new(
        AgentKind::Json,
        fields,
        vec![Finding::new(
            FindingKind::InvalidJson,
            Severity::Critical,
            format!("invalid JSON: {error}"),
        )],
        1.0,
        SuggestedAction::BlockAndAlert,
    )
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer() -> JsonAnalyzer {
        JsonAnalyzer::new(JsonRules::default())
    }

    fn kinds(result: &AnalysisResult) -> Vec<FindingKind> {
        result.findings.iter().map(|f| f.kind).collect()
    }

    #[test]
    fn invalid_json_is_maximal_risk() {
        for input in ["{not json", "", r#"{"a": }"#] {
            let result = analyzer().analyze(input);
            assert_eq!(result.risk_score, 1.0);
            assert_eq!(result.suggested_action, SuggestedAction::BlockAndAlert);
            assert_eq!(kinds(&result), vec![FindingKind::InvalidJson]);
            assert_eq!(result.findings[0].severity, Severity::Critical);
        }
    }

    #[test]
    fn suspicious_transaction_is_flagged() {
        let input = r#"{"transaction_id":"T1","amount":15000,"user_id":"test_user","timestamp":"2024-01-15T00:00:00Z"}"#;
        let result = analyzer().analyze(input);
        assert_eq!(result.extracted_fields["schema"], "transaction");
        assert!(result.findings.iter().any(|f| {
            f.kind == FindingKind::ValueOutOfRange && f.field.as_deref() == Some("amount")
        }));
        assert!(result.findings.iter().any(|f| {
            f.kind == FindingKind::SuspiciousPattern && f.field.as_deref() == Some("user_id")
        }));
        assert!(result.risk_score >= 0.5);
        assert!(matches!(
            result.suggested_action,
            SuggestedAction::FlagForReview | SuggestedAction::BlockAndAlert
        ));
    }

    #[test]
    fn clean_transaction_processes_normally() {
        let input = r#"{"transaction_id":"TXN-1","amount":150.0,"user_id":"user_john","timestamp":"2024-01-15T10:30:00Z","currency":"USD"}"#;
        let result = analyzer().analyze(input);
        assert!(result.findings.is_empty());
        assert_eq!(result.risk_score, 0.0);
        assert_eq!(result.suggested_action, SuggestedAction::ProcessNormally);
        assert_eq!(result.extracted_fields["schema_validated"], true);
        assert_eq!(result.extracted_fields["currency"], "USD");
    }

    #[test]
    fn missing_and_mistyped_fields() {
        let input = r#"{"transaction_id":"T1","amount":"lots","timestamp":"2024-01-15"}"#;
        let result = analyzer().analyze(input);
        let missing = result
            .findings
            .iter()
            .find(|f| f.kind == FindingKind::FieldMissing)
            .unwrap();
        assert_eq!(missing.field.as_deref(), Some("user_id"));
        assert_eq!(missing.severity, Severity::High);
        let mismatch = result
            .findings
            .iter()
            .find(|f| f.kind == FindingKind::TypeMismatch)
            .unwrap();
        assert_eq!(mismatch.field.as_deref(), Some("amount"));
        assert_eq!(mismatch.severity, Severity::Medium);
        assert_eq!(result.extracted_fields["schema_validated"], false);
        assert_eq!(result.suggested_action, SuggestedAction::FlagForReview);
    }

    #[test]
    fn hint_overrides_inference() {
        let input = r#"{"transaction_id":"T1","amount":10}"#;
        let result = analyzer().analyze_with_hint(input, Some("order"));
        assert_eq!(result.extracted_fields["schema"], "order");
        assert_eq!(
            result
                .findings
                .iter()
                .filter(|f| f.kind == FindingKind::FieldMissing)
                .count(),
            3
        );
    }

    #[test]
    fn unknown_hint_is_medium_finding() {
        let result = analyzer().analyze_with_hint(r#"{"a":1}"#, Some("invoice"));
        assert_eq!(kinds(&result), vec![FindingKind::UnknownSchema]);
        assert_eq!(result.extracted_fields["schema"], "none");
        assert_eq!(result.suggested_action, SuggestedAction::LogWarning);
    }

    #[test]
    fn suspicious_amount_and_negative() {
        let result = analyzer().analyze(r#"{"order_id":"O1","customer_id":"c1","total":9999.99}"#);
        assert_eq!(kinds(&result), vec![FindingKind::SuspiciousPattern]);
        assert_eq!(result.suggested_action, SuggestedAction::LogWarning);

        let negative = analyzer().analyze(r#"{"price":-5}"#);
        assert_eq!(kinds(&negative), vec![FindingKind::ValueOutOfRange]);
        assert_eq!(negative.suggested_action, SuggestedAction::FlagForReview);
    }

    #[test]
    fn unknown_transaction_flags() {
        let input = r#"{"transaction_id":"T1","amount":10,"user_id":"u1","timestamp":"t","flags":["new_device","bogus"]}"#;
        let result = analyzer().analyze(input);
        assert_eq!(kinds(&result), vec![FindingKind::UnexpectedValue]);
        assert_eq!(result.findings[0].severity, Severity::Low);
        assert_eq!(result.suggested_action, SuggestedAction::ProcessNormally);
    }

    #[test]
    fn long_strings_are_flagged_with_path() {
        let long = "x".repeat(1001);
        let input = json!({"note": {"text": long}}).to_string();
        let result = analyzer().analyze(&input);
        assert_eq!(kinds(&result), vec![FindingKind::FieldTooLong]);
        assert_eq!(result.findings[0].field.as_deref(), Some("$.note.text"));
    }

    #[test]
    fn array_top_level_is_unexpected() {
        let result = analyzer().analyze("[1, 2, 3]");
        assert_eq!(kinds(&result), vec![FindingKind::UnexpectedStructure]);
        assert_eq!(result.metadata["top_level_type"], "array");
    }

    #[test]
    fn preview_marks_extra_fields() {
        let mut object = Map::new();
        for i in 0..12 {
            object.insert(format!("k{i}"), json!(i));
        }
        let result = analyzer().analyze(&Value::Object(object).to_string());
        let preview = result.extracted_fields["data_preview"].as_object().unwrap();
        assert_eq!(preview.len(), 11);
        assert_eq!(preview["..."], "2 more fields");
        assert!(preview.contains_key("k0"));
    }
}
