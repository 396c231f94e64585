//! Format-specific analyzers.
//!
//! Each analyzer turns raw content into a fully populated `AnalysisResult`.
//! Malformed input becomes a maximal-risk finding, never an error.

pub mod email;
pub mod extract;
pub mod json;
pub mod pdf;

pub use email::EmailAnalyzer;
pub use extract::{PdfTextExtractor, TextExtractor, Utf8TextExtractor};
pub use json::JsonAnalyzer;
pub use pdf::PdfAnalyzer;

use crate::config::AppConfig;
use crate::pipeline::types::{AgentKind, AnalysisResult, DocumentFormat};

/// A format-specific analyzer.
pub trait Analyzer: Send + Sync {
    /// Which agent this analyzer reports as.
    fn kind(&self) -> AgentKind;

    /// Analyze raw content. Never fails.
    fn analyze(&self, content: &str) -> AnalysisResult;
}

/// One analyzer per routable format.
pub struct AnalyzerSet {
    pub email: EmailAnalyzer,
    pub json: JsonAnalyzer,
    pub pdf: PdfAnalyzer,
}

impl AnalyzerSet {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            email: EmailAnalyzer::new(config.email.clone()),
            json: JsonAnalyzer::new(config.json.clone()),
            pdf: PdfAnalyzer::new(config.pdf.clone()),
        }
    }

    /// The analyzer for `format`; `None` for `Unknown`.
    pub fn for_format(&self, format: DocumentFormat) -> Option<&dyn Analyzer> {
        match format {
            DocumentFormat::Email => Some(&self.email),
            DocumentFormat::Json => Some(&self.json),
            DocumentFormat::Pdf => Some(&self.pdf),
            DocumentFormat::Unknown => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_each_format_to_its_agent() {
        let set = AnalyzerSet::from_config(&AppConfig::default());
        for (format, agent) in [
            (DocumentFormat::Email, AgentKind::Email),
            (DocumentFormat::Json, AgentKind::Json),
            (DocumentFormat::Pdf, AgentKind::Pdf),
        ] {
            let analyzer = set.for_format(format).expect("routable format");
            assert_eq!(analyzer.kind(), agent);
        }
        assert!(set.for_format(DocumentFormat::Unknown).is_none());
    }
}
