use super::{AnalysisRequest, Classifier, DocumentAnalysis};

/// Classifier that never calls out. Every document falls back to the
/// unsortable folder and only case-insensitive equal names match.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineClassifier;

impl Classifier for OfflineClassifier {
    fn name(&self) -> &str {
        "offline"
    }

    fn analyze_document(
        &self,
        request: &AnalysisRequest<'_>,
        _path_is_valid: &dyn Fn(&str) -> bool,
    ) -> Option<DocumentAnalysis> {
        tracing::debug!("offline classifier skipping {}", request.pdf_path.display());
        None
    }

    fn compare_names(&self, a: &str, b: &str) -> bool {
        a.trim().eq_ignore_ascii_case(b.trim())
    }

    fn find_duplicate_pair(&self, _names: &[String]) -> Option<(String, String)> {
        None
    }

    fn find_matching_folder(&self, _new_name: &str, _existing: &[String]) -> Option<String> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn offline_classifier_is_inert() {
        let c = OfflineClassifier;
        let request = AnalysisRequest {
            pdf_path: Path::new("a.pdf"),
            layout_text: "",
            hint: "",
            inbox_path: "",
        };
        assert_eq!(c.analyze_document(&request, &|_| true), None);
        assert!(c.compare_names("Chase ", "CHASE"));
        assert!(!c.compare_names("Chase", "JPMorgan"));
        assert_eq!(c.find_duplicate_pair(&["A".into(), "a".into()]), None);
    }
}
