//! What is known about one physical document, keyed by its content hash.

use crate::storage::{self, locator_path, parent_folder};
use serde::{Deserialize, Serialize};

const SUMMARY_PREVIEW_CHARS: usize = 100;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileMetadata {
    pub sha256: String,
    pub original_filename: Option<String>,
    pub file_size: Option<u64>,
    /// `scheme:root:path` of the inbox copy.
    pub src_uri: Option<String>,
    pub src_uri_display: Option<String>,
    pub title: Option<String>,
    pub entity: Option<String>,
    pub summary: Option<String>,
    pub confidence: Option<u8>,
    pub reporting_year: Option<i32>,
    pub document_date: Option<String>,
    pub suggested_path: Option<String>,
    pub dst_uri: Option<String>,
    pub dst_uri_display: Option<String>,
    pub copied: bool,
}

fn pick<T: Clone + Present>(old: &Option<T>, new: &Option<T>) -> Option<T> {
    match new {
        Some(v) if v.present() => Some(v.clone()),
        _ => old.clone().filter(Present::present),
    }
}

trait Present {
    fn present(&self) -> bool;
}

impl Present for String {
    fn present(&self) -> bool {
        !self.trim().is_empty()
    }
}

macro_rules! always_present {
    ($($t:ty),*) => {
        $(impl Present for $t {
            fn present(&self) -> bool {
                true
            }
        })*
    };
}

always_present!(u8, u64, i32);

impl FileMetadata {
    pub fn new(sha256: impl Into<String>) -> Self {
        Self {
            sha256: sha256.into(),
            ..Self::default()
        }
    }

    /// Combines an earlier observation with a newer one of the same file.
    /// Each field takes the newer value when it carries one, otherwise keeps
    /// the older value; `copied` never goes back to false.
    pub fn merge(&self, newer: &FileMetadata) -> FileMetadata {
        debug_assert_eq!(self.sha256, newer.sha256, "cannot merge different files");
        FileMetadata {
            sha256: self.sha256.clone(),
            original_filename: pick(&self.original_filename, &newer.original_filename),
            file_size: pick(&self.file_size, &newer.file_size),
            src_uri: pick(&self.src_uri, &newer.src_uri),
            src_uri_display: pick(&self.src_uri_display, &newer.src_uri_display),
            title: pick(&self.title, &newer.title),
            entity: pick(&self.entity, &newer.entity),
            summary: pick(&self.summary, &newer.summary),
            confidence: pick(&self.confidence, &newer.confidence),
            reporting_year: pick(&self.reporting_year, &newer.reporting_year),
            document_date: pick(&self.document_date, &newer.document_date),
            suggested_path: pick(&self.suggested_path, &newer.suggested_path),
            dst_uri: pick(&self.dst_uri, &newer.dst_uri),
            dst_uri_display: pick(&self.dst_uri_display, &newer.dst_uri_display),
            copied: self.copied || newer.copied,
        }
    }

    pub fn dst_path(&self) -> Option<&str> {
        self.dst_uri.as_deref().and_then(locator_path)
    }

    pub fn dst_folder(&self) -> Option<&str> {
        self.dst_path().map(parent_folder)
    }

    pub fn src_path(&self) -> Option<&str> {
        self.src_uri.as_deref().and_then(locator_path)
    }

    /// File name from the source locator, else the recorded original name.
    pub fn filename(&self) -> Option<&str> {
        self.src_path()
            .map(storage::file_name)
            .or(self.original_filename.as_deref())
    }

    pub fn title_with_year(&self) -> Option<String> {
        let title = self.title.as_deref()?;
        Some(match self.reporting_year {
            Some(year) => format!("{title} {year}"),
            None => title.to_string(),
        })
    }

    pub fn display_lines(&self) -> Vec<String> {
        let mut lines = vec![format!(
            "file: {}",
            self.original_filename.as_deref().unwrap_or("unknown")
        )];
        if let Some(title) = self.title_with_year() {
            lines.push(format!("title: {title}"));
        }
        if let Some(entity) = &self.entity {
            lines.push(format!("entity: {entity}"));
        }
        if let Some(path) = &self.suggested_path {
            let pct = u32::from(self.confidence.unwrap_or(0)) * 10;
            lines.push(format!("path ({pct}%): {path}"));
        }
        if let Some(summary) = &self.summary {
            lines.push(format!(
                "summary: {}",
                crate::papersort::util::truncate_with_ellipsis(summary, SUMMARY_PREVIEW_CHARS)
            ));
        }
        if let Some(dst) = &self.dst_uri_display {
            lines.push(format!("location: {dst}"));
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn record() -> FileMetadata {
        FileMetadata {
            original_filename: Some("scan.pdf".into()),
            title: Some("Bank Statement".into()),
            reporting_year: Some(2024),
            ..FileMetadata::new("abcd")
        }
    }

    #[test]
    fn merge_prefers_newer_values_and_keeps_missing_ones() {
        let old = record();
        let newer = FileMetadata {
            title: Some("Statement".into()),
            summary: Some("Monthly statement".into()),
            entity: Some("".into()),
            ..FileMetadata::new("abcd")
        };
        let merged = old.merge(&newer);
        assert_eq!(merged.title.as_deref(), Some("Statement"));
        assert_eq!(merged.summary.as_deref(), Some("Monthly statement"));
        assert_eq!(merged.original_filename.as_deref(), Some("scan.pdf"));
        assert_eq!(merged.reporting_year, Some(2024));
        assert_eq!(merged.entity, None);
    }

    #[test]
    fn copied_is_sticky() {
        let copied = FileMetadata {
            copied: true,
            dst_uri: Some("local:/d:Financial/Banking/x.pdf".into()),
            ..record()
        };
        let merged = copied.merge(&record());
        assert!(merged.copied);
        assert_eq!(merged.dst_folder(), Some("Financial/Banking"));
    }

    #[test]
    fn locator_accessors() {
        let meta = FileMetadata {
            src_uri: Some("local:/inbox:2024/scan 1.pdf".into()),
            dst_uri: Some("local:/store:Statement.pdf".into()),
            ..FileMetadata::new("abcd")
        };
        assert_eq!(meta.src_path(), Some("2024/scan 1.pdf"));
        assert_eq!(meta.filename(), Some("scan 1.pdf"));
        assert_eq!(meta.dst_folder(), Some(""));
        assert_eq!(FileMetadata::new("x").filename(), None);
    }

    fn opt_field(value: &'static str) -> impl Strategy<Value = Option<String>> {
        prop_oneof![Just(None), Just(Some(String::new())), Just(Some(value.to_string()))]
    }

    prop_compose! {
        fn observation()(
            title in opt_field("Statement"),
            entity in opt_field("Chase"),
            summary in opt_field("Monthly"),
            suggested_path in opt_field("Financial/Banking"),
            confidence in proptest::option::of(Just(7u8)),
            reporting_year in proptest::option::of(Just(2024i32)),
            file_size in proptest::option::of(Just(1024u64)),
            copied in any::<bool>(),
        ) -> FileMetadata {
            FileMetadata {
                title,
                entity,
                summary,
                suggested_path,
                confidence,
                reporting_year,
                file_size,
                copied,
                ..FileMetadata::new("abcd")
            }
        }
    }

    proptest! {
        #[test]
        fn merge_is_idempotent(a in observation(), b in observation()) {
            let ab = a.merge(&b);
            prop_assert_eq!(a.merge(&ab), ab.clone());
            prop_assert_eq!(ab.merge(&ab), ab);
        }

        #[test]
        fn merge_commutes_without_conflicting_values(a in observation(), b in observation()) {
            prop_assert_eq!(a.merge(&b), b.merge(&a));
        }

        #[test]
        fn merge_is_associative(a in observation(), b in observation(), c in observation()) {
            prop_assert_eq!(a.merge(&b).merge(&c), a.merge(&b.merge(&c)));
        }
    }
}
