use serde::{Deserialize, Serialize};

/// Outcome of one produced unit, or of a whole file that produced none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Success,
    Skipped,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDetail {
    pub file_name: String,
    pub status: FileStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<i64>,
}

/// Result of one batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Configured source label.
    pub source: String,
    /// Candidate files found.
    pub total_files: usize,
    /// Files actually handled (less than `total_files` after cancellation).
    pub processed: usize,
    pub imported: usize,
    pub skipped: usize,
    pub errors: usize,
    pub details: Vec<FileDetail>,
}

impl BatchSummary {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Default::default()
        }
    }

    /// Append a detail and bump the matching counter.
    pub fn push(&mut self, detail: FileDetail) {
        match detail.status {
            FileStatus::Success => self.imported += 1,
            FileStatus::Skipped => self.skipped += 1,
            FileStatus::Error => self.errors += 1,
        }
        self.details.push(detail);
    }

    pub fn details_for<'a>(&'a self, file_name: &'a str) -> impl Iterator<Item = &'a FileDetail> {
        self.details.iter().filter(move |d| d.file_name == file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_follow_details() {
        let mut s = BatchSummary::new("inbox");
        for status in [FileStatus::Success, FileStatus::Success, FileStatus::Error] {
            s.push(FileDetail {
                file_name: "a.xml".into(),
                status,
                message: String::new(),
                document_id: None,
            });
        }
        assert_eq!((s.imported, s.skipped, s.errors), (2, 0, 1));
        assert_eq!(s.details_for("a.xml").count(), 3);
    }

    #[test]
    fn serializes_snake_case_status() {
        let d = FileDetail {
            file_name: "a.xml".into(),
            status: FileStatus::Skipped,
            message: "dup".into(),
            document_id: Some(4),
        };
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["status"], "skipped");
        assert_eq!(json["document_id"], 4);
    }
}
