//! In-memory report store.

use std::collections::HashMap;

use tokio::sync::RwLock;

use ideascope_core::{Report, ReportId, ReportSummary};

/// Reports for the lifetime of the process.
#[derive(Default)]
pub struct ReportStore {
    reports: RwLock<HashMap<ReportId, Report>>,
}

impl ReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, report: Report) -> ReportId {
        let id = report.id.clone();
        self.reports.write().await.insert(id.clone(), report);
        id
    }

    /// Summaries, newest first.
    pub async fn list(&self) -> Vec<ReportSummary> {
        let reports = self.reports.read().await;
        let mut summaries: Vec<_> = reports.values().map(Report::summary).collect();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        summaries
    }

    pub async fn get(&self, id: &ReportId) -> Option<Report> {
        self.reports.read().await.get(id).cloned()
    }

    /// Returns false if there was no such report.
    pub async fn delete(&self, id: &ReportId) -> bool {
        self.reports.write().await.remove(id).is_some()
    }

    pub async fn count(&self) -> usize {
        self.reports.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use ideascope_core::{AnalysisOptions, RunResult, SessionId};

    fn report(idea: &str) -> Report {
        Report::new(
            idea,
            SessionId::generate(),
            AnalysisOptions::default(),
            RunResult {
                text: format!("report on {idea}"),
                interrupted: false,
                progress: 100,
                checkpoint_id: None,
                approval: None,
            },
        )
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let store = ReportStore::new();
        let mut older = report("older idea");
        older.created_at -= Duration::minutes(5);
        store.insert(older).await;
        let newer_id = store.insert(report("newer idea")).await;

        let listed = store.list().await;
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, newer_id);
        assert_eq!(listed[1].idea_excerpt, "older idea");
    }

    #[tokio::test]
    async fn test_get_and_delete() {
        let store = ReportStore::new();
        let id = store.insert(report("idea")).await;
        assert_eq!(store.get(&id).await.unwrap().result.text, "report on idea");

        assert!(store.delete(&id).await);
        assert!(!store.delete(&id).await);
        assert!(store.get(&id).await.is_none());
        assert_eq!(store.count().await, 0);
    }
}
