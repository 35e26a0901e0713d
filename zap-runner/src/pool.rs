//! Fan-out of one transform over independent files.
//!
//! Every file gets its own job on a dedicated rayon pool; the call returns
//! once all jobs are done. A failing file is logged and reported in the
//! summary, it never stops its siblings.

use rayon::prelude::*;
use serde::Serialize;

use crate::steps::StepError;

/// Outcome of a fan-out: rows affected per succeeded file, and the error of
/// every failed one, both in input order.
#[derive(Debug, Default)]
pub struct PoolReport {
    pub succeeded: Vec<(String, usize)>,
    pub failed: Vec<(String, StepError)>,
}

/// Printable form of a `PoolReport`.
#[derive(Debug, Clone, Serialize)]
pub struct PoolSummary {
    pub succeeded: Vec<(String, usize)>,
    pub failed: Vec<(String, String)>,
}

impl PoolReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn summary(&self) -> PoolSummary {
        PoolSummary {
            succeeded: self.succeeded.clone(),
            failed: self
                .failed
                .iter()
                .map(|(f, e)| (f.clone(), e.to_string()))
                .collect(),
        }
    }
}

/// Run `job` for every file on a pool of `threads` workers.
///
/// `label` names the step in log lines.
pub fn for_each_file<F>(
    label: &str,
    files: &[String],
    threads: usize,
    job: F,
) -> Result<PoolReport, StepError>
where
    F: Fn(&str) -> Result<usize, StepError> + Sync,
{
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .build()?;

    let results: Vec<(String, Result<usize, StepError>)> = pool.install(|| {
        files
            .par_iter()
            .map(|file| (file.clone(), job(file)))
            .collect()
    });

    let mut report = PoolReport::default();
    for (file, result) in results {
        match result {
            Ok(n) => {
                tracing::info!(step = label, file = %file, rows = n, "done");
                report.succeeded.push((file, n));
            }
            Err(e) => {
                tracing::error!(step = label, file = %file, "failed: {e}");
                report.failed.push((file, e));
            }
        }
    }
    tracing::info!(
        step = label,
        "{}/{} files succeeded",
        report.succeeded.len(),
        files.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use zap_core::prune::PruneError;

    fn files(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn every_file_runs_once() {
        let calls = AtomicUsize::new(0);
        let report = for_each_file("test", &files(&["a", "bb", "ccc"]), 2, |f| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(f.len())
        })
        .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(report.is_success());
        assert_eq!(
            report.succeeded,
            vec![("a".into(), 1), ("bb".into(), 2), ("ccc".into(), 3)]
        );
    }

    #[test]
    fn failure_does_not_stop_siblings() {
        let report = for_each_file("test", &files(&["ok1", "bad", "ok2"]), 3, |f| {
            if f == "bad" {
                Err(StepError::Prune(PruneError::InvalidCount {
                    path: f.into(),
                    found: "x".into(),
                }))
            } else {
                Ok(0)
            }
        })
        .unwrap();
        assert!(!report.is_success());
        assert_eq!(report.succeeded.len(), 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "bad");
        assert_eq!(report.summary().failed[0].0, "bad");
    }

    #[test]
    fn zero_threads_still_runs() {
        let report = for_each_file("test", &files(&["a"]), 0, |_| Ok(7)).unwrap();
        assert_eq!(report.succeeded, vec![("a".into(), 7)]);
    }

    #[test]
    fn empty_file_list() {
        let report = for_each_file("test", &[], 4, |_| Ok(1)).unwrap();
        assert!(report.is_success());
        assert!(report.succeeded.is_empty());
    }
}
