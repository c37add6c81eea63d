//! Scripted analyzer for testing.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::analysis::{AnalysisError, Analyzer, TicketAnalysis};

/// What the analyzer does on one call.
#[derive(Debug, Clone)]
pub enum Script {
    /// Return this analysis.
    Ok(TicketAnalysis),
    /// Fail with this error.
    Err(AnalysisError),
    /// Never return; exercises the caller's timeout.
    Hang,
    /// Panic inside the call.
    Panic,
    /// Return an analysis that fails validation (sentiment out of range).
    Invalid,
}

/// A recorded analysis request for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub title: String,
    pub description: String,
}

/// Mock implementation of the Analyzer trait.
///
/// Queued steps run first, in order; once exhausted every call plays the
/// fallback step.
///
/// # Example
///
/// ```rust,ignore
/// use triage_core::testing::{fixtures, Script, ScriptedAnalyzer};
///
/// // Time out twice, then succeed.
/// let analyzer = ScriptedAnalyzer::always(Script::Ok(fixtures::analysis()))
///     .then(Script::Hang)
///     .then(Script::Hang);
/// ```
#[derive(Debug)]
pub struct ScriptedAnalyzer {
    steps: Mutex<VecDeque<Script>>,
    fallback: Script,
    calls: Mutex<Vec<RecordedCall>>,
    call_count: AtomicUsize,
}

impl ScriptedAnalyzer {
    /// Play `step` on every call.
    pub fn always(step: Script) -> Self {
        Self {
            steps: Mutex::new(VecDeque::new()),
            fallback: step,
            calls: Mutex::new(Vec::new()),
            call_count: AtomicUsize::new(0),
        }
    }

    /// Queue a one-shot step ahead of the fallback.
    pub fn then(self, step: Script) -> Self {
        self.push(step);
        self
    }

    /// Queue a one-shot step on a shared analyzer.
    pub fn push(&self, step: Script) {
        self.steps
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(step);
    }

    /// Number of `analyze` calls so far.
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    pub fn recorded_calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn next_step(&self) -> Script {
        self.steps
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl Analyzer for ScriptedAnalyzer {
    fn provider(&self) -> &str {
        "scripted"
    }

    async fn analyze(
        &self,
        title: &str,
        description: &str,
    ) -> Result<TicketAnalysis, AnalysisError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(RecordedCall {
                title: title.to_string(),
                description: description.to_string(),
            });

        match self.next_step() {
            Script::Ok(analysis) => Ok(analysis),
            Script::Err(e) => Err(e),
            Script::Hang => futures::future::pending().await,
            Script::Panic => panic!("scripted analyzer panic"),
            Script::Invalid => Ok(TicketAnalysis {
                sentiment: 0,
                ..super::fixtures::analysis()
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;

    #[tokio::test]
    async fn test_steps_then_fallback() {
        let analyzer = ScriptedAnalyzer::always(Script::Ok(fixtures::analysis()))
            .then(Script::Err(AnalysisError::Provider("down".to_string())));

        assert!(analyzer.analyze("a", "b").await.is_err());
        assert!(analyzer.analyze("a", "b").await.is_ok());
        assert!(analyzer.analyze("c", "d").await.is_ok());

        assert_eq!(analyzer.call_count(), 3);
        assert_eq!(analyzer.recorded_calls()[2].title, "c");
    }

    #[tokio::test]
    async fn test_invalid_fails_validation() {
        let analyzer = ScriptedAnalyzer::always(Script::Invalid);
        let analysis = analyzer.analyze("a", "b").await.unwrap();
        assert!(analysis.validate().is_err());
    }
}
