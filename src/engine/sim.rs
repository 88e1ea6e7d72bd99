//! In-process speech engine with failure injection.
//!
//! [`SimulatedEngine`] keeps a FIFO of `(id, text)` pairs.  Nothing is spoken;
//! the driver calls [`SimulatedEngine::finish_next`] to "play" the head of the
//! queue and gets back the utterance id that a real engine would report in its
//! completion callback.
//!
//! Failure injection mirrors what the platform bridge does in the field:
//! append calls intermittently reject while the engine itself stays able to
//! accept direct speech.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{EngineError, SpeechEngine};

#[derive(Debug, Default)]
struct SimState {
    queue: VecDeque<(String, String)>,
    failing_appends: u32,
    failing_speaks: u32,
    append_calls: u32,
    speak_now_calls: u32,
    stop_calls: u32,
}

/// Thread-safe simulated engine.
#[derive(Debug, Default)]
pub struct SimulatedEngine {
    state: Mutex<SimState>,
}

impl SimulatedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` append calls fail with [`EngineError::Rejected`].
    pub fn fail_next_appends(&self, n: u32) {
        self.with(|s| s.failing_appends = n);
    }

    /// Make the next `n` speak-now calls fail with [`EngineError::Rejected`].
    pub fn fail_next_speaks(&self, n: u32) {
        self.with(|s| s.failing_speaks = n);
    }

    /// Pop the head of the queue, returning its utterance id.
    pub fn finish_next(&self) -> Option<String> {
        self.with(|s| s.queue.pop_front().map(|(id, _)| id))
    }

    /// Id of the utterance currently at the head of the queue.
    pub fn peek_next(&self) -> Option<String> {
        self.with(|s| s.queue.front().map(|(id, _)| id.clone()))
    }

    /// Ids currently queued, head first.
    pub fn queued_ids(&self) -> Vec<String> {
        self.with(|s| s.queue.iter().map(|(id, _)| id.clone()).collect())
    }

    pub fn append_calls(&self) -> u32 {
        self.with(|s| s.append_calls)
    }

    pub fn speak_now_calls(&self) -> u32 {
        self.with(|s| s.speak_now_calls)
    }

    pub fn stop_calls(&self) -> u32 {
        self.with(|s| s.stop_calls)
    }

    /// Drop queued utterances without reporting them (e.g. simulate the
    /// engine draining while the host was asleep).
    pub fn drain_silently(&self, n: usize) {
        self.with(|s| {
            for _ in 0..n {
                if s.queue.pop_front().is_none() {
                    break;
                }
            }
        });
    }

    fn with<R>(&self, f: impl FnOnce(&mut SimState) -> R) -> R {
        // A poisoned lock only means a test panicked mid-call; the queue is
        // still usable.
        let mut guard = match self.state.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }
}

#[async_trait]
impl SpeechEngine for SimulatedEngine {
    async fn append_to_queue(
        &self,
        texts: &[String],
        ids: &[String],
    ) -> Result<bool, EngineError> {
        self.with(|s| {
            s.append_calls += 1;
            if s.failing_appends > 0 {
                s.failing_appends -= 1;
                return Err(EngineError::Rejected("simulated append failure".into()));
            }
            s.queue
                .extend(ids.iter().cloned().zip(texts.iter().cloned()));
            Ok(true)
        })
    }

    async fn speak_now(&self, texts: &[String], ids: &[String]) -> Result<usize, EngineError> {
        self.with(|s| {
            s.speak_now_calls += 1;
            if s.failing_speaks > 0 {
                s.failing_speaks -= 1;
                return Err(EngineError::Rejected("simulated speak failure".into()));
            }
            s.queue.clear();
            s.queue
                .extend(ids.iter().cloned().zip(texts.iter().cloned()));
            Ok(texts.len())
        })
    }

    async fn queue_depth(&self) -> Result<usize, EngineError> {
        Ok(self.with(|s| s.queue.len()))
    }

    async fn stop(&self) -> Result<(), EngineError> {
        self.with(|s| {
            s.stop_calls += 1;
            s.queue.clear();
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn append_then_finish_in_order() {
        let engine = SimulatedEngine::new();
        engine
            .append_to_queue(&strings(&["a", "b"]), &strings(&["id0", "id1"]))
            .await
            .unwrap();

        assert_eq!(engine.queue_depth().await.unwrap(), 2);
        assert_eq!(engine.finish_next().as_deref(), Some("id0"));
        assert_eq!(engine.finish_next().as_deref(), Some("id1"));
        assert_eq!(engine.finish_next(), None);
    }

    #[tokio::test]
    async fn injected_append_failures_are_consumed() {
        let engine = SimulatedEngine::new();
        engine.fail_next_appends(1);

        let texts = strings(&["a"]);
        let ids = strings(&["id0"]);
        assert!(engine.append_to_queue(&texts, &ids).await.is_err());
        assert!(engine.append_to_queue(&texts, &ids).await.unwrap());
        assert_eq!(engine.append_calls(), 2);
    }

    #[tokio::test]
    async fn speak_now_replaces_queue() {
        let engine = SimulatedEngine::new();
        engine
            .append_to_queue(&strings(&["old"]), &strings(&["old0"]))
            .await
            .unwrap();
        engine
            .speak_now(&strings(&["new"]), &strings(&["new0"]))
            .await
            .unwrap();

        assert_eq!(engine.queued_ids(), vec!["new0".to_string()]);
    }
}
