//! Joint termination coordination.
//!
//! Some plugins have a natural end to their work while the stream keeps
//! flowing (analyze N packets, extract one table, ...). Joint termination
//! lets a quorum of such stages end the whole pipeline: every stage whose
//! plugin opts in registers here, and once all opted-in stages have
//! reported termination the pipeline is stopped gracefully. Stages that
//! do not opt in have no effect on the decision.
//!
//! Only atomic counters are shared; there is no lock domain.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Tracks which opted-in stages have finished.
#[derive(Debug)]
pub struct JointTermination {
    /// False when `ignore_jt` disables the mechanism entirely.
    enabled: bool,
    opted_in: AtomicUsize,
    terminated: AtomicUsize,
}

impl JointTermination {
    /// Create a coordinator. `ignore_jt` disables joint termination: the
    /// pipeline then runs until external abort or natural input
    /// exhaustion.
    pub fn new(ignore_jt: bool) -> Self {
        Self {
            enabled: !ignore_jt,
            opted_in: AtomicUsize::new(0),
            terminated: AtomicUsize::new(0),
        }
    }

    /// Register one stage. Called for every stage while the pipeline is
    /// built, before any stage runs.
    pub fn register(&self, opted_in: bool) {
        if opted_in {
            self.opted_in.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Report that an opted-in stage has terminated. Must be called at
    /// most once per stage.
    ///
    /// Returns `true` when this report completes the quorum: all
    /// opted-in stages are now terminated and the caller should stop the
    /// pipeline.
    pub fn mark_terminated(&self) -> bool {
        let done = self.terminated.fetch_add(1, Ordering::SeqCst) + 1;
        let quorum = self.opted_in.load(Ordering::SeqCst);
        self.enabled && quorum > 0 && done >= quorum
    }

    /// Number of stages that opted in.
    pub fn opted_in(&self) -> usize {
        self.opted_in.load(Ordering::SeqCst)
    }

    /// Number of opted-in stages already terminated.
    pub fn terminated(&self) -> usize {
        self.terminated.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quorum_of_two() {
        let jt = JointTermination::new(false);
        jt.register(true);
        jt.register(true);
        jt.register(false);
        assert_eq!(jt.opted_in(), 2);

        // One of two terminated: pipeline keeps running.
        assert!(!jt.mark_terminated());
        // Second one completes the quorum.
        assert!(jt.mark_terminated());
        assert_eq!(jt.terminated(), 2);
    }

    #[test]
    fn test_single_opted_in_stage() {
        let jt = JointTermination::new(false);
        jt.register(false);
        jt.register(true);
        jt.register(false);

        assert!(jt.mark_terminated());
    }

    #[test]
    fn test_ignore_jt_disables_decision() {
        let jt = JointTermination::new(true);
        jt.register(true);

        // Terminations are still counted but never complete a quorum.
        assert!(!jt.mark_terminated());
        assert_eq!(jt.terminated(), 1);
    }

    #[test]
    fn test_no_opted_in_stages() {
        let jt = JointTermination::new(false);
        jt.register(false);
        assert_eq!(jt.opted_in(), 0);
    }
}
