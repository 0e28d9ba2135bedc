// Sweep Events
// Progress reporting and event types for sweep execution

use crate::stages::{Stage, StageResult};
use crate::sweep::report::SweepSummary;
use crate::sweep::tuple::ParameterTuple;

use tokio::sync::mpsc;

/// Sender for sweep progress events
pub type ProgressSender = mpsc::UnboundedSender<SweepEvent>;

/// Receiver for sweep progress events
pub type ProgressReceiver = mpsc::UnboundedReceiver<SweepEvent>;

/// Create a new progress channel
pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}

/// Events emitted while a sweep runs
#[derive(Debug, Clone)]
pub enum SweepEvent {
    /// Sweep over one stage started
    SweepStarted { stage: Stage, total: usize },

    /// Task passed preflight and waits for a worker slot
    TaskQueued {
        stage: Stage,
        index: usize,
        tuple: ParameterTuple,
    },

    /// Task acquired a worker slot and its engine is being spawned
    TaskStarted {
        stage: Stage,
        index: usize,
        tuple: ParameterTuple,
    },

    /// Task resolved without spawning a process
    TaskSkipped { index: usize, result: StageResult },

    /// Task finished after running (or trying to run) its engine
    TaskFinished { index: usize, result: StageResult },

    /// Engine output line, only sent when live output is enabled
    TaskOutput {
        stage: Stage,
        tuple: ParameterTuple,
        line: String,
        is_error: bool,
    },

    /// Sweep over one stage finished
    SweepCompleted { summary: SweepSummary },
}

impl SweepEvent {
    pub fn task_queued(stage: Stage, index: usize, tuple: &ParameterTuple) -> Self {
        Self::TaskQueued {
            stage,
            index,
            tuple: tuple.clone(),
        }
    }

    pub fn task_started(stage: Stage, index: usize, tuple: &ParameterTuple) -> Self {
        Self::TaskStarted {
            stage,
            index,
            tuple: tuple.clone(),
        }
    }
}

/// Helper trait for sending events, ignoring errors (fire-and-forget)
pub trait EventSender {
    fn send_event(&self, event: SweepEvent);
}

impl EventSender for ProgressSender {
    fn send_event(&self, event: SweepEvent) {
        let _ = self.send(event);
    }
}

impl EventSender for Option<ProgressSender> {
    fn send_event(&self, event: SweepEvent) {
        if let Some(sender) = self {
            let _ = sender.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sweep::tuple::{PhysicsModel, Scenario};

    fn tuple() -> ParameterTuple {
        ParameterTuple {
            distance: 15,
            double_planes: 8,
            energy: 600,
            relative_energy: 100,
            neutrons: 1,
            physics: PhysicsModel::Inclxx,
            scenario: Scenario::Vacuum,
        }
    }

    #[tokio::test]
    async fn test_progress_channel() {
        let (tx, mut rx) = progress_channel();

        tx.send_event(SweepEvent::SweepStarted {
            stage: Stage::Simulate,
            total: 2,
        });
        tx.send_event(SweepEvent::task_queued(Stage::Simulate, 0, &tuple()));

        let event1 = rx.recv().await.unwrap();
        assert!(matches!(event1, SweepEvent::SweepStarted { total: 2, .. }));

        let event2 = rx.recv().await.unwrap();
        assert!(matches!(event2, SweepEvent::TaskQueued { index: 0, .. }));
    }

    #[test]
    fn test_optional_sender() {
        let sender: Option<ProgressSender> = None;
        // Should not panic
        sender.send_event(SweepEvent::task_started(Stage::Train, 3, &tuple()));
    }

    #[test]
    fn test_closed_receiver_is_ignored() {
        let (tx, rx) = progress_channel();
        drop(rx);
        tx.send_event(SweepEvent::task_started(Stage::Train, 0, &tuple()));
    }
}
