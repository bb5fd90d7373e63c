use crate::progress::ProgressState;
use crate::types::Phase;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SideEffect {
    NotifyCompletion { title: String, body: String },
    SignalRefresh,
}

/// Fires the run-completed effects once per file that reaches a terminal
/// phase. Clearing the remembered label is what disarms the trigger.
#[derive(Debug, Clone)]
pub struct SideEffectDispatcher {
    last_phase: Phase,
    last_label: Option<String>,
    notifications_enabled: bool,
}

impl Default for SideEffectDispatcher {
    fn default() -> Self {
        Self::new(true)
    }
}

impl SideEffectDispatcher {
    pub fn new(notifications_enabled: bool) -> Self {
        Self {
            last_phase: Phase::Idle,
            last_label: None,
            notifications_enabled,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.last_label.is_some()
    }

    pub fn on_progress_state(&mut self, next: &ProgressState) -> Vec<SideEffect> {
        let mut effects = Vec::new();
        if next.phase.is_terminal() {
            if let Some(label) = self.last_label.take() {
                if self.notifications_enabled {
                    effects.push(SideEffect::NotifyCompletion {
                        title: "Download complete".to_string(),
                        body: label,
                    });
                }
                effects.push(SideEffect::SignalRefresh);
            }
        } else if next.label.is_some() {
            self.last_label = next.label.clone();
        }
        self.last_phase = next.phase;
        effects
    }

    /// Forgets the file in flight without firing, used on cancellation.
    pub fn disarm(&mut self) {
        self.last_phase = Phase::Idle;
        self.last_label = None;
    }

    pub fn last_phase(&self) -> Phase {
        self.last_phase
    }
}
