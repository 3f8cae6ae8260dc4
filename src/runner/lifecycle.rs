use statig::prelude::*;

/// Where a validation request currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Created,
    ResolvingSecrets,
    Probing,
    Completed,
    Failed,
}

/// Why a request ended in `Failed`. Results are still delivered, all false.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    SecretResolution,
    TimedOut,
    Cancelled,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::SecretResolution => "secret_resolution",
            FailureReason::TimedOut => "timed_out",
            FailureReason::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    Start { needs_secrets: bool },
    SecretsResolved,
    ProbesFinished,
    Fail(FailureReason),
}

#[derive(Debug)]
pub struct ValidationLifecycle {
    correlation_id: String,
    phase: Phase,
    failure: Option<FailureReason>,
}

impl ValidationLifecycle {
    pub fn new(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            phase: Phase::Created,
            failure: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn failure(&self) -> Option<FailureReason> {
        self.failure
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.phase, Phase::Completed | Phase::Failed)
    }

    fn enter(&mut self, phase: Phase) {
        tracing::debug!(
            correlation_id = %self.correlation_id,
            from = ?self.phase,
            to = ?phase,
            "Validation phase change"
        );
        self.phase = phase;
    }

    fn fail(&mut self, reason: FailureReason) -> Outcome<State> {
        self.failure = Some(reason);
        self.enter(Phase::Failed);
        Transition(State::failed())
    }
}

#[state_machine(initial = "State::created()")]
impl ValidationLifecycle {
    #[state]
    fn created(&mut self, event: &LifecycleEvent) -> Outcome<State> {
        match event {
            LifecycleEvent::Start { needs_secrets: true } => {
                self.enter(Phase::ResolvingSecrets);
                Transition(State::resolving_secrets())
            }
            LifecycleEvent::Start { needs_secrets: false } => {
                self.enter(Phase::Probing);
                Transition(State::probing())
            }
            LifecycleEvent::Fail(reason) => self.fail(*reason),
            _ => Handled,
        }
    }

    #[state]
    fn resolving_secrets(&mut self, event: &LifecycleEvent) -> Outcome<State> {
        match event {
            LifecycleEvent::SecretsResolved => {
                self.enter(Phase::Probing);
                Transition(State::probing())
            }
            LifecycleEvent::Fail(reason) => self.fail(*reason),
            _ => Handled,
        }
    }

    #[state]
    fn probing(&mut self, event: &LifecycleEvent) -> Outcome<State> {
        match event {
            LifecycleEvent::ProbesFinished => {
                self.enter(Phase::Completed);
                Transition(State::completed())
            }
            LifecycleEvent::Fail(reason) => self.fail(*reason),
            _ => Handled,
        }
    }

    #[state]
    fn completed(&mut self, event: &LifecycleEvent) -> Outcome<State> {
        tracing::trace!(correlation_id = %self.correlation_id, ?event, "Ignoring event after completion");
        Handled
    }

    #[state]
    fn failed(&mut self, event: &LifecycleEvent) -> Outcome<State> {
        tracing::trace!(correlation_id = %self.correlation_id, ?event, "Ignoring event after failure");
        Handled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_with_secrets() {
        let mut sm = ValidationLifecycle::new("corr-1").state_machine();
        assert_eq!(sm.inner().phase(), Phase::Created);

        sm.handle(&LifecycleEvent::Start { needs_secrets: true });
        assert_eq!(sm.inner().phase(), Phase::ResolvingSecrets);

        sm.handle(&LifecycleEvent::SecretsResolved);
        assert_eq!(sm.inner().phase(), Phase::Probing);

        sm.handle(&LifecycleEvent::ProbesFinished);
        assert_eq!(sm.inner().phase(), Phase::Completed);
        assert!(sm.inner().is_terminal());
    }

    #[test]
    fn test_secretless_request_skips_resolution() {
        let mut sm = ValidationLifecycle::new("corr-2").state_machine();
        sm.handle(&LifecycleEvent::Start { needs_secrets: false });
        assert_eq!(sm.inner().phase(), Phase::Probing);
    }

    #[test]
    fn test_failure_is_terminal() {
        let mut sm = ValidationLifecycle::new("corr-3").state_machine();
        sm.handle(&LifecycleEvent::Start { needs_secrets: true });
        sm.handle(&LifecycleEvent::Fail(FailureReason::SecretResolution));
        assert_eq!(sm.inner().phase(), Phase::Failed);
        assert_eq!(sm.inner().failure(), Some(FailureReason::SecretResolution));

        sm.handle(&LifecycleEvent::SecretsResolved);
        sm.handle(&LifecycleEvent::ProbesFinished);
        assert_eq!(sm.inner().phase(), Phase::Failed);
    }

    #[test]
    fn test_out_of_order_events_are_ignored() {
        let mut sm = ValidationLifecycle::new("corr-4").state_machine();
        sm.handle(&LifecycleEvent::ProbesFinished);
        assert_eq!(sm.inner().phase(), Phase::Created);
    }
}
