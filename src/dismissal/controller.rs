use std::sync::Arc;

use anyhow::Result;
use log::{error, info, warn};
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::alarms::{AlarmRecord, AlarmStore};
use crate::motion::{MotionOutcome, StretchVerifier};

use super::state::{DismissalSession, DismissalState, OperatorChoice, SideEffects};

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum DismissalEvent {
    StateChanged {
        session_id: Uuid,
        alarm_id: i64,
        state: DismissalState,
    },
    /// Input was not understood; show the same prompt again.
    Reprompt { session_id: Uuid, input: String },
    MotionResult {
        session_id: Uuid,
        outcome: MotionOutcome,
    },
    /// Stop the alarm sound.
    Silence { session_id: Uuid, alarm_id: i64 },
    /// The one-off alarm could not be consumed and may ring again.
    ConsumeFailed {
        session_id: Uuid,
        alarm_id: i64,
        error: String,
    },
}

/// Drives one [`DismissalSession`] and performs its side effects.
pub struct DismissalController {
    session: DismissalSession,
    store: Arc<dyn AlarmStore>,
    verifier: Arc<dyn StretchVerifier>,
    events: UnboundedSender<DismissalEvent>,
    abort: CancellationToken,
}

impl DismissalController {
    pub fn open(
        alarm: &AlarmRecord,
        store: Arc<dyn AlarmStore>,
        verifier: Arc<dyn StretchVerifier>,
        events: UnboundedSender<DismissalEvent>,
    ) -> Self {
        let controller = Self {
            session: DismissalSession::open(alarm),
            store,
            verifier,
            events,
            abort: CancellationToken::new(),
        };
        info!(
            "alarm {} ringing (session {})",
            alarm.id, controller.session.id
        );
        controller.emit_state();
        controller
    }

    pub fn session(&self) -> &DismissalSession {
        &self.session
    }

    pub fn state(&self) -> DismissalState {
        self.session.state
    }

    /// Cancelling this token aborts a running motion verification.
    pub fn abort_handle(&self) -> CancellationToken {
        self.abort.clone()
    }

    pub fn present(&mut self) -> Result<DismissalState> {
        self.session.present()?;
        self.emit_state();
        Ok(self.session.state)
    }

    pub async fn handle_input(&mut self, input: &str) -> Result<DismissalState> {
        let choice = OperatorChoice::parse(input);
        let effects = self.session.choose(&choice)?;

        if let OperatorChoice::Unrecognized(raw) = choice {
            warn!("unrecognised dismissal input {raw:?}");
            self.emit(DismissalEvent::Reprompt {
                session_id: self.session.id,
                input: raw,
            });
            return Ok(self.session.state);
        }

        self.emit_state();

        if effects.verify_motion {
            let outcome = self.verifier.verify(self.abort.child_token()).await;
            info!("session {} motion outcome: {outcome:?}", self.session.id);
            self.emit(DismissalEvent::MotionResult {
                session_id: self.session.id,
                outcome,
            });
            let effects = self.session.motion_finished(outcome)?;
            self.emit_state();
            self.apply(effects).await;
        } else {
            self.apply(effects).await;
        }

        Ok(self.session.state)
    }

    pub async fn acknowledge_fallback(&mut self) -> Result<DismissalState> {
        let effects = self.session.acknowledge_fallback()?;
        self.apply(effects).await;
        Ok(self.session.state)
    }

    async fn apply(&self, effects: SideEffects) {
        if effects.silence {
            info!(
                "alarm {} dismissed after {}s",
                self.session.alarm_id,
                self.session.elapsed().as_secs()
            );
            self.emit(DismissalEvent::Silence {
                session_id: self.session.id,
                alarm_id: self.session.alarm_id,
            });
        }

        if let Some(alarm_id) = effects.consume {
            if let Err(err) = self.store.mark_consumed(alarm_id).await {
                error!("failed to consume one-off alarm {alarm_id}: {err:#}");
                self.emit(DismissalEvent::ConsumeFailed {
                    session_id: self.session.id,
                    alarm_id,
                    error: format!("{err:#}"),
                });
            }
        }
    }

    fn emit_state(&self) {
        self.emit(DismissalEvent::StateChanged {
            session_id: self.session.id,
            alarm_id: self.session.alarm_id,
            state: self.session.state,
        });
    }

    fn emit(&self, event: DismissalEvent) {
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alarms::evaluator::parse_rows;
    use crate::db::models::{AlarmRow, MemoRow};
    use crate::dismissal::state::DismissMethod;
    use crate::motion::NotDetectedReason;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    #[derive(Default)]
    struct RecordingStore {
        consumed: Mutex<Vec<i64>>,
        fail: bool,
    }

    #[async_trait]
    impl AlarmStore for RecordingStore {
        async fn list_alarms(&self) -> Result<Vec<AlarmRow>> {
            Ok(Vec::new())
        }

        async fn mark_consumed(&self, alarm_id: i64) -> Result<()> {
            if self.fail {
                return Err(anyhow!("disk full"));
            }
            self.consumed.lock().unwrap().push(alarm_id);
            Ok(())
        }

        async fn list_memos(&self) -> Result<Vec<MemoRow>> {
            Ok(Vec::new())
        }
    }

    struct FixedVerifier {
        outcome: MotionOutcome,
        calls: AtomicUsize,
    }

    impl FixedVerifier {
        fn new(outcome: MotionOutcome) -> Arc<Self> {
            Arc::new(Self {
                outcome,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl StretchVerifier for FixedVerifier {
        async fn verify(&self, _cancel: CancellationToken) -> MotionOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcome
        }
    }

    fn alarm(one_off: bool) -> AlarmRecord {
        let row = AlarmRow {
            id: 9,
            time: "06:30".into(),
            label: Some("flight".into()),
            days: (!one_off).then(|| "0,6".to_string()),
            specific_date: one_off.then(|| "2024-03-10".to_string()),
            is_active: true,
            created_at: "2024-01-01 00:00:00".into(),
        };
        parse_rows(&[row]).0.remove(0)
    }

    fn drain(rx: &mut UnboundedReceiver<DismissalEvent>) -> Vec<DismissalEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn states(events: &[DismissalEvent]) -> Vec<DismissalState> {
        events
            .iter()
            .filter_map(|event| match event {
                DismissalEvent::StateChanged { state, .. } => Some(*state),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn manual_choice_never_invokes_detector() {
        let store = Arc::new(RecordingStore::default());
        let verifier = FixedVerifier::new(MotionOutcome::Confirmed);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut controller =
            DismissalController::open(&alarm(false), store.clone(), verifier.clone(), tx);
        controller.present().unwrap();
        let state = controller.handle_input("enter").await.unwrap();

        assert_eq!(state, DismissalState::Dismissed(DismissMethod::Manual));
        assert_eq!(verifier.calls.load(Ordering::SeqCst), 0);
        assert!(store.consumed.lock().unwrap().is_empty());

        let events = drain(&mut rx);
        assert_eq!(
            states(&events),
            vec![
                DismissalState::Ringing,
                DismissalState::AwaitingChoice,
                DismissalState::Dismissed(DismissMethod::Manual),
            ]
        );
        assert!(events
            .iter()
            .any(|event| matches!(event, DismissalEvent::Silence { alarm_id: 9, .. })));
    }

    #[tokio::test]
    async fn confirmed_motion_consumes_one_off() {
        let store = Arc::new(RecordingStore::default());
        let verifier = FixedVerifier::new(MotionOutcome::Confirmed);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut controller =
            DismissalController::open(&alarm(true), store.clone(), verifier.clone(), tx);
        controller.present().unwrap();

        assert_eq!(
            controller.handle_input("motion").await.unwrap(),
            DismissalState::Dismissed(DismissMethod::Motion)
        );
        assert_eq!(verifier.calls.load(Ordering::SeqCst), 1);
        assert_eq!(*store.consumed.lock().unwrap(), vec![9]);
        assert_eq!(
            states(&drain(&mut rx)),
            vec![
                DismissalState::Ringing,
                DismissalState::AwaitingChoice,
                DismissalState::VerifyingMotion,
                DismissalState::Dismissed(DismissMethod::Motion),
            ]
        );
    }

    #[tokio::test]
    async fn failed_motion_falls_back_to_manual() {
        let store = Arc::new(RecordingStore::default());
        let verifier = FixedVerifier::new(MotionOutcome::CameraUnavailable);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut controller =
            DismissalController::open(&alarm(true), store.clone(), verifier.clone(), tx);
        controller.present().unwrap();

        assert_eq!(
            controller.handle_input("motion").await.unwrap(),
            DismissalState::FallbackManual
        );
        assert!(store.consumed.lock().unwrap().is_empty());
        assert!(controller.handle_input("motion").await.is_err());
        assert_eq!(verifier.calls.load(Ordering::SeqCst), 1);

        controller.acknowledge_fallback().await.unwrap();
        assert!(controller.acknowledge_fallback().await.is_err());
        assert_eq!(*store.consumed.lock().unwrap(), vec![9]);

        let events = drain(&mut rx);
        assert!(events.contains(&DismissalEvent::MotionResult {
            session_id: controller.session().id,
            outcome: MotionOutcome::CameraUnavailable,
        }));
        assert_eq!(
            events
                .iter()
                .filter(|event| matches!(event, DismissalEvent::Silence { .. }))
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn unrecognized_input_keeps_waiting() {
        let store = Arc::new(RecordingStore::default());
        let verifier =
            FixedVerifier::new(MotionOutcome::NotDetected(NotDetectedReason::StreamEnded));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut controller = DismissalController::open(&alarm(false), store, verifier, tx);
        controller.present().unwrap();
        drain(&mut rx);

        assert_eq!(
            controller.handle_input("snooze").await.unwrap(),
            DismissalState::AwaitingChoice
        );
        assert_eq!(
            drain(&mut rx),
            vec![DismissalEvent::Reprompt {
                session_id: controller.session().id,
                input: "snooze".into(),
            }]
        );
    }

    #[tokio::test]
    async fn store_failure_still_silences() {
        let store = Arc::new(RecordingStore {
            fail: true,
            ..Default::default()
        });
        let verifier = FixedVerifier::new(MotionOutcome::Confirmed);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut controller = DismissalController::open(&alarm(true), store, verifier, tx);
        controller.present().unwrap();
        assert_eq!(
            controller.handle_input("").await.unwrap(),
            DismissalState::Dismissed(DismissMethod::Manual)
        );

        let events = drain(&mut rx);
        assert!(events
            .iter()
            .any(|event| matches!(event, DismissalEvent::Silence { .. })));
        assert!(events.iter().any(|event| matches!(
            event,
            DismissalEvent::ConsumeFailed { alarm_id: 9, error, .. } if error.contains("disk full")
        )));
    }
}
