use chrono::{DateTime, Local};
use serde::Serialize;
use std::time::Instant;
use uuid::Uuid;

use crate::alarms::AlarmRecord;
use crate::motion::MotionOutcome;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum DismissMethod {
    Manual,
    Motion,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum DismissalState {
    Ringing,
    AwaitingChoice,
    VerifyingMotion,
    Dismissed(DismissMethod),
    /// Motion verification failed; only a manual acknowledgement remains.
    FallbackManual,
}

impl DismissalState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DismissalState::Dismissed(_) | DismissalState::FallbackManual)
    }
}

/// Operator input while the prompt is showing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorChoice {
    Manual,
    Motion,
    Unrecognized(String),
}

impl OperatorChoice {
    /// `enter` (or an empty line) acknowledges manually, `motion` asks for a
    /// stretch check.
    pub fn parse(input: &str) -> Self {
        match input.trim().to_ascii_lowercase().as_str() {
            "" | "enter" | "manual" => OperatorChoice::Manual,
            "motion" | "stretch" => OperatorChoice::Motion,
            other => OperatorChoice::Unrecognized(other.to_string()),
        }
    }
}

/// What a transition asks of the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SideEffects {
    /// Stop the alarm sound.
    pub silence: bool,
    /// Mark this one-off alarm consumed in the store.
    pub consume: Option<i64>,
    /// Start a stretch verification.
    pub verify_motion: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: DismissalState,
    pub action: &'static str,
}

impl std::fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cannot {} while {:?}", self.action, self.from)
    }
}

impl std::error::Error for InvalidTransition {}

/// One ringing event. Holds a copy of the alarm id only, so the alarm can be
/// deleted while the session is open.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DismissalSession {
    pub id: Uuid,
    pub alarm_id: i64,
    pub one_off: bool,
    pub state: DismissalState,
    /// Set once the fallback prompt has been acknowledged.
    pub acknowledged: bool,
    pub opened_at: DateTime<Local>,
    #[serde(skip)]
    pub opened_instant: Instant,
}

impl DismissalSession {
    pub fn open(alarm: &AlarmRecord) -> Self {
        Self {
            id: Uuid::new_v4(),
            alarm_id: alarm.id,
            one_off: alarm.is_one_off(),
            state: DismissalState::Ringing,
            acknowledged: false,
            opened_at: Local::now(),
            opened_instant: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.opened_instant.elapsed()
    }

    fn invalid(&self, action: &'static str) -> InvalidTransition {
        InvalidTransition {
            from: self.state,
            action,
        }
    }

    fn dismiss(&mut self, method: DismissMethod) -> SideEffects {
        self.state = DismissalState::Dismissed(method);
        SideEffects {
            silence: true,
            consume: self.one_off.then_some(self.alarm_id),
            verify_motion: false,
        }
    }

    /// Ringing → AwaitingChoice once the alert is on screen.
    pub fn present(&mut self) -> Result<(), InvalidTransition> {
        match self.state {
            DismissalState::Ringing => {
                self.state = DismissalState::AwaitingChoice;
                Ok(())
            }
            _ => Err(self.invalid("present the alert")),
        }
    }

    /// Unrecognised input leaves the state untouched and asks for nothing.
    pub fn choose(&mut self, choice: &OperatorChoice) -> Result<SideEffects, InvalidTransition> {
        if self.state != DismissalState::AwaitingChoice {
            return Err(self.invalid("take a choice"));
        }

        Ok(match choice {
            OperatorChoice::Manual => self.dismiss(DismissMethod::Manual),
            OperatorChoice::Motion => {
                self.state = DismissalState::VerifyingMotion;
                SideEffects {
                    verify_motion: true,
                    ..SideEffects::default()
                }
            }
            OperatorChoice::Unrecognized(_) => SideEffects::default(),
        })
    }

    pub fn motion_finished(
        &mut self,
        outcome: MotionOutcome,
    ) -> Result<SideEffects, InvalidTransition> {
        if self.state != DismissalState::VerifyingMotion {
            return Err(self.invalid("finish motion verification"));
        }

        Ok(match outcome {
            MotionOutcome::Confirmed => self.dismiss(DismissMethod::Motion),
            MotionOutcome::NotDetected(_) | MotionOutcome::CameraUnavailable => {
                self.state = DismissalState::FallbackManual;
                SideEffects::default()
            }
        })
    }

    /// Manual acknowledgement offered after a failed motion check. The state
    /// stays `FallbackManual`; the alarm is silenced and consumed as for a
    /// manual dismissal. Accepted once per session.
    pub fn acknowledge_fallback(&mut self) -> Result<SideEffects, InvalidTransition> {
        if self.state != DismissalState::FallbackManual || self.acknowledged {
            return Err(self.invalid("acknowledge the fallback"));
        }
        self.acknowledged = true;
        Ok(SideEffects {
            silence: true,
            consume: self.one_off.then_some(self.alarm_id),
            verify_motion: false,
        })
    }
}
