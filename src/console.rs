//! Terminal front end: rings due alarms and walks the operator through
//! dismissal.

use std::{io::Write, sync::Arc};

use anyhow::{bail, Context, Result};
use log::{error, info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::{self, Receiver, UnboundedReceiver};

use crate::alarms::{AlarmRecord, AlarmStore};
use crate::audio::AudioEngineHandle;
use crate::dismissal::{DismissalController, DismissalEvent, DismissalState};
use crate::motion::{MotionOutcome, NotDetectedReason, StretchVerifier};
use crate::poller::PollEvent;
use crate::settings::AlarmSettings;

/// Sound output as seen by the console.
pub trait Ringer: Send + Sync {
    fn ring(&self);
    fn silence(&self);
}

pub struct ChimeRinger {
    engine: AudioEngineHandle,
    settings: AlarmSettings,
}

impl ChimeRinger {
    pub fn new(engine: AudioEngineHandle, settings: AlarmSettings) -> Self {
        Self { engine, settings }
    }
}

impl Ringer for ChimeRinger {
    fn ring(&self) {
        if let Err(err) = self.engine.ring(self.settings.chime_hz, self.settings.volume) {
            warn!("alarm sound failed: {err:#}");
        }
    }

    fn silence(&self) {
        if let Err(err) = self.engine.silence() {
            warn!("failed to silence alarm: {err:#}");
        }
    }
}

/// Forwards stdin lines into a channel so they can be raced against other
/// work. The channel closes at end of input.
pub fn spawn_stdin_lines() -> Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if tx.send(line).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    warn!("stdin read failed: {err}");
                    break;
                }
            }
        }
    });
    rx
}

pub struct Console<W: Write> {
    store: Arc<dyn AlarmStore>,
    verifier: Arc<dyn StretchVerifier>,
    ringer: Arc<dyn Ringer>,
    input: Receiver<String>,
    out: W,
}

impl<W: Write> Console<W> {
    pub fn new(
        store: Arc<dyn AlarmStore>,
        verifier: Arc<dyn StretchVerifier>,
        ringer: Arc<dyn Ringer>,
        input: Receiver<String>,
        out: W,
    ) -> Self {
        Self {
            store,
            verifier,
            ringer,
            input,
            out,
        }
    }

    /// Serves poll events until the poller goes away.
    pub async fn serve(&mut self, mut events: Receiver<PollEvent>) -> Result<()> {
        while let Some(event) = events.recv().await {
            match event {
                PollEvent::Due {
                    alarms,
                    regular_memo,
                    today_memo,
                } => {
                    for alarm in &alarms {
                        self.show_alarm(alarm, regular_memo.as_deref(), today_memo.as_deref())?;
                        // One failed session must not swallow the rest of the batch.
                        if let Err(err) = self.ring_session(alarm).await {
                            error!("alarm {} session failed: {err:#}", alarm.id);
                        }
                    }
                }
                PollEvent::DataQuality(warnings) => {
                    for warning in warnings {
                        warn!("{warning}");
                    }
                }
            }
        }
        Ok(())
    }

    fn show_alarm(
        &mut self,
        alarm: &AlarmRecord,
        regular_memo: Option<&str>,
        today_memo: Option<&str>,
    ) -> Result<()> {
        writeln!(self.out)?;
        match &alarm.label {
            Some(label) => writeln!(self.out, "⏰ {}  {label}", alarm.display_time())?,
            None => writeln!(self.out, "⏰ {}", alarm.display_time())?,
        }
        if let Some(memo) = regular_memo {
            writeln!(self.out, "   memo: {memo}")?;
        }
        if let Some(memo) = today_memo {
            writeln!(self.out, "   today: {memo}")?;
        }
        Ok(())
    }

    /// One full ringing episode. Returns the final state.
    pub async fn ring_session(&mut self, alarm: &AlarmRecord) -> Result<DismissalState> {
        let (tx, mut events) = mpsc::unbounded_channel();
        let mut controller = DismissalController::open(
            alarm,
            Arc::clone(&self.store),
            Arc::clone(&self.verifier),
            tx,
        );
        self.ringer.ring();
        controller.present()?;
        self.drain(&mut events)?;

        while controller.state() == DismissalState::AwaitingChoice {
            writeln!(
                self.out,
                "Press Enter to stop, or type 'motion' to stop with a stretch:"
            )?;
            let line = self.next_line().await?;

            if line.trim().eq_ignore_ascii_case("motion") {
                writeln!(self.out, "Stretch in front of the camera ('abort' to give up)...")?;
                self.verify_with_abort(&mut controller, &line).await?;
            } else {
                controller.handle_input(&line).await?;
            }
            self.drain(&mut events)?;
        }

        if controller.state() == DismissalState::FallbackManual {
            writeln!(self.out, "Stretch not confirmed. Press Enter to stop the alarm.")?;
            self.next_line().await?;
            controller.acknowledge_fallback().await?;
            self.drain(&mut events)?;
        }

        info!(
            "alarm {} finished in state {:?}",
            alarm.id,
            controller.state()
        );
        Ok(controller.state())
    }

    async fn verify_with_abort(
        &mut self,
        controller: &mut DismissalController,
        line: &str,
    ) -> Result<()> {
        let abort = controller.abort_handle();
        let verification = controller.handle_input(line);
        tokio::pin!(verification);

        let mut input_open = true;
        loop {
            tokio::select! {
                biased;
                result = &mut verification => {
                    result?;
                    return Ok(());
                }
                next = self.input.recv(), if input_open => match next {
                    Some(typed) if typed.trim().eq_ignore_ascii_case("abort") => {
                        info!("operator aborted stretch verification");
                        abort.cancel();
                    }
                    Some(_) => {}
                    None => input_open = false,
                },
            }
        }
    }

    async fn next_line(&mut self) -> Result<String> {
        match self.input.recv().await {
            Some(line) => Ok(line),
            None => {
                self.ringer.silence();
                bail!("operator input closed while an alarm was ringing");
            }
        }
    }

    fn drain(&mut self, events: &mut UnboundedReceiver<DismissalEvent>) -> Result<()> {
        while let Ok(event) = events.try_recv() {
            match event {
                DismissalEvent::Silence { .. } => {
                    self.ringer.silence();
                    writeln!(self.out, "Alarm stopped.")?;
                }
                DismissalEvent::Reprompt { input, .. } => {
                    writeln!(self.out, "Unrecognised input {input:?}.")?;
                }
                DismissalEvent::MotionResult { outcome, .. } => {
                    writeln!(self.out, "{}", describe_outcome(outcome))?;
                }
                DismissalEvent::ConsumeFailed { alarm_id, error, .. } => {
                    writeln!(
                        self.out,
                        "Warning: alarm {alarm_id} could not be retired and may ring again ({error})."
                    )?;
                }
                DismissalEvent::StateChanged { .. } => {}
            }
        }
        self.out.flush().context("failed to flush console output")
    }
}

fn describe_outcome(outcome: MotionOutcome) -> &'static str {
    match outcome {
        MotionOutcome::Confirmed => "Stretch confirmed.",
        MotionOutcome::CameraUnavailable => "Camera unavailable.",
        MotionOutcome::NotDetected(NotDetectedReason::Cancelled) => "Stretch check aborted.",
        MotionOutcome::NotDetected(NotDetectedReason::TimedOut) => "Stretch check timed out.",
        MotionOutcome::NotDetected(_) => "No stretch detected.",
    }
}
