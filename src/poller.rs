//! Periodic due-alarm evaluation.
//!
//! Every tick builds a fresh [`PollSnapshot`] from the store, evaluates it,
//! and forwards non-empty results over a channel. The snapshot is dropped at
//! the end of the tick; only [`PollState`] (the fired-cache and the last
//! reported warning set) outlives it.

use std::{sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate, NaiveDateTime};
use log::{info, warn};
use tokio::sync::mpsc::{error::TrySendError, Sender};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::alarms::{
    evaluator::{due_records, parse_rows},
    projections, AlarmRecord, AlarmStore, DataQualityWarning, FiredCache,
};
use crate::db::models::MemoRow;
use crate::memos;

/// Records and memos as read at one instant.
#[derive(Debug, Clone)]
pub struct PollSnapshot {
    pub now: NaiveDateTime,
    pub alarms: Vec<AlarmRecord>,
    pub warnings: Vec<DataQualityWarning>,
    pub memos: Vec<MemoRow>,
}

impl PollSnapshot {
    pub async fn load(store: &dyn AlarmStore, now: NaiveDateTime) -> Result<Self> {
        let rows = store.list_alarms().await.context("failed to list alarms")?;
        let memos = match store.list_memos().await {
            Ok(memos) => memos,
            Err(err) => {
                warn!("memos unavailable this tick: {err:#}");
                Vec::new()
            }
        };
        let (alarms, warnings) = parse_rows(&rows);
        Ok(Self {
            now,
            alarms,
            warnings,
            memos,
        })
    }

    pub fn today(&self) -> NaiveDate {
        self.now.date()
    }

    pub fn due(&self, cache: &mut FiredCache) -> Vec<AlarmRecord> {
        due_records(self.now, self.alarms.clone(), cache)
    }

    pub fn regular_alarms(&self) -> Vec<AlarmRecord> {
        projections::regular_alarms_for(self.today(), &self.alarms)
    }

    pub fn upcoming_one_off(&self) -> Vec<AlarmRecord> {
        projections::upcoming_one_off(self.today(), &self.alarms)
    }

    pub fn regular_memo(&self) -> Option<&str> {
        memos::regular_memo(&self.memos)
    }

    pub fn today_memo(&self) -> Option<&str> {
        memos::today_memo(self.today(), &self.memos)
    }
}

#[derive(Debug, Clone)]
pub enum PollEvent {
    /// Alarms that became due this tick, oldest first.
    Due {
        alarms: Vec<AlarmRecord>,
        regular_memo: Option<String>,
        today_memo: Option<String>,
    },
    DataQuality(Vec<DataQualityWarning>),
}

/// State carried from one tick to the next.
#[derive(Debug, Default)]
pub struct PollState {
    pub fired: FiredCache,
    reported: Vec<DataQualityWarning>,
}

impl PollState {
    pub fn new() -> Self {
        Self::default()
    }
}

pub struct AlarmPoller {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl AlarmPoller {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    pub fn start(
        &mut self,
        store: Arc<dyn AlarmStore>,
        interval: Duration,
        events: Sender<PollEvent>,
    ) -> Result<()> {
        if self.handle.is_some() {
            bail!("alarm poller already running");
        }
        if interval.is_zero() {
            bail!("poll interval must be greater than zero");
        }

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(poll_loop(store, interval, events, cancel_token.clone()));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("alarm poller task failed to join")
        } else {
            Ok(())
        }
    }
}

impl Default for AlarmPoller {
    fn default() -> Self {
        Self::new()
    }
}

async fn poll_loop(
    store: Arc<dyn AlarmStore>,
    interval: Duration,
    events: Sender<PollEvent>,
    cancel_token: CancellationToken,
) {
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut state = PollState::new();

    info!("alarm poller started ({}ms cadence)", interval.as_millis());
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = Local::now().naive_local();
                if !poll_once(store.as_ref(), now, &mut state, &events).await {
                    break;
                }
            }
            _ = cancel_token.cancelled() => {
                info!("alarm poller shutting down");
                break;
            }
        }
    }
}

/// One evaluation pass. Returns `false` once nobody is listening.
///
/// Warnings are reported only when the set changes and never wait for room
/// in the channel, so a persistently bad row cannot stall due evaluation.
pub async fn poll_once(
    store: &dyn AlarmStore,
    now: NaiveDateTime,
    state: &mut PollState,
    events: &Sender<PollEvent>,
) -> bool {
    let snapshot = match PollSnapshot::load(store, now).await {
        Ok(snapshot) => snapshot,
        Err(err) => {
            warn!("alarm poll skipped: {err:#}");
            return true;
        }
    };

    if snapshot.warnings != state.reported {
        state.reported = snapshot.warnings.clone();
        if !state.reported.is_empty() {
            match events.try_send(PollEvent::DataQuality(state.reported.clone())) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!(
                        "{} data-quality warning(s) not delivered; caller busy",
                        state.reported.len()
                    );
                }
                Err(TrySendError::Closed(_)) => return false,
            }
        }
    }

    let due = snapshot.due(&mut state.fired);
    if due.is_empty() {
        return true;
    }

    info!(
        "{} alarm(s) due at {}",
        due.len(),
        snapshot.now.format("%Y-%m-%d %H:%M")
    );
    events
        .send(PollEvent::Due {
            alarms: due,
            regular_memo: snapshot.regular_memo().map(str::to_string),
            today_memo: snapshot.today_memo().map(str::to_string),
        })
        .await
        .is_ok()
}
