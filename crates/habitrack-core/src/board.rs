//! Live view of a user's habits for one screen.
//!
//! The board re-fetches whatever a change notification makes stale and
//! replaces the list wholesale, so concurrent refreshes resolve as
//! last-write-wins. Closing the board bumps its epoch: refreshes that were
//! already in flight finish their fetches but are not applied.
//!
//! The completed set belongs to one local day. When that day ends the board
//! re-reads completions for the new day even if nothing changed.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::Result;
use crate::realtime::{refresh_for, RefreshPlan, Subscription, SubscriptionHandle};
use crate::streak::DayWindow;
use crate::tracker::{BoardSnapshot, HabitTracker};

/// Shortest wait before re-checking the day, also used after a failed rollover.
const ROLLOVER_RETRY: Duration = Duration::from_secs(1);

/// Snapshot holder that ignores writes from refreshes started before a close.
pub(crate) struct BoardCore {
    epoch: AtomicU64,
    closed: AtomicBool,
    state: watch::Sender<BoardSnapshot>,
}

impl BoardCore {
    pub(crate) fn new(initial: BoardSnapshot) -> Self {
        let (state, _) = watch::channel(initial);
        Self {
            epoch: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            state,
        }
    }

    /// Ticket for a refresh, or `None` once closed.
    pub(crate) fn begin(&self) -> Option<u64> {
        if self.closed.load(Ordering::SeqCst) {
            return None;
        }
        Some(self.epoch.load(Ordering::SeqCst))
    }

    /// Apply `update` if the board is still open in the ticket's epoch.
    pub(crate) fn apply<F>(&self, ticket: u64, update: F) -> bool
    where
        F: FnOnce(&mut BoardSnapshot),
    {
        if self.closed.load(Ordering::SeqCst) || self.epoch.load(Ordering::SeqCst) != ticket {
            return false;
        }
        self.state.send_modify(update);
        true
    }

    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn snapshot(&self) -> BoardSnapshot {
        self.state.borrow().clone()
    }
}

/// Fetch what `plan` asks for and apply it. Returns whether anything landed.
async fn run_refresh(core: &BoardCore, tracker: &HabitTracker, plan: RefreshPlan) -> Result<bool> {
    let Some(ticket) = core.begin() else {
        return Ok(false);
    };
    let mut applied = false;

    if plan.habits {
        let habits = tracker.habits().await?;
        if !core.apply(ticket, |s| s.habits = habits) {
            debug!("board closed during habit refresh");
            return Ok(false);
        }
        applied = true;
    }

    if plan.completions {
        let window = DayWindow::today();
        let done = tracker.completed_ids(&window).await?;
        if !core.apply(ticket, |s| {
            s.completed_today = done.into_iter().collect();
            s.window = window;
        }) {
            debug!("board closed during completion refresh");
            return Ok(false);
        }
        applied = true;
    }

    Ok(applied)
}

pub struct LiveBoard {
    core: Arc<BoardCore>,
    tracker: Arc<HabitTracker>,
    subscription: SubscriptionHandle,
    task: Option<JoinHandle<()>>,
}

impl LiveBoard {
    /// Load the board and start following habit and completion changes.
    pub async fn open(tracker: Arc<HabitTracker>) -> Result<Self> {
        let channels = vec![
            tracker.collections().habits_channel(),
            tracker.collections().completions_channel(),
        ];
        // Subscribe first so changes made while loading are still delivered.
        let subscription = tracker.session().subscribe(channels).await?;
        let handle = subscription.handle();
        let initial = tracker.snapshot().await?;
        let core = Arc::new(BoardCore::new(initial));

        let task = tokio::spawn(follow(core.clone(), tracker.clone(), subscription));

        Ok(Self {
            core,
            tracker,
            subscription: handle,
            task: Some(task),
        })
    }

    pub fn snapshot(&self) -> BoardSnapshot {
        self.core.snapshot()
    }

    /// Receiver notified after every applied refresh.
    pub fn changes(&self) -> watch::Receiver<BoardSnapshot> {
        self.core.state.subscribe()
    }

    /// Re-fetch everything now, e.g. after a user action.
    pub async fn refresh(&self) -> Result<bool> {
        run_refresh(
            &self.core,
            &self.tracker,
            RefreshPlan {
                habits: true,
                completions: true,
            },
        )
        .await
    }

    pub fn is_open(&self) -> bool {
        self.core.begin().is_some()
    }

    /// Stop following changes. Later refresh results are discarded.
    pub fn close(&mut self) {
        self.core.close();
        self.subscription.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for LiveBoard {
    fn drop(&mut self) {
        self.close();
    }
}

/// Time left until `window` ends, never shorter than [`ROLLOVER_RETRY`].
fn rollover_delay(window: &DayWindow, now: DateTime<Utc>) -> Duration {
    (window.end - now)
        .to_std()
        .unwrap_or(Duration::ZERO)
        .max(ROLLOVER_RETRY)
}

async fn follow(core: Arc<BoardCore>, tracker: Arc<HabitTracker>, mut subscription: Subscription) {
    loop {
        let window = core.snapshot().window;
        let plan = tokio::select! {
            message = subscription.recv() => match message {
                Some(message) => refresh_for(&message, tracker.collections()),
                None => break,
            },
            _ = tokio::time::sleep(rollover_delay(&window, Utc::now())) => {
                debug!(ended = %window.end, "day rolled over");
                RefreshPlan {
                    habits: false,
                    completions: true,
                }
            }
        };
        if plan.is_empty() {
            continue;
        }
        if let Err(e) = run_refresh(&core, &tracker, plan).await {
            warn!(error = %e, "board refresh failed");
        }
    }
    debug!("board stopped following changes");
}
