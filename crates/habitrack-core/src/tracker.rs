//! Habit operations on behalf of the signed-in user.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::CollectionIds;
use crate::error::Result;
use crate::model::{Completion, Habit, HabitPatch, NewHabit};
use crate::repository::{CompletionRepository, HabitRepository};
use crate::session::Session;
use crate::streak::{completed_habit_ids, plan_completion, CompletionOutcome, CompletionPlan, DayWindow};

/// Habits plus which of them are done today.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoardSnapshot {
    pub habits: Vec<Habit>,
    pub completed_today: BTreeSet<String>,
    pub window: DayWindow,
}

impl BoardSnapshot {
    pub fn empty(window: DayWindow) -> Self {
        Self {
            habits: Vec::new(),
            completed_today: BTreeSet::new(),
            window,
        }
    }

    pub fn is_completed_today(&self, habit_id: &str) -> bool {
        self.completed_today.contains(habit_id)
    }
}

pub struct HabitTracker {
    session: Arc<Session>,
    collections: CollectionIds,
    habits: HabitRepository,
    completions: CompletionRepository,
}

impl HabitTracker {
    pub fn new(session: Arc<Session>, collections: CollectionIds) -> Self {
        let backend = session.backend().clone();
        Self {
            habits: HabitRepository::new(backend.clone(), collections.habits.clone()),
            completions: CompletionRepository::new(backend, collections.completions.clone()),
            session,
            collections,
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn collections(&self) -> &CollectionIds {
        &self.collections
    }

    pub async fn habits(&self) -> Result<Vec<Habit>> {
        let user = self.session.require_user()?;
        self.habits.list(&user.id).await
    }

    pub async fn habit(&self, id: &str) -> Result<Habit> {
        let user = self.session.require_user()?;
        self.habits.get(&user.id, id).await
    }

    pub async fn create_habit(&self, new: &NewHabit) -> Result<Habit> {
        let user = self.session.require_user()?;
        let habit = self.habits.create(&user.id, new, Utc::now()).await?;
        info!(habit_id = %habit.id, "habit created");
        Ok(habit)
    }

    pub async fn update_habit(&self, id: &str, patch: &HabitPatch) -> Result<Habit> {
        let user = self.session.require_user()?;
        self.habits.update(&user.id, id, patch).await
    }

    pub async fn delete_habit(&self, id: &str) -> Result<()> {
        let user = self.session.require_user()?;
        self.habits.delete(&user.id, id).await?;
        info!(habit_id = id, "habit deleted");
        Ok(())
    }

    pub async fn completions_since(&self, since: DateTime<Utc>) -> Result<Vec<Completion>> {
        let user = self.session.require_user()?;
        self.completions.list_since(&user.id, since).await
    }

    pub async fn completions_in(&self, window: &DayWindow) -> Result<Vec<Completion>> {
        let user = self.session.require_user()?;
        self.completions.list_in(&user.id, window).await
    }

    pub async fn completions_today(&self) -> Result<Vec<Completion>> {
        self.completions_in(&DayWindow::today()).await
    }

    /// Ids of habits with a completion in `window`.
    pub async fn completed_ids(&self, window: &DayWindow) -> Result<HashSet<String>> {
        let completions = self.completions_in(window).await?;
        Ok(completed_habit_ids(&completions, window))
    }

    /// Mark a habit done now, in the local day.
    pub async fn complete_habit(&self, id: &str) -> Result<CompletionOutcome> {
        let (window, now) = DayWindow::current();
        self.complete_habit_in(id, window, now).await
    }

    /// Mark a habit done at `now`, treating `window` as today.
    ///
    /// Writes the completion record first and the streak second. If the
    /// second write fails the completion stays and the streak is one behind;
    /// nothing is rolled back or retried.
    pub async fn complete_habit_in(
        &self,
        id: &str,
        window: DayWindow,
        now: DateTime<Utc>,
    ) -> Result<CompletionOutcome> {
        let user = self.session.require_user()?;
        let habit = self.habits.get(&user.id, id).await?;
        let done_today: HashSet<String> =
            if self.completions.exists_in(&user.id, id, &window).await? {
                [habit.id.clone()].into()
            } else {
                HashSet::new()
            };

        match plan_completion(&habit, &done_today, &user.id, now) {
            CompletionPlan::AlreadyCompletedToday => {
                info!(habit_id = id, "already completed today");
                Ok(CompletionOutcome::AlreadyCompleted { habit })
            }
            CompletionPlan::Record {
                completion, patch, ..
            } => {
                let completion = self.completions.create(&completion).await?;
                let habit = self.habits.write_patch(id, &patch).await.map_err(|e| {
                    warn!(
                        habit_id = id,
                        completion_id = %completion.id,
                        error = %e,
                        "completion recorded but streak update failed"
                    );
                    e
                })?;
                info!(habit_id = id, streak = habit.streak_count, "habit completed");
                Ok(CompletionOutcome::Completed { habit, completion })
            }
        }
    }

    /// Current habits and today's completed set.
    pub async fn snapshot_in(&self, window: DayWindow) -> Result<BoardSnapshot> {
        let habits = self.habits().await?;
        let completed_today = self.completed_ids(&window).await?.into_iter().collect();
        Ok(BoardSnapshot {
            habits,
            completed_today,
            window,
        })
    }

    pub async fn snapshot(&self) -> Result<BoardSnapshot> {
        self.snapshot_in(DayWindow::today()).await
    }
}
