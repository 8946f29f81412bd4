//! Structured change events and refresh decisions.
//!
//! Backend event strings look like
//! `databases.<db>.collections.<collection>.documents.<doc>.<create|update|delete>`.
//! A single push usually carries both the concrete form and the wildcard form
//! (`databases.*.collections.*.documents.*.create`), so the collection is
//! taken from concrete events when present and from the channel otherwise.

use serde::{Deserialize, Serialize};

use super::RealtimeMessage;
use crate::config::CollectionIds;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Create,
    Update,
    Delete,
}

impl ChangeKind {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "create" => Some(ChangeKind::Create),
            "update" => Some(ChangeKind::Update),
            "delete" => Some(ChangeKind::Delete),
            _ => None,
        }
    }
}

/// One document change. Wildcard segments are kept as `*`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub database: String,
    pub collection: String,
    pub document: String,
    pub kind: ChangeKind,
}

impl ChangeEvent {
    /// Parse a document event string. Anything else (account events,
    /// attribute events, events without an action suffix) yields `None`.
    pub fn parse(event: &str) -> Option<Self> {
        let parts: Vec<&str> = event.split('.').collect();
        match parts.as_slice() {
            ["databases", database, "collections", collection, "documents", document, action] => {
                Some(Self {
                    database: (*database).to_string(),
                    collection: (*collection).to_string(),
                    document: (*document).to_string(),
                    kind: ChangeKind::parse(action)?,
                })
            }
            _ => None,
        }
    }

    pub fn is_wildcard(&self) -> bool {
        self.database == "*" || self.collection == "*"
    }
}

/// All document events in a message, concrete and wildcard alike.
pub fn change_events(message: &RealtimeMessage) -> Vec<ChangeEvent> {
    message
        .events
        .iter()
        .filter_map(|e| ChangeEvent::parse(e))
        .collect()
}

/// Which lists a message makes stale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RefreshPlan {
    pub habits: bool,
    pub completions: bool,
}

impl RefreshPlan {
    pub fn is_empty(&self) -> bool {
        !self.habits && !self.completions
    }
}

/// Decide what to re-fetch for `message`.
///
/// Only create/update/delete pushes for the configured database count. Habit
/// changes of any kind refresh the habit list; completion records are only
/// ever created, so only creates refresh the completed-today set.
pub fn refresh_for(message: &RealtimeMessage, ids: &CollectionIds) -> RefreshPlan {
    let events = change_events(message);
    if events.is_empty() {
        return RefreshPlan::default();
    }

    let mut plan = RefreshPlan::default();
    let concrete: Vec<&ChangeEvent> = events.iter().filter(|e| !e.is_wildcard()).collect();

    if concrete.is_empty() {
        let kinds: Vec<ChangeKind> = events.iter().map(|e| e.kind).collect();
        for channel in &message.channels {
            if *channel == ids.habits_channel() {
                plan.habits = true;
            } else if *channel == ids.completions_channel()
                && kinds.contains(&ChangeKind::Create)
            {
                plan.completions = true;
            }
        }
        return plan;
    }

    for event in concrete {
        if event.database != ids.database_id {
            continue;
        }
        if event.collection == ids.habits {
            plan.habits = true;
        } else if event.collection == ids.completions && event.kind == ChangeKind::Create {
            plan.completions = true;
        }
    }
    plan
}
