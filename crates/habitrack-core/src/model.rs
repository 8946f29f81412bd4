//! Habit, completion and user records.
//!
//! Field names follow the backend document attributes (`user_id`,
//! `streak_count`, ...). Backend-managed fields use the `$`-prefixed names
//! Appwrite returns (`$id`, `$createdAt`, `$updatedAt`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// How often a habit is meant to be performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    #[default]
    Daily,
    Weekly,
    Monthly,
}

impl Frequency {
    pub const ALL: [Frequency; 3] = [Frequency::Daily, Frequency::Weekly, Frequency::Monthly];

    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Frequency::ALL
            .into_iter()
            .find(|f| f.as_str() == wanted)
            .ok_or_else(|| {
                let names: Vec<&str> = Frequency::ALL.iter().map(Frequency::as_str).collect();
                ValidationError::InvalidValue {
                    field: "frequency".to_string(),
                    message: format!("expected one of {}, got '{wanted}'", names.join(", ")),
                }
            })
    }
}

/// A user-defined recurring task with a running completion streak.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Habit {
    #[serde(rename = "$id")]
    pub id: String,
    pub user_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub frequency: Frequency,
    #[serde(default, deserialize_with = "lenient_count")]
    pub streak_count: u32,
    /// `None` for documents written without it.
    #[serde(default)]
    pub last_completed: Option<DateTime<Utc>>,
    #[serde(rename = "$createdAt", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(rename = "$updatedAt", default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Input for creating a habit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewHabit {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub frequency: Frequency,
}

impl NewHabit {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        frequency: Frequency,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            frequency,
        }
    }

    /// Title and description must both contain something besides whitespace.
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_text("title", &self.title)?;
        require_text("description", &self.description)
    }

    /// Document body for the habits collection. New habits start with a zero
    /// streak and `last_completed` set to creation time.
    pub fn to_document(&self, user_id: &str, now: DateTime<Utc>) -> serde_json::Value {
        serde_json::json!({
            "user_id": user_id,
            "title": self.title.trim(),
            "description": self.description.trim(),
            "frequency": self.frequency,
            "streak_count": 0,
            "last_completed": now,
        })
    }
}

/// Partial habit update. Unset fields are left untouched by the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HabitPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency: Option<Frequency>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub streak_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_completed: Option<DateTime<Utc>>,
}

impl HabitPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.frequency.is_none()
            && self.streak_count.is_none()
            && self.last_completed.is_none()
    }

    /// Edited text fields may not be blanked out.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(title) = &self.title {
            require_text("title", title)?;
        }
        if let Some(description) = &self.description {
            require_text("description", description)?;
        }
        Ok(())
    }

    /// Apply the patch to a local copy, mirroring what the backend does.
    pub fn apply_to(&self, habit: &mut Habit) {
        if let Some(title) = &self.title {
            habit.title = title.clone();
        }
        if let Some(description) = &self.description {
            habit.description = description.clone();
        }
        if let Some(frequency) = self.frequency {
            habit.frequency = frequency;
        }
        if let Some(streak_count) = self.streak_count {
            habit.streak_count = streak_count;
        }
        if let Some(last_completed) = self.last_completed {
            habit.last_completed = Some(last_completed);
        }
    }
}

/// Immutable record that a habit was performed at a given time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    #[serde(rename = "$id")]
    pub id: String,
    pub user_id: String,
    pub habit_id: String,
    pub completed_at: DateTime<Utc>,
}

/// A completion that has not been written yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCompletion {
    pub user_id: String,
    pub habit_id: String,
    pub completed_at: DateTime<Utc>,
}

/// Authenticated account as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "$id")]
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
}

fn require_text(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::EmptyField {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Older habit documents stored `streak_count` as a string attribute.
fn lenient_count<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Count {
        Number(u32),
        Text(String),
    }

    match Count::deserialize(deserializer)? {
        Count::Number(n) => Ok(n),
        Count::Text(s) if s.trim().is_empty() => Ok(0),
        Count::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}
