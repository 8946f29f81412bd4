//! # Habitrack Core Library
//!
//! Client-side logic for a habit tracker whose accounts, storage and change
//! notifications live in a backend-as-a-service (Appwrite).
//!
//! ## Architecture
//!
//! - **Session**: explicit identity context with init / sign-in / sign-out
//! - **Repositories**: owner-scoped habit and completion collections
//! - **Streaks**: once-per-local-day completion and streak increment
//! - **Realtime**: cancellable change subscriptions and refresh decisions
//! - **Board**: live in-memory view kept current by change notifications
//!
//! ## Key Components
//!
//! - [`HabitTracker`]: habit operations for the signed-in user
//! - [`Session`]: authentication state shared by everything else
//! - [`LiveBoard`]: habits plus today's completions, refreshed on change
//! - [`Backend`]: trait bundle implemented by [`AppwriteClient`] and [`MemoryBackend`]

pub mod backend;
pub mod board;
pub mod config;
pub mod credentials;
pub mod error;
pub mod model;
pub mod realtime;
pub mod repository;
pub mod session;
pub mod streak;
pub mod tracker;

pub use backend::{AppwriteClient, Backend, MemoryBackend, Query};
pub use board::LiveBoard;
pub use config::{BackendConfig, CollectionIds, Config};
pub use error::{ConfigError, CoreError, Result, ValidationError};
pub use model::{Completion, Frequency, Habit, HabitPatch, NewCompletion, NewHabit, User};
pub use realtime::{ChangeEvent, ChangeKind, RealtimeMessage, RefreshPlan, Subscription};
pub use session::{AuthState, Session};
pub use streak::{CompletionOutcome, CompletionPlan, DayWindow};
pub use tracker::{BoardSnapshot, HabitTracker};
