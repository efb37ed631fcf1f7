//! Core of daybook: the client-side sync layer for events and todos.
//!
//! - `gateway` scopes document store calls to the signed-in principal
//! - `store` holds the session's cached collections
//! - `session` follows the identity provider and drives loads and clears
//! - `views` derives presentation data from a store snapshot
//!
//! [`Daybook`] bundles all of them into one context object.

pub mod clock;
pub mod config;
pub mod daybook;
pub mod error;
pub mod event;
pub mod gateway;
pub mod identity;
pub mod principal;
pub mod remote;
pub mod retry;
pub mod session;
pub mod store;
pub mod todo;
pub mod views;

pub use daybook::{Daybook, DaybookBuilder};
pub use error::{DaybookError, DaybookResult};
pub use event::{Event, EventPatch, NewEvent, Priority};
pub use principal::Principal;
pub use session::{CollectionLoad, LoadReport, SessionManager, SessionStatus};
pub use store::{LoadState, ReconcileMode, Snapshot, StoreOptions, SyncStore};
pub use todo::{NewTodo, Todo, TodoPatch};
