pub mod action;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod credentials;
pub mod diagnostics;
pub mod duration;
pub mod error;
pub mod executor;
pub mod fetch;
pub mod io;
pub mod lifecycle;
pub mod schema;
pub mod store;

pub use action::{Action, ActionBody, ActionDetails, ActionStatus, Operation};
pub use auth::{Caller, PrincipalSet};
pub use config::ServiceConfig;
pub use error::{ApError, Result};
pub use executor::{ActionExecutor, Collaborators};
pub use lifecycle::{ActionLifecycle, Job, Outcome, SubmitRequest, Submission};
pub use store::{ActionDb, ActionStore};
