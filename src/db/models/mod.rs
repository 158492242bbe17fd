pub mod focus_session;

pub use focus_session::{FocusSessionFilter, ProjectTotal, StoredFocusSession};
