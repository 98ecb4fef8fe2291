//! Command handlers for the CLI
//!
//! Operator commands that inspect and maintain the session store.

pub mod sessions;
