//! Guided indoor tour navigation core
//!
//! Exposes modules for integration testing and binary reuse.

pub mod domain;
pub mod infra;
pub mod io;
pub mod nav;
pub mod services;
