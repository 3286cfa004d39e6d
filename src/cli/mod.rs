//! Command runners and terminal rendering

pub mod convert;
pub mod rates;
pub mod serve;
pub mod setup;
pub mod ui;
