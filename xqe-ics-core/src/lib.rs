//! XQE ICS Core Library
//!
//! This library emulates the XiQueEr (Kingo) portal login, scrapes the
//! student timetable and turns it into an ICS calendar.

pub mod cipher;
pub mod config;
pub mod error;
pub mod ics;
pub mod parser;
pub mod pipeline;
pub mod portal;
pub mod ranges;
pub mod types;

// Re-export core types and error handling
pub use error::{Error, Result};
pub use types::*;

/// Commonly used items
pub mod prelude {
    pub use crate::{
        cipher::{Cipher, KingoDes},
        config::{PeriodTable, PortalConfig, TimetableConfig},
        ics::CalendarSynthesizer,
        parser::parse_schedule,
        pipeline::{CalendarRequest, Pipeline},
        types::*,
    };
}
