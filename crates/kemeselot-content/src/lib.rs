//! Read-only devotional content shown inside the lockout overlay.
//!
//! Everything here is a pure function of the current date or weekday.

pub mod calendar;
pub mod media;
pub mod psalms;

pub use calendar::{reading_range, EthiopianDate};
pub use media::{daily_quote, todays_chant, todays_wallpaper, ChantTrack, Quote, Wallpaper};
pub use psalms::{DailyReading, Psalm, PsalmBook};
