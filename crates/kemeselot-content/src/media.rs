use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

const CHANT_BASE_URL: &str = "https://www.ethiopianorthodox.org/amharic/holydays/audio";
const CHANT_DURATION_SECONDS: u32 = 1800;

/// Chant of the day, Sunday first
const DAILY_CHANTS: [(&str, &str); 7] = [
    ("sunday", "Sunday - Fikare Mistir"),
    ("monday", "Monday - Fikare Tsega"),
    ("tuesday", "Tuesday - Fikare Gedam"),
    ("wednesday", "Wednesday - Fikare Medhanit"),
    ("thursday", "Thursday - Fikare Abat"),
    ("friday", "Friday - Fikare Siklet"),
    ("saturday", "Saturday - Fikare Mariam"),
];

const FALLBACK_WALLPAPERS: [&str; 6] = [
    "https://images.unsplash.com/photo-1506905925346-21bda4d32df4?w=1080&q=80",
    "https://images.unsplash.com/photo-1518241353330-0f7941c2d9b5?w=1080&q=80",
    "https://images.unsplash.com/photo-1476611338391-6f395a0dd82e?w=1080&q=80",
    "https://images.unsplash.com/photo-1502209524164-acea936639a2?w=1080&q=80",
    "https://images.unsplash.com/photo-1445307806294-bff7f67ff225?w=1080&q=80",
    "https://images.unsplash.com/photo-1489980557514-251d61e3eeb6?w=1080&q=80",
];

const QUOTES: [(&str, &str); 4] = [
    (
        "Whoever listens to me will dwell secure and will be at ease, without dread of disaster.",
        "Proverbs 1:33",
    ),
    (
        "The Lord is my light and my salvation; whom shall I fear?",
        "Psalm 27:1",
    ),
    (
        "Rejoice in the Lord always; again I will say, rejoice.",
        "Philippians 4:4",
    ),
    (
        "Blessed is the one who trusts in the Lord.",
        "Spiritual Wisdom",
    ),
];

/// Audio track descriptor handed to the player
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChantTrack {
    pub id: String,
    pub locator: String,
    pub title: String,
    pub duration_seconds: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallpaper {
    pub locator: String,
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub text: String,
    pub source: String,
}

#[must_use]
pub fn todays_chant(weekday: Weekday) -> ChantTrack {
    let (id, title) = DAILY_CHANTS[weekday.num_days_from_sunday() as usize];
    ChantTrack {
        id: id.to_string(),
        locator: format!("{CHANT_BASE_URL}/{id}.mp3"),
        title: title.to_string(),
        duration_seconds: CHANT_DURATION_SECONDS,
    }
}

/// Background image for the day; stays the same all day
#[must_use]
pub fn todays_wallpaper(weekday: Weekday) -> Wallpaper {
    let index = weekday.num_days_from_sunday() as usize % FALLBACK_WALLPAPERS.len();
    Wallpaper {
        locator: FALLBACK_WALLPAPERS[index].to_string(),
        index,
    }
}

/// Quote rotating by day of year
#[must_use]
pub fn daily_quote(date: NaiveDate) -> Quote {
    let (text, source) = QUOTES[date.ordinal() as usize % QUOTES.len()];
    Quote {
        text: text.to_string(),
        source: source.to_string(),
    }
}
