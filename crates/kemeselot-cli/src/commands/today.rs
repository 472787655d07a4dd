/// Today's devotional content
use anyhow::Result;
use chrono::{Datelike, Local, NaiveDate};
use kemeselot_content::{
    daily_quote, reading_range, todays_chant, todays_wallpaper, ChantTrack, DailyReading,
    EthiopianDate, PsalmBook, Quote, Wallpaper,
};
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct Today {
    date: NaiveDate,
    ethiopian_date: String,
    reading: String,
    chant: ChantTrack,
    wallpaper: Wallpaper,
    quote: Quote,
    #[serde(skip_serializing_if = "Option::is_none")]
    psalms: Option<DailyReading>,
}

fn build_today(date: NaiveDate, book: Option<&PsalmBook>) -> Today {
    let weekday = date.weekday();
    let range = reading_range(weekday);
    Today {
        date,
        ethiopian_date: EthiopianDate::from_gregorian(date).to_string(),
        reading: format!("Psalms {}-{}", range.start(), range.end()),
        chant: todays_chant(weekday),
        wallpaper: todays_wallpaper(weekday),
        quote: daily_quote(date),
        psalms: book.map(|b| b.todays_reading(weekday)),
    }
}

pub fn show_today(psalter: Option<&Path>, json: bool) -> Result<()> {
    let book = psalter.map(PsalmBook::load).transpose()?;
    let today = build_today(Local::now().date_naive(), book.as_ref());

    if json {
        println!("{}", serde_json::to_string_pretty(&today)?);
        return Ok(());
    }

    println!("{} ({})", today.date.format("%A, %B %-d %Y"), today.ethiopian_date);
    println!("\nToday's reading: {}", today.reading);
    println!(
        "Chant: {} ({} min)\n  {}",
        today.chant.title,
        today.chant.duration_seconds / 60,
        today.chant.locator
    );
    println!("Wallpaper: {}", today.wallpaper.locator);
    println!("\n\"{}\"\n  - {}", today.quote.text, today.quote.source);

    if let Some(reading) = &today.psalms {
        for psalm in &reading.psalms {
            println!("\n{}", psalm.title);
            for verse in &psalm.verses {
                println!("  {verse}");
            }
        }
    }
    Ok(())
}
