/// Configuration management command handlers
use anyhow::Result;
use kemeselot_storage::{Database, PrayerMode, Settings};

pub fn handle_config_show() -> Result<()> {
    let db = Database::new(None)?;
    let settings = db.get_settings()?;

    println!("Configuration:");
    println!("  prayer_mode = {}", settings.prayer_mode);
    println!("  timer_duration_seconds = {}", settings.timer_duration_seconds);
    println!(
        "  overlay_command = {}",
        settings.overlay_command.as_deref().unwrap_or("(headless)")
    );
    Ok(())
}

pub fn handle_config_set(key: &str, value: &str) -> Result<()> {
    let db = Database::new(None)?;
    let mut settings = db.get_settings()?;
    apply_setting(&mut settings, key, value)?;
    db.update_settings(&settings)?;
    println!("Set {key} = {value}");

    if key == "overlay_command" {
        println!("Restart the daemon (`kemeselot shutdown` then `kemeselot start`) to apply.");
    }
    Ok(())
}

fn apply_setting(settings: &mut Settings, key: &str, value: &str) -> Result<()> {
    match key {
        "prayer_mode" | "mode" => {
            settings.prayer_mode = PrayerMode::parse_mode(value)
                .ok_or_else(|| anyhow::anyhow!("Invalid prayer mode: {value} (silent or voice)"))?;
        }
        "timer_duration_seconds" | "timer" => {
            settings.timer_duration_seconds = value
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid number"))?;
        }
        "overlay_command" => {
            let value = value.trim();
            settings.overlay_command =
                (!value.is_empty() && value != "none").then(|| value.to_string());
        }
        _ => anyhow::bail!(
            "Unknown key: {key}. Valid keys: prayer_mode, timer_duration_seconds, overlay_command"
        ),
    }
    settings.validate()
}
