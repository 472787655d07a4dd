//! Login autostart for the daemon.
//!
//! The service manager launches `daemon-internal-start --boot` at login and
//! relaunches it when it dies abnormally. Whether the monitor resumes is left
//! to the stored start intent, so a user who ran `kemeselot stop` stays
//! stopped across reboots.

use anyhow::Result;
#[cfg(any(target_os = "macos", target_os = "linux", test))]
use {
    anyhow::Context,
    std::{fs, path::Path},
};

#[cfg(any(target_os = "macos", test))]
const LAUNCHD_LABEL: &str = "org.kemeselot.daemon";
#[cfg(any(target_os = "linux", test))]
const SYSTEMD_UNIT: &str = "kemeselot.service";

/// launchd agent: started at login, restarted unless it exited cleanly
#[cfg(any(target_os = "macos", test))]
fn generate_macos_plist(exe_path: &Path, data_dir: &Path) -> String {
    let err_log_path = data_dir.join("kemeselot.err.log");

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>Label</key>
    <string>{LAUNCHD_LABEL}</string>

    <key>ProgramArguments</key>
    <array>
        <string>{}</string>
        <string>daemon-internal-start</string>
        <string>--boot</string>
    </array>

    <key>RunAtLoad</key>
    <true/>

    <key>KeepAlive</key>
    <dict>
        <key>SuccessfulExit</key>
        <false/>
    </dict>

    <key>ThrottleInterval</key>
    <integer>5</integer>

    <key>StandardErrorPath</key>
    <string>{}</string>
</dict>
</plist>
"#,
        exe_path.display(),
        err_log_path.display()
    )
}

/// systemd user unit: started with the session, restarted after a crash or kill
#[cfg(any(target_os = "linux", test))]
fn generate_systemd_unit(exe_path: &Path) -> String {
    format!(
        r"[Unit]
Description=Kemeselot app blocker daemon
After=graphical-session.target

[Service]
Type=simple
ExecStart={} daemon-internal-start --boot
Restart=on-failure
RestartSec=5

[Install]
WantedBy=default.target
",
        exe_path.display()
    )
}

#[cfg(any(target_os = "macos", target_os = "linux"))]
fn run_quietly(program: &str, args: &[&str]) {
    match std::process::Command::new(program).args(args).output() {
        Ok(output) if output.status.success() => {}
        Ok(output) => log::warn!(
            "{program} {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        ),
        Err(e) => log::warn!("Failed to run {program}: {e}"),
    }
}

#[cfg(target_os = "macos")]
fn plist_path() -> Result<std::path::PathBuf> {
    let home_dir = dirs::home_dir().context("Failed to get home directory")?;
    Ok(home_dir
        .join("Library/LaunchAgents")
        .join(format!("{LAUNCHD_LABEL}.plist")))
}

#[cfg(target_os = "macos")]
pub fn enable() -> Result<()> {
    let exe_path = std::env::current_exe().context("Failed to get executable path")?;
    let data_dir = kemeselot_core::config::get_data_dir()?;
    let plist_path = plist_path()?;
    let path_arg = plist_path.to_string_lossy().to_string();

    if let Some(parent) = plist_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::create_dir_all(&data_dir)?;

    if plist_path.exists() {
        run_quietly("launchctl", &["unload", path_arg.as_str()]);
    }
    write_unit(&plist_path, &generate_macos_plist(&exe_path, &data_dir))?;
    run_quietly("launchctl", &["load", path_arg.as_str()]);

    println!("Autostart enabled. Kemeselot will start on login.");
    Ok(())
}

#[cfg(target_os = "macos")]
pub fn disable() -> Result<()> {
    let plist_path = plist_path()?;
    if !plist_path.exists() {
        println!("Autostart is not enabled.");
        return Ok(());
    }
    let path_arg = plist_path.to_string_lossy().to_string();
    run_quietly("launchctl", &["unload", path_arg.as_str()]);
    fs::remove_file(&plist_path)?;
    println!("Autostart disabled.");
    Ok(())
}

#[cfg(target_os = "linux")]
fn unit_path() -> Result<std::path::PathBuf> {
    let config_dir = dirs::config_dir().context("Failed to get config directory")?;
    Ok(config_dir.join("systemd/user").join(SYSTEMD_UNIT))
}

#[cfg(target_os = "linux")]
pub fn enable() -> Result<()> {
    let exe_path = std::env::current_exe().context("Failed to get executable path")?;
    let unit_path = unit_path()?;
    if let Some(parent) = unit_path.parent() {
        fs::create_dir_all(parent)?;
    }

    write_unit(&unit_path, &generate_systemd_unit(&exe_path))?;
    run_quietly("systemctl", &["--user", "daemon-reload"]);
    run_quietly("systemctl", &["--user", "enable", "--now", SYSTEMD_UNIT]);

    println!("Autostart enabled. Kemeselot will start on login.");
    Ok(())
}

#[cfg(target_os = "linux")]
pub fn disable() -> Result<()> {
    let unit_path = unit_path()?;
    if !unit_path.exists() {
        println!("Autostart is not enabled.");
        return Ok(());
    }
    run_quietly("systemctl", &["--user", "disable", SYSTEMD_UNIT]);
    fs::remove_file(&unit_path)?;
    run_quietly("systemctl", &["--user", "daemon-reload"]);
    println!("Autostart disabled. A running daemon keeps running until `kemeselot shutdown`.");
    Ok(())
}

#[cfg(not(any(target_os = "macos", target_os = "linux")))]
pub fn enable() -> Result<()> {
    println!("Autostart is not supported on this platform.");
    println!("Run `kemeselot boot` from your login scripts instead.");
    Ok(())
}

#[cfg(not(any(target_os = "macos", target_os = "linux")))]
pub fn disable() -> Result<()> {
    println!("Autostart is not supported on this platform.");
    Ok(())
}

#[cfg(any(target_os = "macos", target_os = "linux", test))]
fn write_unit(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Created: {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_systemd_unit_restarts_boot_daemon() {
        let unit = generate_systemd_unit(&PathBuf::from("/usr/local/bin/kemeselot"));
        assert!(unit.contains("ExecStart=/usr/local/bin/kemeselot daemon-internal-start --boot\n"));
        assert!(unit.contains("Restart=on-failure"));
        assert!(unit.contains("RestartSec=5"));
        assert!(unit.contains("WantedBy=default.target"));
    }

    #[test]
    fn test_macos_plist_keeps_daemon_alive() {
        let plist = generate_macos_plist(
            &PathBuf::from("/Applications/kemeselot"),
            &PathBuf::from("/Users/me/Library/Application Support/kemeselot"),
        );
        assert!(plist.contains(&format!("<string>{LAUNCHD_LABEL}</string>")));
        assert!(plist.contains(
            "<string>/Applications/kemeselot</string>\n        \
             <string>daemon-internal-start</string>\n        \
             <string>--boot</string>"
        ));
        assert!(plist.contains("<key>RunAtLoad</key>\n    <true/>"));
        assert!(plist.contains("<key>SuccessfulExit</key>\n        <false/>"));
        assert!(plist.contains("kemeselot/kemeselot.err.log</string>"));
    }

    #[test]
    fn test_write_unit_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SYSTEMD_UNIT);
        write_unit(&path, "old").unwrap();
        write_unit(&path, "new").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "new");
    }
}
