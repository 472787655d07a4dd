/// Blocked application commands.
///
/// Changes go through the daemon when it is up so a running monitor reloads
/// the policy; otherwise they are written straight to the database.
use anyhow::Result;
use kemeselot_core::ipc::{IpcRequest, IpcResponse};
use kemeselot_storage::{BlockPolicy, Database};
use std::collections::BTreeSet;
use tabled::{settings::Style, Table, Tabled};

use super::helpers::{daemon_reachable, expect_bool, request};

#[derive(Tabled)]
struct BlockedAppRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Application")]
    app_id: String,
}

async fn load() -> Result<BTreeSet<String>> {
    if daemon_reachable().await {
        match request(IpcRequest::GetBlockedApps).await? {
            IpcResponse::Apps(apps) => Ok(apps.into_iter().collect()),
            other => anyhow::bail!("Unexpected response from daemon: {other:?}"),
        }
    } else {
        Ok(Database::new(None)?.get_blocked_apps()?.into_apps())
    }
}

async fn store(apps: BTreeSet<String>) -> Result<()> {
    if daemon_reachable().await {
        expect_bool(request(IpcRequest::SetBlockedApps(apps.into_iter().collect())).await?)?;
    } else {
        Database::new(None)?.set_blocked_apps(&BlockPolicy::new(apps))?;
    }
    Ok(())
}

pub async fn list() -> Result<()> {
    let apps = load().await?;
    if apps.is_empty() {
        println!("No blocked applications. Add one with `kemeselot block add <app>`.");
        return Ok(());
    }

    let rows: Vec<BlockedAppRow> = apps
        .into_iter()
        .enumerate()
        .map(|(i, app_id)| BlockedAppRow {
            index: i + 1,
            app_id,
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    Ok(())
}

pub async fn set(apps: Vec<String>) -> Result<()> {
    let policy = BlockPolicy::new(
        apps.iter()
            .map(|app| app.trim())
            .filter(|app| !app.is_empty()),
    );
    let count = policy.len();
    store(policy.into_apps()).await?;
    println!("Blocking {count} applications.");
    Ok(())
}

pub async fn add(app: &str) -> Result<()> {
    let mut apps = load().await?;
    let app = app.trim();
    if app.is_empty() {
        anyhow::bail!("Application identifier cannot be empty");
    }
    if !apps.insert(app.to_string()) {
        println!("{app} is already blocked.");
        return Ok(());
    }
    store(apps).await?;
    println!("Blocked {app}.");
    Ok(())
}

pub async fn remove(app: &str) -> Result<()> {
    let mut apps = load().await?;
    if !apps.remove(app.trim()) {
        println!("{app} is not blocked.");
        return Ok(());
    }
    store(apps).await?;
    println!("Unblocked {app}.");
    Ok(())
}
