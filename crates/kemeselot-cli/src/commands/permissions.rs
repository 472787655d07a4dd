/// Permission check and request commands
use anyhow::Result;
use kemeselot_core::ipc::{IpcRequest, IpcResponse};

use super::helpers::{request, yes_no};
use crate::PermissionKind;

pub async fn show_permissions() -> Result<()> {
    let IpcResponse::Permissions(state) = request(IpcRequest::CheckPermissions).await? else {
        anyhow::bail!("Unexpected response from daemon");
    };

    println!("Draw over other apps: {}", yes_no(state.overlay));
    println!("Usage access:         {}", yes_no(state.usage_access));
    if !state.overlay {
        println!("  -> kemeselot permissions request overlay");
    }
    if !state.usage_access {
        println!("  -> kemeselot permissions request usage");
    }
    Ok(())
}

pub async fn request_permission(permission: PermissionKind) -> Result<()> {
    let req = match permission {
        PermissionKind::Overlay => IpcRequest::RequestOverlayPermission,
        PermissionKind::Usage => IpcRequest::RequestUsageAccessPermission,
    };
    request(req).await?;
    println!("Grant the permission, then check again with `kemeselot permissions`.");
    Ok(())
}
