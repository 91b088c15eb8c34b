use crate::backup;
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{self, roles, HandlerErr};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string())
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    match db::open_db(&path) {
        Ok(conn) => {
            tracing::info!(path = %path.to_string_lossy(), "workspace opened");
            state.workspace = Some(path.clone());
            state.db = Some(conn);
            ok(&req.id, json!({ "workspacePath": path.to_string_lossy() }))
        }
        Err(e) => err(&req.id, "db_open_failed", format!("{e:?}"), None),
    }
}

fn export_bundle(state: &AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(workspace) = state.workspace.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let gated = (|| -> Result<PathBuf, HandlerErr> {
        let ctx = helpers::authenticate(conn, req)?;
        helpers::require_roles(&ctx, &[roles::ADMIN, roles::DIRECTOR])?;
        let out_path = helpers::required_str(&req.params, "outPath")?;
        Ok(PathBuf::from(out_path))
    })();
    let out_path = match gated {
        Ok(p) => p,
        Err(e) => return e.response(&req.id),
    };

    match backup::export_workspace_bundle(workspace, &out_path) {
        Ok(summary) => ok(
            &req.id,
            json!({
                "bundleFormat": summary.bundle_format,
                "entryCount": summary.entry_count,
                "outPath": out_path.to_string_lossy()
            }),
        ),
        Err(e) => err(&req.id, "backup_failed", format!("{e:#}"), None),
    }
}

fn import_bundle(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(workspace) = state.workspace.clone() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    {
        let Some(conn) = state.db.as_ref() else {
            return err(&req.id, "no_workspace", "select a workspace first", None);
        };
        let gated = (|| -> Result<(), HandlerErr> {
            let ctx = helpers::authenticate(conn, req)?;
            helpers::require_roles(&ctx, &[roles::ADMIN, roles::DIRECTOR])
        })();
        if let Err(e) = gated {
            return e.response(&req.id);
        }
    }
    let in_path = match helpers::required_str(&req.params, "inPath") {
        Ok(p) => PathBuf::from(p),
        Err(e) => return e.response(&req.id),
    };

    // Drop the open connection before replacing the database file.
    state.db = None;
    let summary = match backup::import_workspace_bundle(&in_path, &workspace) {
        Ok(s) => s,
        Err(e) => {
            // Reopen whatever is on disk so the daemon stays usable.
            state.db = db::open_db(&workspace).ok();
            return err(&req.id, "backup_failed", format!("{e:#}"), None);
        }
    };
    match db::open_db(&workspace) {
        Ok(conn) => {
            state.db = Some(conn);
            ok(
                &req.id,
                json!({
                    "bundleFormatDetected": summary.bundle_format_detected,
                    "uploadsRestored": summary.uploads_restored
                }),
            )
        }
        Err(e) => err(&req.id, "db_open_failed", format!("{e:?}"), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        "backup.exportBundle" => Some(export_bundle(state, req)),
        "backup.importBundle" => Some(import_bundle(state, req)),
        _ => None,
    }
}
