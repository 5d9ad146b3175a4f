//! Gate server assembly and lifecycle.
//!
//! [`build`] wires the stores together from a [`GateConfig`] and bootstraps
//! the configured admins; [`serve`] runs the HTTP router together with the
//! session reaper until ctrl-c.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use tokio::sync::watch;
use tracing::info;

use crate::api::{AppState, create_router};
use crate::auth::{CredentialStore, RoleGrants, SessionService, spawn_reaper};
use crate::config::{GateConfig, SessionConfig};
use crate::types::{InstitutionId, Username};
use crate::users::admins::bootstrap_admin;
use crate::users::{CreatedCredential, Directory};

/// An admin created during startup, with the only copy of its password.
#[derive(Debug)]
pub struct BootstrappedAdmin {
    pub institution: InstitutionId,
    pub username: Username,
    pub credential: CreatedCredential,
}

/// A fully wired gate, ready to serve.
pub struct Gate {
    pub state: AppState,
    pub bootstrapped: Vec<BootstrappedAdmin>,
}

pub fn build(config: &GateConfig) -> anyhow::Result<Gate> {
    let institutions = config.institutions()?;
    let credentials = Arc::new(CredentialStore::new(&institutions)?);
    let directory = Arc::new(Directory::new(&institutions));
    let sessions = Arc::new(SessionService::new(
        credentials.clone(),
        &config.session,
        RoleGrants::from(&config.authorization.grants),
    ));

    let now = Utc::now();
    let mut bootstrapped = Vec::new();
    for (id, institution) in &config.institutions {
        for admin in &institution.bootstrap_admins {
            let created = bootstrap_admin(&credentials, &directory, id.as_str(), admin, now)
                .with_context(|| format!("Bootstrapping admin `{}` of `{}`", admin.username, id))?;
            if let Some(credential) = created {
                bootstrapped.push(BootstrappedAdmin {
                    institution: id.clone(),
                    username: admin.username.clone(),
                    credential,
                });
            }
        }
    }

    info!(
        institutions = institutions.len(),
        bootstrapped = bootstrapped.len(),
        "Gate assembled"
    );

    Ok(Gate {
        state: AppState {
            sessions,
            institutions,
            directory,
        },
        bootstrapped,
    })
}

/// Serve until ctrl-c, then stop the reaper and return.
pub async fn serve(gate: Gate, session: &SessionConfig, bind: SocketAddr) -> anyhow::Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reaper = session
        .reap_interval()
        .map(|every| spawn_reaper(gate.state.sessions.clone(), every, shutdown_rx));

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Binding {}", bind))?;
    info!("Gate listening on http://{}", bind);

    axum::serve(listener, create_router(gate.state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown requested");
        })
        .await?;

    let _ = shutdown_tx.send(true);
    if let Some(reaper) = reaper {
        reaper.await.context("Session reaper panicked")?;
    }
    info!("Gate stopped");
    Ok(())
}
