// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subcommand handlers for the `keeper` binary.

use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::config::{Cli, Command, SessionConfig};
use crate::gate::Liveness;
use crate::identity::{HttpIdentityProvider, IdentityProvider};
use crate::session::{SessionEvent, SessionHandlingMode, SessionState, SessionStatus};
use crate::Keeper;

/// Combined output of `keeper status`.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    #[serde(flatten)]
    pub session: SessionStatus,
    pub liveness: Liveness,
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let Cli { config, command, .. } = cli;
    match command {
        Command::Login { code, stay_logged_in, return_to } => {
            login(config, &code, stay_logged_in, return_to.as_deref()).await
        }
        Command::Run { code, stay_logged_in } => keep_alive(config, code, stay_logged_in).await,
        Command::Status => status(config).await,
        Command::Logout => logout(config).await,
        Command::AuthorizeUrl { return_to } => authorize_url(&config, return_to.as_deref()),
    }
}

fn mode(stay_logged_in: bool) -> SessionHandlingMode {
    if stay_logged_in {
        SessionHandlingMode::StayLoggedIn
    } else {
        SessionHandlingMode::AskAgain
    }
}

async fn login(
    config: SessionConfig,
    code: &str,
    stay_logged_in: bool,
    return_to: Option<&str>,
) -> anyhow::Result<()> {
    let keeper = Keeper::from_config(config, "/login")?;
    keeper.coordinator.login(code, mode(stay_logged_in), return_to).await?;
    println!("{}", serde_json::to_string_pretty(&keeper.coordinator.status())?);
    Ok(())
}

async fn keep_alive(
    config: SessionConfig,
    code: Option<String>,
    stay_logged_in: bool,
) -> anyhow::Result<()> {
    let keeper = Keeper::from_config(config, "/")?;
    let coordinator = &keeper.coordinator;

    match code {
        Some(code) => {
            coordinator.login(&code, mode(stay_logged_in), None).await?;
        }
        None => {
            let state = coordinator.restore();
            if state == SessionState::Idle {
                anyhow::bail!("no session to keep alive, log in first");
            }
        }
    }

    let mut events = coordinator.subscribe();
    let shutdown = coordinator.start();
    info!(state = %coordinator.state(), "keeping session alive");

    let result = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break Ok(());
            }
            _ = shutdown.cancelled() => {
                if coordinator.state() == SessionState::Unauthenticated {
                    break Err(anyhow::anyhow!("session expired"));
                }
                break Ok(());
            }
            event = events.recv() => match event {
                Ok(SessionEvent::Refreshed { expires_in_secs }) => {
                    info!(expires_in_secs, "session renewed");
                }
                Ok(SessionEvent::RefreshFailed { error }) => warn!(%error, "renewal failed"),
                Ok(SessionEvent::Resumed { description, .. }) => {
                    info!(elapsed = %description, "resumed after suspend");
                }
                Ok(_) => {}
                Err(RecvError::Lagged(n)) => warn!(skipped = n, "event stream lagged"),
                Err(RecvError::Closed) => break Ok(()),
            },
        }
    };

    coordinator.stop();
    result
}

async fn status(config: SessionConfig) -> anyhow::Result<()> {
    let keeper = Keeper::from_config(config, "/")?;
    let state = keeper.coordinator.restore();
    let liveness = match state {
        SessionState::Idle => Liveness::Rejected,
        _ => keeper.gate.probe_liveness().await,
    };
    let report = StatusReport { session: keeper.coordinator.status(), liveness };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn logout(config: SessionConfig) -> anyhow::Result<()> {
    let keeper = Keeper::from_config(config, "/logout")?;
    keeper.coordinator.restore();
    keeper.coordinator.logout().await;
    Ok(())
}

fn authorize_url(config: &SessionConfig, return_to: Option<&str>) -> anyhow::Result<()> {
    let provider = HttpIdentityProvider::new(config);
    let Some(url) = provider.authorize_url(return_to.unwrap_or("/")) else {
        anyhow::bail!("no valid --authorize-url configured");
    };
    println!("{url}");
    Ok(())
}
