//! TaskFlow headless client: config loading, logging, session root, board change log.
pub mod auth;
pub mod config;
pub mod gestures;
pub mod log_bridge;
pub mod session;
pub mod state;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use taskflow_core::clock::Clock;
use taskflow_core::sync::TasksByColumn;
use taskflow_core::timer::{displayed_seconds, format_hms};

use crate::auth::{AuthError, AuthProvider};
use crate::config::{DemoAccount, TaskflowConfig};
use crate::session::{BoardSession, SessionRoot};
use crate::state::AppState;
use tokio::sync::watch;

pub async fn run() {
    let config_path = config::default_config_path();
    let loaded = config::read_config(&config_path);
    let config = match &loaded {
        Ok(Some(config)) => config.clone(),
        Ok(None) | Err(_) => TaskflowConfig::default(),
    };
    if let Err(e) = log_bridge::init(&config.log_filter, config.log_file.clone()) {
        log_bridge::write_fallback_line(&format!("failed to initialize logger: {}", e));
    }
    match loaded {
        Ok(Some(_)) => {}
        Ok(None) => log::info!("[taskflow.app] No config at {}, using defaults", config_path.display()),
        Err(e) => log::warn!(
            "[taskflow.app] Failed to read config {}, using defaults: {}",
            config_path.display(),
            e
        ),
    }
    log::info!(
        "[taskflow.app] Starting with config {} (log file: {})",
        config_path.display(),
        log_bridge::log_file_path().unwrap_or_else(|| "none".to_string())
    );

    let state = AppState::in_memory(&config);
    let root = SessionRoot::spawn(state.clone());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let problems = tokio::spawn(log_bridge::tally(log_bridge::subscribe(), shutdown_rx.clone()));
    let reporter = tokio::spawn(report_board_changes(root.watch(), shutdown_rx));

    if let Some(account) = &config.demo_account {
        sign_in_demo(state.auth.as_ref(), account).await;
    } else {
        log::info!("[taskflow.app] No demo account configured, waiting for sign-in");
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("[taskflow.app] Failed to listen for Ctrl-C: {}", e);
    }
    let _ = shutdown_tx.send(true);
    let _ = reporter.await;
    root.shutdown().await;

    let summary = problems.await.unwrap_or_default();
    log::info!(
        "[taskflow.app] Shutting down after {} warning(s) and {} error(s)",
        summary.warnings,
        summary.errors
    );
    if let Some(entry) = log_bridge::last_error() {
        log::info!("[taskflow.app] Last error: [{}] {}", entry.target, entry.message);
    }
}

/// Log in, registering the account the first time.
async fn sign_in_demo(auth: &dyn AuthProvider, account: &DemoAccount) {
    let result = match auth.login(&account.email, &account.password).await {
        Err(AuthError::InvalidCredentials) => auth.register(&account.email, &account.password).await,
        other => other,
    };
    if let Err(e) = result {
        log::error!("[taskflow.app] Demo sign-in for {} failed: {}", account.email, e);
    }
}

async fn report_board_changes(
    mut sessions: watch::Receiver<Option<Arc<BoardSession>>>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let session = sessions.borrow_and_update().clone();
        match session {
            Some(session) => {
                let mut columns = session.watch_columns();
                let mut tasks = session.watch_tasks();
                loop {
                    tokio::select! {
                        changed = columns.changed() => {
                            if changed.is_err() {
                                break;
                            }
                        }
                        changed = tasks.changed() => {
                            if changed.is_err() {
                                break;
                            }
                        }
                        changed = sessions.changed() => {
                            if changed.is_err() {
                                return;
                            }
                            break;
                        }
                        _ = shutdown.changed() => return,
                    }
                    log_board(&session);
                }
            }
            None => {
                tokio::select! {
                    changed = sessions.changed() => {
                        if changed.is_err() {
                            return;
                        }
                    }
                    _ = shutdown.changed() => return,
                }
            }
        }
    }
}

fn log_board(session: &BoardSession) {
    let columns = session.columns().items();
    let tasks = session.tasks().items();
    let summary: Vec<String> = columns
        .iter()
        .map(|c| format!("{} ({})", c.title, tasks.column(&c.id).len()))
        .collect();
    log::info!("[taskflow.app] Board of {}: {}", session.user().email, summary.join(", "));
    for line in tracking_lines(&tasks, session.board().clock().now()) {
        log::info!("[taskflow.app] Tracking {}", line);
    }
}

/// `title: HH:MM:SS` for every running timer.
fn tracking_lines(tasks: &TasksByColumn, now: DateTime<Utc>) -> Vec<String> {
    tasks
        .all()
        .filter(|t| t.is_tracking)
        .map(|t| format!("{}: {}", t.title, format_hms(displayed_seconds(t, now))))
        .collect()
}
