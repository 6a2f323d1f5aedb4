/// Application root.
///
/// The auth session is consumed here and nowhere else. Signing in opens a
/// `BoardSession` (board initialized, column and task mirrors live); signing
/// out or shutting down drops it, which releases both subscriptions.
use std::sync::Arc;
use std::time::Duration;

use taskflow_core::board::{BoardError, TaskBoard};
use taskflow_core::sync::{LiveMirror, MirrorView, TasksByColumn};
use taskflow_core::timer::TimerDisplay;
use taskflow_core::types::{find_column_by_title, Column, Task, DONE_COLUMN};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::auth::User;
use crate::state::AppState;

pub struct BoardSession {
    user: User,
    board: Arc<TaskBoard>,
    columns: LiveMirror<Vec<Column>>,
    tasks: LiveMirror<TasksByColumn>,
    timer_tick: Duration,
}

impl BoardSession {
    pub async fn open(state: &AppState, user: User) -> Result<Self, BoardError> {
        let board = Arc::new(TaskBoard::new(state.store.clone(), state.clock.clone(), user.uid.clone()));
        board.initialize().await?;
        let columns = board.subscribe_columns().await?;
        let tasks = board.subscribe_tasks().await?;
        log::info!("[taskflow.session] Opened board for {}", user.email);
        Ok(Self {
            user,
            board,
            columns,
            tasks,
            timer_tick: state.timer_tick,
        })
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn board(&self) -> Arc<TaskBoard> {
        self.board.clone()
    }

    pub fn columns(&self) -> &LiveMirror<Vec<Column>> {
        &self.columns
    }

    pub fn tasks(&self) -> &LiveMirror<TasksByColumn> {
        &self.tasks
    }

    pub fn watch_columns(&self) -> watch::Receiver<MirrorView<Vec<Column>>> {
        self.columns.watch()
    }

    pub fn watch_tasks(&self) -> watch::Receiver<MirrorView<TasksByColumn>> {
        self.tasks.watch()
    }

    pub fn done_column(&self) -> Option<Column> {
        find_column_by_title(&self.columns.items(), DONE_COLUMN).cloned()
    }

    /// Ticking `HH:MM:SS` display for one task, fed by the caller.
    pub fn timer_display(&self, task: Task) -> TimerDisplay {
        TimerDisplay::spawn(task, self.board.clock(), self.timer_tick)
    }
}

impl Drop for BoardSession {
    fn drop(&mut self) {
        log::info!("[taskflow.session] Closed board for {}", self.user.email);
    }
}

/// Owns the task that follows the auth session.
pub struct SessionRoot {
    sessions: watch::Receiver<Option<Arc<BoardSession>>>,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl SessionRoot {
    pub fn spawn(state: AppState) -> Self {
        let (session_tx, sessions) = watch::channel(None);
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let mut auth_rx = state.auth.watch_session();

        let handle = tokio::spawn(async move {
            loop {
                let signed_in = auth_rx.borrow_and_update().clone();
                let current_uid = session_tx
                    .borrow()
                    .as_ref()
                    .map(|s: &Arc<BoardSession>| s.user().uid.clone());

                match signed_in {
                    Some(user) if current_uid.as_deref() != Some(user.uid.as_str()) => {
                        session_tx.send_replace(None);
                        match BoardSession::open(&state, user).await {
                            Ok(session) => {
                                session_tx.send_replace(Some(Arc::new(session)));
                            }
                            Err(e) => {
                                log::error!("[taskflow.session] Failed to open board: {}", e);
                            }
                        }
                    }
                    None if current_uid.is_some() => {
                        session_tx.send_replace(None);
                    }
                    _ => {}
                }

                tokio::select! {
                    changed = auth_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
            session_tx.send_replace(None);
            log::info!("[taskflow.session] Session root stopped");
        });

        Self {
            sessions,
            shutdown,
            handle,
        }
    }

    pub fn current(&self) -> Option<Arc<BoardSession>> {
        self.sessions.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<Option<Arc<BoardSession>>> {
        self.sessions.clone()
    }

    /// Stop following the session and close the open board.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.handle.await {
            log::warn!("[taskflow.session] Session root ended abnormally: {}", e);
        }
    }
}
