//! Terminal keyboard input for running tours without positioning hardware
//!
//! Arrow keys / WASD steer the walker, space stops it. The remaining keys
//! stand in for the display layer's buttons.

use crate::domain::events::TourCommand;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// What a key press asks for
#[derive(Debug, Clone, PartialEq)]
pub enum KeyAction {
    Command(TourCommand),
    Quit,
}

/// Map a key event to an action; unmapped keys and releases yield None
pub fn map_key(key: &KeyEvent) -> Option<KeyAction> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return Some(KeyAction::Quit);
    }

    let steer = |x: f32, z: f32| Some(KeyAction::Command(TourCommand::Steer { x, z }));
    match key.code {
        KeyCode::Up | KeyCode::Char('w') => steer(0.0, 1.0),
        KeyCode::Down | KeyCode::Char('s') => steer(0.0, -1.0),
        KeyCode::Left | KeyCode::Char('a') => steer(-1.0, 0.0),
        KeyCode::Right | KeyCode::Char('d') => steer(1.0, 0.0),
        KeyCode::Char(' ') => steer(0.0, 0.0),
        KeyCode::Enter | KeyCode::Char('r') => Some(KeyAction::Command(TourCommand::UserReady)),
        KeyCode::Char('n') => Some(KeyAction::Command(TourCommand::RequestNext)),
        KeyCode::Char('c') => Some(KeyAction::Command(TourCommand::ContinueToNextFloor)),
        KeyCode::Char('x') => {
            Some(KeyAction::Command(TourCommand::StopTour { return_home: true }))
        }
        KeyCode::Char('q') | KeyCode::Esc => Some(KeyAction::Quit),
        _ => None,
    }
}

/// Read terminal keys until quit or shutdown, forwarding commands
///
/// Runs on a blocking thread; raw mode is restored before returning.
pub fn run_keyboard_input(
    cmd_tx: mpsc::Sender<TourCommand>,
    shutdown_tx: Arc<watch::Sender<bool>>,
) -> std::io::Result<()> {
    enable_raw_mode()?;
    info!("keyboard_input_started");
    let result = read_keys(&cmd_tx, &shutdown_tx);
    disable_raw_mode()?;
    info!("keyboard_input_stopped");
    result
}

fn read_keys(
    cmd_tx: &mpsc::Sender<TourCommand>,
    shutdown_tx: &watch::Sender<bool>,
) -> std::io::Result<()> {
    let poll_timeout = Duration::from_millis(100);
    while !*shutdown_tx.borrow() {
        if !event::poll(poll_timeout)? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        match map_key(&key) {
            Some(KeyAction::Command(cmd)) => {
                debug!(cmd = ?cmd, "keyboard_command");
                if cmd_tx.blocking_send(cmd).is_err() {
                    warn!("keyboard_command_channel_closed");
                    return Ok(());
                }
            }
            Some(KeyAction::Quit) => {
                info!("keyboard_quit");
                let _ = shutdown_tx.send(true);
                return Ok(());
            }
            None => {}
        }
    }
    Ok(())
}
