//! Keyboard control.
//!
//! Raw-mode terminal input on a dedicated thread. Drone commands are async,
//! so the thread bridges into the runtime with `Handle::block_on` per
//! keystroke; recording toggles are synchronous calls into the session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

use crate::camera::CameraViewer;
use crate::drone::DroneController;

/// What a key press asks the program to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    TakeOffOrLand,
    MoveForward,
    MoveBackward,
    MoveLeft,
    MoveRight,
    MoveUp,
    MoveDown,
    ToggleRecording,
    Quit,
}

/// Map a key press to its action. Letters are case-insensitive.
pub fn map_key(key: &KeyEvent) -> Option<KeyAction> {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return Some(KeyAction::Quit);
    }
    match key.code {
        KeyCode::Esc => Some(KeyAction::TakeOffOrLand),
        KeyCode::Char(' ') => Some(KeyAction::MoveUp),
        KeyCode::Char(c) => match c.to_ascii_lowercase() {
            'w' => Some(KeyAction::MoveForward),
            's' => Some(KeyAction::MoveBackward),
            'a' => Some(KeyAction::MoveLeft),
            'd' => Some(KeyAction::MoveRight),
            'z' => Some(KeyAction::MoveDown),
            'l' => Some(KeyAction::ToggleRecording),
            'q' => Some(KeyAction::Quit),
            _ => None,
        },
        _ => None,
    }
}

pub struct KeyboardHandler {
    thread: Option<JoinHandle<()>>,
    running: Arc<AtomicBool>,
}

impl KeyboardHandler {
    /// Print the control reference, enter raw mode, and start the input
    /// thread. `quit` is signalled on Q, Ctrl-C, or an input error.
    pub fn start(
        drone: Arc<DroneController>,
        viewer: Arc<CameraViewer>,
        handle: Handle,
        quit: mpsc::UnboundedSender<()>,
    ) -> Result<Self, String> {
        print_controls();

        terminal::enable_raw_mode()
            .map_err(|e| format!("Failed to enable raw terminal mode: {e}"))?;

        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();

        let thread = thread::Builder::new()
            .name("keyboard".into())
            .spawn(move || {
                while flag.load(Ordering::Relaxed) {
                    match event::poll(Duration::from_millis(100)) {
                        Ok(false) => {}
                        Ok(true) => match event::read() {
                            Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => {
                                if let Some(action) = map_key(&key) {
                                    dispatch(action, &drone, &viewer, &handle, &quit);
                                }
                            }
                            Ok(_) => {}
                            Err(e) => {
                                log::error!("Keyboard event error: {e}");
                                let _ = quit.send(());
                                break;
                            }
                        },
                        Err(e) => {
                            log::error!("Keyboard poll error: {e}");
                            let _ = quit.send(());
                            break;
                        }
                    }
                }
                log::info!("Keyboard thread stopped");
            })
            .map_err(|e| format!("Failed to spawn keyboard thread: {e}"))?;

        Ok(Self {
            thread: Some(thread),
            running,
        })
    }

    /// Signal the input thread to stop and restore the terminal.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
        let _ = terminal::disable_raw_mode();
    }
}

impl Drop for KeyboardHandler {
    fn drop(&mut self) {
        self.stop();
        if let Some(t) = self.thread.take() {
            let _ = t.join();
        }
    }
}

fn dispatch(
    action: KeyAction,
    drone: &Arc<DroneController>,
    viewer: &Arc<CameraViewer>,
    handle: &Handle,
    quit: &mpsc::UnboundedSender<()>,
) {
    let result = match action {
        KeyAction::TakeOffOrLand => handle.block_on(drone.take_off_or_land()),
        KeyAction::MoveForward => handle.block_on(drone.move_forward()),
        KeyAction::MoveBackward => handle.block_on(drone.move_backward()),
        KeyAction::MoveLeft => handle.block_on(drone.move_left()),
        KeyAction::MoveRight => handle.block_on(drone.move_right()),
        KeyAction::MoveUp => handle.block_on(drone.move_up()),
        KeyAction::MoveDown => handle.block_on(drone.move_down()),
        KeyAction::ToggleRecording => {
            viewer.toggle_recording();
            Ok(())
        }
        KeyAction::Quit => {
            let _ = quit.send(());
            Ok(())
        }
    };

    if let Err(e) = result {
        log::warn!("Drone command failed: {e}");
    }
}

fn print_controls() {
    println!("Keyboard controls:");
    println!("  W/A/S/D   forward / left / backward / right");
    println!("  Space     up");
    println!("  Z         down");
    println!("  Esc       take off / land");
    println!("  L         start / stop recording");
    println!("  Q         quit");
}
