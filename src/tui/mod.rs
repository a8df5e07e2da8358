//! Terminal front end: raw-mode setup, input forwarding and the event loop.

pub mod draw;
pub mod theme;

use std::io::{self, Stdout};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::app::{App, Key, Msg};
use crate::runtime::Runtime;
pub use theme::Theme;

const TICK_RATE: Duration = Duration::from_millis(100);
const INPUT_POLL: Duration = Duration::from_millis(50);

type Backend = CrosstermBackend<Stdout>;

/// Map a terminal key event to a state machine key.
pub fn key_from_event(event: KeyEvent) -> Option<Key> {
    if event.modifiers.contains(KeyModifiers::CONTROL) {
        return match event.code {
            KeyCode::Char('c') => Some(Key::Interrupt),
            _ => None,
        };
    }

    let key = match event.code {
        KeyCode::Char(c) => Key::Char(c),
        KeyCode::Enter => Key::Enter,
        KeyCode::Esc => Key::Esc,
        KeyCode::Tab => Key::Tab,
        KeyCode::BackTab => Key::BackTab,
        KeyCode::Backspace => Key::Backspace,
        KeyCode::Delete => Key::Delete,
        KeyCode::Up => Key::Up,
        KeyCode::Down => Key::Down,
        KeyCode::Left => Key::Left,
        KeyCode::Right => Key::Right,
        _ => return None,
    };
    Some(key)
}

/// Run the dashboard until the user quits.
pub async fn run(
    app: App,
    runtime: Runtime,
    tx: UnboundedSender<Msg>,
    rx: UnboundedReceiver<Msg>,
    cancel: CancellationToken,
    theme: Theme,
) -> Result<()> {
    let mut terminal = setup_terminal()?;
    install_panic_hook();

    info!("Starting TUI");
    let input = spawn_input_thread(tx, cancel.clone());
    let result = event_loop(&mut terminal, app, &runtime, rx, &theme).await;

    cancel.cancel();
    if input.join().is_err() {
        error!("Input thread panicked");
    }
    restore_terminal(&mut terminal);

    if let Err(err) = &result {
        error!(error = %err, "TUI exited with error");
    }
    result
}

fn setup_terminal() -> Result<Terminal<Backend>> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("enter alternate screen")?;
    Terminal::new(CrosstermBackend::new(stdout)).context("create terminal")
}

fn restore_terminal(terminal: &mut Terminal<Backend>) {
    disable_raw_mode().ok();
    execute!(terminal.backend_mut(), LeaveAlternateScreen).ok();
    terminal.show_cursor().ok();
}

/// Leave the alternate screen before the panic message is printed.
fn install_panic_hook() {
    let original = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        disable_raw_mode().ok();
        execute!(io::stdout(), LeaveAlternateScreen).ok();
        original(info);
    }));
}

/// Forward key presses and resizes from crossterm until `cancel` fires.
fn spawn_input_thread(tx: UnboundedSender<Msg>, cancel: CancellationToken) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        while !cancel.is_cancelled() {
            let ready = match event::poll(INPUT_POLL) {
                Ok(ready) => ready,
                Err(e) => {
                    error!("Failed to poll terminal events: {}", e);
                    break;
                }
            };
            if !ready {
                continue;
            }

            let msg = match event::read() {
                Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => {
                    key_from_event(key).map(Msg::Key)
                }
                Ok(Event::Resize(width, height)) => Some(Msg::Resize { width, height }),
                Ok(_) => None,
                Err(e) => {
                    error!("Failed to read terminal event: {}", e);
                    break;
                }
            };
            if let Some(msg) = msg {
                if tx.send(msg).is_err() {
                    break;
                }
            }
        }
        debug!("Input thread stopped");
    })
}

async fn event_loop(
    terminal: &mut Terminal<Backend>,
    mut app: App,
    runtime: &Runtime,
    mut rx: UnboundedReceiver<Msg>,
    theme: &Theme,
) -> Result<()> {
    let (width, height) = crossterm::terminal::size().context("read terminal size")?;
    app.update(Msg::Resize { width, height });
    for command in app.init() {
        runtime.execute(command);
    }

    let mut ticker = tokio::time::interval(TICK_RATE);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    debug!(tick_rate_ms = TICK_RATE.as_millis() as u64, "TUI event loop started");

    loop {
        terminal
            .draw(|frame| draw::draw(frame, &app, theme))
            .context("draw frame")?;

        let msg = tokio::select! {
            _ = ticker.tick() => Msg::Tick,
            msg = rx.recv() => match msg {
                Some(msg) => msg,
                None => break,
            },
        };

        for command in app.update(msg) {
            if !runtime.execute(command) {
                info!("Quit requested");
                return Ok(());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_mapping() {
        let plain = |code| KeyEvent::new(code, KeyModifiers::NONE);

        assert_eq!(key_from_event(plain(KeyCode::Char('j'))), Some(Key::Char('j')));
        assert_eq!(key_from_event(plain(KeyCode::Enter)), Some(Key::Enter));
        assert_eq!(key_from_event(plain(KeyCode::BackTab)), Some(Key::BackTab));
        assert_eq!(key_from_event(plain(KeyCode::F(5))), None);
        assert_eq!(
            key_from_event(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            Some(Key::Interrupt)
        );
        assert_eq!(
            key_from_event(KeyEvent::new(KeyCode::Char('x'), KeyModifiers::CONTROL)),
            None
        );
        // Shifted letters arrive as uppercase chars
        assert_eq!(
            key_from_event(KeyEvent::new(KeyCode::Char('A'), KeyModifiers::SHIFT)),
            Some(Key::Char('A'))
        );
    }
}
