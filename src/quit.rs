//! Quit requests: a `q` keypress, Ctrl+C, or a termination signal.
//!
//! On a terminal, stdin is switched to raw mode so a single `q` is enough.
//! Raw mode is restored when the [`QuitListener`] is dropped. When stdin is
//! not a terminal, input is read line by line instead.

use crossbeam_channel::{bounded, Receiver, Sender};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use std::io::{self, BufRead, IsTerminal, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;

const KEY_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Why the session was asked to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuitSignal {
    /// `q` pressed on the terminal
    Keypress,
    /// Ctrl+C, SIGTERM or SIGHUP
    Interrupt,
}

#[derive(Debug, Error)]
pub enum QuitError {
    #[error("Failed to install signal handler: {0}")]
    Signal(#[from] ctrlc::Error),
    #[error("Failed to configure terminal: {0}")]
    Terminal(#[from] io::Error),
}

/// Whether an input line asks to quit.
pub fn is_quit_command(line: &str) -> bool {
    line.trim().eq_ignore_ascii_case("q")
}

/// Map a raw-mode key event to a quit request. Ctrl+C has to be handled
/// here because raw mode stops the terminal from raising SIGINT.
pub fn quit_key(key: &KeyEvent) -> Option<QuitSignal> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            Some(QuitSignal::Interrupt)
        }
        KeyCode::Char('q') | KeyCode::Char('Q') => Some(QuitSignal::Keypress),
        _ => None,
    }
}

/// Watch `reader` line by line and send [`QuitSignal::Keypress`] on `q`.
/// The thread ends at end of input or once the receiver is gone.
pub fn watch_input<R>(reader: R, sender: Sender<QuitSignal>) -> JoinHandle<()>
where
    R: BufRead + Send + 'static,
{
    thread::spawn(move || {
        for line in reader.lines() {
            let Ok(line) = line else {
                break;
            };
            if is_quit_command(&line) {
                if sender.send(QuitSignal::Keypress).is_err() {
                    break;
                }
            } else if !line.trim().is_empty() {
                tracing::info!("Unknown command '{}', type q to quit", line.trim());
            }
        }
    })
}

/// Raw-mode key reader. Dropping it stops the thread and restores the terminal.
struct KeyWatcher {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl KeyWatcher {
    fn start(sender: Sender<QuitSignal>) -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        let stop = Arc::new(AtomicBool::new(false));
        let stopped = stop.clone();

        let handle = thread::spawn(move || {
            while !stopped.load(Ordering::SeqCst) {
                match event::poll(KEY_POLL_INTERVAL) {
                    Ok(true) => match event::read() {
                        Ok(Event::Key(key)) => {
                            if let Some(signal) = quit_key(&key) {
                                if sender.send(signal).is_err() {
                                    break;
                                }
                            }
                        }
                        Ok(_) => {}
                        Err(e) => {
                            tracing::warn!(error = %e, "Failed to read key event");
                            break;
                        }
                    },
                    Ok(false) => {}
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to poll terminal");
                        break;
                    }
                }
            }
        });

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }
}

impl Drop for KeyWatcher {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        if let Err(e) = terminal::disable_raw_mode() {
            tracing::warn!(error = %e, "Failed to restore terminal mode");
        }
    }
}

/// Quit requests from the keyboard and from signals, in one channel.
pub struct QuitListener {
    receiver: Receiver<QuitSignal>,
    keys: Option<KeyWatcher>,
}

impl QuitListener {
    pub fn receiver(&self) -> &Receiver<QuitSignal> {
        &self.receiver
    }

    /// Stop reading keys and give the terminal back its normal mode.
    pub fn release_terminal(&mut self) {
        self.keys = None;
    }
}

/// Route `q`, Ctrl+C, SIGTERM and SIGHUP into one channel.
pub fn install_quit_listeners() -> Result<QuitListener, QuitError> {
    let (sender, receiver) = bounded(4);

    let interrupt = sender.clone();
    ctrlc::set_handler(move || {
        let _ = interrupt.try_send(QuitSignal::Interrupt);
    })?;

    let keys = if io::stdin().is_terminal() {
        Some(KeyWatcher::start(sender)?)
    } else {
        watch_input(io::BufReader::new(io::stdin()), sender);
        None
    };

    Ok(QuitListener { receiver, keys })
}

/// Expand bare `\n` to `\r\n`.
fn to_crlf(buf: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(buf.len() + 8);
    let mut previous = 0u8;
    for &byte in buf {
        if byte == b'\n' && previous != b'\r' {
            out.push(b'\r');
        }
        out.push(byte);
        previous = byte;
    }
    out
}

/// Stderr writer that keeps log lines aligned while raw mode is on.
pub struct TerminalWriter(io::Stderr);

impl TerminalWriter {
    pub fn stderr() -> Self {
        Self(io::stderr())
    }
}

impl Write for TerminalWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if terminal::is_raw_mode_enabled().unwrap_or(false) {
            self.0.write_all(&to_crlf(buf))?;
            Ok(buf.len())
        } else {
            self.0.write(buf)
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn press(code: KeyCode, modifiers: KeyModifiers) -> KeyEvent {
        KeyEvent::new(code, modifiers)
    }

    #[test]
    fn test_quit_command_parsing() {
        assert!(is_quit_command("q"));
        assert!(is_quit_command("  Q \n"));
        assert!(!is_quit_command("quit"));
        assert!(!is_quit_command(""));
    }

    #[test]
    fn test_single_key_quits() {
        assert_eq!(
            quit_key(&press(KeyCode::Char('q'), KeyModifiers::NONE)),
            Some(QuitSignal::Keypress)
        );
        assert_eq!(
            quit_key(&press(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            Some(QuitSignal::Interrupt)
        );
        assert_eq!(quit_key(&press(KeyCode::Char('c'), KeyModifiers::NONE)), None);
        assert_eq!(quit_key(&press(KeyCode::Enter, KeyModifiers::NONE)), None);
    }

    #[test]
    fn test_key_release_is_ignored() {
        let mut key = press(KeyCode::Char('q'), KeyModifiers::NONE);
        key.kind = KeyEventKind::Release;
        assert_eq!(quit_key(&key), None);
    }

    #[test]
    fn test_watch_input_signals_on_q() {
        let (sender, receiver) = bounded(4);
        let handle = watch_input(Cursor::new("hello\n\nq\n"), sender);
        handle.join().unwrap();

        assert_eq!(receiver.try_recv().unwrap(), QuitSignal::Keypress);
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn test_crlf_expansion() {
        assert_eq!(to_crlf(b"a\nb\r\nc"), b"a\r\nb\r\nc".to_vec());
        assert_eq!(to_crlf(b"no newline"), b"no newline".to_vec());
    }
}
