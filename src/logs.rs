//! The `logs` command: backup logs, the server's stored log, and live log
//! polling, optionally re-fetched until interrupted.

use crate::api::ApiClient;
use crate::error::ClientError;
use crate::format::precise_time;
use crate::output::Console;
use crate::views;
use chrono::Utc;
use clap::ValueEnum;
use crossterm::cursor::MoveTo;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{self, Clear, ClearType};
use serde_json::Value;
use std::io::Write;
use std::time::{Duration, Instant};

/// Seconds between fetches in follow mode
const FOLLOW_INTERVAL_SECS: u64 = 10;

/// Poll step while waiting for Ctrl-C
const EVENT_POLL_MS: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogKind {
    Backup,
    Stored,
    Profiling,
    Information,
    Warning,
    Error,
}

/// Where a log is read from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogSource {
    Backup { id: u64, remote: bool },
    Stored,
    Live(&'static str),
}

impl LogSource {
    /// Backup logs need the id of the backup
    pub fn resolve(kind: LogKind, id: Option<u64>, remote: bool) -> Result<Self, ClientError> {
        Ok(match kind {
            LogKind::Backup => LogSource::Backup {
                id: id.ok_or_else(|| {
                    ClientError::Config("A backup id must be provided with --id".to_string())
                })?,
                remote,
            },
            LogKind::Stored => LogSource::Stored,
            LogKind::Profiling => LogSource::Live("profiling"),
            LogKind::Information => LogSource::Live("information"),
            LogKind::Warning => LogSource::Live("warning"),
            LogKind::Error => LogSource::Live("error"),
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LogOptions {
    pub source: LogSource,
    pub lines: usize,
    pub show_all: bool,
}

/// Fetch and reshape one page of log entries
pub fn fetch(api: &mut ApiClient, options: &LogOptions) -> Result<Vec<Value>, ClientError> {
    let LogOptions {
        source,
        lines,
        show_all,
    } = *options;
    Ok(match source {
        LogSource::Backup { id, remote } => {
            views::backup_logs(api.backup_log(id, remote, lines)?, lines, show_all)
        }
        LogSource::Stored => views::stored_logs(api.stored_log(lines)?, lines, show_all),
        LogSource::Live(level) => views::live_logs(api.live_log(level, lines)?, lines),
    })
}

/// Render one page of the log as printable text
fn page(api: &mut ApiClient, options: &LogOptions) -> Result<String, ClientError> {
    let logs = fetch(api, options)?;
    if logs.is_empty() {
        return Ok("No log entries found".to_string());
    }
    Ok(serde_yaml::to_string(&logs)?.trim_end().to_string())
}

pub fn show(api: &mut ApiClient, console: &Console, options: &LogOptions) -> Result<(), ClientError> {
    console.print(&page(api, options)?);
    Ok(())
}

/// Keeps the terminal in raw mode so Ctrl-C arrives as a key press instead
/// of a signal. Restores cooked mode on drop.
struct RawMode;

impl RawMode {
    fn enable() -> Result<Self, ClientError> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

fn is_interrupt(key: &KeyEvent) -> bool {
    key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL)
}

/// Wait up to `wait`, returning true as soon as Ctrl-C is pressed. A press
/// queued during the previous fetch is seen on the first poll.
fn wait_for_interrupt(wait: Duration) -> Result<bool, ClientError> {
    let deadline = Instant::now() + wait;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(false);
        }
        let step = remaining.min(Duration::from_millis(EVENT_POLL_MS));
        if event::poll(step)? {
            if let Event::Key(key) = event::read()? {
                if is_interrupt(&key) {
                    return Ok(true);
                }
            }
        }
    }
}

/// Raw mode does not translate `\n`, so lines need an explicit return
fn write_raw(out: &mut impl Write, text: &str) -> Result<(), ClientError> {
    for line in text.lines() {
        write!(out, "{}\r\n", line)?;
    }
    out.flush()?;
    Ok(())
}

/// Re-fetch the log every ten seconds until Ctrl-C is pressed, then return
/// to the caller. A failed fetch ends the loop with its error.
pub fn follow(api: &mut ApiClient, options: &LogOptions) -> Result<(), ClientError> {
    let _raw = RawMode::enable()?;
    let mut stdout = std::io::stdout();
    loop {
        execute!(stdout, Clear(ClearType::All), MoveTo(0, 0))?;
        let text = page(api, options)?;
        write_raw(&mut stdout, &text)?;
        write_raw(&mut stdout, &precise_time(Utc::now()))?;
        write_raw(&mut stdout, "Press control+C to quit")?;
        if wait_for_interrupt(Duration::from_secs(FOLLOW_INTERVAL_SECS))? {
            return Ok(());
        }
    }
}
