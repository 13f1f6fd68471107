//! User commands: terminal keys or a script.

use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::collections::VecDeque;
use std::io::{self, Write};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Quit,
    ResetFusion,
    ExportPoints,
    ToggleFreeze,
}

impl FromStr for Command {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "quit" | "q" => Ok(Command::Quit),
            "reset" | "r" => Ok(Command::ResetFusion),
            "export" | "save" | "s" => Ok(Command::ExportPoints),
            "freeze" | "f" => Ok(Command::ToggleFreeze),
            other => Err(format!("unknown command '{}'", other)),
        }
    }
}

/// Where commands come from. Polled once per cycle; never blocks.
pub trait CommandSource {
    fn poll(&mut self) -> Option<Command>;
}

impl<C: CommandSource + ?Sized> CommandSource for Box<C> {
    fn poll(&mut self) -> Option<Command> {
        (**self).poll()
    }
}

/// Keys read from the controlling terminal in raw mode.
///
/// Esc or `q` quits, `s` exports points, `r` resets fusion, `f` freezes the
/// 3-D view. Raw mode is left again on drop.
pub struct TerminalKeys {
    _private: (),
}

impl TerminalKeys {
    pub fn new() -> std::io::Result<Self> {
        enable_raw_mode()?;
        info!("keys: [q/Esc] quit  [s] save points  [r] reset fusion  [f] freeze 3-D view");
        Ok(Self { _private: () })
    }

    fn map_key(code: KeyCode, modifiers: KeyModifiers) -> Option<Command> {
        match code {
            KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => Some(Command::Quit),
            KeyCode::Esc | KeyCode::Char('q') => Some(Command::Quit),
            KeyCode::Char('s') => Some(Command::ExportPoints),
            KeyCode::Char('r') => Some(Command::ResetFusion),
            KeyCode::Char('f') => Some(Command::ToggleFreeze),
            _ => None,
        }
    }
}

impl CommandSource for TerminalKeys {
    fn poll(&mut self) -> Option<Command> {
        let ready = match event::poll(Duration::ZERO) {
            Ok(ready) => ready,
            Err(e) => {
                warn!("failed to poll terminal: {}", e);
                return None;
            }
        };
        if !ready {
            return None;
        }
        match event::read() {
            Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => {
                Self::map_key(key.code, key.modifiers)
            }
            Ok(_) => None,
            Err(e) => {
                warn!("failed to read terminal event: {}", e);
                None
            }
        }
    }
}

impl Drop for TerminalKeys {
    fn drop(&mut self) {
        if let Err(e) = disable_raw_mode() {
            warn!("failed to restore terminal: {}", e);
        }
    }
}

/// Log sink for a terminal in raw mode, where `\n` no longer returns the
/// cursor to the first column. Line ends are written as `\r\n`.
pub struct RawModeWriter<W: Write>(pub W);

impl<W: Write> Write for RawModeWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for chunk in buf.split_inclusive(|&b| b == b'\n') {
            match chunk.strip_suffix(b"\n") {
                Some(line) if !line.ends_with(b"\r") => {
                    self.0.write_all(line)?;
                    self.0.write_all(b"\r\n")?;
                }
                _ => self.0.write_all(chunk)?,
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

/// Commands issued at fixed cycles.
#[derive(Debug, Clone, Default)]
pub struct ScriptedCommands {
    queue: VecDeque<(u64, Command)>,
    cycle: u64,
}

impl ScriptedCommands {
    /// `script` pairs a cycle index (0-based) with the command to issue then.
    pub fn new(script: impl IntoIterator<Item = (u64, Command)>) -> Self {
        let mut entries: Vec<_> = script.into_iter().collect();
        entries.sort_by_key(|(cycle, _)| *cycle);
        Self {
            queue: entries.into(),
            cycle: 0,
        }
    }

    /// Parse `cycle:command` pairs separated by commas, e.g. `5:export,9:quit`.
    pub fn parse(script: &str) -> Result<Self, String> {
        let mut entries = Vec::new();
        for item in script.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let (cycle, command) = item
                .split_once(':')
                .ok_or_else(|| format!("expected cycle:command, got '{}'", item))?;
            let cycle = cycle
                .trim()
                .parse::<u64>()
                .map_err(|e| format!("bad cycle '{}': {}", cycle, e))?;
            entries.push((cycle, command.parse()?));
        }
        Ok(Self::new(entries))
    }

    pub fn is_finished(&self) -> bool {
        self.queue.is_empty()
    }
}

impl CommandSource for ScriptedCommands {
    fn poll(&mut self) -> Option<Command> {
        let cycle = self.cycle;
        self.cycle += 1;
        match self.queue.front() {
            Some((at, _)) if *at <= cycle => self.queue.pop_front().map(|(_, c)| c),
            _ => None,
        }
    }
}

/// No input at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoInput;

impl CommandSource for NoInput {
    fn poll(&mut self) -> Option<Command> {
        None
    }
}
