// Copyright (C) 2025 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::{io, thread};

use tokio::{
    sync::{mpsc::Sender, oneshot},
    task::JoinHandle,
};
use tracing::{info, span, warn, Level};

use super::Event;
use crate::input::InputEvent;

const HELP: &str = "\
Commands:
  <key>            tap a key (a w s e d f t g y h u j k o l p ;)
  +<key> / -<key>  press / release a key
  z / x            octave down / up
  start, pause, resume, reset, status
  speed <3|5|8>    seconds per trainer note
  volume <0-1>     master volume
  timbre <name>    piano, sine or triangle
  labels <on|off>  show key labels
  blur, hide       simulate losing focus
  panic, unlock, help, quit";

/// Parses one command line. Returns Ok(None) for blank lines and help.
pub fn parse_command(line: &str) -> Result<Option<Event>, String> {
    let line = line.trim();
    let (command, arg) = match line.split_once(char::is_whitespace) {
        Some((command, arg)) => (command.to_lowercase(), Some(arg.trim())),
        None => (line.to_lowercase(), None),
    };

    let event = match (command.as_str(), arg) {
        ("", None) | ("help", None) | ("?", None) => return Ok(None),
        ("start", None) => Event::Start,
        ("pause", None) => Event::Pause,
        ("resume", None) => Event::Resume,
        ("reset", None) => Event::Reset,
        ("status", None) => Event::Status,
        ("panic", None) => Event::Panic,
        ("unlock", None) => Event::Unlock,
        ("quit", None) | ("exit", None) => Event::Quit,
        ("blur", None) => Event::Input(InputEvent::Blur),
        ("hide", None) => Event::Input(InputEvent::VisibilityHidden),
        ("speed", Some(arg)) => Event::Speed(arg.parse().map_err(|e| format!("{}", e))?),
        ("volume", Some(arg)) => Event::Volume(
            arg.parse::<f32>()
                .ok()
                .filter(|v| (0.0..=1.0).contains(v))
                .ok_or_else(|| format!("invalid volume '{}', expected 0 to 1", arg))?,
        ),
        ("timbre", Some(arg)) => {
            Event::Timbre(arg.to_lowercase().parse().map_err(|e| format!("{}", e))?)
        }
        ("labels", Some("on")) => Event::Labels(true),
        ("labels", Some("off")) => Event::Labels(false),
        (key, None) if key.len() > 1 && key.starts_with('+') => {
            Event::Input(InputEvent::key_down(&key[1..]))
        }
        (key, None) if key.len() > 1 && key.starts_with('-') => {
            Event::Input(InputEvent::key_up(&key[1..]))
        }
        (key, None) if key.chars().count() == 1 => Event::Tap(key.to_string()),
        _ => return Err(format!("unrecognized command '{}'", line)),
    };
    Ok(Some(event))
}

/// A controller that reads commands from standard input.
pub struct Driver {}

impl Driver {
    pub fn new() -> Driver {
        Driver {}
    }

    /// Reads and dispatches one line. Returns false once the reader is
    /// exhausted.
    fn monitor_io<R, W>(
        events_tx: &Sender<Event>,
        mut reader: R,
        mut writer: W,
    ) -> Result<bool, io::Error>
    where
        R: io::BufRead,
        W: io::Write,
    {
        write!(writer, "> ")?;
        writer.flush()?;
        let mut input: String = String::default();
        if reader.read_line(&mut input)? == 0 {
            return Ok(false);
        }

        match parse_command(&input) {
            Ok(Some(event)) => events_tx
                .blocking_send(event)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?,
            Ok(None) => writeln!(writer, "{}", HELP)?,
            Err(e) => {
                warn!(input = input.trim(), "Unrecognized input");
                writeln!(writer, "{}", e)?;
            }
        }
        Ok(true)
    }
}

impl Default for Driver {
    fn default() -> Self {
        Self::new()
    }
}

impl super::Driver for Driver {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>> {
        let (done_tx, done_rx) = oneshot::channel();

        // Blocked stdin reads can't be cancelled; the thread is left behind
        // when the controller stops.
        thread::spawn(move || {
            let span = span!(Level::INFO, "keyboard driver");
            let _enter = span.enter();

            info!("Keyboard driver started.");

            let result = loop {
                match Self::monitor_io(&events_tx, io::stdin().lock(), io::stdout()) {
                    Ok(true) => {}
                    Ok(false) => {
                        info!("Input closed.");
                        // Nothing to do if the controller already quit.
                        let _ = events_tx.blocking_send(Event::Quit);
                        break Ok(());
                    }
                    Err(e) => break Err(e),
                }
            };
            let _ = done_tx.send(result);
        });

        tokio::spawn(async move { done_rx.await.unwrap_or(Ok(())) })
    }
}
