// Copyright (C) 2024 Michael Wilson <mike@mdwn.dev>
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
use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, Sender};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, span, Instrument, Level};

use crate::input::InputEvent;
use crate::tone::Timbre;
use crate::trainer::Speed;

pub mod keyboard;

/// How long a tapped key is held before it is released.
pub const TAP_DURATION: Duration = Duration::from_millis(150);

/// Controller events delivered to a handler.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A raw key, pointer or focus event.
    Input(InputEvent),

    /// Presses a key and releases it shortly after.
    Tap(String),

    /// Starts the trainer.
    Start,

    /// Pauses the trainer.
    Pause,

    /// Resumes a paused trainer.
    Resume,

    /// Returns the trainer to idle and clears its scores.
    Reset,

    /// Prints the current state.
    Status,

    /// Sets the seconds allowed per trainer note.
    Speed(Speed),

    /// Sets the master volume.
    Volume(f32),

    /// Selects the instrument timbre.
    Timbre(Timbre),

    /// Shows or hides the key labels.
    Labels(bool),

    /// Releases every held note.
    Panic,

    /// Unlocks audio output.
    Unlock,

    /// Stops the controller.
    Quit,
}

/// Whether the controller should keep going after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub trait Driver: Send + Sync + 'static {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>>;
}

/// Something that reacts to controller events.
pub trait Handler: Send + 'static {
    fn handle(&mut self, event: Event) -> impl Future<Output = Flow> + Send;
}

/// Feeds events from a driver into a handler.
pub struct Controller {
    handle: JoinHandle<()>,
}

impl Controller {
    /// Creates a new controller with the given handler and driver.
    pub fn new<H: Handler>(handler: H, driver: Arc<dyn Driver>) -> Controller {
        Controller {
            handle: tokio::spawn(
                Controller::trigger_events(handler, driver)
                    .instrument(span!(Level::INFO, "controller")),
            ),
        }
    }

    /// Join will block until the controller finishes.
    pub async fn join(&mut self) -> Result<(), JoinError> {
        (&mut self.handle).await
    }

    /// Watches the driver and passes its events to the handler until the
    /// handler asks to quit.
    async fn trigger_events<H: Handler>(mut handler: H, driver: Arc<dyn Driver>) {
        let (events_tx, mut events_rx) = mpsc::channel(16);
        let join_handle = driver.monitor_events(events_tx.clone());

        info!("Controller started.");

        while let Some(event) = events_rx.recv().await {
            debug!(?event, "Received event.");

            let flow = match event {
                Event::Tap(key) => {
                    let release = events_tx.clone();
                    let up = Event::Input(InputEvent::key_up(&key));
                    tokio::spawn(async move {
                        tokio::time::sleep(TAP_DURATION).await;
                        // The controller may already be gone.
                        let _ = release.send(up).await;
                    });
                    handler
                        .handle(Event::Input(InputEvent::key_down(&key)))
                        .await
                }
                event => handler.handle(event).await,
            };

            if flow == Flow::Quit {
                break;
            }
        }

        info!("Controller closing.");
        join_handle.abort();
        match join_handle.await {
            Ok(Err(e)) => error!("Error from event monitor: {}", e),
            Err(e) if !e.is_cancelled() => {
                error!("Error waiting for event monitor to stop: {}", e)
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod test {
    use parking_lot::Mutex;

    use super::*;

    /// Sends a fixed list of events, then waits to be stopped.
    struct ScriptDriver {
        events: Vec<Event>,
    }

    impl Driver for ScriptDriver {
        fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>> {
            let events = self.events.clone();
            tokio::spawn(async move {
                for event in events {
                    if events_tx.send(event).await.is_err() {
                        break;
                    }
                }
                std::future::pending::<()>().await;
                Ok(())
            })
        }
    }

    struct RecordingHandler {
        seen: Arc<Mutex<Vec<Event>>>,
    }

    impl Handler for RecordingHandler {
        async fn handle(&mut self, event: Event) -> Flow {
            let quit = event == Event::Quit;
            self.seen.lock().push(event);
            if quit {
                Flow::Quit
            } else {
                Flow::Continue
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_controller() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let driver = Arc::new(ScriptDriver {
            events: vec![
                Event::Tap("a".to_string()),
                Event::Status,
                Event::Speed(Speed::try_from(3).unwrap()),
            ],
        });
        let controller = Controller::new(RecordingHandler { seen: seen.clone() }, driver);

        tokio::time::sleep(TAP_DURATION * 2).await;
        assert_eq!(
            vec![
                Event::Input(InputEvent::key_down("a")),
                Event::Status,
                Event::Speed(Speed::try_from(3).unwrap()),
                Event::Input(InputEvent::key_up("a")),
            ],
            *seen.lock()
        );
        assert!(!controller.handle.is_finished());
        controller.handle.abort();
    }

    #[tokio::test]
    async fn test_quit_stops_controller() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let driver = Arc::new(ScriptDriver {
            events: vec![Event::Panic, Event::Quit, Event::Status],
        });
        let mut controller = Controller::new(RecordingHandler { seen: seen.clone() }, driver);

        assert!(controller.join().await.is_ok());
        assert_eq!(vec![Event::Panic, Event::Quit], *seen.lock());
    }
}
