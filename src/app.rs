// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
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
// Wires the tone engine, instrument and trainer to a controller.

use std::{error::Error, sync::Arc};

use tokio::{sync::watch, task::JoinHandle};
use tracing::{info, warn};

use crate::{
    audio,
    config::Keynote,
    controller::{keyboard, Controller, Event, Flow, Handler},
    input::InputEvent,
    instrument::Instrument,
    pitch,
    settings::{self, FileStore, InstrumentSettings, MemoryStore, SettingsStore},
    staff,
    tone::{PianoStatus, Sound, ToneEngine},
    trainer::{Outcome, RoundPhase, Trainer, TrainerError, TrainerSnapshot},
    util::{duration_tenths, progress_bar},
};

const BAR_WIDTH: usize = 20;

/// Unlocks audio output, logging a failure. Input keeps working silently
/// when the device is unavailable.
async fn unlock(engine: &ToneEngine) {
    if let Err(e) = engine.start().await {
        warn!(err = %e, "Unable to unlock audio.");
    }
}

fn is_press(input: &InputEvent) -> bool {
    matches!(
        input,
        InputEvent::KeyDown { repeat: false, .. } | InputEvent::PointerDown { .. }
    )
}

/// Lists the instrument keys and the notes they play under the given octave
/// shift.
pub fn keyboard_layout(octave_shift: i8, show_labels: bool) -> String {
    let mut keys = String::new();
    let mut notes = String::new();
    for (key, _) in pitch::instrument_keys() {
        let Some(assignment) = pitch::assign(key, octave_shift) else {
            continue;
        };
        keys.push_str(&format!("{:<5}", key));
        notes.push_str(&format!("{:<5}", assignment.note_name.to_string()));
    }
    let notes = notes.trim_end().to_string();
    if show_labels {
        format!("{}\n{}", keys.trim_end(), notes)
    } else {
        notes
    }
}

/// Plays the instrument from controller events.
pub struct PlayHandler {
    engine: Arc<ToneEngine>,
    instrument: Instrument,
    settings: InstrumentSettings,
    store: Arc<dyn SettingsStore>,
}

impl PlayHandler {
    /// Creates a handler, applying the stored settings over the defaults.
    pub fn new(
        engine: Arc<ToneEngine>,
        store: Arc<dyn SettingsStore>,
        defaults: InstrumentSettings,
    ) -> PlayHandler {
        let settings = InstrumentSettings::load(store.as_ref(), defaults);
        engine.set_master_volume(settings.volume);
        engine.set_timbre(settings.timbre);
        PlayHandler {
            instrument: Instrument::new(engine.clone()),
            engine,
            settings,
            store,
        }
    }

    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    pub fn settings(&self) -> InstrumentSettings {
        self.settings
    }

    pub fn status(&self) -> String {
        let held = self.instrument.held_keys();
        format!(
            "octave {:+} | volume {:.2} | timbre {} | piano {} | audio {} | held: {}",
            self.instrument.octave_shift(),
            self.engine.volume(),
            self.settings.timbre,
            piano_status(self.engine.piano_status()),
            if self.engine.is_ready() { "ready" } else { "locked" },
            if held.is_empty() {
                "none".to_string()
            } else {
                held.join(" ")
            },
        )
    }
}

fn piano_status(status: PianoStatus) -> &'static str {
    match status {
        PianoStatus::Unconfigured => "not configured",
        PianoStatus::Loading => "loading",
        PianoStatus::Loaded => "loaded",
        PianoStatus::Failed => "unavailable",
    }
}

impl Handler for PlayHandler {
    async fn handle(&mut self, event: Event) -> Flow {
        match event {
            Event::Input(input) => {
                if is_press(&input) {
                    unlock(&self.engine).await;
                }
                let shift = self.instrument.octave_shift();
                self.instrument.handle(&input);
                if shift != self.instrument.octave_shift() {
                    println!(
                        "{}",
                        keyboard_layout(
                            self.instrument.octave_shift(),
                            self.settings.show_keyboard_keys
                        )
                    );
                }
            }
            Event::Tap(key) => {
                unlock(&self.engine).await;
                self.instrument.handle(&InputEvent::key_down(&key));
                self.instrument.handle(&InputEvent::key_up(&key));
            }
            Event::Volume(volume) => {
                self.engine.set_master_volume(volume);
                self.settings.volume = self.engine.volume();
                self.settings.save(self.store.as_ref());
            }
            Event::Timbre(timbre) => {
                self.engine.set_timbre(timbre);
                self.settings.timbre = timbre;
                self.settings.save(self.store.as_ref());
            }
            Event::Labels(show) => {
                self.settings.show_keyboard_keys = show;
                self.settings.save(self.store.as_ref());
                println!("{}", keyboard_layout(self.instrument.octave_shift(), show));
            }
            Event::Panic => {
                self.instrument.panic();
            }
            Event::Unlock => unlock(&self.engine).await,
            Event::Status => println!("{}", self.status()),
            Event::Start | Event::Pause | Event::Resume | Event::Reset | Event::Speed(_) => {
                println!("Trainer commands are only available in train mode.")
            }
            Event::Quit => return Flow::Quit,
        }
        Flow::Continue
    }
}

/// Describes the trainer state for the terminal.
pub fn render_status(snapshot: &TrainerSnapshot, show_labels: bool) -> String {
    let session = &snapshot.session;
    let target = match (show_labels, pitch::note_to_key(&snapshot.target)) {
        (true, Some(key)) => format!("Target: {} (key {})", snapshot.target, key),
        _ => format!("Target: {}", snapshot.target),
    };
    format!(
        "{}\n{}\n{} | Time: {} {} | Score {} | Streak {} | Best {} | Speed {}",
        staff::render(&snapshot.target),
        target,
        session.state,
        duration_tenths(snapshot.remaining),
        progress_bar(snapshot.time_ratio(), BAR_WIDTH),
        session.score,
        session.streak,
        session.best_streak,
        session.speed,
    )
}

/// Prints each new round and each result as the trainer publishes them.
pub fn spawn_trainer_view(
    mut updates: watch::Receiver<TrainerSnapshot>,
    show_labels: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut last = updates.borrow_and_update().clone();
        while updates.changed().await.is_ok() {
            let current = updates.borrow_and_update().clone();
            let new_round = current.phase == RoundPhase::Armed
                && (last.phase != RoundPhase::Armed || last.target != current.target);
            let resolved =
                current.phase == RoundPhase::Resolved && last.phase != RoundPhase::Resolved;

            if resolved {
                match current.last_outcome {
                    Some(Outcome::Hit) => println!(
                        "Correct! Score {} | Streak {}",
                        current.session.score, current.session.streak
                    ),
                    Some(Outcome::Miss) => println!("Too slow, it was {}.", current.target),
                    None => {}
                }
            }
            if new_round {
                println!("{}", render_status(&current, *show_labels.borrow()));
            }
            last = current;
        }
    })
}

/// Runs the note trainer from controller events.
pub struct TrainHandler {
    engine: Arc<ToneEngine>,
    trainer: Trainer,
    store: Arc<dyn SettingsStore>,
    show_labels: watch::Sender<bool>,
}

impl TrainHandler {
    /// Creates a handler with the stored speed and instrument settings.
    pub fn new(
        engine: Arc<ToneEngine>,
        store: Arc<dyn SettingsStore>,
        defaults: InstrumentSettings,
    ) -> TrainHandler {
        let settings = InstrumentSettings::load(store.as_ref(), defaults);
        engine.set_master_volume(settings.volume);
        let trainer = Trainer::new(engine.clone(), settings::load_speed(store.as_ref()));
        TrainHandler {
            engine,
            trainer,
            store,
            show_labels: watch::Sender::new(settings.show_keyboard_keys),
        }
    }

    pub fn trainer(&self) -> &Trainer {
        &self.trainer
    }

    /// Returns a receiver tracking whether key labels are shown.
    pub fn labels(&self) -> watch::Receiver<bool> {
        self.show_labels.subscribe()
    }

    fn report(&self, result: Result<(), TrainerError>) {
        match result {
            Ok(()) => println!(
                "{}",
                render_status(&self.trainer.snapshot(), *self.show_labels.borrow())
            ),
            Err(e) => println!("Unable to {}", e.to_string().trim_start_matches("cannot ")),
        }
    }
}

impl Handler for TrainHandler {
    async fn handle(&mut self, event: Event) -> Flow {
        match event {
            Event::Input(input) => {
                if is_press(&input) {
                    unlock(&self.engine).await;
                }
                match input {
                    InputEvent::KeyDown { key, repeat } => {
                        self.trainer.key_down(&key, repeat);
                    }
                    InputEvent::PointerDown { key } => {
                        self.trainer.key_down(&key, false);
                    }
                    InputEvent::KeyUp { key }
                    | InputEvent::PointerUp { key }
                    | InputEvent::PointerCancel { key }
                    | InputEvent::PointerLeave { key } => self.trainer.key_up(&key),
                    InputEvent::Blur | InputEvent::VisibilityHidden => self.trainer.interrupt(),
                }
            }
            Event::Tap(key) => {
                unlock(&self.engine).await;
                self.trainer.key_down(&key, false);
                self.trainer.key_up(&key);
            }
            Event::Start => {
                unlock(&self.engine).await;
                let result = self.trainer.start();
                self.report(result);
            }
            Event::Pause => {
                let result = self.trainer.pause();
                self.report(result);
            }
            Event::Resume => {
                unlock(&self.engine).await;
                let result = self.trainer.resume();
                self.report(result);
            }
            Event::Reset => {
                self.trainer.reset();
                self.report(Ok(()));
            }
            Event::Speed(speed) => {
                self.trainer.set_speed(speed);
                settings::save_speed(self.store.as_ref(), speed);
            }
            Event::Volume(volume) => self.engine.set_master_volume(volume),
            Event::Labels(show) => {
                self.show_labels.send_replace(show);
            }
            Event::Panic => self.trainer.interrupt(),
            Event::Unlock => unlock(&self.engine).await,
            Event::Status => self.report(Ok(())),
            Event::Timbre(_) => println!("The timbre only applies in play mode."),
            Event::Quit => return Flow::Quit,
        }
        Flow::Continue
    }
}

fn open_store(config: &Keynote) -> Arc<dyn SettingsStore> {
    match config.settings_file() {
        Some(path) => {
            info!(path = ?path, "Using settings file.");
            Arc::new(FileStore::new(path))
        }
        None => Arc::new(MemoryStore::new()),
    }
}

fn create_engine(config: &Keynote) -> Result<Arc<ToneEngine>, Box<dyn Error>> {
    let device = audio::get_device(config.audio())?;
    info!(device = device.to_string(), "Using audio device.");
    Ok(Arc::new(ToneEngine::new(device, config.instrument())?))
}

fn default_settings(config: &Keynote) -> InstrumentSettings {
    InstrumentSettings {
        volume: config.instrument().volume(),
        ..Default::default()
    }
}

/// Runs the instrument until the input closes or quit is entered.
pub async fn play(config: &Keynote) -> Result<(), Box<dyn Error>> {
    let engine = create_engine(config)?;
    let handler = PlayHandler::new(engine.clone(), open_store(config), default_settings(config));
    println!("{}", keyboard_layout(0, handler.settings().show_keyboard_keys));
    println!("Type a key and press enter to play it, or 'help' for commands.");

    let mut controller = Controller::new(handler, Arc::new(keyboard::Driver::new()));
    controller.join().await?;
    engine.dispose();
    Ok(())
}

/// Runs the note trainer until the input closes or quit is entered.
pub async fn train(config: &Keynote) -> Result<(), Box<dyn Error>> {
    let engine = create_engine(config)?;
    let handler = TrainHandler::new(engine.clone(), open_store(config), default_settings(config));
    let view = spawn_trainer_view(handler.trainer().subscribe(), handler.labels());
    println!(
        "{}",
        render_status(&handler.trainer().snapshot(), *handler.labels().borrow())
    );
    println!("Type 'start' to begin, then play the target note, or 'help' for commands.");

    let mut controller = Controller::new(handler, Arc::new(keyboard::Driver::new()));
    controller.join().await?;
    view.abort();
    engine.dispose();
    Ok(())
}
