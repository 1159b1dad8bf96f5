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
// The note trainer: timed rounds asking for one note at a time.
//
// A session is Idle, Running or Paused. While Running, each round is Armed
// with a countdown until the target note is played (a hit) or the countdown
// runs out (a miss). Either way the round is Resolved and the next one is
// armed after a short grace delay.
//
// Every transition runs under a single lock. Waiting is done by spawned
// tokio tasks, at most one at a time, each tagged with the round generation
// it was scheduled for so that a late firing is ignored.

use std::{
    collections::BTreeSet,
    fmt,
    str::FromStr,
    sync::{Arc, Weak},
    time::Duration,
};

use parking_lot::Mutex;
use rand::{rngs::StdRng, Rng, SeedableRng};
use tokio::{sync::watch, task::JoinHandle, time::Instant};
use tracing::{debug, info};

use crate::{
    pitch::{self, NoteName},
    tone::{Cue, Sound},
};


/// Delay between resolving a round and arming the next.
pub const GRACE_DELAY: Duration = Duration::from_millis(400);

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Running,
    Paused,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            State::Idle => "idle",
            State::Running => "running",
            State::Paused => "paused",
        })
    }
}

/// Seconds allowed per note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Speed(u8);

impl Speed {
    /// The selectable speeds, in seconds.
    pub const OPTIONS: [u8; 3] = [3, 5, 8];

    pub fn seconds(&self) -> u8 {
        self.0
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.0 as u64)
    }
}

impl Default for Speed {
    fn default() -> Self {
        Speed(5)
    }
}

impl fmt::Display for Speed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0)
    }
}

impl TryFrom<u64> for Speed {
    type Error = TrainerError;

    fn try_from(seconds: u64) -> Result<Self, Self::Error> {
        Speed::OPTIONS
            .iter()
            .find(|option| **option as u64 == seconds)
            .map(|option| Speed(*option))
            .ok_or(TrainerError::InvalidSpeed(seconds.to_string()))
    }
}

impl FromStr for Speed {
    type Err = TrainerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let seconds = trimmed.strip_suffix('s').unwrap_or(trimmed);
        seconds
            .parse::<u64>()
            .map_err(|_| TrainerError::InvalidSpeed(s.to_string()))
            .and_then(Speed::try_from)
    }
}

/// Errors returned by trainer operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TrainerError {
    #[error("cannot {action} while {state}")]
    InvalidTransition { action: &'static str, state: State },

    #[error("invalid speed {0}, expected one of 3, 5 or 8 seconds")]
    InvalidSpeed(String),
}

/// Scores and settings for a session. Reset clears the scores but keeps the
/// speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrainerSession {
    pub state: State,
    pub score: u32,
    pub streak: u32,
    pub best_streak: u32,
    pub speed: Speed,
}

/// Where the current round stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundPhase {
    /// No round in play: idle or paused.
    Inactive,
    /// Counting down, waiting for the target.
    Armed,
    /// Hit or missed, waiting out the grace delay.
    Resolved,
}

/// How a round ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Hit,
    Miss,
}

/// Everything a view needs to draw the trainer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainerSnapshot {
    pub session: TrainerSession,
    pub target: NoteName,
    pub phase: RoundPhase,
    pub remaining: Duration,
    /// Trainer keys currently held down.
    pub pressed_keys: Vec<String>,
    pub last_outcome: Option<Outcome>,
}

impl TrainerSnapshot {
    /// Fraction of the round left, 0 to 1.
    pub fn time_ratio(&self) -> f64 {
        let total = self.session.speed.duration().as_secs_f64();
        (self.remaining.as_secs_f64() / total).clamp(0.0, 1.0)
    }
}

/// Picks a note from the pool, never the previous one.
pub fn next_target<R: Rng>(rng: &mut R, previous: Option<&NoteName>) -> NoteName {
    let pool: Vec<NoteName> = pitch::note_pool()
        .into_iter()
        .filter(|note| Some(note) != previous)
        .collect();
    pool[rng.gen_range(0..pool.len())]
}

#[derive(Debug, Clone, Copy)]
enum Round {
    None,
    Armed {
        started_at: Instant,
        duration: Duration,
    },
    Resolved,
}

struct Inner {
    /// Handle back to ourselves for scheduled tasks.
    weak: Weak<Mutex<Inner>>,
    sound: Arc<dyn Sound>,
    rng: StdRng,
    session: TrainerSession,
    target: NoteName,
    round: Round,
    /// Remaining time shown while no countdown runs.
    frozen_remaining: Duration,
    /// Set when a pause lands in the grace delay, so resume moves on.
    advance_on_resume: bool,
    last_outcome: Option<Outcome>,
    pressed: BTreeSet<String>,
    /// The single pending countdown or grace timer.
    pending: Option<JoinHandle<()>>,
    generation: u64,
    updates: watch::Sender<TrainerSnapshot>,
}

impl Inner {
    fn snapshot(&self) -> TrainerSnapshot {
        let (phase, remaining) = match self.round {
            Round::None => (RoundPhase::Inactive, self.frozen_remaining),
            Round::Armed {
                started_at,
                duration,
            } => (
                RoundPhase::Armed,
                duration.saturating_sub(started_at.elapsed()),
            ),
            Round::Resolved => (RoundPhase::Resolved, self.frozen_remaining),
        };
        TrainerSnapshot {
            session: self.session,
            target: self.target,
            phase,
            remaining,
            pressed_keys: self.pressed.iter().cloned().collect(),
            last_outcome: self.last_outcome,
        }
    }

    fn publish(&self) {
        self.updates.send_replace(self.snapshot());
    }

    /// Cancels the pending timer and invalidates anything already in flight.
    fn cancel_timers(&mut self) {
        self.generation += 1;
        if let Some(pending) = self.pending.take() {
            pending.abort();
        }
    }

    /// Schedules the given callback for the deadline, replacing any pending
    /// timer.
    fn schedule(&mut self, deadline: Instant, fire: fn(&mut Inner)) {
        self.cancel_timers();
        let generation = self.generation;
        let weak = self.weak.clone();
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let mut inner = inner.lock();
            if inner.generation != generation {
                return;
            }
            inner.pending = None;
            fire(&mut inner);
            inner.publish();
        }));
    }

    /// Arms a round for the current target with a full countdown.
    fn arm_round(&mut self) {
        let duration = self.session.speed.duration();
        let started_at = Instant::now();
        self.round = Round::Armed {
            started_at,
            duration,
        };
        self.advance_on_resume = false;
        self.schedule(started_at + duration, Inner::on_deadline);
        debug!(note = %self.target, ?duration, "Round armed.");
    }

    fn remaining(&self) -> Duration {
        match self.round {
            Round::Armed {
                started_at,
                duration,
            } => duration.saturating_sub(started_at.elapsed()),
            _ => self.frozen_remaining,
        }
    }

    fn resolve(&mut self, outcome: Outcome) {
        self.frozen_remaining = match outcome {
            Outcome::Hit => self.remaining(),
            Outcome::Miss => Duration::ZERO,
        };
        self.round = Round::Resolved;
        self.last_outcome = Some(outcome);
        self.schedule(Instant::now() + GRACE_DELAY, Inner::on_advance);
    }

    fn on_deadline(&mut self) {
        if self.session.state != State::Running || !matches!(self.round, Round::Armed { .. }) {
            return;
        }
        self.sound.play_cue(Cue::Fail);
        self.session.streak = 0;
        info!(note = %self.target, score = self.session.score, "Missed.");
        self.resolve(Outcome::Miss);
    }

    fn on_advance(&mut self) {
        if self.session.state != State::Running {
            return;
        }
        self.target = next_target(&mut self.rng, Some(&self.target));
        self.arm_round();
    }

    fn invalid(&self, action: &'static str) -> TrainerError {
        TrainerError::InvalidTransition {
            action,
            state: self.session.state,
        }
    }
}

/// The note trainer. Operations that arm timers must run inside a tokio
/// runtime.
pub struct Trainer {
    inner: Arc<Mutex<Inner>>,
}

impl Trainer {
    /// Creates an idle trainer with a randomly seeded target picker.
    pub fn new(sound: Arc<dyn Sound>, speed: Speed) -> Trainer {
        Trainer::with_rng(sound, speed, StdRng::from_entropy())
    }

    /// Creates an idle trainer that picks targets with the given generator.
    pub fn with_rng(sound: Arc<dyn Sound>, speed: Speed, mut rng: StdRng) -> Trainer {
        let target = next_target(&mut rng, None);
        let session = TrainerSession {
            state: State::Idle,
            score: 0,
            streak: 0,
            best_streak: 0,
            speed,
        };
        let inner = Arc::new_cyclic(|weak| {
            let initial = TrainerSnapshot {
                session,
                target,
                phase: RoundPhase::Inactive,
                remaining: speed.duration(),
                pressed_keys: Vec::new(),
                last_outcome: None,
            };
            Mutex::new(Inner {
                weak: weak.clone(),
                sound,
                rng,
                session,
                target,
                round: Round::None,
                frozen_remaining: speed.duration(),
                advance_on_resume: false,
                last_outcome: None,
                pressed: BTreeSet::new(),
                pending: None,
                generation: 0,
                updates: watch::Sender::new(initial),
            })
        });
        Trainer { inner }
    }

    /// Starts a session from Idle, zeroing the scores and arming the current
    /// target.
    pub fn start(&self) -> Result<(), TrainerError> {
        let mut inner = self.inner.lock();
        if inner.session.state != State::Idle {
            return Err(inner.invalid("start"));
        }
        inner.session.state = State::Running;
        inner.session.score = 0;
        inner.session.streak = 0;
        inner.session.best_streak = 0;
        inner.last_outcome = None;
        inner.arm_round();
        info!(note = %inner.target, speed = %inner.session.speed, "Trainer started.");
        inner.publish();
        Ok(())
    }

    /// Pauses a running session without resolving the round.
    pub fn pause(&self) -> Result<(), TrainerError> {
        let mut inner = self.inner.lock();
        if inner.session.state != State::Running {
            return Err(inner.invalid("pause"));
        }
        Trainer::suspend(&mut inner);
        info!("Trainer paused.");
        inner.publish();
        Ok(())
    }

    /// Resumes a paused session. The countdown restarts at full duration for
    /// the same target, or for the next one if the pause came during the
    /// grace delay.
    pub fn resume(&self) -> Result<(), TrainerError> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if inner.session.state != State::Paused {
            return Err(inner.invalid("resume"));
        }
        inner.session.state = State::Running;
        if inner.advance_on_resume {
            inner.target = next_target(&mut inner.rng, Some(&inner.target));
        }
        inner.arm_round();
        info!(note = %inner.target, "Trainer resumed.");
        inner.publish();
        Ok(())
    }

    /// Returns to Idle from any state, clearing the scores and picking a new
    /// target. The speed is kept.
    pub fn reset(&self) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        inner.cancel_timers();
        inner.session.state = State::Idle;
        inner.session.score = 0;
        inner.session.streak = 0;
        inner.session.best_streak = 0;
        inner.round = Round::None;
        inner.advance_on_resume = false;
        inner.last_outcome = None;
        inner.frozen_remaining = inner.session.speed.duration();
        inner.target = next_target(&mut inner.rng, Some(&inner.target));
        info!(note = %inner.target, "Trainer reset.");
        inner.publish();
    }

    /// Changes the time allowed per note. An armed round restarts with the
    /// new full duration for the same target.
    pub fn set_speed(&self, speed: Speed) {
        let mut inner = self.inner.lock();
        inner.session.speed = speed;
        if inner.session.state == State::Running && matches!(inner.round, Round::Armed { .. }) {
            inner.arm_round();
        } else if matches!(inner.round, Round::None) {
            inner.frozen_remaining = speed.duration();
        }
        info!(%speed, "Speed set.");
        inner.publish();
    }

    /// Handles a trainer key press. Every fresh press of a mapped key sounds
    /// its note, and a key already held is ignored until released. Only the
    /// target while a round is armed counts as a hit.
    /// Returns true on a hit.
    pub fn key_down(&self, key: &str, repeat: bool) -> bool {
        let key = key.to_lowercase();
        let Some(note) = pitch::key_to_note(&key) else {
            return false;
        };
        if repeat {
            return false;
        }

        let mut inner = self.inner.lock();
        // Held keys stay silent until released.
        if !inner.pressed.insert(key) {
            return false;
        }
        inner.sound.play_cue(Cue::Note(note));

        let armed = matches!(inner.round, Round::Armed { .. });
        if inner.session.state != State::Running || !armed || note != inner.target {
            inner.publish();
            return false;
        }

        inner.sound.play_cue(Cue::Success);
        inner.session.score += 1;
        inner.session.streak += 1;
        inner.session.best_streak = inner.session.best_streak.max(inner.session.streak);
        info!(
            note = %inner.target,
            score = inner.session.score,
            streak = inner.session.streak,
            "Hit."
        );
        inner.resolve(Outcome::Hit);
        inner.publish();
        true
    }

    /// Handles a trainer key release.
    pub fn key_up(&self, key: &str) {
        let mut inner = self.inner.lock();
        if inner.pressed.remove(&key.to_lowercase()) {
            inner.publish();
        }
    }

    /// Handles focus loss: a running session pauses without scoring and all
    /// held keys are forgotten.
    pub fn interrupt(&self) {
        let mut inner = self.inner.lock();
        if inner.session.state == State::Running {
            Trainer::suspend(&mut inner);
            info!("Trainer paused by interruption.");
        } else {
            inner.cancel_timers();
        }
        inner.pressed.clear();
        inner.publish();
    }

    fn suspend(inner: &mut Inner) {
        inner.frozen_remaining = inner.remaining();
        inner.advance_on_resume = matches!(inner.round, Round::Resolved);
        inner.cancel_timers();
        inner.round = Round::None;
        inner.session.state = State::Paused;
    }

    /// Returns the current state with the remaining time computed now.
    pub fn snapshot(&self) -> TrainerSnapshot {
        self.inner.lock().snapshot()
    }

    /// Returns a receiver that sees a new snapshot after every transition.
    pub fn subscribe(&self) -> watch::Receiver<TrainerSnapshot> {
        self.inner.lock().updates.subscribe()
    }

    /// Cancels every pending timer. The session keeps its state.
    pub fn shutdown(&self) {
        self.inner.lock().cancel_timers();
    }
}

impl Drop for Trainer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
