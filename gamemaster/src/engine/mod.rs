//! The single-writer game state machine (spec.md §4.2): one task owns
//! every field below and the only way in is through [`EngineEvent`].
//!
//! Grounded in `backbone_lib::middle_layer::MiddleLayer::update_server`'s
//! shape: one authoritative task draining a command channel, rather than
//! a shared lock guarding the same fields. Control tasks never touch this
//! state directly — see [`control_task`].

mod commands;
mod control_task;
mod handle;
mod state;

pub use handle::UnitHandle;
pub use state::{Durations, GameState, TimerPhase};

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use rand::seq::SliceRandom;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::clock::Clock;
use control_task::ControlTask;

/// Everything that can happen to the Engine: unit lifecycle, button
/// events, and control-task timer fires. `Timer` carries the generation
/// it was spawned for so a stale fire (raced by a cancellation) is
/// dropped rather than acted on.
pub enum EngineEvent {
    Register { uid: u64, handle: UnitHandle },
    Unregister { uid: u64 },
    Press { uid: u64 },
    Release { uid: u64 },
    Timer { generation: u64, phase: TimerPhase },
}

pub struct GameEngine {
    clock: Arc<dyn Clock>,
    durations: Durations,
    events_tx: mpsc::UnboundedSender<EngineEvent>,

    state: GameState,
    active: HashMap<u64, UnitHandle>,
    unit_list: Vec<u64>,
    previous_correct: HashSet<u64>,
    correct: Option<u64>,
    wrong: Option<u64>,
    pressed_units: HashSet<u64>,
    last_press_time: Option<std::time::Instant>,

    player_scores: HashMap<u8, u32>,
    player_colors: HashMap<u8, (u8, u8, u8)>,
    player_queue: HashMap<u8, VecDeque<u64>>,
    correct_units: HashMap<u8, Option<u64>>,

    control_task: Option<ControlTask>,
    next_generation: u64,
}

impl GameEngine {
    pub fn new(
        clock: Arc<dyn Clock>,
        durations: Durations,
        events_tx: mpsc::UnboundedSender<EngineEvent>,
    ) -> Self {
        let mut player_colors = HashMap::new();
        player_colors.insert(1, (255, 255, 0));
        player_colors.insert(2, (0, 0, 255));

        let mut player_scores = HashMap::new();
        player_scores.insert(1, 0);
        player_scores.insert(2, 0);

        let mut correct_units = HashMap::new();
        correct_units.insert(1, None);
        correct_units.insert(2, None);

        let mut player_queue = HashMap::new();
        player_queue.insert(1, VecDeque::new());
        player_queue.insert(2, VecDeque::new());

        Self {
            clock,
            durations,
            events_tx,
            state: GameState::NoUnits,
            active: HashMap::new(),
            unit_list: Vec::new(),
            previous_correct: HashSet::new(),
            correct: None,
            wrong: None,
            pressed_units: HashSet::new(),
            last_press_time: None,
            player_scores,
            player_colors,
            player_queue,
            correct_units,
            control_task: None,
            next_generation: 0,
        }
    }

    pub async fn run(mut self, mut events_rx: mpsc::UnboundedReceiver<EngineEvent>) {
        while let Some(event) = events_rx.recv().await {
            self.handle_event(event);
        }
    }

    pub fn state(&self) -> GameState {
        self.state
    }

    pub fn correct(&self) -> Option<u64> {
        self.correct
    }

    pub fn wrong(&self) -> Option<u64> {
        self.wrong
    }

    pub fn active_ids(&self) -> HashSet<u64> {
        self.active.keys().copied().collect()
    }

    pub fn control_task_generation(&self) -> Option<u64> {
        self.control_task.as_ref().map(ControlTask::generation)
    }

    pub fn player_score(&self, player: u8) -> u32 {
        self.player_scores.get(&player).copied().unwrap_or(0)
    }

    fn handle_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Register { uid, handle } => self.on_register(uid, handle),
            EngineEvent::Unregister { uid } => self.on_unregister(uid),
            EngineEvent::Press { uid } => self.on_press(uid),
            EngineEvent::Release { uid } => self.on_release(uid),
            EngineEvent::Timer { generation, phase } => self.on_timer(generation, phase),
        }
    }

    // ---- control-task slot management ---------------------------------

    /// Cancels whatever is running, then installs a fresh task under the
    /// next generation number. `spawn` is handed the new generation and a
    /// clone of the Engine's own event sender so it can report back.
    fn install_task(
        &mut self,
        spawn: impl FnOnce(u64, mpsc::UnboundedSender<EngineEvent>) -> ControlTask,
    ) {
        if let Some(old) = self.control_task.take() {
            old.cancel();
        }
        self.next_generation += 1;
        let generation = self.next_generation;
        self.control_task = Some(spawn(generation, self.events_tx.clone()));
    }

    fn on_timer(&mut self, generation: u64, phase: TimerPhase) {
        match &self.control_task {
            Some(task) if task.generation() == generation => {}
            _ => {
                debug!(?phase, generation, "dropping stale control-task timer");
                return;
            }
        }
        match phase {
            TimerPhase::AttractorTick => self.attractor_tick(),
            TimerPhase::AllReleasedTimeout => self.enter_timeout(),
            TimerPhase::WaitReleaseFlash => self.wait_release_flash_fire(),
            TimerPhase::LoseStopAll => self.lose_stop_all(),
            TimerPhase::LoseReturn => self.return_to_attract(),
            TimerPhase::WinStopAll => self.win_stop_all(),
            TimerPhase::WinReturn => self.return_to_attract(),
            TimerPhase::TimeoutEnd => self.timeout_end(),
            TimerPhase::MultiplayerPartition => self.multiplayer_partition(),
            TimerPhase::MultiplayerInactivity => self.enter_timeout(),
            TimerPhase::EndMultiplayerStopAll => self.end_multiplayer_stop_all(),
        }
    }

    // ---- registration / unregistration ---------------------------------

    fn on_register(&mut self, uid: u64, handle: UnitHandle) {
        info!(unit = format_args!("{uid:#x}"), "unit registered");
        self.active.insert(uid, handle);

        // Every newly (re-)registered unit is told to stop all actuators
        // first, regardless of what state the register lands in, so that
        // a cue the entry below enqueues for this same unit (e.g. its own
        // PreGameSingle `correct()` light-up) is the one that wins FIFO,
        // not this reset.
        if let Some(h) = self.active.get(&uid) {
            let at = commands::schedule_at(&*self.clock, h.latency_seconds());
            for cmd in commands::stop_all(at) {
                h.enqueue(cmd);
            }
        }

        match self.state {
            GameState::NoUnits => {
                self.state = GameState::PreGameSingle;
                self.enter_pre_game_single();
            }
            GameState::PreGameSingle => {
                if self.active.len() > 1 {
                    self.state = GameState::PreGameMultiple;
                    self.enter_pre_game_multiple();
                } else {
                    self.enter_pre_game_single();
                }
            }
            _ => {}
        }
    }

    fn on_unregister(&mut self, uid: u64) {
        info!(unit = format_args!("{uid:#x}"), "unit unregistered");
        self.active.remove(&uid);
        self.previous_correct.remove(&uid);
        self.pressed_units.remove(&uid);

        if let Some(pos) = self.unit_list.iter().position(|id| *id == uid) {
            self.unit_list.remove(pos);
        } else if Some(uid) == self.correct {
            self.next_correct();
            self.next_wrong();
        }
        if Some(uid) == self.wrong {
            self.next_wrong();
        }

        if self.active.is_empty() {
            if let Some(task) = self.control_task.take() {
                task.cancel();
            }
            self.state = GameState::NoUnits;
        } else if self.state == GameState::PreGameMultiple && self.active.len() == 1 {
            self.state = GameState::PreGameSingle;
            self.enter_pre_game_single();
        } else if self.state == GameState::Playing && self.active.len() == 1 {
            self.enter_win();
        }
    }

    // ---- attract-mode entry ---------------------------------------------

    fn enter_pre_game_single(&mut self) {
        if let Some(prev) = self.correct {
            if let Some(h) = self.active.get(&prev) {
                let at = commands::schedule_at(&*self.clock, h.latency_seconds());
                for cmd in commands::stop_all(at) {
                    h.enqueue(cmd);
                }
            }
        }
        let ids: Vec<u64> = self.active.keys().copied().collect();
        self.correct = ids.choose(&mut rand::thread_rng()).copied();
        if let Some(c) = self.correct {
            if let Some(h) = self.active.get(&c) {
                let at = commands::schedule_at(&*self.clock, h.latency_seconds());
                for cmd in commands::correct(at) {
                    h.enqueue(cmd);
                }
            }
        }
        self.install_task(|gen, _tx| control_task::spawn_noop(gen));
    }

    fn enter_pre_game_multiple(&mut self) {
        self.attractor_tick();
        let every = self.durations.attractor_tick;
        self.install_task(move |gen, tx| {
            control_task::spawn_repeating(gen, every, TimerPhase::AttractorTick, tx)
        });
    }

    fn attractor_tick(&mut self) {
        if let Some(prev) = self.correct {
            if let Some(h) = self.active.get(&prev) {
                let at = commands::schedule_at(&*self.clock, h.latency_seconds());
                for cmd in commands::stop_all(at) {
                    h.enqueue(cmd);
                }
            }
        }
        let ids: Vec<u64> = self.active.keys().copied().collect();
        if ids.is_empty() {
            self.correct = None;
            return;
        }
        let mut rng = rand::thread_rng();
        let next = if ids.len() == 1 {
            ids[0]
        } else {
            loop {
                let candidate = *ids.choose(&mut rng).expect("non-empty");
                if Some(candidate) != self.correct {
                    break candidate;
                }
            }
        };
        self.correct = Some(next);
        if let Some(h) = self.active.get(&next) {
            let at = commands::schedule_at(&*self.clock, h.latency_seconds());
            for cmd in commands::correct(at) {
                h.enqueue(cmd);
            }
        }
    }

    /// Shared ending for Lose/Win/Timeout/EndMultiplayer: clears round
    /// bookkeeping and picks the next state by population, diverting to
    /// `WaitRelease` if any button is still physically held (the source
    /// defines `WaitRelease`'s handlers and control task but never wires
    /// an entry edge into it; this is that edge).
    fn return_to_attract(&mut self) {
        self.previous_correct.clear();
        self.correct = None;
        self.wrong = None;

        if !self.pressed_units.is_empty() {
            self.state = GameState::WaitRelease;
            let dur = self.durations.wait_release_flash;
            self.install_task(move |gen, tx| {
                control_task::spawn_once(gen, dur, TimerPhase::WaitReleaseFlash, tx)
            });
            return;
        }

        match self.active.len() {
            0 => {
                if let Some(task) = self.control_task.take() {
                    task.cancel();
                }
                self.state = GameState::NoUnits;
            }
            1 => {
                self.state = GameState::PreGameSingle;
                self.enter_pre_game_single();
            }
            _ => {
                self.state = GameState::PreGameMultiple;
                self.enter_pre_game_multiple();
            }
        }
    }

    // ---- round bookkeeping ------------------------------------------------

    fn setup_round(&mut self) {
        let mut ids: Vec<u64> = self.active.keys().copied().collect();
        ids.shuffle(&mut rand::thread_rng());
        self.unit_list = ids;
    }

    fn next_correct(&mut self) {
        if self.unit_list.is_empty() {
            self.correct = None;
            return;
        }
        let next = self.unit_list.remove(0);
        self.correct = Some(next);
        if let Some(h) = self.active.get(&next) {
            let at = commands::schedule_at(&*self.clock, h.latency_seconds());
            for cmd in commands::correct(at) {
                h.enqueue(cmd);
            }
        }
    }

    fn next_wrong(&mut self) {
        if self.unit_list.is_empty() {
            self.wrong = None;
            return;
        }
        if let Some(prev) = self.wrong {
            if Some(prev) != self.correct {
                if let Some(h) = self.active.get(&prev) {
                    let at = commands::schedule_at(&*self.clock, h.latency_seconds());
                    for cmd in commands::stop_all(at) {
                        h.enqueue(cmd);
                    }
                }
            }
        }
        let next = *self
            .unit_list
            .choose(&mut rand::thread_rng())
            .expect("non-empty");
        self.wrong = Some(next);
        if let Some(h) = self.active.get(&next) {
            let at = commands::schedule_at(&*self.clock, h.latency_seconds());
            for cmd in commands::wrong(at) {
                h.enqueue(cmd);
            }
        }
    }

    /// Sends `build`'s commands to every active unit at once, timestamped
    /// by `at`.
    fn broadcast(
        &self,
        at: protocol::ActuatorTimestamp,
        build: impl Fn(protocol::ActuatorTimestamp) -> Vec<protocol::ActuatorCommand>,
    ) {
        for h in self.active.values() {
            for cmd in build(at) {
                h.enqueue(cmd);
            }
        }
    }

    /// `broadcast`, timestamped from the max latency across every active
    /// unit — the right basis when nothing singles any unit out (stop-all
    /// resets, a cluster-wide win, a timeout).
    fn emit_cluster(&self, build: impl Fn(protocol::ActuatorTimestamp) -> Vec<protocol::ActuatorCommand>) {
        let latency = commands::max_latency(self.active.values().map(UnitHandle::latency_seconds));
        let at = commands::schedule_at(&*self.clock, latency);
        self.broadcast(at, build);
    }

    /// `broadcast`, timestamped from the max latency across only
    /// `pressed_units` — spec.md §4.2 item 2's wrong-press lose cue, which
    /// the original computes as `max(unit.ws.latency for unit in
    /// self.pressed_units)`, not over every active unit.
    fn emit_cluster_from_pressed(
        &self,
        build: impl Fn(protocol::ActuatorTimestamp) -> Vec<protocol::ActuatorCommand>,
    ) {
        let latency = commands::max_latency(
            self.pressed_units
                .iter()
                .filter_map(|uid| self.active.get(uid))
                .map(UnitHandle::latency_seconds),
        );
        let at = commands::schedule_at(&*self.clock, latency);
        self.broadcast(at, build);
    }

    // ---- press handling ---------------------------------------------------

    fn is_fast_press(&mut self) -> bool {
        let now = self.clock.mono_now();
        let Some(last) = self.last_press_time else {
            self.last_press_time = Some(now);
            return false;
        };
        let elapsed = now.duration_since(last).as_secs_f64();
        self.last_press_time = Some(now);
        elapsed < protocol::PRESS_THRESHOLD_SECONDS
    }

    fn on_press(&mut self, uid: u64) {
        if self.state == GameState::Timeout {
            return;
        }
        if !self.active.contains_key(&uid) {
            return;
        }

        if Some(uid) == self.correct
            && matches!(self.state, GameState::Playing | GameState::PlayingAllReleased)
            && self.is_fast_press()
        {
            info!("fast press detected, switching to multiplayer");
            self.start_multiplayer();
            return;
        }

        self.pressed_units.insert(uid);

        match self.state {
            GameState::PreGameSingle => self.press_pre_game_single(uid),
            GameState::PreGameMultiple => self.press_pre_game_multiple(uid),
            GameState::Playing => self.press_playing(uid),
            GameState::PlayingAllReleased => self.press_playing_all_released(uid),
            GameState::WaitRelease => self.press_wait_release(uid),
            GameState::PreGameMultiplayer | GameState::PlayingMultiplayer => {
                self.press_playing_multiplayer(uid)
            }
            GameState::Lose
            | GameState::Win
            | GameState::NoUnits
            | GameState::EndMultiplayer
            | GameState::Timeout => {}
        }
    }

    fn press_pre_game_single(&mut self, _uid: u64) {
        self.enter_win();
    }

    fn press_pre_game_multiple(&mut self, uid: u64) {
        if Some(uid) != self.correct {
            return;
        }
        if let Some(h) = self.active.get(&uid) {
            let at = commands::schedule_at(&*self.clock, h.latency_seconds());
            for cmd in commands::correct_pressed(at) {
                h.enqueue(cmd);
            }
        }
        self.previous_correct.insert(uid);
        self.setup_round();
        self.unit_list.retain(|id| *id != uid);
        self.next_correct();
        self.next_wrong();
        self.state = GameState::Playing;
        self.install_task(|gen, _tx| control_task::spawn_noop(gen));
    }

    fn press_playing(&mut self, uid: u64) {
        if self.previous_correct.contains(&uid) {
            if let Some(h) = self.active.get(&uid) {
                let at = commands::schedule_at(&*self.clock, h.latency_seconds());
                for cmd in commands::correct_pressed(at) {
                    h.enqueue(cmd);
                }
            }
        } else if Some(uid) == self.wrong {
            self.enter_lose();
        } else if Some(uid) == self.correct {
            if self.unit_list.is_empty() {
                self.enter_win();
            } else {
                if let Some(h) = self.active.get(&uid) {
                    let at = commands::schedule_at(&*self.clock, h.latency_seconds());
                    for cmd in commands::correct_pressed(at) {
                        h.enqueue(cmd);
                    }
                }
                self.previous_correct.insert(uid);
                self.next_correct();
                self.next_wrong();
            }
        }
    }

    fn press_playing_all_released(&mut self, uid: u64) {
        if self.previous_correct.contains(&uid) {
            if let Some(h) = self.active.get(&uid) {
                let at = commands::schedule_at(&*self.clock, h.latency_seconds());
                for cmd in commands::correct_pressed(at) {
                    h.enqueue(cmd);
                }
            }
            self.state = GameState::Playing;
            self.install_task(|gen, _tx| control_task::spawn_noop(gen));
        } else if Some(uid) == self.wrong {
            self.enter_lose();
        } else if Some(uid) == self.correct {
            self.previous_correct.insert(uid);
            if self.unit_list.is_empty() {
                self.enter_win();
            } else {
                if let Some(h) = self.active.get(&uid) {
                    let at = commands::schedule_at(&*self.clock, h.latency_seconds());
                    for cmd in commands::correct_pressed(at) {
                        h.enqueue(cmd);
                    }
                }
                self.next_correct();
                self.next_wrong();
                self.state = GameState::Playing;
                self.install_task(|gen, _tx| control_task::spawn_noop(gen));
            }
        }
    }

    fn press_wait_release(&mut self, uid: u64) {
        if let Some(h) = self.active.get(&uid) {
            let at = commands::schedule_at(&*self.clock, h.latency_seconds());
            for cmd in commands::wait_release_hold(at) {
                h.enqueue(cmd);
            }
        }
    }

    fn press_playing_multiplayer(&mut self, uid: u64) {
        let player = if self.correct_units.get(&1).copied().flatten() == Some(uid) {
            1
        } else if self.correct_units.get(&2).copied().flatten() == Some(uid) {
            2
        } else {
            return;
        };

        *self.player_scores.entry(player).or_insert(0) += 1;
        let color = *self.player_colors.get(&player).expect("seeded for 1,2");
        if let Some(h) = self.active.get(&uid) {
            let at = commands::schedule_at(&*self.clock, h.latency_seconds());
            for cmd in commands::correct_pressed_multiplayer(color, at) {
                h.enqueue(cmd);
            }
        }
        self.previous_correct.insert(uid);
        self.next_correct_multi(player);

        let score = self.player_score(player) as usize;
        if score >= self.active.len() / 2 && self.state != GameState::EndMultiplayer {
            self.enter_end_multiplayer(player);
        } else {
            self.state = GameState::PlayingMultiplayer;
            let dur = self.durations.multiplayer_inactivity;
            self.install_task(move |gen, tx| {
                control_task::spawn_once(gen, dur, TimerPhase::MultiplayerInactivity, tx)
            });
        }
    }

    fn next_correct_multi(&mut self, player: u8) {
        let next = self.player_queue.entry(player).or_default().pop_front();
        self.correct_units.insert(player, next);
        if let Some(next) = next {
            if let Some(h) = self.active.get(&next) {
                let at = commands::schedule_at(&*self.clock, h.latency_seconds());
                for cmd in commands::multiplayer_target(player, at) {
                    h.enqueue(cmd);
                }
            }
        }
    }

    // ---- release handling ---------------------------------------------------

    fn on_release(&mut self, uid: u64) {
        if self.state == GameState::Timeout {
            return;
        }
        if !self.active.contains_key(&uid) {
            return;
        }
        self.pressed_units.remove(&uid);
        match self.state {
            GameState::Playing => self.release_playing(),
            GameState::WaitRelease => self.release_wait_release(uid),
            _ => {}
        }
    }

    fn release_playing(&mut self) {
        if self.pressed_units.is_empty() {
            self.state = GameState::PlayingAllReleased;
            let dur = self.durations.all_released_timeout;
            self.install_task(move |gen, tx| {
                control_task::spawn_once(gen, dur, TimerPhase::AllReleasedTimeout, tx)
            });
        }
    }

    fn release_wait_release(&mut self, uid: u64) {
        if let Some(h) = self.active.get(&uid) {
            let at = commands::schedule_at(&*self.clock, h.latency_seconds());
            for cmd in commands::stop_all(at) {
                h.enqueue(cmd);
            }
        }
        self.previous_correct.remove(&uid);
        if self.pressed_units.is_empty() {
            if self.active.len() > 1 {
                self.state = GameState::PreGameMultiple;
                self.enter_pre_game_multiple();
            } else if self.active.len() == 1 {
                self.state = GameState::PreGameSingle;
                self.enter_pre_game_single();
            }
        }
    }

    // ---- win / lose / timeout / multiplayer transitions ------------------

    fn enter_win(&mut self) {
        self.state = GameState::Win;
        self.emit_cluster(|at| commands::win_random(at).to_vec());
        let dwell = self.durations.win_dwell;
        self.install_task(move |gen, tx| {
            control_task::spawn_once(gen, dwell, TimerPhase::WinStopAll, tx)
        });
    }

    fn win_stop_all(&mut self) {
        self.emit_cluster(|at| commands::stop_all(at).to_vec());
        let dwell = self.durations.win_dwell;
        self.install_task(move |gen, tx| {
            control_task::spawn_once(gen, dwell, TimerPhase::WinReturn, tx)
        });
    }

    fn enter_lose(&mut self) {
        self.state = GameState::Lose;
        self.emit_cluster_from_pressed(|at| commands::lose_random(at).to_vec());
        let dwell = self.durations.lose_dwell;
        self.install_task(move |gen, tx| {
            control_task::spawn_once(gen, dwell, TimerPhase::LoseStopAll, tx)
        });
    }

    fn lose_stop_all(&mut self) {
        self.emit_cluster(|at| commands::stop_all(at).to_vec());
        let dwell = self.durations.lose_dwell;
        self.install_task(move |gen, tx| {
            control_task::spawn_once(gen, dwell, TimerPhase::LoseReturn, tx)
        });
    }

    fn enter_timeout(&mut self) {
        self.state = GameState::Timeout;
        self.emit_cluster(|at| commands::lose_random(at).to_vec());
        let dwell = self.durations.timeout_dwell;
        self.install_task(move |gen, tx| {
            control_task::spawn_once(gen, dwell, TimerPhase::TimeoutEnd, tx)
        });
    }

    fn timeout_end(&mut self) {
        self.emit_cluster(|at| commands::stop_all(at).to_vec());
        self.return_to_attract();
    }

    fn wait_release_flash_fire(&mut self) {
        let held: Vec<u64> = self.pressed_units.iter().copied().collect();
        for uid in held {
            if let Some(h) = self.active.get(&uid) {
                let at = commands::schedule_at(&*self.clock, h.latency_seconds());
                for cmd in commands::wait_release_flash(at) {
                    h.enqueue(cmd);
                }
            }
        }
    }

    fn start_multiplayer(&mut self) {
        self.emit_cluster(|at| commands::stop_all(at).to_vec());
        self.previous_correct.clear();
        self.unit_list.clear();
        self.pressed_units.clear();
        self.correct = None;
        self.wrong = None;
        self.state = GameState::PreGameMultiplayer;

        let delay = self.durations.multiplayer_transition;
        self.install_task(move |gen, tx| {
            control_task::spawn_once(gen, delay, TimerPhase::MultiplayerPartition, tx)
        });
    }

    fn multiplayer_partition(&mut self) {
        self.emit_cluster(|at| commands::stop_all(at).to_vec());
        self.previous_correct.clear();
        self.player_scores.insert(1, 0);
        self.player_scores.insert(2, 0);

        let mut ids: Vec<u64> = self.active.keys().copied().collect();
        ids.shuffle(&mut rand::thread_rng());
        let midpoint = ids.len() / 2;
        let (first_half, second_half) = ids.split_at(midpoint);
        self.player_queue.insert(1, first_half.iter().copied().collect());
        self.player_queue.insert(2, second_half.iter().copied().collect());

        self.next_correct_multi(1);
        self.next_correct_multi(2);

        self.state = GameState::PlayingMultiplayer;
        let dur = self.durations.multiplayer_inactivity;
        self.install_task(move |gen, tx| {
            control_task::spawn_once(gen, dur, TimerPhase::MultiplayerInactivity, tx)
        });
    }

    fn enter_end_multiplayer(&mut self, player: u8) {
        self.state = GameState::EndMultiplayer;
        self.emit_cluster(|at| commands::multiplayer_win(player, at).to_vec());
        let dwell = self.durations.end_multiplayer_dwell;
        self.install_task(move |gen, tx| {
            control_task::spawn_once(gen, dwell, TimerPhase::EndMultiplayerStopAll, tx)
        });
    }

    fn end_multiplayer_stop_all(&mut self) {
        self.emit_cluster(|at| commands::stop_all(at).to_vec());
        self.return_to_attract();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use std::sync::atomic::AtomicU64;

    fn engine_with(durations: Durations) -> (GameEngine, mpsc::UnboundedSender<EngineEvent>) {
        let (tx, _rx) = mpsc::unbounded_channel();
        let clock = FakeClock::new();
        (GameEngine::new(clock, durations, tx.clone()), tx)
    }

    fn fresh_handle(id: u64) -> (UnitHandle, mpsc::UnboundedReceiver<protocol::ActuatorCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (UnitHandle::new(id, tx, Arc::new(AtomicU64::new(0))), rx)
    }

    #[test]
    fn register_first_unit_enters_pre_game_single() {
        let (mut engine, _tx) = engine_with(Durations::scaled(1000));
        let (handle, _rx) = fresh_handle(0x1);
        engine.on_register(0x1, handle);
        assert_eq!(engine.state(), GameState::PreGameSingle);
        assert_eq!(engine.correct(), Some(0x1));
        assert!(engine.control_task_generation().is_some());
    }

    #[test]
    fn register_second_unit_enters_pre_game_multiple() {
        let (mut engine, _tx) = engine_with(Durations::scaled(1000));
        let (h1, _r1) = fresh_handle(0x1);
        let (h2, _r2) = fresh_handle(0x2);
        engine.on_register(0x1, h1);
        engine.on_register(0x2, h2);
        assert_eq!(engine.state(), GameState::PreGameMultiple);
        assert!(engine.correct().is_some());
    }

    #[test]
    fn pressing_lit_unit_in_pre_game_single_wins() {
        let (mut engine, _tx) = engine_with(Durations::scaled(1000));
        let (handle, _rx) = fresh_handle(0x1);
        engine.on_register(0x1, handle);
        engine.on_press(0x1);
        assert_eq!(engine.state(), GameState::Win);
    }

    #[test]
    fn pressing_correct_unit_in_pre_game_multiple_enters_playing() {
        let (mut engine, _tx) = engine_with(Durations::scaled(1000));
        let (h1, _r1) = fresh_handle(0x1);
        let (h2, _r2) = fresh_handle(0x2);
        engine.on_register(0x1, h1);
        engine.on_register(0x2, h2);
        let target = engine.correct().unwrap();
        engine.on_press(target);
        assert_eq!(engine.state(), GameState::Playing);
        assert!(engine.correct().is_some());
        assert_ne!(engine.correct(), Some(target));
    }

    #[test]
    fn pressing_wrong_unit_in_playing_loses() {
        let (mut engine, _tx) = engine_with(Durations::scaled(1000));
        let (h1, _r1) = fresh_handle(0x1);
        let (h2, _r2) = fresh_handle(0x2);
        let (h3, _r3) = fresh_handle(0x3);
        engine.on_register(0x1, h1);
        engine.on_register(0x2, h2);
        engine.on_register(0x3, h3);
        let target = engine.correct().unwrap();
        engine.on_press(target);
        let wrong = engine.wrong().expect("wrong assigned with 3 units");
        engine.on_press(wrong);
        assert_eq!(engine.state(), GameState::Lose);
    }

    #[test]
    fn unregister_last_unit_returns_to_no_units() {
        let (mut engine, _tx) = engine_with(Durations::scaled(1000));
        let (handle, _rx) = fresh_handle(0x1);
        engine.on_register(0x1, handle);
        engine.on_unregister(0x1);
        assert_eq!(engine.state(), GameState::NoUnits);
        assert!(engine.active_ids().is_empty());
    }

    #[test]
    fn register_then_unregister_restores_empty_state_r1() {
        let (mut engine, _tx) = engine_with(Durations::scaled(1000));
        let (handle, _rx) = fresh_handle(0x1);
        engine.on_register(0x1, handle);
        engine.on_unregister(0x1);
        assert_eq!(engine.state(), GameState::NoUnits);
        assert_eq!(engine.correct(), None);
        assert_eq!(engine.wrong(), None);
        assert!(engine.unit_list.is_empty());
        assert!(engine.previous_correct.is_empty());
    }

    #[test]
    fn timeout_ignores_incoming_presses_p5() {
        let (mut engine, _tx) = engine_with(Durations::scaled(1000));
        let (h1, _r1) = fresh_handle(0x1);
        let (h2, _r2) = fresh_handle(0x2);
        engine.on_register(0x1, h1);
        engine.on_register(0x2, h2);
        engine.state = GameState::Timeout;
        let correct_before = engine.correct();
        engine.on_press(0x1);
        engine.on_press(0x2);
        engine.on_release(0x1);
        assert_eq!(engine.state(), GameState::Timeout);
        assert_eq!(engine.correct(), correct_before);
    }

    #[test]
    fn control_task_generation_changes_on_every_transition_p6() {
        let (mut engine, _tx) = engine_with(Durations::scaled(1000));
        let (h1, _r1) = fresh_handle(0x1);
        engine.on_register(0x1, h1);
        let gen1 = engine.control_task_generation();
        engine.on_press(0x1); // -> Win
        let gen2 = engine.control_task_generation();
        assert_ne!(gen1, gen2);
    }

    #[test]
    fn repeated_presses_on_held_unit_collapse_to_one_effect_r2() {
        let (mut engine, _tx) = engine_with(Durations::scaled(1000));
        let (h1, _r1) = fresh_handle(0x1);
        let (h2, _r2) = fresh_handle(0x2);
        engine.on_register(0x1, h1);
        engine.on_register(0x2, h2);
        let target = engine.correct().unwrap();
        engine.on_press(target);
        assert_eq!(engine.state(), GameState::Playing);
        let correct_after_first = engine.correct();
        for _ in 0..9 {
            engine.on_press(target);
        }
        assert_eq!(engine.correct(), correct_after_first);
    }

    #[test]
    fn double_press_within_threshold_starts_multiplayer() {
        // `is_fast_press` only starts its clock once a correct press is
        // observed while already in Playing/PlayingAllReleased, so the
        // attract-mode press that opens the round doesn't arm it — the
        // first Playing-state correct press arms it, and the next one
        // (here, well inside the threshold) trips it.
        let clock = FakeClock::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut engine = GameEngine::new(clock.clone(), Durations::scaled(1000), tx);
        let (h1, _r1) = fresh_handle(0x1);
        let (h2, _r2) = fresh_handle(0x2);
        let (h3, _r3) = fresh_handle(0x3);
        engine.on_register(0x1, h1);
        engine.on_register(0x2, h2);
        engine.on_register(0x3, h3);

        let first = engine.correct().unwrap();
        engine.on_press(first); // PreGameMultiple -> Playing
        assert_eq!(engine.state(), GameState::Playing);

        let second = engine.correct().expect("unit_list had a second target");
        engine.on_press(second); // first Playing press: arms last_press_time
        assert_eq!(engine.state(), GameState::Playing);

        let third = engine.correct().expect("unit_list had a third target");
        clock.advance(std::time::Duration::from_millis(500));
        engine.on_press(third);
        assert_eq!(engine.state(), GameState::PreGameMultiplayer);
    }
}
