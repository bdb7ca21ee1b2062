//! Service bootstrap finite state machine.
//!
//! Phases:
//! - Provisioning (artifact fetch / resolve)
//! - LoadingModel
//! - Serving
//!
//! Tracks the duration of every completed phase and publishes the current one
//! for the `/status` route.

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

static CURRENT_PHASE: Lazy<RwLock<BootstrapPhase>> = Lazy::new(|| RwLock::new(BootstrapPhase::Provisioning));

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BootstrapPhase { Provisioning, LoadingModel, Serving }

pub fn current_phase() -> BootstrapPhase { *CURRENT_PHASE.read() }

#[derive(Debug)]
pub struct BootstrapState {
    phase: BootstrapPhase,
    started_at: Instant,
    phase_started_at: Instant,
    phase_durations: Vec<(BootstrapPhase, Duration)>,
}

impl Default for BootstrapState { fn default() -> Self { Self::new() } }

impl BootstrapState {
    pub fn new() -> Self {
        *CURRENT_PHASE.write() = BootstrapPhase::Provisioning;
        Self { phase: BootstrapPhase::Provisioning, started_at: Instant::now(), phase_started_at: Instant::now(), phase_durations: Vec::new() }
    }
    pub fn phase(&self) -> BootstrapPhase { self.phase }
    pub fn advance(&mut self) {
        let now = Instant::now();
        let dur = now - self.phase_started_at;
        self.phase_durations.push((self.phase, dur));
        tracing::info!(phase = ?self.phase, elapsed_ms = dur.as_millis() as u64, "bootstrap phase complete");
        self.phase = match self.phase { BootstrapPhase::Provisioning => BootstrapPhase::LoadingModel, BootstrapPhase::LoadingModel => BootstrapPhase::Serving, BootstrapPhase::Serving => BootstrapPhase::Serving };
        self.phase_started_at = now;
        *CURRENT_PHASE.write() = self.phase;
    }
    pub fn durations(&self) -> &[(BootstrapPhase, Duration)] { &self.phase_durations }
    pub fn total_elapsed(&self) -> Duration { self.started_at.elapsed() }
}
