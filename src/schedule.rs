//! Timing policy for the orchestrator: working-hours window, download
//! pacing, session budget and the watch interval.
//!
//! Functions take the RNG as a parameter so tests can seed it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{Datelike, NaiveDateTime, Timelike};
use rand::Rng;
use tracing::debug;

use crate::config::HumanBehavior;

const SHORT_BREAK_SECS: (u64, u64) = (30, 120);
const LONG_BREAK_SECS: (u64, u64) = (300, 900);
const INTERRUPT_POLL: Duration = Duration::from_millis(250);

/// True when `now` (local time) falls on a working day inside working hours.
#[must_use]
pub fn is_working_time(behavior: &HumanBehavior, now: NaiveDateTime) -> bool {
    let weekday = now.weekday().num_days_from_monday();
    if !behavior.working_days.contains(&weekday) {
        return false;
    }
    (behavior.working_hours_start..behavior.working_hours_end).contains(&now.hour())
}

/// Decides whether a scheduled wake-up should download anything.
///
/// The first run always downloads when `first_run_always_download` is set;
/// otherwise a probability is drawn from the configured range for the mode.
pub fn should_download<R: Rng + ?Sized>(
    behavior: &HumanBehavior,
    first_run: bool,
    rng: &mut R,
) -> bool {
    if first_run && behavior.first_run_always_download {
        return true;
    }
    let (min, max) = if first_run {
        (
            behavior.initial_download_probability_min,
            behavior.initial_download_probability_max,
        )
    } else {
        (
            behavior.monitoring_download_probability_min,
            behavior.monitoring_download_probability_max,
        )
    };
    let probability = uniform(rng, min, max).clamp(0.0, 1.0);
    let decision = rng.gen_bool(probability);
    debug!(probability, decision, first_run, "download decision");
    decision
}

/// Pause before the next download: a uniform delay plus an occasional break.
pub fn pacing_delay<R: Rng + ?Sized>(behavior: &HumanBehavior, rng: &mut R) -> Duration {
    let base = uniform(
        rng,
        behavior.download_delay_min_secs,
        behavior.download_delay_max_secs,
    );
    let mut delay = Duration::from_secs_f64(base.max(0.0));

    if rng.gen_bool(behavior.long_break_probability.clamp(0.0, 1.0)) {
        let secs = rng.gen_range(LONG_BREAK_SECS.0..=LONG_BREAK_SECS.1);
        debug!(secs, "taking a long break");
        delay += Duration::from_secs(secs);
    } else if rng.gen_bool(behavior.short_break_probability.clamp(0.0, 1.0)) {
        let secs = rng.gen_range(SHORT_BREAK_SECS.0..=SHORT_BREAK_SECS.1);
        debug!(secs, "taking a short break");
        delay += Duration::from_secs(secs);
    }
    delay
}

/// Time budget for one monitoring session.
pub fn session_budget<R: Rng + ?Sized>(behavior: &HumanBehavior, rng: &mut R) -> Duration {
    let min = behavior.min_session_time.min(behavior.max_session_time);
    Duration::from_secs(rng.gen_range(min..=behavior.max_session_time))
}

/// Sleep before the next watch cycle: the interval ± `interval_variation`.
pub fn next_check_delay<R: Rng + ?Sized>(
    interval_minutes: u64,
    variation: f64,
    rng: &mut R,
) -> Duration {
    #[allow(clippy::cast_precision_loss)]
    let base = (interval_minutes * 60) as f64;
    let variation = variation.clamp(0.0, 1.0);
    let factor = uniform(rng, 1.0 - variation, 1.0 + variation);
    Duration::from_secs_f64((base * factor).max(60.0))
}

/// Sleeps for `delay`, waking early once `interrupted` is set.
///
/// Returns false when the sleep was cut short.
pub async fn sleep_unless_interrupted(delay: Duration, interrupted: &AtomicBool) -> bool {
    let deadline = tokio::time::Instant::now() + delay;
    loop {
        if interrupted.load(Ordering::SeqCst) {
            return false;
        }
        let now = tokio::time::Instant::now();
        if now >= deadline {
            return true;
        }
        tokio::time::sleep((deadline - now).min(INTERRUPT_POLL)).await;
    }
}

fn uniform<R: Rng + ?Sized>(rng: &mut R, min: f64, max: f64) -> f64 {
    if max > min {
        rng.gen_range(min..=max)
    } else {
        min
    }
}
