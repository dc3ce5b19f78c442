//! Materializes every entry of an infinite-scroll listing.
//!
//! The loader polls the entry count, scrolls, lets lazy content settle and
//! polls again. It stops once the count holds steady after the grace
//! iterations (`Stable`) or when the iteration ceiling is hit (`Exhausted`).
//! A feed that pauses longer than one settle interval after the grace period
//! can still be under-counted; that is a known limitation of polling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::browser::{Browser, CatalogEntry, Condition};
use crate::config::ScrollSettings;
use crate::error::RunFailure;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrollPolicy {
    pub initial_wait: Duration,
    pub settle: Duration,
    pub grace_iterations: u32,
    pub max_iterations: u32,
}

impl From<&ScrollSettings> for ScrollPolicy {
    fn from(s: &ScrollSettings) -> Self {
        Self {
            initial_wait: Duration::from_secs(s.initial_wait_secs),
            settle: Duration::from_secs(s.settle_secs),
            grace_iterations: s.grace_iterations,
            max_iterations: s.max_iterations,
        }
    }
}

/// How a listing finished loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollEnd {
    /// Count stopped changing after the grace period.
    Stable,
    /// Iteration ceiling reached while the count was still moving.
    Exhausted,
    /// Nothing rendered within the initial wait.
    Empty,
}

impl ScrollEnd {
    pub fn as_str(self) -> &'static str {
        match self {
            ScrollEnd::Stable => "stable",
            ScrollEnd::Exhausted => "exhausted",
            ScrollEnd::Empty => "empty",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollState {
    /// `iteration` scrolls done so far; `last_count` seen before the latest one.
    Loading { iteration: u32, last_count: usize },
    Stable,
    Exhausted,
}

impl ScrollState {
    pub fn start() -> Self {
        ScrollState::Loading {
            iteration: 0,
            last_count: 0,
        }
    }

    /// Feed the latest entry count. Returning `Loading` means scroll again.
    pub fn observe(self, count: usize, policy: &ScrollPolicy) -> ScrollState {
        match self {
            ScrollState::Loading {
                iteration,
                last_count,
            } if count == last_count && iteration >= policy.grace_iterations => ScrollState::Stable,
            ScrollState::Loading { iteration, .. } if iteration >= policy.max_iterations => {
                ScrollState::Exhausted
            }
            ScrollState::Loading { iteration, .. } => ScrollState::Loading {
                iteration: iteration + 1,
                last_count: count,
            },
            terminal => terminal,
        }
    }
}

pub struct Loaded<'a> {
    pub entries: Vec<Box<dyn CatalogEntry + 'a>>,
    pub end: ScrollEnd,
    pub iterations: u32,
}

/// Scroll the current page until its listing is fully rendered and return
/// handles to every entry matching `selector`.
pub fn load_all<'a, B: Browser>(
    browser: &'a B,
    selector: &str,
    policy: &ScrollPolicy,
    cancel: &AtomicBool,
) -> Result<Loaded<'a>, RunFailure> {
    if !browser.wait_for(&Condition::Present(selector), policy.initial_wait)? {
        warn!("No entries rendered within {:?}", policy.initial_wait);
        return Ok(Loaded {
            entries: Vec::new(),
            end: ScrollEnd::Empty,
            iterations: 0,
        });
    }

    let mut state = ScrollState::start();
    let mut iterations = 0;
    loop {
        if cancel.load(Ordering::Relaxed) {
            return Err(RunFailure::Cancelled);
        }

        let count = browser.count(selector)?;
        state = state.observe(count, policy);
        match state {
            ScrollState::Loading { iteration, .. } => {
                debug!("Found {} entries (scroll attempt {})", count, iteration);
                browser.scroll_to_bottom()?;
                std::thread::sleep(policy.settle);
                iterations = iteration;
            }
            ScrollState::Stable | ScrollState::Exhausted => break,
        }
    }

    let end = match state {
        ScrollState::Exhausted => {
            warn!("Scroll ceiling of {} iterations reached", policy.max_iterations);
            ScrollEnd::Exhausted
        }
        _ => ScrollEnd::Stable,
    };

    let entries = browser.find_all(selector)?;
    info!("Finished loading. Total entries found: {}", entries.len());
    Ok(Loaded {
        entries,
        end,
        iterations,
    })
}
