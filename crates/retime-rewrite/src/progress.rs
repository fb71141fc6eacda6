use std::io::Write;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Receives progress for one labelled stage at a time.
pub trait Progress: Send + Sync {
    fn start(&self, label: &str, total: u64);
    fn tick(&self, current: u64, total: u64);
    fn finish(&self);
}

pub const BAR_WIDTH: usize = 40;

/// Text progress bar on stderr, redrawn in place.
pub struct BarProgress {
    state: Mutex<BarState>,
}

struct BarState {
    label: String,
    started: Instant,
    drawn: bool,
}

impl BarProgress {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BarState {
                label: String::new(),
                started: Instant::now(),
                drawn: false,
            }),
        }
    }
}

impl Default for BarProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl Progress for BarProgress {
    fn start(&self, label: &str, total: u64) {
        if let Ok(mut s) = self.state.lock() {
            s.label = label.to_string();
            s.started = Instant::now();
            s.drawn = false;
        }
        self.tick(0, total);
    }

    fn tick(&self, current: u64, total: u64) {
        let Ok(mut s) = self.state.lock() else {
            return;
        };
        let line = render_line(&s.label, current, total, s.started.elapsed());
        let mut err = std::io::stderr().lock();
        let _ = write!(err, "\r{line}");
        let _ = err.flush();
        s.drawn = true;
    }

    fn finish(&self) {
        let Ok(mut s) = self.state.lock() else {
            return;
        };
        if s.drawn {
            let _ = writeln!(std::io::stderr());
            s.drawn = false;
        }
    }
}

/// Discards everything (`--no-progress`, JSON output).
pub struct NullProgress;

impl Progress for NullProgress {
    fn start(&self, _label: &str, _total: u64) {}
    fn tick(&self, _current: u64, _total: u64) {}
    fn finish(&self) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Start { label: String, total: u64 },
    Tick { current: u64, total: u64 },
    Finish,
}

/// Collects events in memory (for testing).
pub struct CollectProgress {
    events: Mutex<Vec<ProgressEvent>>,
}

impl CollectProgress {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Labels of every stage started, in order.
    pub fn labels(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ProgressEvent::Start { label, .. } => Some(label),
                _ => None,
            })
            .collect()
    }

    /// Highest `current` reported by any tick.
    pub fn last_tick(&self) -> Option<(u64, u64)> {
        self.events().into_iter().rev().find_map(|e| match e {
            ProgressEvent::Tick { current, total } => Some((current, total)),
            _ => None,
        })
    }
}

impl Default for CollectProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl Progress for CollectProgress {
    fn start(&self, label: &str, total: u64) {
        self.events.lock().unwrap().push(ProgressEvent::Start {
            label: label.to_string(),
            total,
        });
    }

    fn tick(&self, current: u64, total: u64) {
        self.events
            .lock()
            .unwrap()
            .push(ProgressEvent::Tick { current, total });
    }

    fn finish(&self) {
        self.events.lock().unwrap().push(ProgressEvent::Finish);
    }
}

/// `label [████░░░░] 12/40 (30%) 0:04 elapsed, ~0:09 left`
pub fn render_line(label: &str, current: u64, total: u64, elapsed: Duration) -> String {
    let current = current.min(total);
    let fraction = if total == 0 {
        1.0
    } else {
        current as f64 / total as f64
    };
    let filled = ((fraction * BAR_WIDTH as f64).round() as usize).min(BAR_WIDTH);
    let bar: String = "█".repeat(filled) + &"░".repeat(BAR_WIDTH - filled);
    let percent = (fraction * 100.0).round() as u64;

    let mut line = format!(
        "{label} [{bar}] {current}/{total} ({percent}%) {} elapsed",
        clock(elapsed)
    );
    if let Some(eta) = eta(current, total, elapsed) {
        line.push_str(&format!(", ~{} left", clock(eta)));
    }
    line
}

/// Remaining time extrapolated from the average pace so far.
pub fn eta(current: u64, total: u64, elapsed: Duration) -> Option<Duration> {
    if current == 0 || current >= total {
        return None;
    }
    let per_item = elapsed.as_secs_f64() / current as f64;
    Some(Duration::from_secs_f64(per_item * (total - current) as f64))
}

fn clock(d: Duration) -> String {
    let secs = d.as_secs();
    if secs >= 3600 {
        format!("{}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
    } else {
        format!("{}:{:02}", secs / 60, secs % 60)
    }
}
