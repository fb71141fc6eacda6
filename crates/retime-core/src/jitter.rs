use rand::Rng;
use serde::Serialize;

pub const DEFAULT_JITTER_MINUTES: u32 = 120;
pub const DEFAULT_ANON_NAME: &str = "Dev Team";
pub const DEFAULT_ANON_EMAIL: &str = "dev@company.com";

/// Random perturbation applied after proportional mapping.
///
/// Each commit draws an independent whole-minute offset in
/// `[-window, +window]`. Nearby commits can swap order once jittered; that
/// loss of strict ordering is accepted, not a bug.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Jitter {
    pub window_minutes: u32,
}

impl Default for Jitter {
    fn default() -> Self {
        Self {
            window_minutes: DEFAULT_JITTER_MINUTES,
        }
    }
}

impl Jitter {
    pub fn new(window_minutes: u32) -> Self {
        Self { window_minutes }
    }

    /// Offset in seconds, drawn from `rng`.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> i64 {
        let w = i64::from(self.window_minutes);
        if w == 0 {
            return 0;
        }
        rng.gen_range(-w..=w) * 60
    }

    pub fn apply<R: Rng + ?Sized>(&self, timestamp: i64, rng: &mut R) -> i64 {
        timestamp.saturating_add(self.sample(rng))
    }
}

/// Placeholder author/committer written over every rewritten commit.
///
/// One-way: the original identity is gone from the output once finalized.
/// The source repository is never touched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub name: String,
    pub email: String,
}

impl Default for Identity {
    fn default() -> Self {
        Self {
            name: DEFAULT_ANON_NAME.into(),
            email: DEFAULT_ANON_EMAIL.into(),
        }
    }
}

impl Identity {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} <{}>", self.name, self.email)
    }
}
