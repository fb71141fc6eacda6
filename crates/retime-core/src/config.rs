use crate::date::{now_unix, parse_iso8601, seconds_to_days};
use crate::error::CompressError;
use crate::jitter::{Identity, Jitter};
use crate::timeline::CompressionRatio;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

/// Which rewrite implementation drives the run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RewriteStrategy {
    /// One targeted `filter-branch` pass per commit. Failures are counted,
    /// the loop continues.
    #[default]
    PerCommit,
    /// One `filter-repo` pass with a generated callback. Any failure aborts.
    Batch,
}

impl FromStr for RewriteStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "per-commit" | "per_commit" | "percommit" => Ok(Self::PerCommit),
            "batch" => Ok(Self::Batch),
            other => Err(format!(
                "unknown strategy '{other}' (expected 'per-commit' or 'batch')"
            )),
        }
    }
}

impl std::fmt::Display for RewriteStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PerCommit => f.write_str("per-commit"),
            Self::Batch => f.write_str("batch"),
        }
    }
}

/// Where the compression ratio came from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RatioSource {
    Explicit {
        ratio: f64,
    },
    Days {
        original_days: f64,
        target_days: f64,
    },
    EndDate {
        original_days: f64,
        end_timestamp: i64,
    },
}

/// Raw, unvalidated inputs as they arrive from flags or environment.
#[derive(Debug, Clone)]
pub struct CompressOptions {
    pub source: PathBuf,
    pub output: PathBuf,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub compression_ratio: Option<f64>,
    pub original_days: Option<f64>,
    pub target_days: Option<f64>,
    pub allow_expansion: bool,
    pub strategy: RewriteStrategy,
    pub jitter: bool,
    pub jitter_minutes: u32,
    pub anonymize: bool,
    pub anon_name: String,
    pub anon_email: String,
    pub seed: Option<u64>,
    pub backup: bool,
    pub force: bool,
    pub dry_run: bool,
    pub verbose: bool,
}

impl Default for CompressOptions {
    fn default() -> Self {
        let identity = Identity::default();
        Self {
            source: PathBuf::from("./source"),
            output: PathBuf::from("./destination"),
            start_date: None,
            end_date: None,
            compression_ratio: None,
            original_days: None,
            target_days: None,
            allow_expansion: false,
            strategy: RewriteStrategy::default(),
            jitter: false,
            jitter_minutes: Jitter::default().window_minutes,
            anonymize: false,
            anon_name: identity.name,
            anon_email: identity.email,
            seed: None,
            backup: false,
            force: false,
            dry_run: false,
            verbose: false,
        }
    }
}

/// Validated configuration for one run.
#[derive(Debug, Clone, Serialize)]
pub struct CompressConfig {
    pub source: PathBuf,
    pub output: PathBuf,
    pub start_timestamp: i64,
    pub ratio_source: RatioSource,
    pub compression_ratio: CompressionRatio,
    pub strategy: RewriteStrategy,
    pub jitter: Option<Jitter>,
    pub identity: Option<Identity>,
    pub seed: Option<u64>,
    pub backup: bool,
    pub force: bool,
    pub dry_run: bool,
    pub verbose: bool,
}

impl CompressConfig {
    /// Validate raw options. Every problem found is reported together in a
    /// single `Configuration` error, one per line.
    pub fn resolve(opts: CompressOptions) -> Result<Self, CompressError> {
        let mut errors: Vec<String> = Vec::new();

        let start_timestamp = match opts.start_date.as_deref() {
            Some(s) => parse_iso8601(s)
                .map_err(|e| errors.push(format!("start date: {e}")))
                .ok(),
            None => Some(now_unix()),
        };
        let end_timestamp = match opts.end_date.as_deref() {
            Some(s) => parse_iso8601(s)
                .map_err(|e| errors.push(format!("end date: {e}")))
                .ok(),
            None => None,
        };

        let original_days = positive(opts.original_days, "original days", &mut errors);
        let target_days = positive(opts.target_days, "target days", &mut errors);

        let ratio = match (opts.compression_ratio, original_days, target_days) {
            (Some(r), _, _) => CompressionRatio::explicit(r, opts.allow_expansion)
                .map(|ratio| (ratio, RatioSource::Explicit { ratio: r }))
                .map_err(|e| errors.push(config_message(e)))
                .ok(),
            (None, Some(o), Some(t)) => CompressionRatio::from_days(o, t)
                .map(|ratio| {
                    (
                        ratio,
                        RatioSource::Days {
                            original_days: o,
                            target_days: t,
                        },
                    )
                })
                .map_err(|e| errors.push(config_message(e)))
                .ok(),
            (None, Some(o), None) if opts.end_date.is_some() => {
                match (start_timestamp, end_timestamp) {
                    (Some(start), Some(end)) if end > start => {
                        let t = seconds_to_days((end - start) as f64);
                        CompressionRatio::from_days(o, t)
                            .map(|ratio| {
                                (
                                    ratio,
                                    RatioSource::EndDate {
                                        original_days: o,
                                        end_timestamp: end,
                                    },
                                )
                            })
                            .map_err(|e| errors.push(config_message(e)))
                            .ok()
                    }
                    (Some(_), Some(_)) => {
                        errors.push("end date must be after the start date".into());
                        None
                    }
                    // Date parse errors were already recorded.
                    _ => None,
                }
            }
            _ => {
                if opts.original_days.is_none() || errors.is_empty() {
                    errors.push(
                        "unable to determine compression ratio: provide --compression-ratio, \
                         --original-days with --target-days, or --original-days with --end-date"
                            .into(),
                    );
                }
                None
            }
        };

        if opts.anonymize {
            if opts.anon_name.trim().is_empty() {
                errors.push("anonymized name must not be empty".into());
            }
            if opts.anon_email.trim().is_empty() {
                errors.push("anonymized email must not be empty".into());
            }
        }

        if let Some(problem) = path_overlap(&opts.source, &opts.output) {
            errors.push(problem.into());
        }

        if !errors.is_empty() {
            return Err(CompressError::Configuration(errors.join("\n")));
        }

        // Both are Some when no error was recorded.
        let (Some(start_timestamp), Some((compression_ratio, ratio_source))) =
            (start_timestamp, ratio)
        else {
            return Err(CompressError::config("incomplete configuration"));
        };

        Ok(Self {
            source: opts.source,
            output: opts.output,
            start_timestamp,
            ratio_source,
            compression_ratio,
            strategy: opts.strategy,
            jitter: opts.jitter.then(|| Jitter::new(opts.jitter_minutes)),
            identity: opts
                .anonymize
                .then(|| Identity::new(opts.anon_name, opts.anon_email)),
            seed: opts.seed,
            backup: opts.backup,
            force: opts.force,
            dry_run: opts.dry_run,
            verbose: opts.verbose,
        })
    }
}

/// Reports when `source` and `output` name the same directory or one sits
/// inside the other, however the paths are spelled.
pub fn path_overlap(source: &Path, output: &Path) -> Option<&'static str> {
    let source = resolve_path(source);
    let output = resolve_path(output);
    if source == output {
        Some("output must differ from source; the source is never rewritten in place")
    } else if output.starts_with(&source) {
        Some("output must not be inside the source repository")
    } else if source.starts_with(&output) {
        Some("output must not contain the source repository")
    } else {
        None
    }
}

/// Absolute form of `path` with symlinks and `..` resolved. A path that does
/// not exist yet resolves through its closest existing ancestor.
fn resolve_path(path: &Path) -> PathBuf {
    let absolute = match std::env::current_dir() {
        Ok(cwd) if path.is_relative() => cwd.join(path),
        _ => path.to_path_buf(),
    };
    let mut missing = Vec::new();
    let mut base = absolute.as_path();
    loop {
        if let Ok(real) = base.canonicalize() {
            return missing.into_iter().rev().fold(real, |acc, part| acc.join(part));
        }
        match (base.parent(), base.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                base = parent;
            }
            _ => {
                let clean = lexical(&absolute);
                return if clean == absolute {
                    clean
                } else {
                    resolve_path(&clean)
                };
            }
        }
    }
}

fn lexical(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other),
        }
    }
    out
}

fn positive(value: Option<f64>, what: &str, errors: &mut Vec<String>) -> Option<f64> {
    match value {
        Some(v) if v.is_finite() && v > 0.0 => Some(v),
        Some(v) => {
            errors.push(format!("{what} must be positive (got {v})"));
            None
        }
        None => None,
    }
}

fn config_message(err: CompressError) -> String {
    match err {
        CompressError::Configuration(msg) => msg,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> CompressOptions {
        CompressOptions {
            source: PathBuf::from("src-repo"),
            output: PathBuf::from("out-repo"),
            start_date: Some("2025-06-18T09:00:00".into()),
            ..Default::default()
        }
    }

    fn config_err(o: CompressOptions) -> String {
        match CompressConfig::resolve(o) {
            Err(CompressError::Configuration(msg)) => msg,
            other => panic!("expected configuration error, got {other:?}"),
        }
    }

    #[test]
    fn ratio_from_days() {
        let cfg = CompressConfig::resolve(CompressOptions {
            original_days: Some(25.0),
            target_days: Some(17.5),
            ..opts()
        })
        .unwrap();
        assert!((cfg.compression_ratio.value() - 0.7).abs() < 1e-12);
        assert_eq!(cfg.start_timestamp, 1_750_237_200);
        assert!(matches!(cfg.ratio_source, RatioSource::Days { .. }));
    }

    #[test]
    fn explicit_ratio_wins_over_days() {
        let cfg = CompressConfig::resolve(CompressOptions {
            compression_ratio: Some(0.5),
            original_days: Some(25.0),
            target_days: Some(17.5),
            ..opts()
        })
        .unwrap();
        assert_eq!(cfg.compression_ratio.value(), 0.5);
    }

    #[test]
    fn ratio_from_end_date() {
        let cfg = CompressConfig::resolve(CompressOptions {
            original_days: Some(20.0),
            end_date: Some("2025-06-28T09:00:00".into()),
            ..opts()
        })
        .unwrap();
        assert!((cfg.compression_ratio.value() - 0.5).abs() < 1e-12);
        assert!(matches!(cfg.ratio_source, RatioSource::EndDate { .. }));
    }

    #[test]
    fn end_date_before_start_is_rejected() {
        let msg = config_err(CompressOptions {
            original_days: Some(20.0),
            end_date: Some("2025-06-01".into()),
            ..opts()
        });
        assert!(msg.contains("after the start date"));
    }

    #[test]
    fn missing_ratio_is_rejected() {
        let msg = config_err(opts());
        assert!(msg.contains("unable to determine compression ratio"));
    }

    #[test]
    fn explicit_ratio_above_one_needs_opt_in() {
        let msg = config_err(CompressOptions {
            compression_ratio: Some(1.5),
            ..opts()
        });
        assert!(msg.contains("between 0 and 1"));

        let cfg = CompressConfig::resolve(CompressOptions {
            compression_ratio: Some(1.5),
            allow_expansion: true,
            ..opts()
        })
        .unwrap();
        assert!(cfg.compression_ratio.is_expansion());
    }

    #[test]
    fn collects_every_problem() {
        let msg = config_err(CompressOptions {
            start_date: Some("not-a-date".into()),
            compression_ratio: Some(0.5),
            original_days: Some(-3.0),
            target_days: Some(0.0),
            ..opts()
        });
        assert!(msg.contains("start date"));
        assert!(msg.contains("original days must be positive"));
        assert!(msg.contains("target days must be positive"));
        assert_eq!(msg.lines().count(), 3);
    }

    #[test]
    fn output_must_differ_from_source() {
        let msg = config_err(CompressOptions {
            output: PathBuf::from("src-repo"),
            compression_ratio: Some(0.5),
            ..opts()
        });
        assert!(msg.contains("differ from source"));
    }

    #[test]
    fn output_spelled_differently_is_still_the_source() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("src");
        std::fs::create_dir(&source).unwrap();

        let msg = config_err(CompressOptions {
            source: source.clone(),
            output: dir.path().join("src/../src"),
            compression_ratio: Some(0.5),
            ..opts()
        });
        assert!(msg.contains("differ from source"));
        assert!(source.exists());
    }

    #[test]
    fn nested_output_and_source_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("src");
        std::fs::create_dir(&source).unwrap();

        let inside = config_err(CompressOptions {
            source: source.clone(),
            output: source.join("out"),
            compression_ratio: Some(0.5),
            ..opts()
        });
        assert!(inside.contains("inside the source"));

        let around = config_err(CompressOptions {
            source: source.clone(),
            output: dir.path().join("missing/.."),
            compression_ratio: Some(0.5),
            ..opts()
        });
        assert!(around.contains("contain the source"));

        assert_eq!(path_overlap(&source, &dir.path().join("out")), None);
        assert_eq!(path_overlap(&source, &dir.path().join("src-copy")), None);
    }

    #[test]
    fn jitter_and_identity_only_when_enabled() {
        let cfg = CompressConfig::resolve(CompressOptions {
            compression_ratio: Some(0.5),
            ..opts()
        })
        .unwrap();
        assert!(cfg.jitter.is_none());
        assert!(cfg.identity.is_none());

        let cfg = CompressConfig::resolve(CompressOptions {
            compression_ratio: Some(0.5),
            jitter: true,
            jitter_minutes: 15,
            anonymize: true,
            ..opts()
        })
        .unwrap();
        assert_eq!(cfg.jitter, Some(Jitter::new(15)));
        assert_eq!(cfg.identity, Some(Identity::default()));
    }

    #[test]
    fn empty_anon_identity_is_rejected() {
        let msg = config_err(CompressOptions {
            compression_ratio: Some(0.5),
            anonymize: true,
            anon_email: "  ".into(),
            ..opts()
        });
        assert!(msg.contains("anonymized email"));
    }

    #[test]
    fn strategy_parses() {
        assert_eq!(
            "per-commit".parse::<RewriteStrategy>().unwrap(),
            RewriteStrategy::PerCommit
        );
        assert_eq!("Batch".parse::<RewriteStrategy>().unwrap(), RewriteStrategy::Batch);
        assert!("parallel".parse::<RewriteStrategy>().is_err());
        assert_eq!(RewriteStrategy::Batch.to_string(), "batch");
    }

    #[test]
    fn serializes_for_verbose_logging() {
        let cfg = CompressConfig::resolve(CompressOptions {
            compression_ratio: Some(0.5),
            strategy: RewriteStrategy::Batch,
            jitter: true,
            ..opts()
        })
        .unwrap();
        let json = serde_json::to_value(&cfg).unwrap();
        assert_eq!(json["strategy"], "batch");
        assert_eq!(json["compression_ratio"], 0.5);
        assert_eq!(json["ratio_source"]["kind"], "explicit");
        assert_eq!(json["jitter"]["window_minutes"], 120);
        assert!(json["identity"].is_null());
    }
}
