//! Collector backed by an external scraper process.
//!
//! The process receives the continuation as a single JSON line on stdin and
//! streams newline-delimited JSON records on stdout:
//!
//! ```text
//! {"type":"item","id":"7301","title":"Clip","date":"3 weeks ago","likes":120}
//! {"type":"log","message":"scrolled 4/18"}
//! {"type":"done","score":340}
//! ```
//!
//! The duplicate check is consulted every `check_every` items. When it says
//! stop, the child is killed and the items collected so far are returned.
//! Stderr is inherited so the scraper's own diagnostics reach the terminal.

use std::process::Stdio;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use smart_harvest_core::{ContinuationPoint, DuplicateCheck, Item, TitleClassifier};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::collector::{due_for_check, CollectOutcome, Collector, CollectorRecord};

pub struct CommandCollector {
    program: String,
    args: Vec<String>,
    classifier: TitleClassifier,
    check_every: usize,
}

impl CommandCollector {
    pub fn new(
        program: String,
        args: Vec<String>,
        classifier: TitleClassifier,
        check_every: usize,
    ) -> Self {
        Self {
            program,
            args,
            classifier,
            check_every,
        }
    }
}

#[async_trait]
impl Collector for CommandCollector {
    fn name(&self) -> &str {
        &self.program
    }

    async fn collect(
        &self,
        continuation: &ContinuationPoint,
        duplicate_check: &dyn DuplicateCheck,
    ) -> Result<CollectOutcome> {
        let started = Instant::now();
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn collector '{}'", self.program))?;

        let mut request = serde_json::to_string(continuation)?;
        request.push('\n');
        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(request.as_bytes()).await {
                warn!(collector = %self.program, error = %e, "could not send continuation");
            }
            // Dropping stdin closes it so the child sees EOF.
        }

        let stdout = child
            .stdout
            .take()
            .context("collector stdout was not captured")?;
        let mut lines = BufReader::new(stdout).lines();

        let mut outcome = CollectOutcome::default();
        let mut seen: Vec<Item> = Vec::new();
        let mut done = false;

        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let record: CollectorRecord = match serde_json::from_str(line) {
                Ok(r) => r,
                Err(e) => {
                    warn!(collector = %self.program, error = %e, "skipping malformed record");
                    continue;
                }
            };
            match record {
                CollectorRecord::Item(raw) => {
                    let collected = match raw.into_collected(&self.classifier) {
                        Ok(c) => c,
                        Err(e) => {
                            warn!(collector = %self.program, error = %e, "skipping item");
                            continue;
                        }
                    };
                    seen.push(collected.item.clone());
                    outcome.items.push(collected);
                    if due_for_check(seen.len(), self.check_every)
                        && !duplicate_check.should_continue(&seen)
                    {
                        info!(
                            collector = %self.program,
                            items = seen.len(),
                            "duplicate check ended the session"
                        );
                        outcome.stopped_early = true;
                        break;
                    }
                }
                CollectorRecord::Done { score } => {
                    outcome.quality_score = score;
                    done = true;
                }
                CollectorRecord::Log { message } => {
                    debug!(collector = %self.program, "{}", message);
                }
            }
        }

        if outcome.stopped_early {
            if let Err(e) = child.kill().await {
                debug!(collector = %self.program, error = %e, "collector already exited");
            }
        } else {
            let status = child
                .wait()
                .await
                .with_context(|| format!("Failed to wait for collector '{}'", self.program))?;
            if !status.success() && !done {
                bail!(
                    "collector '{}' exited with {} before finishing the session",
                    self.program,
                    status
                );
            }
        }

        outcome.duration_seconds = started.elapsed().as_secs_f64();
        Ok(outcome)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use smart_harvest_core::{Corpus, DuplicateGuard, GuardConfig};

    fn sh(script: &str) -> CommandCollector {
        CommandCollector::new(
            "sh".into(),
            vec!["-c".into(), script.into()],
            TitleClassifier::new(Some("VIDEO_".into())),
            20,
        )
    }

    #[tokio::test]
    async fn reads_items_and_score() {
        let collector = sh(r#"read req
echo '{"type":"item","id":"a","title":"First","date":"2 days ago","likes":3}'
echo 'garbage'
echo '{"type":"log","message":"halfway"}'
echo '{"type":"item","id":"b","title":"VIDEO_b"}'
echo '{"type":"done","score":17}'"#);
        let outcome = collector
            .collect(&ContinuationPoint::fresh_start(), &|_: &[Item]| true)
            .await
            .unwrap();
        assert_eq!(outcome.items_found(), 2);
        assert_eq!(outcome.quality_score, 17);
        assert!((outcome.success_rate() - 50.0).abs() < 1e-9);
        assert_eq!(
            outcome.items[0].item.date_bucket.as_deref(),
            Some("2 days ago")
        );
        assert!(!outcome.stopped_early);
    }

    #[tokio::test]
    async fn child_receives_the_continuation() {
        let collector = sh(r#"read req
case "$req" in
  *scroll_offset*) echo '{"type":"item","id":"ok"}' ;;
esac
echo '{"type":"done","score":0}'"#);
        let outcome = collector
            .collect(&ContinuationPoint::scroll_offset(12), &|_: &[Item]| true)
            .await
            .unwrap();
        assert_eq!(outcome.items_found(), 1);
        assert_eq!(outcome.items[0].item.identity, "ok");
    }

    #[tokio::test]
    async fn duplicate_check_kills_the_child() {
        let corpus: Corpus = (0..40).map(|i| Item::new(format!("v{}", i))).collect();
        let guard = DuplicateGuard::new(&corpus, GuardConfig::default());
        let collector = sh(r#"read req
i=0
while true; do
  echo "{\"type\":\"item\",\"id\":\"v$i\",\"title\":\"t$i\"}"
  i=$((i+1))
done"#);
        let outcome = collector
            .collect(&ContinuationPoint::fresh_start(), &guard)
            .await
            .unwrap();
        assert!(outcome.stopped_early);
        assert_eq!(outcome.items_found(), 20);
    }

    #[tokio::test]
    async fn failing_process_without_done_is_an_error() {
        let collector = sh(r#"read req
echo '{"type":"item","id":"a"}'
exit 3"#);
        let err = collector
            .collect(&ContinuationPoint::fresh_start(), &|_: &[Item]| true)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("before finishing"));
    }

    #[tokio::test]
    async fn missing_program_is_an_error() {
        let collector = CommandCollector::new(
            "/nonexistent/harvest-scraper".into(),
            vec![],
            TitleClassifier::default(),
            20,
        );
        assert!(collector
            .collect(&ContinuationPoint::fresh_start(), &|_: &[Item]| true)
            .await
            .is_err());
    }
}
