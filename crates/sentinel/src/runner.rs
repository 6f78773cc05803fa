//! Driving the agent loop.
//!
//! The server runs cycles on a background task that can be started and
//! stopped through an [`AgentControl`]; the `simulate` command runs them in
//! the foreground and prints the log as it goes.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::{spawn_blocking, JoinHandle};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::agent::{CycleReport, SentinelAgent};
use crate::error::{Error, Result};

/// The agent shared between the loop task and request handlers.
pub type SharedAgent = Arc<Mutex<SentinelAgent>>;

/// Wrap an agent for sharing.
#[must_use]
pub fn share(agent: SentinelAgent) -> SharedAgent {
    Arc::new(Mutex::new(agent))
}

/// Lock a shared agent.
///
/// # Errors
///
/// Returns an error if a previous holder panicked.
pub fn lock(agent: &SharedAgent) -> Result<MutexGuard<'_, SentinelAgent>> {
    agent
        .lock()
        .map_err(|_| Error::internal("agent lock poisoned"))
}

/// Handle for starting and stopping the agent loop.
///
/// Clones share the same flags.
#[derive(Debug, Clone, Default)]
pub struct AgentControl {
    running: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
}

impl AgentControl {
    /// Create a stopped control.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Let the loop run cycles. Returns `false` if it was already running.
    pub fn start(&self) -> bool {
        !self.running.swap(true, Ordering::SeqCst)
    }

    /// Pause the loop. Returns `false` if it was not running.
    pub fn stop(&self) -> bool {
        self.running.swap(false, Ordering::SeqCst)
    }

    /// Whether cycles are being run.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// End the loop task for good.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Whether the loop task has been told to exit.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

/// Spawn the background loop.
///
/// Every `period` it runs one cycle if the control says so. Cycles run on the
/// blocking pool so SQLite work does not stall request handlers. A failing
/// cycle is logged and the loop carries on.
pub fn spawn_loop(agent: SharedAgent, control: AgentControl, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        debug!("Agent loop started with period {:?}", period);

        loop {
            ticker.tick().await;
            if control.is_shutdown() {
                break;
            }
            if !control.is_running() {
                continue;
            }
            let shared = Arc::clone(&agent);
            let outcome =
                spawn_blocking(move || lock(&shared).and_then(|mut guard| guard.run_cycle())).await;
            match outcome {
                Ok(Ok(report)) => debug!(
                    "Cycle done: {} ingested, {} findings",
                    report.ingested,
                    report.findings.len()
                ),
                Ok(Err(e)) => warn!("Agent cycle failed: {}", e),
                Err(e) => error!("Agent cycle task aborted: {}", e),
            }
        }

        info!("Agent loop stopped");
    })
}

/// Run cycles in the foreground, writing each cycle's log lines to `out`.
///
/// Attempts `cycles` cycles, or runs until Ctrl-C when `None`. Failed cycles
/// count as attempts. Returns the number of cycles that succeeded.
///
/// # Errors
///
/// Returns an error if writing to `out` fails.
pub async fn run_console(
    agent: &mut SentinelAgent,
    cycles: Option<u64>,
    period: Duration,
    out: &mut impl Write,
) -> Result<u64> {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut attempted = 0;
    let mut completed = 0;

    while cycles.map_or(true, |limit| attempted < limit) {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }

        attempted += 1;
        match agent.run_cycle() {
            Ok(report) => {
                write_report(out, &report)?;
                completed += 1;
            }
            Err(e) => writeln!(out, "cycle failed: {e}")?,
        }
    }

    Ok(completed)
}

fn write_report(out: &mut impl Write, report: &CycleReport) -> Result<()> {
    for entry in &report.logs {
        writeln!(out, "{}", entry.render())?;
    }
    writeln!(
        out,
        "    threshold {:.2} -> {:.2}, {} evaluated, {} findings",
        report.threshold_before,
        report.threshold_after,
        report.evaluated,
        report.findings.len()
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::storage::Storage;

    fn test_agent() -> SentinelAgent {
        let mut config = Config::default();
        config.generator.seed = Some(21);
        config.dataset.paths = Vec::new();
        config.dataset.backfill = 0;
        SentinelAgent::new(config, Storage::open_in_memory().unwrap()).unwrap()
    }

    #[test]
    fn test_control_start_stop() {
        let control = AgentControl::new();
        assert!(!control.is_running());

        assert!(control.start());
        assert!(!control.start());
        assert!(control.is_running());

        assert!(control.stop());
        assert!(!control.stop());
        assert!(!control.is_running());
    }

    #[test]
    fn test_control_clone_shares_state() {
        let control = AgentControl::new();
        let clone = control.clone();

        control.start();
        assert!(clone.is_running());

        clone.shutdown();
        assert!(control.is_shutdown());
        assert!(!control.is_running());
    }

    #[tokio::test]
    async fn test_loop_runs_only_while_started() {
        let agent = share(test_agent());
        let control = AgentControl::new();
        let handle = spawn_loop(Arc::clone(&agent), control.clone(), Duration::from_millis(5));

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(lock(&agent).unwrap().stats().processed, 0);

        control.start();
        tokio::time::sleep(Duration::from_millis(60)).await;
        control.stop();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let processed = lock(&agent).unwrap().stats().processed;
        assert!(processed > 0);

        control.shutdown();
        handle.await.unwrap();
        assert_eq!(lock(&agent).unwrap().stats().processed, processed);
    }

    #[tokio::test]
    async fn test_loop_survives_failing_cycles() {
        let agent = share(test_agent());
        lock(&agent)
            .unwrap()
            .storage()
            .set_setting("fraud_threshold", "garbage")
            .unwrap();
        let control = AgentControl::new();
        let handle = spawn_loop(Arc::clone(&agent), control.clone(), Duration::from_millis(5));

        control.start();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(!handle.is_finished());
        assert_eq!(lock(&agent).unwrap().stats().processed, 0);

        lock(&agent).unwrap().storage().set_fraud_threshold(0.8).unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(lock(&agent).unwrap().stats().processed > 0);

        control.shutdown();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_run_console_stops_after_failed_cycles() {
        let mut agent = test_agent();
        agent
            .storage()
            .set_setting("fraud_threshold", "garbage")
            .unwrap();
        let mut out = Vec::new();

        let run = run_console(&mut agent, Some(3), Duration::from_millis(1), &mut out);
        let completed = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("bounded run must return")
            .unwrap();

        assert_eq!(completed, 0);
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.matches("cycle failed").count(), 3);
    }

    #[tokio::test]
    async fn test_run_console_bounded() {
        let mut agent = test_agent();
        let mut out = Vec::new();

        let completed = run_console(&mut agent, Some(3), Duration::from_millis(1), &mut out)
            .await
            .unwrap();

        assert_eq!(completed, 3);
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.matches("[OBSERVE]").count(), 3);
        assert!(text.contains("threshold 0.80"));
    }
}
