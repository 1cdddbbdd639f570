//! Readiness polling of the runtime cluster.
//!
//! Bounded retries of the runtime's own status command inside the head
//! container. The first success is followed by a fixed grace delay so
//! peers can finish joining before the orchestrator hands off control.

use std::time::Duration;

use rayup_exec::{Executor, Host};
use tracing::{debug, info};

use crate::docker;
use crate::error::{ClusterError, ClusterResult};

/// Bounded-retry readiness probe.
#[derive(Debug, Clone)]
pub struct ReadinessProbe {
    max_attempts: u32,
    interval: Duration,
    join_grace: Duration,
}

impl Default for ReadinessProbe {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            interval: Duration::from_secs(2),
            join_grace: Duration::from_secs(5),
        }
    }
}

impl ReadinessProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_join_grace(mut self, join_grace: Duration) -> Self {
        self.join_grace = join_grace;
        self
    }

    /// Poll until the runtime responds or attempts are exhausted.
    ///
    /// Exhaustion is a fatal [`ClusterError::ReadinessTimeout`]; it is
    /// never retried at a higher level.
    pub async fn wait_ready<E: Executor>(
        &self,
        exec: &E,
        head: &Host,
        container: &str,
    ) -> ClusterResult<()> {
        let cmd = docker::runtime_status(container);

        for attempt in 1..=self.max_attempts {
            let out = exec.run(head, &cmd).await?;
            if out.success() {
                info!(attempt, "runtime cluster is ready");
                // Grace delay for peers still joining.
                tokio::time::sleep(self.join_grace).await;
                return Ok(());
            }
            debug!(attempt, max = self.max_attempts, "runtime not ready yet");
            tokio::time::sleep(self.interval).await;
        }

        Err(ClusterError::ReadinessTimeout {
            attempts: self.max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayup_exec::{CommandOutput, ScriptedExecutor};

    fn fast_probe(max_attempts: u32) -> ReadinessProbe {
        ReadinessProbe::new()
            .with_max_attempts(max_attempts)
            .with_interval(Duration::from_millis(1))
            .with_join_grace(Duration::ZERO)
    }

    #[tokio::test]
    async fn ready_on_first_attempt() {
        let exec = ScriptedExecutor::new();
        fast_probe(3)
            .wait_ready(&exec, &Host::Local, "rayup")
            .await
            .unwrap();
        assert_eq!(exec.run_log().len(), 1);
    }

    #[tokio::test]
    async fn retries_until_success() {
        let exec = ScriptedExecutor::new();
        let fail = CommandOutput {
            status: 1,
            stdout: String::new(),
            stderr: String::new(),
        };
        exec.on_sequence("ray status", vec![fail.clone(), fail, CommandOutput::ok()]);

        fast_probe(5)
            .wait_ready(&exec, &Host::Local, "rayup")
            .await
            .unwrap();
        assert_eq!(exec.run_log().len(), 3);
    }

    #[tokio::test]
    async fn exhaustion_is_a_timeout() {
        let exec = ScriptedExecutor::new();
        exec.fail_on("ray status", 1);

        let err = fast_probe(4)
            .wait_ready(&exec, &Host::Local, "rayup")
            .await
            .unwrap_err();
        assert!(matches!(err, ClusterError::ReadinessTimeout { attempts: 4 }));
        assert_eq!(exec.run_log().len(), 4);
    }
}
