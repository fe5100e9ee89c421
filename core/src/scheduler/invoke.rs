use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;

use crate::agent::{Agent, AgentOutput};
use crate::error::OrchestratorError;
use crate::task::{AgentResult, Status, TaskRecord};

/// Run `agent.process(task)` with an optional timeout, catching panics.
///
/// Every way the call can go wrong comes back as an `OrchestratorError`;
/// an in-flight call that times out is dropped.
pub(crate) async fn call_agent(
    agent: &dyn Agent,
    task: TaskRecord,
    timeout: Option<Duration>,
) -> Result<AgentOutput, OrchestratorError> {
    let fut = AssertUnwindSafe(agent.process(task)).catch_unwind();
    let outcome = match timeout {
        Some(limit) => match tokio::time::timeout(limit, fut).await {
            Ok(outcome) => outcome,
            Err(_) => {
                return Err(OrchestratorError::AgentTimeout {
                    agent: agent.name().to_string(),
                    timeout_ms: limit.as_millis() as u64,
                })
            }
        },
        None => fut.await,
    };

    match outcome {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(OrchestratorError::AgentFailure {
            agent: agent.name().to_string(),
            reason: format!("{e:#}"),
        }),
        Err(payload) => Err(OrchestratorError::AgentPanicked {
            agent: agent.name().to_string(),
            message: panic_message(payload.as_ref()),
        }),
    }
}

/// Call the tracking hook once; failures and panics are logged and dropped.
pub(crate) async fn call_track(
    agent: &dyn Agent,
    task: &TaskRecord,
    status: &Status,
    result: &AgentResult,
    used_remote: bool,
) {
    let outcome = AssertUnwindSafe(agent.track(task, status, result, used_remote))
        .catch_unwind()
        .await;

    let reason = match outcome {
        Ok(Ok(())) => return,
        Ok(Err(e)) => format!("{e:#}"),
        Err(payload) => format!("panicked: {}", panic_message(payload.as_ref())),
    };
    let err = OrchestratorError::CallbackFailure {
        callback: format!("{}.track", agent.name()),
        reason,
    };
    tracing::warn!(kind = err.kind(), agent = agent.name(), task_id = %task.task_id, "{}", err);
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Behaviour {
        Succeed,
        Fail,
        Panic,
        Hang,
    }

    struct StubAgent {
        behaviour: Behaviour,
        tracked: AtomicUsize,
    }

    impl StubAgent {
        fn new(behaviour: Behaviour) -> Self {
            Self {
                behaviour,
                tracked: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Agent for StubAgent {
        fn name(&self) -> &str {
            "StubAgent_t"
        }

        async fn process(&self, _task: TaskRecord) -> anyhow::Result<AgentOutput> {
            match self.behaviour {
                Behaviour::Succeed => Ok((Status::from("done"), AgentResult::Text("ok".into()))),
                Behaviour::Fail => anyhow::bail!("model unavailable"),
                Behaviour::Panic => panic!("index out of bounds"),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok((Status::from("late"), AgentResult::empty()))
                }
            }
        }

        async fn track(
            &self,
            _task: &TaskRecord,
            _status: &Status,
            _result: &AgentResult,
            _used_remote: bool,
        ) -> anyhow::Result<()> {
            self.tracked.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("telemetry endpoint down")
        }
    }

    fn task() -> TaskRecord {
        TaskRecord::new("t", "stub")
    }

    #[tokio::test]
    async fn success_passes_through() {
        let stub = StubAgent::new(Behaviour::Succeed);
        let (status, result) = call_agent(&stub, task(), None).await.unwrap();
        assert_eq!(status, "done");
        assert_eq!(result, AgentResult::Text("ok".into()));
    }

    #[tokio::test]
    async fn errors_become_agent_failures() {
        let stub = StubAgent::new(Behaviour::Fail);
        let err = call_agent(&stub, task(), None).await.unwrap_err();
        assert_eq!(err.kind(), "agent_failure");
        assert!(err.to_string().contains("model unavailable"));
    }

    #[tokio::test]
    async fn panics_are_caught() {
        let stub = StubAgent::new(Behaviour::Panic);
        let err = call_agent(&stub, task(), None).await.unwrap_err();
        assert_eq!(err.kind(), "agent_panicked");
        assert!(err.to_string().contains("index out of bounds"));
        assert!(err.is_agent_fault());
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_agents_time_out() {
        let stub = StubAgent::new(Behaviour::Hang);
        let err = call_agent(&stub, task(), Some(Duration::from_millis(20)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "agent_timeout");
    }

    #[tokio::test]
    async fn track_failures_are_swallowed() {
        let stub = StubAgent::new(Behaviour::Succeed);
        call_track(&stub, &task(), &Status::from("done"), &AgentResult::empty(), false).await;
        assert_eq!(stub.tracked.load(Ordering::SeqCst), 1);
    }
}
