//! Orchestrator behaviour with scripted agents and in-memory tools

use crew_core::roster::{ANALYZER_ROLE, REWRITER_ROLE, STRATEGIST_ROLE, SUMMARIZER_ROLE};
use crew_core::{
    AgentError, CrewConfig, CrewError, RunState, SessionError, SessionStore, StepId,
};
use crew_protocol::ToolName;
use crew_test_utils::{
    answer, connect_error, orchestrator, tool_request, MemoryToolInvoker, ScriptedBackend,
};
use crew_tools::{ToolErrorCause, ToolInvocationError};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const CODE: &str = "def add(a, b):\n    return a + b\n";

#[tokio::test]
async fn completed_run_returns_every_step_in_order() {
    let backend = Arc::new(
        ScriptedBackend::new()
            .script(SUMMARIZER_ROLE, [answer("Adds two numbers.")])
            .script(ANALYZER_ROLE, [answer("- no type checks")])
            .script(STRATEGIST_ROLE, [answer("1. add hints")])
            .script(REWRITER_ROLE, [answer("diff: +hints")]),
    );
    let tools = Arc::new(MemoryToolInvoker::new());
    let (orch, store) = orchestrator(CrewConfig::default(), backend.clone(), tools.clone());

    let report = orch.submit(CODE, "snippet.py").await.unwrap();

    assert_eq!(report.state, RunState::Completed);
    assert!(report.failure.is_none());
    assert_eq!(report.artifact, format!("{}/snippet.py", report.session));
    assert_eq!(
        report.results.iter().map(|(k, v)| (*k, v.as_str())).collect::<Vec<_>>(),
        vec![
            (StepId::Summarize, "Adds two numbers."),
            (StepId::Analyze, "- no type checks"),
            (StepId::Plan, "1. add hints"),
            (StepId::Rewrite, "diff: +hints"),
        ]
    );
    assert_eq!(tools.file(&report.artifact).as_deref(), Some(CODE));
    assert_eq!(store.get(&report.session).await.unwrap(), report.results);
    assert_eq!(
        store.record(&report.session).await.unwrap().artifact.as_deref(),
        Some(report.artifact.as_str())
    );
    assert_eq!(
        backend.roles_seen(),
        vec![SUMMARIZER_ROLE, ANALYZER_ROLE, STRATEGIST_ROLE, REWRITER_ROLE]
    );
    assert!(!report.render_log().is_empty());
}

#[tokio::test]
async fn prior_outputs_flow_into_later_steps() {
    let backend = Arc::new(
        ScriptedBackend::new()
            .script(SUMMARIZER_ROLE, [answer("SUMMARY-TEXT")])
            .script(ANALYZER_ROLE, [answer("FINDINGS-TEXT")]),
    );
    let tools = Arc::new(MemoryToolInvoker::new());
    let (orch, _store) = orchestrator(CrewConfig::default(), backend.clone(), tools);

    orch.submit(CODE, "snippet.py").await.unwrap();

    let plan_prompt = backend
        .requests()
        .into_iter()
        .find(|(role, _)| role == STRATEGIST_ROLE)
        .map(|(_, req)| req.messages[1].content.clone())
        .unwrap();
    assert!(plan_prompt.contains("SUMMARY-TEXT"));
    assert!(plan_prompt.contains("FINDINGS-TEXT"));
}

#[tokio::test]
async fn unauthorized_tool_in_step_two_keeps_step_one_only() {
    let backend = Arc::new(
        ScriptedBackend::new()
            .script(SUMMARIZER_ROLE, [answer("summary")])
            .script(
                ANALYZER_ROLE,
                [tool_request("write_file", json!({ "path": "x.py", "content": "" }))],
            ),
    );
    let tools = Arc::new(MemoryToolInvoker::new());
    let (orch, store) = orchestrator(CrewConfig::default(), backend.clone(), tools.clone());

    let report = orch.submit(CODE, "snippet.py").await.unwrap();

    assert_eq!(report.state, RunState::Failed);
    assert_eq!(report.results.keys().copied().collect::<Vec<_>>(), vec![StepId::Summarize]);
    let failure = report.failure.as_ref().unwrap();
    assert_eq!(failure.step, StepId::Analyze);
    assert!(matches!(failure.source, AgentError::UnauthorizedTool { ref tool, .. } if tool == "write_file"));

    // Only the artifact write went through the invoker.
    assert_eq!(tools.calls_of(ToolName::WriteFile), 1);
    assert_eq!(store.get(&report.session).await.unwrap(), report.results);
    assert!(!backend.roles_seen().iter().any(|r| r == STRATEGIST_ROLE));
}

#[tokio::test]
async fn exhausted_rewriter_fails_the_run() {
    let loop_forever = (0..5).map(|_| tool_request("read_file", json!({ "path": "x.py" })));
    let backend = Arc::new(ScriptedBackend::new().script(REWRITER_ROLE, loop_forever));
    let tools = Arc::new(MemoryToolInvoker::new());
    let (orch, _store) = orchestrator(
        CrewConfig::default().with_max_iterations(0),
        backend,
        tools,
    );

    let report = orch.submit(CODE, "snippet.py").await.unwrap();

    assert_eq!(report.state, RunState::Failed);
    assert_eq!(report.results.len(), 3);
    let failure = report.failure.unwrap();
    assert_eq!(failure.step, StepId::Rewrite);
    assert!(matches!(failure.source, AgentError::AgentExhausted { max_iterations: 0, .. }));
}

#[tokio::test]
async fn retryable_tool_errors_are_retried_when_configured() {
    let script = || {
        ScriptedBackend::new().script(
            ANALYZER_ROLE,
            [
                tool_request("run_tests", json!({})),
                tool_request("run_tests", json!({})),
                answer("tests pass"),
            ],
        )
    };

    let tools = Arc::new(MemoryToolInvoker::new());
    tools.fail_with(ToolName::RunTests, connect_error(ToolName::RunTests));
    let config = CrewConfig::default().with_step_retries(1, Duration::from_millis(1));
    let (orch, _store) = orchestrator(config, Arc::new(script()), tools.clone());

    let report = orch.submit(CODE, "snippet.py").await.unwrap();
    assert_eq!(report.state, RunState::Completed);
    assert_eq!(report.results[&StepId::Analyze], "tests pass");
    assert_eq!(tools.calls_of(ToolName::RunTests), 2);

    // Without retries the same failure is terminal.
    let tools = Arc::new(MemoryToolInvoker::new());
    tools.fail_with(ToolName::RunTests, connect_error(ToolName::RunTests));
    let (orch, _store) = orchestrator(CrewConfig::default(), Arc::new(script()), tools);

    let report = orch.submit(CODE, "snippet.py").await.unwrap();
    assert_eq!(report.state, RunState::Failed);
    assert!(report.failure.unwrap().source.is_retryable());
}

#[tokio::test]
async fn non_retryable_tool_errors_are_not_retried() {
    let backend = Arc::new(ScriptedBackend::new().script(
        ANALYZER_ROLE,
        [tool_request("run_tests", json!({})), answer("unused")],
    ));
    let tools = Arc::new(MemoryToolInvoker::new());
    tools.fail_with(
        ToolName::RunTests,
        ToolInvocationError::new("run_tests", ToolErrorCause::TimedOut("pytest -q".into())),
    );
    let config = CrewConfig::default().with_step_retries(3, Duration::from_millis(1));
    let (orch, _store) = orchestrator(config, backend, tools.clone());

    let report = orch.submit(CODE, "snippet.py").await.unwrap();
    assert_eq!(report.state, RunState::Failed);
    assert_eq!(report.results.keys().copied().collect::<Vec<_>>(), vec![StepId::Summarize]);
    assert_eq!(tools.calls_of(ToolName::RunTests), 1);
}

#[tokio::test]
async fn agents_cannot_reach_another_sessions_files() {
    let tools = Arc::new(MemoryToolInvoker::new());
    let (first, _store) = orchestrator(
        CrewConfig::default(),
        Arc::new(ScriptedBackend::new()),
        tools.clone(),
    );
    let a = first.submit("SECRET = 1\n", "snippet.py").await.unwrap();
    assert_eq!(a.state, RunState::Completed);

    let snooping = Arc::new(ScriptedBackend::new().script(
        SUMMARIZER_ROLE,
        [tool_request("read_file", json!({ "path": a.artifact })), answer("leaked")],
    ));
    let (second, _store) = orchestrator(CrewConfig::default(), snooping.clone(), tools.clone());
    let b = second.submit(CODE, "snippet.py").await.unwrap();

    assert_ne!(a.session, b.session);
    assert_eq!(b.state, RunState::Failed);
    assert!(b.results.is_empty());
    let failure = b.failure.unwrap();
    assert_eq!(failure.step, StepId::Summarize);
    assert!(matches!(failure.source, AgentError::InvalidToolArguments { tool: ToolName::ReadFile, .. }));
    assert_eq!(tools.calls_of(ToolName::ReadFile), 0);
    assert!(snooping
        .requests()
        .iter()
        .all(|(_, req)| req.messages.iter().all(|m| !m.content.contains("SECRET"))));
}

#[tokio::test]
async fn bad_filenames_are_rejected_before_any_session() {
    let (orch, store) = orchestrator(
        CrewConfig::default(),
        Arc::new(ScriptedBackend::new()),
        Arc::new(MemoryToolInvoker::new()),
    );

    let err = orch.submit(CODE, "../escape.py").await.unwrap_err();
    assert!(matches!(err, CrewError::InvalidFilename(_)));
    assert!(err.is_client_error());
    assert!(store.is_empty());
}

#[tokio::test]
async fn artifact_write_failure_is_reported() {
    let tools = Arc::new(MemoryToolInvoker::new());
    tools.fail_with(ToolName::WriteFile, connect_error(ToolName::WriteFile));
    let (orch, _store) = orchestrator(CrewConfig::default(), Arc::new(ScriptedBackend::new()), tools);

    let err = orch.submit(CODE, "snippet.py").await.unwrap_err();
    assert!(matches!(err, CrewError::Artifact(_)));
}

#[tokio::test]
async fn concurrent_submissions_use_distinct_sessions() {
    let tools = Arc::new(MemoryToolInvoker::new());
    let (orch, store) = orchestrator(CrewConfig::default(), Arc::new(ScriptedBackend::new()), tools.clone());

    let mut handles = Vec::new();
    for i in 0..8 {
        let orch = orch.clone();
        handles.push(tokio::spawn(async move {
            orch.submit(&format!("x = {i}\n"), "snippet.py").await.unwrap()
        }));
    }

    let mut sessions = Vec::new();
    for (i, handle) in handles.into_iter().enumerate() {
        let report = handle.await.unwrap();
        assert_eq!(report.state, RunState::Completed);
        assert_eq!(tools.file(&report.artifact), Some(format!("x = {i}\n")));
        sessions.push(report.session);
    }
    sessions.sort();
    sessions.dedup();
    assert_eq!(sessions.len(), 8);
    assert_eq!(store.len(), 8);
}

#[tokio::test]
async fn unknown_sessions_are_not_found() {
    let (orch, _store) = orchestrator(
        CrewConfig::default(),
        Arc::new(ScriptedBackend::new()),
        Arc::new(MemoryToolInvoker::new()),
    );
    let id = "00000000".parse().unwrap();
    assert!(matches!(orch.sessions().get(&id).await, Err(SessionError::NotFound(_))));
}
