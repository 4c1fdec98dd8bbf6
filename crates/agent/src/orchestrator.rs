use tracing::{info, warn};
use uuid::Uuid;

use crate::capability::CapabilityRegistry;
use crate::conversation::{ContentBlock, ConversationMessage};
use crate::error::AgentError;
use crate::llm::InferenceEngine;
use crate::session::CapabilitySession;

pub const DEFAULT_FRAMING: &str = "You are an assistant that provisions Amazon S3 buckets through \
the AWS Controllers for Kubernetes (ACK) S3 controller. Use the available tools to create buckets \
when the user asks for one, and report the outcome plainly.";

/// Drives one query through inference and capability dispatch.
///
/// Only the first inference call sees the capability set. Each invocation
/// block of that first response is dispatched once and followed by exactly
/// one re-inference; invocation requests in follow-up responses are dropped.
pub struct ConversationOrchestrator<E> {
    engine: E,
    registry: CapabilityRegistry,
    framing: String,
}

impl<E: InferenceEngine> ConversationOrchestrator<E> {
    pub fn new(engine: E, registry: CapabilityRegistry) -> Self {
        Self { engine, registry, framing: DEFAULT_FRAMING.to_string() }
    }

    pub fn with_framing(mut self, framing: impl Into<String>) -> Self {
        self.framing = framing.into();
        self
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    fn frame(&self, query: &str) -> String {
        format!("{}\n\nUser request: {query}", self.framing)
    }

    pub async fn process_query<S>(&self, session: &S, query: &str) -> Result<String, AgentError>
    where
        S: CapabilitySession + ?Sized,
    {
        self.run_query(session, query, &Uuid::new_v4().to_string()).await
    }

    async fn run_query<S>(
        &self,
        session: &S,
        query: &str,
        correlation_id: &str,
    ) -> Result<String, AgentError>
    where
        S: CapabilitySession + ?Sized,
    {
        info!(
            event_name = "agent.query.received",
            correlation_id = %correlation_id,
            query_len = query.len(),
            "processing query"
        );

        let mut conversation = vec![ConversationMessage::user_text(self.frame(query))];
        let blocks = self.engine.infer(&conversation, Some(self.registry.as_slice())).await?;

        let mut output: Vec<String> = Vec::new();
        let mut preceding_text: Vec<String> = Vec::new();
        let mut invocations = 0usize;

        for block in blocks {
            let request = match block {
                ContentBlock::Text(text) => {
                    output.push(text.clone());
                    preceding_text.push(text);
                    continue;
                }
                ContentBlock::Invocation(request) => request,
            };

            if !self.registry.contains(&request.capability_name) {
                warn!(
                    event_name = "agent.capability.unknown",
                    correlation_id = %correlation_id,
                    capability = %request.capability_name,
                    "model requested a capability the server does not offer"
                );
                output.push(format!(
                    "[Capability {} is not offered by the server; request skipped]",
                    request.capability_name
                ));
                continue;
            }

            info!(
                event_name = "agent.capability.invoke",
                correlation_id = %correlation_id,
                capability = %request.capability_name,
                "invoking capability"
            );
            let result = session.invoke(&request).await?;
            invocations += 1;
            output.push(format!(
                "[Calling capability {} with args {}]",
                request.capability_name,
                request.arguments_json()
            ));

            if !preceding_text.is_empty() {
                conversation.push(ConversationMessage::assistant_text(preceding_text.join("\n")));
                preceding_text.clear();
            }
            conversation.push(ConversationMessage::invocation_result(result));

            for follow_up in self.engine.infer(&conversation, None).await? {
                match follow_up {
                    ContentBlock::Text(text) => output.push(text),
                    ContentBlock::Invocation(nested) => warn!(
                        event_name = "agent.capability.nested_discarded",
                        correlation_id = %correlation_id,
                        capability = %nested.capability_name,
                        "follow-up response requested another capability; discarded"
                    ),
                }
            }
        }

        info!(
            event_name = "agent.query.completed",
            correlation_id = %correlation_id,
            invocations,
            "query processed"
        );
        Ok(output.join("\n"))
    }

    /// Like [`Self::process_query`] but renders failures as `Error: ...`.
    pub async fn respond<S>(&self, session: &S, query: &str) -> String
    where
        S: CapabilitySession + ?Sized,
    {
        let correlation_id = Uuid::new_v4().to_string();
        match self.run_query(session, query, &correlation_id).await {
            Ok(text) => text,
            Err(error) => {
                warn!(
                    event_name = "agent.query.failed",
                    correlation_id = %correlation_id,
                    error = %error,
                    "query failed"
                );
                format!("Error: {error}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use futures::FutureExt;
    use serde_json::{json, Map, Value};

    use super::ConversationOrchestrator;
    use crate::capability::{Capability, CapabilityRegistry};
    use crate::conversation::{
        CapabilityInvocationRequest, ContentBlock, ConversationMessage, MessageContent, Role,
    };
    use crate::error::InferenceError;
    use crate::llm::InferenceEngine;
    use crate::session::testing::{bucket_capability, events, EventLog, FakeConnector, FakeSession};
    use crate::session::with_session;

    struct Call {
        conversation: Vec<ConversationMessage>,
        with_capabilities: bool,
    }

    /// Replays scripted responses and records what each call was given.
    struct ScriptedEngine {
        responses: Mutex<VecDeque<Vec<ContentBlock>>>,
        calls: Mutex<Vec<Call>>,
    }

    impl ScriptedEngine {
        fn new(responses: Vec<Vec<ContentBlock>>) -> Self {
            Self { responses: Mutex::new(responses.into()), calls: Mutex::new(Vec::new()) }
        }

        fn calls(&self) -> std::sync::MutexGuard<'_, Vec<Call>> {
            self.calls.lock().expect("calls lock")
        }
    }

    #[async_trait]
    impl InferenceEngine for ScriptedEngine {
        async fn infer(
            &self,
            conversation: &[ConversationMessage],
            capabilities: Option<&[Capability]>,
        ) -> Result<Vec<ContentBlock>, InferenceError> {
            self.calls.lock().expect("calls lock").push(Call {
                conversation: conversation.to_vec(),
                with_capabilities: capabilities.is_some(),
            });
            self.responses
                .lock()
                .expect("responses lock")
                .pop_front()
                .ok_or_else(|| InferenceError::Api("script exhausted".to_string()))
        }
    }

    fn text(value: &str) -> ContentBlock {
        ContentBlock::Text(value.to_string())
    }

    fn invoke(name: &str, arguments: Value) -> ContentBlock {
        let arguments: Map<String, Value> = match arguments {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        ContentBlock::Invocation(CapabilityInvocationRequest::new(name, arguments))
    }

    fn orchestrator(responses: Vec<Vec<ContentBlock>>) -> ConversationOrchestrator<ScriptedEngine> {
        ConversationOrchestrator::new(
            ScriptedEngine::new(responses),
            CapabilityRegistry::new(vec![bucket_capability()]),
        )
    }

    fn invocations(log: &EventLog) -> Vec<String> {
        events(log).into_iter().filter(|event| event.starts_with("session.invoke")).collect()
    }

    #[tokio::test]
    async fn pure_text_needs_one_inference_and_no_invocations() {
        let log = EventLog::default();
        let session = FakeSession::new(log.clone());
        let orchestrator = orchestrator(vec![vec![text("Buckets hold objects.")]]);

        let answer = orchestrator.process_query(&session, "what is a bucket?").await.expect("ok");

        assert_eq!(answer, "Buckets hold objects.");
        let calls = orchestrator.engine().calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].with_capabilities);
        assert_eq!(calls[0].conversation.len(), 1);
        assert_eq!(calls[0].conversation[0].role, Role::User);
        assert!(calls[0].conversation[0].text().ends_with("what is a bucket?"));
        assert!(invocations(&log).is_empty());
    }

    #[tokio::test]
    async fn each_invocation_block_gets_one_follow_up_in_order() {
        let log = EventLog::default();
        let session = FakeSession::new(log.clone());
        let orchestrator = orchestrator(vec![
            vec![
                text("Creating two buckets."),
                invoke("create-storage-bucket", json!({"name": "alpha"})),
                invoke("create-storage-bucket", json!({"name": "beta"})),
            ],
            vec![text("alpha is ready.")],
            vec![text("beta is ready.")],
        ]);

        let answer = orchestrator.process_query(&session, "two buckets").await.expect("ok");

        assert_eq!(
            invocations(&log),
            vec![r#"session.invoke:{"name":"alpha"}"#, r#"session.invoke:{"name":"beta"}"#]
        );
        let calls = orchestrator.engine().calls();
        assert_eq!(calls.len(), 3);
        assert!(!calls[1].with_capabilities);
        assert!(!calls[2].with_capabilities);

        // first follow-up: framing, preceding assistant text, alpha result
        let first = &calls[1].conversation;
        assert_eq!(first.len(), 3);
        assert_eq!(first[1], ConversationMessage::assistant_text("Creating two buckets."));
        assert!(matches!(
            &first[2].content,
            MessageContent::InvocationResult(result) if result.to_text().contains("alpha")
        ));

        // second follow-up extends the first; beta result comes last
        let second = &calls[2].conversation;
        assert_eq!(second.len(), 4);
        assert_eq!(&second[..3], &first[..]);
        assert!(second[3].text().contains(r#"{"name":"beta"}"#));

        assert_eq!(
            answer,
            [
                "Creating two buckets.",
                r#"[Calling capability create-storage-bucket with args {"name":"alpha"}]"#,
                "alpha is ready.",
                r#"[Calling capability create-storage-bucket with args {"name":"beta"}]"#,
                "beta is ready.",
            ]
            .join("\n")
        );
    }

    #[tokio::test]
    async fn nested_requests_in_follow_ups_are_not_dispatched() {
        let log = EventLog::default();
        let session = FakeSession::new(log.clone());
        let orchestrator = orchestrator(vec![
            vec![invoke("create-storage-bucket", json!({}))],
            vec![text("Done."), invoke("create-storage-bucket", json!({"name": "again"}))],
        ]);

        let answer = orchestrator.process_query(&session, "bucket please").await.expect("ok");

        assert_eq!(invocations(&log).len(), 1);
        assert_eq!(orchestrator.engine().calls().len(), 2);
        assert!(answer.ends_with("Done."));
    }

    #[tokio::test]
    async fn unknown_capability_is_reported_without_dispatch() {
        let log = EventLog::default();
        let session = FakeSession::new(log.clone());
        let orchestrator = orchestrator(vec![vec![
            invoke("delete-everything", json!({})),
            text("Anything else?"),
        ]]);

        let answer = orchestrator.process_query(&session, "wipe it").await.expect("ok");

        assert!(invocations(&log).is_empty());
        assert_eq!(orchestrator.engine().calls().len(), 1);
        assert_eq!(
            answer,
            "[Capability delete-everything is not offered by the server; request skipped]\nAnything else?"
        );
    }

    #[tokio::test]
    async fn invocation_failures_are_rendered_by_respond() {
        let log = EventLog::default();
        let session = FakeSession::new(log.clone()).failing_invocations();
        let orchestrator =
            orchestrator(vec![vec![invoke("create-storage-bucket", json!({"name": "x"}))]]);

        let answer = orchestrator.respond(&session, "bucket x").await;

        assert_eq!(
            answer,
            "Error: invocation of `create-storage-bucket` failed: connection reset"
        );
        assert_eq!(orchestrator.engine().calls().len(), 1);
    }

    #[tokio::test]
    async fn custom_framing_prefixes_the_query() {
        let session = FakeSession::new(EventLog::default());
        let orchestrator =
            orchestrator(vec![vec![text("ok")]]).with_framing("You manage buckets.");

        orchestrator.process_query(&session, "hello").await.expect("ok");

        let calls = orchestrator.engine().calls();
        assert_eq!(calls[0].conversation[0].text(), "You manage buckets.\n\nUser request: hello");
    }

    #[tokio::test]
    async fn failure_mid_query_still_closes_session_then_transport_once() {
        let connector = FakeConnector { fail_invocations: true, ..FakeConnector::default() };
        let orchestrator =
            orchestrator(vec![vec![invoke("create-storage-bucket", json!({"name": "x"}))]]);

        let result = with_session(&connector, "http://localhost:8080/mcp", move |session| {
            async move { orchestrator.process_query(session, "bucket x").await }.boxed()
        })
        .await
        .expect("session should open");

        assert!(result.is_err());
        let log = events(&connector.log);
        assert_eq!(log.iter().filter(|e| *e == "session.close").count(), 1);
        assert_eq!(log.iter().filter(|e| *e == "transport.close").count(), 1);
        assert_eq!(&log[log.len() - 2..], ["session.close", "transport.close"]);
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(std::sync::Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().expect("log buffer lock").extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn failed_query_log_carries_the_query_correlation_id() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let session = FakeSession::new(EventLog::default());
        let orchestrator = orchestrator(Vec::new());
        let answer = orchestrator.respond(&session, "hello").await;
        assert!(answer.starts_with("Error: "));

        let raw = logs.0.lock().expect("log buffer lock").clone();
        let records: Vec<Value> = String::from_utf8(raw)
            .expect("utf8 logs")
            .lines()
            .map(|line| serde_json::from_str(line).expect("json log line"))
            .collect();
        let correlation_of = |event: &str| {
            records
                .iter()
                .find(|record| record["fields"]["event_name"] == event)
                .and_then(|record| record["fields"]["correlation_id"].as_str())
                .map(str::to_string)
        };

        let received = correlation_of("agent.query.received").expect("received event");
        assert_eq!(correlation_of("agent.query.failed"), Some(received));
    }
}
