use events::{ProgressBroadcaster, ProgressEvent};
use insights_core::{AnalysisSession, Stage, ThoughtTrace};

/// Appends thought traces to a session and mirrors each line as a `thought`
/// progress event.
#[derive(Debug, Clone)]
pub struct ThoughtTraceRecorder {
    broadcaster: ProgressBroadcaster,
}

impl ThoughtTraceRecorder {
    pub fn new(broadcaster: ProgressBroadcaster) -> Self {
        Self { broadcaster }
    }

    /// Never blocks; events are dropped when nobody listens or the channel is full.
    pub fn record(&self, session: &mut AnalysisSession, stage: Stage, trace: ThoughtTrace) {
        let lines: Vec<String> = std::iter::once(trace.reasoning.clone())
            .chain(trace.observations.iter().map(|o| format!("Observation: {o}")))
            .chain(trace.decisions.iter().map(|d| format!("Decision: {d}")))
            .collect();
        let step = trace.step.clone();
        let session_id = session.id;

        session.add_trace(trace);

        for line in lines {
            self.broadcaster
                .publish(session_id, ProgressEvent::thought(stage, step.as_str(), line));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use events::{ChannelSubscriber, ProgressKind};
    use insights_core::RestaurantProfile;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_record_appends_and_publishes_each_line() {
        let broadcaster = ProgressBroadcaster::new();
        let recorder = ThoughtTraceRecorder::new(broadcaster.clone());
        let mut session = AnalysisSession::new(RestaurantProfile::new("Deli"));
        let (subscriber, mut rx) = ChannelSubscriber::new(8);
        broadcaster.register(session.id, Arc::new(subscriber));

        recorder.record(
            &mut session,
            Stage::SalesProcessing,
            ThoughtTrace::new(
                "Sales Processing",
                "aggregated 12 rows",
                vec!["2 rows unparseable".to_string()],
                vec!["ignored bad rows".to_string()],
                0.9,
            ),
        );

        assert_eq!(session.thought_traces.len(), 1);
        let mut messages = Vec::new();
        for _ in 0..3 {
            let envelope = rx.recv().await.unwrap();
            assert_eq!(envelope.event.stage, Stage::SalesProcessing);
            assert!(matches!(envelope.event.kind, ProgressKind::Thought { .. }));
            messages.push(envelope.event.message);
        }
        assert_eq!(
            messages,
            vec![
                "aggregated 12 rows",
                "Observation: 2 rows unparseable",
                "Decision: ignored bad rows",
            ]
        );
    }

    #[test]
    fn test_record_without_subscribers_or_runtime() {
        let recorder = ThoughtTraceRecorder::new(ProgressBroadcaster::new());
        let mut session = AnalysisSession::new(RestaurantProfile::new("Deli"));
        recorder.record(
            &mut session,
            Stage::Verification,
            ThoughtTrace::new("Verification", "nothing to check", vec![], vec![], 2.0),
        );
        assert_eq!(session.thought_traces[0].confidence, 1.0);
    }
}
