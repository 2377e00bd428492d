use std::sync::Arc;

use async_trait::async_trait;
use fusionguard_compute::FeatureBuilder;
use fusionguard_core::{ShotEnded, TelemetryPoint};
use fusionguard_eisenbahn::{topics, Message};
use tracing::{debug, info};

use crate::counters::StageCounters;
use crate::error::StageError;
use crate::stage::{decode, StageHandler, StageOutput};

const TOPICS: &[&str] = &[topics::TELEMETRY_RAW, topics::SHOT_ENDED];

/// Raw telemetry in, one feature vector per configured window out.
pub struct FeatureStage {
    builder: FeatureBuilder,
    output: StageOutput,
    counters: Arc<StageCounters>,
}

impl FeatureStage {
    pub fn new(builder: FeatureBuilder, output: StageOutput) -> Self {
        Self {
            builder,
            output,
            counters: Arc::new(StageCounters::new()),
        }
    }

    pub fn builder(&self) -> &FeatureBuilder {
        &self.builder
    }

    async fn on_point(&self, message: &Message) -> Result<(), StageError> {
        let point: TelemetryPoint = decode(message)?;
        point.validate()?;

        let vectors = self.builder.process(&point);
        debug!(
            shot_id = %point.shot_id,
            ts = point.ts_unix_ns,
            vectors = vectors.len(),
            "computed features"
        );

        // Every window is attempted; the first failure is reported.
        let mut first_err = None;
        for vector in &vectors {
            let out = Message::with_correlation(topics::FEATURE_VECTOR, vector, message.correlation_id)?;
            if let Err(e) = self.output.send(out, &self.counters).await {
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn on_shot_ended(&self, message: &Message) -> Result<(), StageError> {
        let ended: ShotEnded = decode(message)?;
        let tracked = self.builder.end_shot(&ended.shot_id);
        info!(shot_id = %ended.shot_id, tracked, "released shot state");
        Ok(())
    }
}

#[async_trait]
impl StageHandler for FeatureStage {
    fn name(&self) -> &str {
        "feature-stage"
    }

    fn topics(&self) -> &[&'static str] {
        TOPICS
    }

    fn counters(&self) -> &Arc<StageCounters> {
        &self.counters
    }

    async fn handle(&self, message: Message) -> Result<(), StageError> {
        match message.topic.as_str() {
            topics::TELEMETRY_RAW => self.on_point(&message).await,
            topics::SHOT_ENDED => self.on_shot_ended(&message),
            other => Err(StageError::UnexpectedTopic(other.to_string())),
        }
    }

    async fn finish(&self) {
        info!(
            tracked_shots = self.builder.tracked_shots(),
            out_of_order = self.builder.out_of_order_count(),
            late = self.builder.late_count(),
            "feature stage finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fusionguard_core::{ChannelSample, FeatureVector};
    use fusionguard_eisenbahn::{EisenbahnError, EventPublisher};
    use std::time::Duration;
    use tokio::sync::Mutex;

    struct MockPublisher {
        messages: Mutex<Vec<Message>>,
        fail: bool,
    }

    impl MockPublisher {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                messages: Mutex::new(Vec::new()),
                fail,
            })
        }
    }

    #[async_trait]
    impl EventPublisher for MockPublisher {
        async fn publish(&self, message: Message) -> Result<(), EisenbahnError> {
            if self.fail {
                return Err(EisenbahnError::Transport("down".into()));
            }
            self.messages.lock().await.push(message);
            Ok(())
        }
    }

    fn stage(publisher: Arc<MockPublisher>) -> FeatureStage {
        FeatureStage::new(
            FeatureBuilder::new(vec![50, 200], ["ip".to_string(), "ne".to_string()]),
            StageOutput::new(publisher, Duration::from_millis(100)),
        )
    }

    fn raw(point: &TelemetryPoint) -> Message {
        Message::new(topics::TELEMETRY_RAW, point).unwrap()
    }

    #[tokio::test]
    async fn point_yields_one_vector_per_window() {
        let publisher = MockPublisher::new(false);
        let stage = stage(publisher.clone());
        let msg = raw(&TelemetryPoint::new("s1", 1, vec![ChannelSample::new("ip", 1.0)]));
        let correlation = msg.correlation_id;

        stage.handle(msg).await.unwrap();

        let sent = publisher.messages.lock().await;
        assert_eq!(sent.len(), 2);
        let windows: Vec<u32> = sent
            .iter()
            .map(|m| m.decode::<FeatureVector>().unwrap().window_ms)
            .collect();
        assert_eq!(windows, vec![50, 200]);
        assert!(sent.iter().all(|m| m.topic == topics::FEATURE_VECTOR));
        assert!(sent.iter().all(|m| m.correlation_id == correlation));

        let v: FeatureVector = sent[0].decode().unwrap();
        assert_eq!(v.missing_ratio, 0.5);
        assert_eq!(stage.counters().snapshot().published, 2);
    }

    #[tokio::test]
    async fn invalid_point_is_malformed() {
        let stage = stage(MockPublisher::new(false));
        let err = stage
            .handle(raw(&TelemetryPoint::new("", 1, vec![ChannelSample::new("ip", 1.0)])))
            .await
            .unwrap_err();
        assert!(err.is_malformed());

        let err = stage
            .handle(Message::from_raw(topics::TELEMETRY_RAW, b"[]".to_vec()))
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::Malformed { .. }));
    }

    #[tokio::test]
    async fn shot_ended_releases_state() {
        let stage = stage(MockPublisher::new(false));
        stage
            .handle(raw(&TelemetryPoint::new("s1", 1, vec![ChannelSample::new("ip", 1.0)])))
            .await
            .unwrap();
        assert_eq!(stage.builder().tracked_shots(), 1);

        let ended = Message::new(topics::SHOT_ENDED, &ShotEnded { shot_id: "s1".into() }).unwrap();
        stage.handle(ended).await.unwrap();
        assert_eq!(stage.builder().tracked_shots(), 0);
    }

    #[tokio::test]
    async fn point_behind_shot_end_publishes_nothing() {
        let publisher = MockPublisher::new(false);
        let stage = stage(publisher.clone());

        // The end marker overtakes the shot's only point.
        let ended = Message::new(topics::SHOT_ENDED, &ShotEnded { shot_id: "s1".into() }).unwrap();
        stage.handle(ended).await.unwrap();
        stage
            .handle(raw(&TelemetryPoint::new("s1", 1, vec![ChannelSample::new("ip", 1.0)])))
            .await
            .unwrap();

        assert!(publisher.messages.lock().await.is_empty());
        assert_eq!(stage.builder().tracked_shots(), 0);
        assert_eq!(stage.builder().late_count(), 1);
    }

    #[tokio::test]
    async fn publish_failure_is_reported_and_counted() {
        let stage = stage(MockPublisher::new(true));
        let err = stage
            .handle(raw(&TelemetryPoint::new("s1", 1, vec![ChannelSample::new("ip", 1.0)])))
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::Publish { .. }));
        assert!(!err.is_malformed());
        assert_eq!(stage.counters().snapshot().publish_failures, 2);
    }

    #[tokio::test]
    async fn unknown_topic_is_rejected() {
        let stage = stage(MockPublisher::new(false));
        let err = stage
            .handle(Message::new("fusionguard.other", &1u8).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::UnexpectedTopic(t) if t == "fusionguard.other"));
    }
}
