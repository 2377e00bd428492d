use std::sync::Arc;

use async_trait::async_trait;
use fusionguard_compute::{derive_alerts, RiskEngine};
use fusionguard_core::config::ThresholdConfig;
use fusionguard_core::{FeatureVector, ValidationError};
use fusionguard_eisenbahn::{topics, Message};
use tracing::{debug, info, warn};

use crate::counters::StageCounters;
use crate::error::StageError;
use crate::sink::{SinkHandle, SinkRecord};
use crate::stage::{decode, StageHandler, StageOutput};

const TOPICS: &[&str] = &[topics::FEATURE_VECTOR];

/// Feature vectors in; risk points and alerts out.
pub struct InferenceStage {
    engine: RiskEngine,
    thresholds: ThresholdConfig,
    risk_output: StageOutput,
    alert_output: StageOutput,
    sink: Option<SinkHandle>,
    counters: Arc<StageCounters>,
}

impl InferenceStage {
    pub fn new(
        engine: RiskEngine,
        thresholds: ThresholdConfig,
        risk_output: StageOutput,
        alert_output: StageOutput,
    ) -> Self {
        Self {
            engine,
            thresholds,
            risk_output,
            alert_output,
            sink: None,
            counters: Arc::new(StageCounters::new()),
        }
    }

    /// Attach a sink. Its drops are counted on this stage's counters, so the
    /// handle should be spawned with [`counters`](StageHandler::counters).
    pub fn with_sink(mut self, sink: SinkHandle) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn engine(&self) -> &RiskEngine {
        &self.engine
    }
}

#[async_trait]
impl StageHandler for InferenceStage {
    fn name(&self) -> &str {
        "inference-stage"
    }

    fn topics(&self) -> &[&'static str] {
        TOPICS
    }

    fn counters(&self) -> &Arc<StageCounters> {
        &self.counters
    }

    async fn handle(&self, message: Message) -> Result<(), StageError> {
        if message.topic != topics::FEATURE_VECTOR {
            return Err(StageError::UnexpectedTopic(message.topic));
        }
        let vector: FeatureVector = decode(&message)?;
        if vector.shot_id.is_empty() {
            return Err(ValidationError::MissingShotId.into());
        }

        let risk = self.engine.assess(&vector);
        let alerts = derive_alerts(&risk, &self.thresholds);
        debug!(
            shot_id = %risk.shot_id,
            window_ms = vector.window_ms,
            h50 = risk.risk_h50,
            h200 = risk.risk_h200,
            recommendations = risk.recommendations.len(),
            alerts = alerts.len(),
            "scored feature vector"
        );

        let correlation = message.correlation_id;
        let risk_msg = Message::with_correlation(topics::RISK_POINT, &risk, correlation)?;
        let alert_msgs = alerts
            .iter()
            .map(|a| Message::with_correlation(topics::RISK_ALERT, a, correlation))
            .collect::<Result<Vec<_>, _>>()?;

        if let Some(sink) = &self.sink {
            sink.submit(SinkRecord {
                risk,
                alerts,
            });
        }

        let mut first_err = self.risk_output.send(risk_msg, &self.counters).await.err();
        for alert in alert_msgs {
            if let Err(e) = self.alert_output.send(alert, &self.counters).await {
                warn!(error = %e, "alert publish failed");
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

    async fn finish(&self) {
        if let Some(sink) = &self.sink {
            sink.close().await;
        }
        info!(
            model_version = %self.engine.scorer().model().version,
            "inference stage finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fusionguard_compute::{Calibration, ModelParams};
    use fusionguard_core::{AlertEvent, RiskPoint, Severity};
    use fusionguard_eisenbahn::{EisenbahnError, EventPublisher};
    use fusionguard_rules::parse_rules;
    use std::collections::{BTreeMap, HashMap};
    use std::time::Duration;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct MockPublisher {
        messages: Mutex<Vec<Message>>,
    }

    #[async_trait]
    impl EventPublisher for MockPublisher {
        async fn publish(&self, message: Message) -> Result<(), EisenbahnError> {
            self.messages.lock().await.push(message);
            Ok(())
        }
    }

    const RULES: &str = r#"
rules:
  - id: high-near-term-risk
    when:
      all:
        - { field: risk_h50, op: gte, value: 0.8 }
    then:
      action: reduce_heating_power
      confidence: 0.7
      rationale: "Near-term disruption risk is high"
"#;

    fn engine(intercept: f64) -> RiskEngine {
        let model = ModelParams {
            coefficients: HashMap::from([("ip_mean_w50".to_string(), 1.0)]),
            intercept,
            version: "m-test".into(),
        };
        let calibration = Calibration {
            scale: 1.0,
            offset: 0.0,
            version: "c-test".into(),
        };
        RiskEngine::new(model, calibration, parse_rules(RULES).unwrap(), 3)
    }

    fn vector(ip_mean: f64) -> FeatureVector {
        FeatureVector {
            shot_id: "s1".into(),
            ts_unix_ns: 10,
            window_ms: 50,
            features: BTreeMap::from([("ip_mean_w50".to_string(), ip_mean)]),
            missing_ratio: 0.0,
        }
    }

    fn stage(intercept: f64) -> (InferenceStage, Arc<MockPublisher>, Arc<MockPublisher>) {
        let risk = Arc::new(MockPublisher::default());
        let alerts = Arc::new(MockPublisher::default());
        let stage = InferenceStage::new(
            engine(intercept),
            ThresholdConfig::default(),
            StageOutput::new(risk.clone(), Duration::from_millis(100)),
            StageOutput::new(alerts.clone(), Duration::from_millis(100)),
        );
        (stage, risk, alerts)
    }

    #[tokio::test]
    async fn low_risk_publishes_point_only() {
        let (stage, risk, alerts) = stage(0.0);
        let msg = Message::new(topics::FEATURE_VECTOR, &vector(0.0)).unwrap();
        let id = msg.correlation_id;
        stage.handle(msg).await.unwrap();

        let points = risk.messages.lock().await;
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].correlation_id, id);
        let rp: RiskPoint = points[0].decode().unwrap();
        assert_eq!(rp.risk_h50, 0.5);
        assert_eq!(rp.model_version, "m-test");
        assert_eq!(rp.calibration_version, "c-test");
        assert!(rp.recommendations.is_empty());
        assert!(alerts.messages.lock().await.is_empty());
    }

    #[tokio::test]
    async fn high_risk_publishes_alerts_and_recommendation() {
        let (stage, risk, alerts) = stage(5.0);
        stage
            .handle(Message::new(topics::FEATURE_VECTOR, &vector(0.0)).unwrap())
            .await
            .unwrap();

        let rp: RiskPoint = risk.messages.lock().await[0].decode().unwrap();
        assert!(rp.risk_h50 > 0.99);
        assert_eq!(rp.recommendations[0].action, "reduce_heating_power");

        let sent: Vec<AlertEvent> = alerts
            .messages
            .lock()
            .await
            .iter()
            .map(|m| m.decode().unwrap())
            .collect();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|a| a.severity == Severity::High));
        assert_eq!(stage.counters().snapshot().published, 3);
    }

    #[tokio::test]
    async fn garbage_vector_is_malformed() {
        let (stage, risk, _) = stage(0.0);
        let err = stage
            .handle(Message::from_raw(topics::FEATURE_VECTOR, b"{\"shot_id\":1}".to_vec()))
            .await
            .unwrap_err();
        assert!(err.is_malformed());

        let mut v = vector(0.0);
        v.shot_id.clear();
        let err = stage
            .handle(Message::new(topics::FEATURE_VECTOR, &v).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::Invalid(ValidationError::MissingShotId)));
        assert!(risk.messages.lock().await.is_empty());
    }

    #[tokio::test]
    async fn sink_receives_point_with_alerts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("risk.jsonl");
        let (stage, _, _) = stage(5.0);
        let sink = SinkHandle::spawn(
            Arc::new(crate::sink::JsonlSink::open(&path).await.unwrap()),
            8,
            Duration::from_secs(1),
            stage.counters().clone(),
        );
        let stage = stage.with_sink(sink);

        stage
            .handle(Message::new(topics::FEATURE_VECTOR, &vector(0.0)).unwrap())
            .await
            .unwrap();
        stage.finish().await;

        let text = std::fs::read_to_string(&path).unwrap();
        let record: SinkRecord = serde_json::from_str(text.lines().next().unwrap()).unwrap();
        assert_eq!(record.risk.shot_id, "s1");
        assert_eq!(record.alerts.len(), 2);
    }
}
