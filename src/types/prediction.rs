//! Prediction results and the rows served to the dashboard

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Binary outcome of the deposit classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Label {
    #[serde(rename = "yes")]
    Accept,
    #[serde(rename = "no")]
    Decline,
}

impl Label {
    /// Map the classifier's class index (1 = positive) to a label
    pub fn from_class(class: i64) -> Self {
        if class == 1 {
            Label::Accept
        } else {
            Label::Decline
        }
    }

    /// Value written to the `result` column
    pub fn as_int(self) -> i16 {
        match self {
            Label::Accept => 1,
            Label::Decline => 0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Label::Accept => "yes",
            Label::Decline => "no",
        }
    }

    /// Human-readable explanation returned with the prediction
    pub fn message(self) -> &'static str {
        match self {
            Label::Accept => "Client is likely to accept the campaign.",
            Label::Decline => "Client is unlikely to accept the campaign.",
        }
    }
}

/// Outcome of one run of the inference pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionResult {
    pub label: Label,
    /// Positive-class probability (0.0 - 1.0)
    pub probability: f64,
    /// False when the probability was synthesized from the label
    pub calibrated: bool,
    pub message: String,
    /// Client row the record was heuristically linked to
    pub linked_client_id: Option<i64>,
}

impl PredictionResult {
    pub fn new(label: Label, probability: f64, calibrated: bool) -> Self {
        Self {
            label,
            probability,
            calibrated,
            message: label.message().to_string(),
            linked_client_id: None,
        }
    }

    /// Attach the linked client id
    pub fn with_linked_client(mut self, client_id: Option<i64>) -> Self {
        self.linked_client_id = client_id;
        self
    }

    /// Convert into the wire response
    pub fn to_response(&self) -> PredictionResponse {
        PredictionResponse {
            prediction: self.label,
            probability: self.probability,
            message: self.message.clone(),
            linked_client_id: self.linked_client_id,
        }
    }
}

/// Body of a successful `POST /api/predict`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    /// "yes" (accepts) or "no" (declines)
    pub prediction: Label,
    pub probability: f64,
    pub message: String,
    pub linked_client_id: Option<i64>,
}

/// A prediction as stored by the prediction store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredPrediction {
    pub id: i64,
    pub age: i64,
    pub job: String,
    pub marital: String,
    pub education: String,
    pub balance: f64,
    /// 1 = accept, 0 = decline
    pub result: i16,
    pub predicted_at: DateTime<Utc>,
}

/// Body of `GET /api/dashboard/predictions`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionsList {
    pub predictions: Vec<StoredPrediction>,
}

/// A stored prediction joined with the real outcome of its linked client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TruthPair {
    pub predicted: bool,
    pub actual: bool,
}

/// Summary served by `GET /api/dashboard/metrics`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardMetrics {
    pub total: u64,
    pub positive: u64,
    /// Percentage of positive predictions
    pub positive_rate: f64,
    /// Percentage of linked predictions matching the real outcome
    pub accuracy: f64,
    pub last_update: Option<DateTime<Utc>>,
}

impl DashboardMetrics {
    pub fn compute(predictions: &[StoredPrediction], truth: &[TruthPair]) -> Self {
        let total = predictions.len() as u64;
        let positive = predictions.iter().filter(|p| p.result == 1).count() as u64;
        let positive_rate = if total > 0 {
            round2(positive as f64 / total as f64 * 100.0)
        } else {
            0.0
        };

        let accuracy = if truth.is_empty() {
            0.0
        } else {
            let hits = truth.iter().filter(|t| t.predicted == t.actual).count();
            round2(hits as f64 / truth.len() as f64 * 100.0)
        };

        Self {
            total,
            positive,
            positive_rate,
            accuracy,
            last_update: predictions.iter().map(|p| p.predicted_at).max(),
        }
    }
}

/// 2x2 confusion matrix, rows = actual (no, yes), columns = predicted (no, yes)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub matrix: [[u64; 2]; 2],
}

impl ConfusionMatrix {
    pub fn from_pairs(pairs: &[TruthPair]) -> Self {
        let mut matrix = [[0u64; 2]; 2];
        for pair in pairs {
            matrix[pair.actual as usize][pair.predicted as usize] += 1;
        }
        Self { matrix }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn stored(id: i64, result: i16, minutes_ago: i64) -> StoredPrediction {
        StoredPrediction {
            id,
            age: 40,
            job: "management".to_string(),
            marital: "married".to_string(),
            education: "tertiary".to_string(),
            balance: 100.0,
            result,
            predicted_at: Utc::now() - Duration::minutes(minutes_ago),
        }
    }

    #[test]
    fn test_label_mapping() {
        assert_eq!(Label::from_class(1), Label::Accept);
        assert_eq!(Label::from_class(0), Label::Decline);
        assert_eq!(Label::Accept.as_int(), 1);
        assert_eq!(serde_json::to_string(&Label::Decline).unwrap(), "\"no\"");
    }

    #[test]
    fn test_response_serialization() {
        let result = PredictionResult::new(Label::Accept, 0.8, true).with_linked_client(Some(7));
        let json = serde_json::to_value(result.to_response()).unwrap();

        assert_eq!(json["prediction"], "yes");
        assert_eq!(json["probability"], 0.8);
        assert_eq!(json["linked_client_id"], 7);
        assert_eq!(json["message"], "Client is likely to accept the campaign.");
    }

    #[test]
    fn test_dashboard_metrics() {
        let predictions = vec![stored(1, 1, 10), stored(2, 0, 5), stored(3, 1, 1)];
        let truth = vec![
            TruthPair { predicted: true, actual: true },
            TruthPair { predicted: false, actual: true },
            TruthPair { predicted: false, actual: false },
        ];

        let metrics = DashboardMetrics::compute(&predictions, &truth);
        assert_eq!(metrics.total, 3);
        assert_eq!(metrics.positive, 2);
        assert_eq!(metrics.positive_rate, 66.67);
        assert_eq!(metrics.accuracy, 66.67);
        assert_eq!(metrics.last_update, Some(predictions[2].predicted_at));
    }

    #[test]
    fn test_empty_dashboard_metrics() {
        let metrics = DashboardMetrics::compute(&[], &[]);
        assert_eq!(metrics.total, 0);
        assert_eq!(metrics.positive_rate, 0.0);
        assert_eq!(metrics.accuracy, 0.0);
        assert!(metrics.last_update.is_none());
    }

    #[test]
    fn test_confusion_matrix() {
        let pairs = vec![
            TruthPair { predicted: true, actual: true },
            TruthPair { predicted: true, actual: false },
            TruthPair { predicted: false, actual: false },
            TruthPair { predicted: false, actual: false },
        ];
        let cm = ConfusionMatrix::from_pairs(&pairs);
        assert_eq!(cm.matrix, [[2, 1], [0, 1]]);
        assert_eq!(ConfusionMatrix::from_pairs(&[]).matrix, [[0, 0], [0, 0]]);
    }
}
