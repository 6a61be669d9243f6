//! Feature extraction for deposit-acceptance model inference.
//!
//! Turns a client record into the feature vector the classifier was trained
//! on, in three steps:
//!
//! 1. **Normalize**: reduce categorical fields to their string tags and fill
//!    absent fields from the fixed default table.
//! 2. **Encode**: replace each categorical string with the integer code the
//!    training-time label encoder assigned to it. Values never seen during
//!    training fall back to the column's default code.
//! 3. **Align**: order the encoded columns exactly like the training feature
//!    list, filling absent columns with `0` and dropping everything else.

use crate::error::PredictError;
use crate::types::record::{ClientRecord, CLIENT_FIELDS};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

/// A single raw or encoded column value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Number(value as f64)
    }
}

/// Column name -> value, before alignment
pub type RawRow = BTreeMap<String, FieldValue>;

/// Per-column vocabulary fixed at training time: value -> integer code.
#[derive(Debug, Clone, Default)]
pub struct EncodingTable {
    columns: HashMap<String, HashMap<String, i64>>,
}

impl EncodingTable {
    /// Build from label-encoder classes; a value's code is its position.
    pub fn from_classes(classes: HashMap<String, Vec<String>>) -> Self {
        let columns = classes
            .into_iter()
            .map(|(column, values)| {
                let codes = values
                    .into_iter()
                    .enumerate()
                    .map(|(code, value)| (value, code as i64))
                    .collect();
                (column, codes)
            })
            .collect();
        Self { columns }
    }

    /// Code of `value` in `column`, if the column has an encoder and the value was seen in training
    pub fn code(&self, column: &str, value: &str) -> Option<i64> {
        self.columns.get(column)?.get(value).copied()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.contains_key(column)
    }

    /// Number of encoded columns
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Fallback code per column for categories unseen during training.
#[derive(Debug, Clone, Default)]
pub struct DefaultCodeTable(HashMap<String, i64>);

impl DefaultCodeTable {
    pub fn new(codes: HashMap<String, i64>) -> Self {
        Self(codes)
    }

    /// Columns without a configured code fall back to 0
    pub fn code_for(&self, column: &str) -> i64 {
        self.0.get(column).copied().unwrap_or(0)
    }
}

/// Ordered model input columns, label column excluded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureOrder(Vec<String>);

impl FeatureOrder {
    /// Build from the training column list, removing `label_column`.
    pub fn new(columns: Vec<String>, label_column: &str) -> Self {
        Self(columns.into_iter().filter(|c| c != label_column).collect())
    }

    pub fn columns(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Raw values substituted for absent record fields
#[derive(Debug, Clone)]
pub struct FieldDefaults(Vec<(String, FieldValue)>);

impl FieldDefaults {
    /// The fixed table used in production
    pub fn standard() -> Self {
        use FieldValue::{Number, Text};
        let entries = [
            ("age", Number(40.0)),
            ("job", Text("unknown".into())),
            ("marital", Text("unknown".into())),
            ("education", Text("unknown".into())),
            ("default", Text("no".into())),
            ("balance", Number(0.0)),
            ("housing", Text("no".into())),
            ("loan", Text("no".into())),
            ("contact", Text("unknown".into())),
            ("day", Number(15.0)),
            ("month", Text("may".into())),
            ("duration", Number(0.0)),
            ("campaign", Number(1.0)),
            ("pdays", Number(-1.0)),
            ("previous", Number(0.0)),
            ("poutcome", Text("unknown".into())),
        ];
        Self(entries.into_iter().map(|(c, v)| (c.to_string(), v)).collect())
    }

    pub fn new(entries: Vec<(String, FieldValue)>) -> Self {
        Self(entries)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.0.iter().map(|(c, v)| (c, v))
    }
}

impl Default for FieldDefaults {
    fn default() -> Self {
        Self::standard()
    }
}

/// A categorical value that was replaced by its column's default code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnseenCategory {
    pub column: String,
    pub value: String,
    pub fallback_code: i64,
}

/// Output of the encoding step
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedRow {
    pub values: RawRow,
    pub unseen: Vec<UnseenCategory>,
}

/// Model-ready feature vector plus the fallbacks taken to build it
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub features: Vec<f32>,
    pub unseen: Vec<UnseenCategory>,
    /// The row after defaults were applied, before encoding
    pub normalized: RawRow,
}

/// Feature extractor that transforms client records into model input features.
///
/// Holds the read-only preprocessing artifacts produced by training.
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    encoders: EncodingTable,
    default_codes: DefaultCodeTable,
    feature_order: FeatureOrder,
    defaults: FieldDefaults,
}

impl FeatureExtractor {
    pub fn new(
        encoders: EncodingTable,
        default_codes: DefaultCodeTable,
        feature_order: FeatureOrder,
    ) -> Self {
        Self {
            encoders,
            default_codes,
            feature_order,
            defaults: FieldDefaults::standard(),
        }
    }

    /// Replace the default table
    pub fn with_defaults(mut self, defaults: FieldDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    /// Run normalize, encode and align on a record.
    pub fn extract(&self, record: &ClientRecord) -> Result<Extraction, PredictError> {
        self.extract_row(record_row(record))
    }

    /// Run normalize, encode and align on an arbitrary row. Extra columns are dropped.
    pub fn extract_row(&self, row: RawRow) -> Result<Extraction, PredictError> {
        let normalized = self.normalize(row)?;
        let encoded = self.encode(normalized.clone());
        let features = self.align(&encoded)?;
        Ok(Extraction {
            features,
            unseen: encoded.unseen,
            normalized,
        })
    }

    /// Fill absent record fields from the default table.
    ///
    /// Fails when a record field is still missing afterwards.
    pub fn normalize(&self, mut row: RawRow) -> Result<RawRow, PredictError> {
        for (column, default) in self.defaults.entries() {
            row.entry(column.clone()).or_insert_with(|| default.clone());
        }

        let missing: Vec<&str> = CLIENT_FIELDS
            .iter()
            .copied()
            .filter(|f| !row.contains_key(*f))
            .collect();
        if !missing.is_empty() {
            return Err(PredictError::InvalidInput(format!(
                "missing required field(s): {}",
                missing.join(", ")
            )));
        }

        Ok(row)
    }

    /// Replace categorical strings with their training-time codes.
    ///
    /// Strings in columns without an encoder are left untouched.
    pub fn encode(&self, row: RawRow) -> EncodedRow {
        let mut unseen = Vec::new();
        let values = row
            .into_iter()
            .map(|(column, value)| {
                let encoded = match value {
                    FieldValue::Text(text) if self.encoders.has_column(&column) => {
                        let code = match self.encoders.code(&column, &text) {
                            Some(code) => code,
                            None => {
                                let fallback_code = self.default_codes.code_for(&column);
                                warn!(
                                    column = %column,
                                    value = %text,
                                    fallback_code,
                                    "Unseen category, using default code"
                                );
                                unseen.push(UnseenCategory {
                                    column: column.clone(),
                                    value: text,
                                    fallback_code,
                                });
                                fallback_code
                            }
                        };
                        FieldValue::Number(code as f64)
                    }
                    other => other,
                };
                (column, encoded)
            })
            .collect();

        EncodedRow { values, unseen }
    }

    /// Lay the encoded row out in training column order.
    pub fn align(&self, row: &EncodedRow) -> Result<Vec<f32>, PredictError> {
        self.feature_order
            .columns()
            .iter()
            .map(|column| match row.values.get(column) {
                None => Ok(0.0),
                Some(FieldValue::Number(n)) => Ok(*n as f32),
                Some(FieldValue::Text(text)) => Err(PredictError::InvalidInput(format!(
                    "column '{column}' has non-numeric value '{text}' and no encoder"
                ))),
            })
            .collect()
    }

    /// Get the number of features produced.
    pub fn feature_count(&self) -> usize {
        self.feature_order.len()
    }

    /// Get feature names in model input order.
    pub fn feature_names(&self) -> &[String] {
        self.feature_order.columns()
    }

    pub fn encoders(&self) -> &EncodingTable {
        &self.encoders
    }
}

/// Explicit field-by-field conversion of a record into raw columns.
/// Absent fields are omitted.
pub fn record_row(record: &ClientRecord) -> RawRow {
    let columns: [(&str, Option<FieldValue>); 16] = [
        ("age", record.age.map(FieldValue::from)),
        ("job", record.job.map(|v| v.as_str().into())),
        ("marital", record.marital.map(|v| v.as_str().into())),
        ("education", record.education.map(|v| v.as_str().into())),
        ("default", record.credit_default.map(|v| v.as_str().into())),
        ("balance", record.balance.map(FieldValue::from)),
        ("housing", record.housing.map(|v| v.as_str().into())),
        ("loan", record.loan.map(|v| v.as_str().into())),
        ("contact", record.contact.map(|v| v.as_str().into())),
        ("day", record.day.map(FieldValue::from)),
        ("month", record.month.map(|v| v.as_str().into())),
        ("duration", record.duration.map(FieldValue::from)),
        ("campaign", record.campaign.map(FieldValue::from)),
        ("pdays", record.pdays.map(FieldValue::from)),
        ("previous", record.previous.map(FieldValue::from)),
        ("poutcome", record.poutcome.map(|v| v.as_str().into())),
    ];

    columns
        .into_iter()
        .filter_map(|(column, value)| value.map(|v| (column.to_string(), v)))
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::types::record::{Contact, Education, Job, Marital, Month, Outcome, YesNo};

    fn classes(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    /// Encoders shaped like the bank-marketing training run
    pub(crate) fn training_encoders() -> EncodingTable {
        let mut map = HashMap::new();
        map.insert(
            "job".to_string(),
            classes(&[
                "admin.",
                "blue-collar",
                "entrepreneur",
                "housemaid",
                "management",
                "retired",
                "self-employed",
                "services",
                "student",
                "technician",
                "unemployed",
                "unknown",
            ]),
        );
        map.insert("marital".to_string(), classes(&["divorced", "married", "single"]));
        map.insert(
            "education".to_string(),
            classes(&["primary", "secondary", "tertiary", "unknown"]),
        );
        map.insert("default".to_string(), classes(&["no", "yes"]));
        map.insert("housing".to_string(), classes(&["no", "yes"]));
        map.insert("loan".to_string(), classes(&["no", "yes"]));
        map.insert(
            "contact".to_string(),
            classes(&["cellular", "telephone", "unknown"]),
        );
        map.insert(
            "month".to_string(),
            classes(&[
                "apr", "aug", "dec", "feb", "jan", "jul", "jun", "mar", "may", "nov", "oct", "sep",
            ]),
        );
        map.insert(
            "poutcome".to_string(),
            classes(&["failure", "other", "success", "unknown"]),
        );
        map.insert("deposit".to_string(), classes(&["no", "yes"]));
        EncodingTable::from_classes(map)
    }

    pub(crate) fn training_default_codes() -> DefaultCodeTable {
        let codes = [
            ("job", 4),
            ("marital", 1),
            ("education", 1),
            ("default", 0),
            ("housing", 0),
            ("loan", 0),
            ("contact", 0),
            ("month", 8),
            ("poutcome", 3),
        ];
        DefaultCodeTable::new(codes.into_iter().map(|(c, v)| (c.to_string(), v)).collect())
    }

    pub(crate) fn training_order() -> FeatureOrder {
        let mut columns: Vec<String> = CLIENT_FIELDS.iter().map(|c| c.to_string()).collect();
        columns.push("deposit".to_string());
        FeatureOrder::new(columns, "deposit")
    }

    pub(crate) fn training_extractor() -> FeatureExtractor {
        FeatureExtractor::new(training_encoders(), training_default_codes(), training_order())
    }

    pub(crate) fn sample_record() -> ClientRecord {
        ClientRecord {
            age: Some(45),
            job: Some(Job::Management),
            marital: Some(Marital::Married),
            education: Some(Education::Tertiary),
            credit_default: Some(YesNo::No),
            balance: Some(1200.0),
            housing: Some(YesNo::Yes),
            loan: Some(YesNo::No),
            contact: Some(Contact::Cellular),
            day: Some(12),
            month: Some(Month::May),
            duration: Some(300),
            campaign: Some(2),
            pdays: Some(-1),
            previous: Some(0),
            poutcome: Some(Outcome::Unknown),
        }
    }

    #[test]
    fn test_feature_extraction() {
        let extractor = training_extractor();
        let extraction = extractor.extract(&sample_record()).unwrap();

        assert_eq!(extraction.features.len(), extractor.feature_count());
        assert_eq!(
            extraction.features,
            vec![45.0, 4.0, 1.0, 2.0, 0.0, 1200.0, 1.0, 0.0, 0.0, 12.0, 8.0, 300.0, 2.0, -1.0, 0.0, 3.0]
        );
        assert!(extraction.unseen.is_empty());
    }

    #[test]
    fn test_feature_order_drops_label() {
        let order = training_order();
        assert_eq!(order.len(), 16);
        assert!(!order.columns().iter().any(|c| c == "deposit"));
        assert_eq!(order.columns()[0], "age");
        assert_eq!(order.columns()[15], "poutcome");
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let extractor = training_extractor();
        let mut record = sample_record();
        record.poutcome = None;
        record.day = None;
        record.contact = None;

        let row = extractor.normalize(record_row(&record)).unwrap();
        assert_eq!(row["poutcome"], FieldValue::Text("unknown".to_string()));
        assert_eq!(row["day"], FieldValue::Number(15.0));
        assert_eq!(row["contact"], FieldValue::Text("unknown".to_string()));

        let features = extractor.extract(&record).unwrap().features;
        assert_eq!(features[8], 2.0); // contact "unknown"
        assert_eq!(features[9], 15.0); // day
        assert_eq!(features[15], 3.0); // poutcome "unknown"
    }

    #[test]
    fn test_empty_record_is_fully_defaulted() {
        let extractor = training_extractor();
        let extraction = extractor.extract(&ClientRecord::default()).unwrap();
        assert_eq!(extraction.features.len(), 16);
        assert_eq!(extraction.features[0], 40.0);
        // marital "unknown" was never seen in training
        assert_eq!(extraction.unseen.len(), 1);
        assert_eq!(extraction.unseen[0].column, "marital");
        assert_eq!(extraction.unseen[0].fallback_code, 1);
    }

    #[test]
    fn test_missing_field_without_default_is_invalid() {
        let extractor = training_extractor().with_defaults(FieldDefaults::new(Vec::new()));
        let mut record = sample_record();
        record.age = None;

        let err = extractor.extract(&record).unwrap_err();
        assert!(matches!(err, PredictError::InvalidInput(ref msg) if msg.contains("age")));
    }

    #[test]
    fn test_defaults_outside_record_fields_are_applied() {
        let mut entries = vec![("engineered_score".to_string(), FieldValue::Number(2.5))];
        entries.push(("day".to_string(), FieldValue::Number(1.0)));
        let extractor = FeatureExtractor::new(
            training_encoders(),
            training_default_codes(),
            FeatureOrder::new(
                vec!["engineered_score".to_string(), "day".to_string(), "age".to_string()],
                "deposit",
            ),
        )
        .with_defaults(FieldDefaults::new(entries));

        let row = extractor.normalize(record_row(&sample_record())).unwrap();
        assert_eq!(row["engineered_score"], FieldValue::Number(2.5));
        // present fields are never overwritten
        assert_eq!(row["day"], FieldValue::Number(12.0));

        let extraction = extractor.extract(&sample_record()).unwrap();
        assert_eq!(extraction.features, vec![2.5, 12.0, 45.0]);
    }

    #[test]
    fn test_encoding_is_stable() {
        let extractor = training_extractor();
        let first = extractor.extract(&sample_record()).unwrap();
        let second = extractor.extract(&sample_record()).unwrap();
        assert_eq!(first, second);
        assert_eq!(extractor.encoders().code("job", "management"), Some(4));
        assert_eq!(extractor.encoders().code("job", "management"), Some(4));
    }

    #[test]
    fn test_unseen_category_uses_default_code() {
        let mut map = HashMap::new();
        map.insert("job".to_string(), classes(&["admin.", "technician"]));
        let mut codes = HashMap::new();
        codes.insert("job".to_string(), 1);
        let extractor = FeatureExtractor::new(
            EncodingTable::from_classes(map),
            DefaultCodeTable::new(codes),
            FeatureOrder::new(vec!["age".to_string(), "job".to_string()], "deposit"),
        );

        let extraction = extractor.extract(&sample_record()).unwrap();
        assert_eq!(extraction.features, vec![45.0, 1.0]);
        assert_eq!(
            extraction.unseen,
            vec![UnseenCategory {
                column: "job".to_string(),
                value: "management".to_string(),
                fallback_code: 1,
            }]
        );
    }

    #[test]
    fn test_unseen_category_without_default_code_is_zero() {
        let mut map = HashMap::new();
        map.insert("month".to_string(), classes(&["jan"]));
        let extractor = FeatureExtractor::new(
            EncodingTable::from_classes(map),
            DefaultCodeTable::default(),
            FeatureOrder::new(vec!["month".to_string()], "deposit"),
        );

        let extraction = extractor.extract(&sample_record()).unwrap();
        assert_eq!(extraction.features, vec![0.0]);
        assert_eq!(extraction.unseen.len(), 1);
    }

    #[test]
    fn test_alignment_ignores_extra_and_fills_missing_columns() {
        let extractor = FeatureExtractor::new(
            training_encoders(),
            training_default_codes(),
            FeatureOrder::new(
                vec![
                    "duration".to_string(),
                    "engineered_score".to_string(),
                    "age".to_string(),
                ],
                "deposit",
            ),
        );

        let mut row = record_row(&sample_record());
        row.insert("session_id".to_string(), FieldValue::Text("abc".to_string()));

        let extraction = extractor.extract_row(row).unwrap();
        assert_eq!(extraction.features, vec![300.0, 0.0, 45.0]);
    }

    #[test]
    fn test_text_in_unencoded_feature_column_is_rejected() {
        let extractor = FeatureExtractor::new(
            EncodingTable::default(),
            DefaultCodeTable::default(),
            FeatureOrder::new(vec!["age".to_string(), "job".to_string()], "deposit"),
        );

        let err = extractor.extract(&sample_record()).unwrap_err();
        assert!(matches!(err, PredictError::InvalidInput(ref msg) if msg.contains("'job'")));
    }

    #[test]
    fn test_text_in_dropped_column_is_ignored() {
        let extractor = FeatureExtractor::new(
            EncodingTable::default(),
            DefaultCodeTable::default(),
            FeatureOrder::new(vec!["age".to_string()], "deposit"),
        );

        let extraction = extractor.extract(&sample_record()).unwrap();
        assert_eq!(extraction.features, vec![45.0]);
    }
}
