//! Bank-marketing client record and its input-boundary validation

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Defines a closed categorical field with an explicit variant-to-tag mapping.
macro_rules! categorical {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $tag:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $tag)]
                $variant,
            )+
        }

        impl $name {
            /// Every accepted variant, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// The string tag seen by the encoders.
            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $tag,)+
                }
            }
        }

        impl FromStr for $name {
            type Err = ();

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($tag => Ok($name::$variant),)+
                    _ => Err(()),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

categorical! {
    /// Type of job
    Job {
        Admin => "admin.",
        BlueCollar => "blue-collar",
        Entrepreneur => "entrepreneur",
        Housemaid => "housemaid",
        Management => "management",
        Retired => "retired",
        SelfEmployed => "self-employed",
        Services => "services",
        Student => "student",
        Technician => "technician",
        Unemployed => "unemployed",
        Unknown => "unknown",
    }
}

categorical! {
    /// Marital status
    Marital {
        Divorced => "divorced",
        Married => "married",
        Single => "single",
        Unknown => "unknown",
    }
}

categorical! {
    /// Education level
    Education {
        Primary => "primary",
        Secondary => "secondary",
        Tertiary => "tertiary",
        Unknown => "unknown",
    }
}

categorical! {
    /// Yes/no flag with an explicit unknown
    YesNo {
        Yes => "yes",
        No => "no",
        Unknown => "unknown",
    }
}

categorical! {
    /// Contact channel
    Contact {
        Cellular => "cellular",
        Telephone => "telephone",
        Unknown => "unknown",
    }
}

categorical! {
    /// Month of the last contact
    Month {
        Jan => "jan",
        Feb => "feb",
        Mar => "mar",
        Apr => "apr",
        May => "may",
        Jun => "jun",
        Jul => "jul",
        Aug => "aug",
        Sep => "sep",
        Oct => "oct",
        Nov => "nov",
        Dec => "dec",
    }
}

categorical! {
    /// Outcome of the previous marketing campaign
    Outcome {
        Success => "success",
        Failure => "failure",
        Other => "other",
        Unknown => "unknown",
    }
}

/// Column names of a client record, in training order.
pub const CLIENT_FIELDS: [&str; 16] = [
    "age",
    "job",
    "marital",
    "education",
    "default",
    "balance",
    "housing",
    "loan",
    "contact",
    "day",
    "month",
    "duration",
    "campaign",
    "pdays",
    "previous",
    "poutcome",
];

/// A single bank-marketing contact submitted for prediction.
///
/// Every field is optional so that partially filled records can reach the
/// pipeline, which completes them from the default table. The HTTP boundary
/// is stricter: see [`ClientRecord::from_json`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientRecord {
    /// Age in years (18-100)
    pub age: Option<i64>,
    pub job: Option<Job>,
    pub marital: Option<Marital>,
    pub education: Option<Education>,
    /// Has credit in default?
    #[serde(rename = "default")]
    pub credit_default: Option<YesNo>,
    /// Average yearly balance
    pub balance: Option<f64>,
    /// Has a housing loan?
    pub housing: Option<YesNo>,
    /// Has a personal loan?
    pub loan: Option<YesNo>,
    pub contact: Option<Contact>,
    /// Last contact day of the month (1-31)
    pub day: Option<i64>,
    pub month: Option<Month>,
    /// Last contact duration in seconds
    pub duration: Option<i64>,
    /// Contacts performed during this campaign
    pub campaign: Option<i64>,
    /// Days since the client was last contacted (-1 when never)
    pub pdays: Option<i64>,
    /// Contacts performed before this campaign
    pub previous: Option<i64>,
    pub poutcome: Option<Outcome>,
}

/// A single violated constraint on one input field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    pub field: String,
    pub constraint: String,
}

impl FieldViolation {
    fn new(field: &str, constraint: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            constraint: constraint.into(),
        }
    }
}

/// All constraint violations found on a request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{} invalid field(s): {}", .0.len(), summarize(.0))]
pub struct ValidationErrors(pub Vec<FieldViolation>);

fn summarize(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(|v| format!("{} ({})", v.field, v.constraint))
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationErrors {
    pub fn violations(&self) -> &[FieldViolation] {
        &self.0
    }
}

/// Integer bounds, inclusive. `None` means unbounded.
const INT_BOUNDS: [(&str, Option<i64>, Option<i64>); 6] = [
    ("age", Some(18), Some(100)),
    ("day", Some(1), Some(31)),
    ("duration", Some(0), Some(5000)),
    ("campaign", Some(1), Some(50)),
    ("pdays", Some(-1), None),
    ("previous", Some(0), None),
];

const BALANCE_MIN: f64 = -10_000.0;
const BALANCE_MAX: f64 = 1_000_000.0;

/// Fields that may be omitted at the HTTP boundary.
const OPTIONAL_FIELDS: [&str; 2] = ["default", "poutcome"];

impl ClientRecord {
    /// Builds a record from a request body, collecting every violation
    /// instead of stopping at the first one.
    ///
    /// Fields other than `default` and `poutcome` are required; those two
    /// take `no` and `unknown` when absent. Unknown keys are ignored.
    pub fn from_json(body: &Value) -> Result<Self, ValidationErrors> {
        let Some(obj) = body.as_object() else {
            return Err(ValidationErrors(vec![FieldViolation::new(
                "body",
                "Input should be a JSON object",
            )]));
        };

        let mut errors = Vec::new();
        let mut record = ClientRecord {
            age: int_field(obj, "age", &mut errors),
            job: enum_field(obj, "job", &mut errors),
            marital: enum_field(obj, "marital", &mut errors),
            education: enum_field(obj, "education", &mut errors),
            credit_default: enum_field(obj, "default", &mut errors),
            balance: float_field(obj, "balance", &mut errors),
            housing: enum_field(obj, "housing", &mut errors),
            loan: enum_field(obj, "loan", &mut errors),
            contact: enum_field(obj, "contact", &mut errors),
            day: int_field(obj, "day", &mut errors),
            month: enum_field(obj, "month", &mut errors),
            duration: int_field(obj, "duration", &mut errors),
            campaign: int_field(obj, "campaign", &mut errors),
            pdays: int_field(obj, "pdays", &mut errors),
            previous: int_field(obj, "previous", &mut errors),
            poutcome: enum_field(obj, "poutcome", &mut errors),
        };

        for field in CLIENT_FIELDS {
            let present = obj.get(field).is_some_and(|v| !v.is_null());
            if !present && !OPTIONAL_FIELDS.contains(&field) {
                errors.push(FieldViolation::new(field, "Field required"));
            }
        }

        record.credit_default.get_or_insert(YesNo::No);
        record.poutcome.get_or_insert(Outcome::Unknown);

        if let Err(ValidationErrors(range_errors)) = record.validate() {
            errors.extend(range_errors);
        }

        if errors.is_empty() {
            Ok(record)
        } else {
            Err(ValidationErrors(errors))
        }
    }

    /// Checks the numeric domains of the fields that are present.
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = Vec::new();

        for (field, min, max) in INT_BOUNDS {
            let Some(value) = self.int_value(field) else {
                continue;
            };
            if let Some(min) = min.filter(|&m| value < m) {
                errors.push(FieldViolation::new(
                    field,
                    format!("Input should be greater than or equal to {min}"),
                ));
            }
            if let Some(max) = max.filter(|&m| value > m) {
                errors.push(FieldViolation::new(
                    field,
                    format!("Input should be less than or equal to {max}"),
                ));
            }
        }

        if let Some(balance) = self.balance {
            if !balance.is_finite() {
                errors.push(FieldViolation::new("balance", "Input should be a finite number"));
            } else if balance < BALANCE_MIN {
                errors.push(FieldViolation::new(
                    "balance",
                    format!("Input should be greater than or equal to {BALANCE_MIN}"),
                ));
            } else if balance > BALANCE_MAX {
                errors.push(FieldViolation::new(
                    "balance",
                    format!("Input should be less than or equal to {BALANCE_MAX}"),
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationErrors(errors))
        }
    }

    fn int_value(&self, field: &str) -> Option<i64> {
        match field {
            "age" => self.age,
            "day" => self.day,
            "duration" => self.duration,
            "campaign" => self.campaign,
            "pdays" => self.pdays,
            "previous" => self.previous,
            _ => None,
        }
    }
}

fn int_field(obj: &Map<String, Value>, field: &str, errors: &mut Vec<FieldViolation>) -> Option<i64> {
    let value = obj.get(field).filter(|v| !v.is_null())?;
    if let Some(i) = value.as_i64() {
        return Some(i);
    }
    // Floats with no fractional part are accepted as integers.
    match value.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Some(f as i64),
        _ => {
            errors.push(FieldViolation::new(field, "Input should be a valid integer"));
            None
        }
    }
}

fn float_field(obj: &Map<String, Value>, field: &str, errors: &mut Vec<FieldViolation>) -> Option<f64> {
    let value = obj.get(field).filter(|v| !v.is_null())?;
    match value.as_f64() {
        Some(f) => Some(f),
        None => {
            errors.push(FieldViolation::new(field, "Input should be a valid number"));
            None
        }
    }
}

fn enum_field<T>(obj: &Map<String, Value>, field: &str, errors: &mut Vec<FieldViolation>) -> Option<T>
where
    T: Categorical,
{
    let value = obj.get(field).filter(|v| !v.is_null())?;
    match value.as_str().and_then(|s| s.parse::<T>().ok()) {
        Some(parsed) => Some(parsed),
        None => {
            errors.push(FieldViolation::new(field, T::expected()));
            None
        }
    }
}

/// Shared view over the categorical enums, used for error messages.
trait Categorical: FromStr + Copy + 'static {
    fn tags() -> Vec<&'static str>;

    fn expected() -> String {
        let tags = Self::tags();
        let quoted: Vec<String> = tags.iter().map(|t| format!("'{t}'")).collect();
        match quoted.split_last() {
            Some((last, rest)) if !rest.is_empty() => {
                format!("Input should be {} or {}", rest.join(", "), last)
            }
            _ => format!("Input should be {}", quoted.join("")),
        }
    }
}

macro_rules! impl_categorical {
    ($($name:ident),+) => {
        $(
            impl Categorical for $name {
                fn tags() -> Vec<&'static str> {
                    $name::ALL.iter().map(|v| v.as_str()).collect()
                }
            }
        )+
    };
}

impl_categorical!(Job, Marital, Education, YesNo, Contact, Month, Outcome);
