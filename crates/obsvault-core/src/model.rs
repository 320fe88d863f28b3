//! Flat internal Observation model and its version history records.
//!
//! Coded groups (category, code, component codes) and the per-kind value
//! sequences are stored as parallel arrays: index `i` of the code, display
//! and system vectors belongs to the same coding. The arrays are filtered
//! field-independently on ingest, so their lengths may legitimately differ.

use crate::time::{self, FhirInstant};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical id handed out when a create request carries `test=true` and no
/// id has been assigned yet. Keeps smoke-test data recognizable.
pub const TEST_LOGICAL_ID: i64 = 7357;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ObservationStatus {
    Registered,
    Preliminary,
    Final,
    Amended,
    Cancelled,
    #[default]
    EnteredInError,
    Unknown,
}

impl ObservationStatus {
    pub fn as_code(&self) -> &'static str {
        match self {
            Self::Registered => "registered",
            Self::Preliminary => "preliminary",
            Self::Final => "final",
            Self::Amended => "amended",
            Self::Cancelled => "cancelled",
            Self::EnteredInError => "entered-in-error",
            Self::Unknown => "unknown",
        }
    }

    /// Maps a wire-level status code. Unrecognized codes map to `None`;
    /// callers decide the fallback.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "registered" => Some(Self::Registered),
            "preliminary" => Some(Self::Preliminary),
            "final" => Some(Self::Final),
            "amended" => Some(Self::Amended),
            "cancelled" => Some(Self::Cancelled),
            "entered-in-error" => Some(Self::EnteredInError),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }
}

impl fmt::Display for ObservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_code())
    }
}

/// Current state of an Observation row plus everything needed to rebuild
/// its external form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Logical id; 0 means "not yet assigned by the store".
    pub observation_id: i64,
    pub version_id: i32,
    pub is_deleted: bool,
    pub status: ObservationStatus,

    pub category_code: Vec<String>,
    pub category_display: Vec<String>,
    pub category_system: Vec<String>,
    pub category_text: String,

    pub code_code: Vec<String>,
    pub code_display: Vec<String>,
    pub code_system: Vec<String>,
    pub code_text: String,

    pub patient_reference: String,
    pub device_reference: String,
    pub performer_references: Vec<String>,

    /// Instant form of `effective[x]`; exclusive with the interval below.
    pub effective_date_time: Option<FhirInstant>,
    pub effective_period_start: FhirInstant,
    pub effective_period_end: FhirInstant,
    pub issued: FhirInstant,

    pub interpretation_code: String,
    pub interpretation_display: String,
    pub interpretation_system: String,
    pub interpretation_text: String,

    pub comments: String,

    pub body_site_code: String,
    pub body_site_display: String,
    pub body_site_system: String,
    pub body_site_text: String,

    pub component_code_code: Vec<String>,
    pub component_code_display: Vec<String>,
    pub component_code_system: Vec<String>,
    pub component_code_text: String,

    pub value_quantity_code: Vec<String>,
    pub value_quantity_system: Vec<String>,
    pub value_quantity_unit: Vec<String>,
    pub value_quantity_value: Vec<f64>,

    pub value_code: Vec<String>,
    pub value_display: Vec<String>,
    pub value_system: Vec<String>,
    pub value_text: Vec<String>,

    pub value_string: Vec<String>,

    pub value_sampled_data_origin_code: Vec<String>,
    pub value_sampled_data_origin_system: Vec<String>,
    pub value_sampled_data_origin_unit: Vec<String>,
    pub value_sampled_data_origin_value: Vec<f64>,
    pub value_sampled_data_period: Vec<f64>,
    pub value_sampled_data_dimensions: Vec<u32>,
    pub value_sampled_data_data: Vec<String>,

    pub value_period_start: Vec<FhirInstant>,
    pub value_period_end: Vec<FhirInstant>,
}

impl Observation {
    /// Fresh unassigned row. Timestamp fields default to "now" so an
    /// Observation that never sets them still serializes a valid interval.
    pub fn new() -> Self {
        let now = time::now_utc();
        Self {
            observation_id: 0,
            version_id: 0,
            is_deleted: false,
            status: ObservationStatus::default(),
            category_code: Vec::new(),
            category_display: Vec::new(),
            category_system: Vec::new(),
            category_text: String::new(),
            code_code: Vec::new(),
            code_display: Vec::new(),
            code_system: Vec::new(),
            code_text: String::new(),
            patient_reference: String::new(),
            device_reference: String::new(),
            performer_references: Vec::new(),
            effective_date_time: None,
            effective_period_start: now.clone(),
            effective_period_end: now.clone(),
            issued: now,
            interpretation_code: String::new(),
            interpretation_display: String::new(),
            interpretation_system: String::new(),
            interpretation_text: String::new(),
            comments: String::new(),
            body_site_code: String::new(),
            body_site_display: String::new(),
            body_site_system: String::new(),
            body_site_text: String::new(),
            component_code_code: Vec::new(),
            component_code_display: Vec::new(),
            component_code_system: Vec::new(),
            component_code_text: String::new(),
            value_quantity_code: Vec::new(),
            value_quantity_system: Vec::new(),
            value_quantity_unit: Vec::new(),
            value_quantity_value: Vec::new(),
            value_code: Vec::new(),
            value_display: Vec::new(),
            value_system: Vec::new(),
            value_text: Vec::new(),
            value_string: Vec::new(),
            value_sampled_data_origin_code: Vec::new(),
            value_sampled_data_origin_system: Vec::new(),
            value_sampled_data_origin_unit: Vec::new(),
            value_sampled_data_origin_value: Vec::new(),
            value_sampled_data_period: Vec::new(),
            value_sampled_data_dimensions: Vec::new(),
            value_sampled_data_data: Vec::new(),
            value_period_start: Vec::new(),
            value_period_end: Vec::new(),
        }
    }

    /// True until the store has allocated a logical id.
    pub fn is_unassigned(&self) -> bool {
        self.observation_id == 0
    }

    /// Component mode is keyed on the component-code sequence alone.
    pub fn has_components(&self) -> bool {
        !self.component_code_code.is_empty()
    }
}

impl Default for Observation {
    fn default() -> Self {
        Self::new()
    }
}

/// What a history record says happened to the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordAction {
    Create,
    Update,
    Delete,
    #[default]
    Unassigned,
}

impl fmt::Display for RecordAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Unassigned => "UNASSIGNED",
        };
        write!(f, "{name}")
    }
}

/// One entry in the append-only version history of a logical id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationRecord {
    pub record_id: i64,
    pub observation_id: i64,
    pub version_id: i32,
    pub last_modified: FhirInstant,
    pub action: RecordAction,
}

impl ObservationRecord {
    /// First record of a logical id: version 1, CREATE.
    pub fn first(record_id: i64, observation_id: i64) -> Self {
        Self {
            record_id,
            observation_id,
            version_id: 1,
            last_modified: time::now_utc(),
            action: RecordAction::Create,
        }
    }

    /// Record following `previous` for the same logical id; versions are
    /// assigned monotonically, never reused.
    pub fn successor(record_id: i64, previous: &ObservationRecord, action: RecordAction) -> Self {
        Self {
            record_id,
            observation_id: previous.observation_id,
            version_id: previous.version_id + 1,
            last_modified: time::now_utc(),
            action,
        }
    }
}
