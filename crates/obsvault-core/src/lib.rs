//! Core types for the ObsVault Observation service.
//!
//! This crate carries the flat internal Observation model, the typed FHIR
//! wire representation, the bidirectional mapper between the two, the
//! version-record model and the shared datetime newtype. It is free of I/O
//! so that every other crate in the workspace can depend on it.

pub mod error;
pub mod fhir;
pub mod mapper;
pub mod model;
pub mod time;

pub use error::{CoreError, ErrorCategory, Result};
pub use fhir::{
    CodeableConcept, Coding, FhirValue, Meta, ObservationComponent, ObservationResource, Period,
    Quantity, Reference, SampledData, OBSERVATION_RESOURCE_TYPE,
};
pub use mapper::{observation_to_resource, resource_to_observation};
pub use model::{
    Observation, ObservationRecord, ObservationStatus, RecordAction, TEST_LOGICAL_ID,
};
pub use time::{now_utc, FhirInstant};
