//! Cosmos Domain - Core platform types
//!
//! This crate defines the domain model for the Cosmos WFM Platform client:
//! sessions and tokens, the request/response envelope, the circuit breaker
//! state machine, and the resources the platform API serves.
//! All types here are pure Rust with no I/O dependencies.

pub mod auth;
pub mod breaker;
pub mod dataset;
pub mod error;
pub mod generation;
pub mod id;
pub mod model;
pub mod monitor;
pub mod request;
pub mod response;
pub mod safety;
pub mod settings;
pub mod training;

pub use auth::{
    AuthGrant, Credentials, LoginOutcome, LogoutReason, MfaChallenge, Role, Session,
    SessionPhase, TokenClaims, TokenPair, User, permissions,
};
pub use breaker::{BreakerDecision, BreakerEvent, BreakerPolicy, BreakerState, CircuitState};
pub use dataset::{
    CurationFilters, CurationJob, Dataset, DatasetDraft, DatasetQuery, DatasetStatus, Page,
};
pub use error::{ApiError, DomainError, DomainResult, ErrorKind};
pub use generation::{GenerationJob, GenerationRequest, GenerationStatus, Resolution};
pub use id::{REQUEST_ID_HEADER, generate_request_id};
pub use model::{Model, ModelType};
pub use monitor::{ConnectionState, MonitorEvent};
pub use request::{ApiRequest, HttpMethod, RequestAuth, api_path};
pub use response::{ApiResponse, ResponseMetadata};
pub use safety::{GuardrailConfig, SafetyEvent, SafetyThresholds, Severity};
pub use settings::{
    ApiSettings, MonitorSettings, PlatformSettings, ResilienceSettings, SessionSettings,
    StorageSettings,
};
pub use training::{MetricPoint, TrainingConfig, TrainingJob, TrainingMetrics, TrainingStatus};
