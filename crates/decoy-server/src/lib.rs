//! Decoy: a programmable HTTP test double.
//!
//! Mappings pair a scored [`RequestMatcher`] with a response provider. The
//! [`MockEngine`] picks the best-scoring mapping for each request, advances
//! scenario state machines, optionally proxies to a real upstream and records
//! what it saw as new mappings.

pub mod admin;
pub mod config;
pub mod error;
pub mod log;
pub mod mapping;
pub mod matchers;
pub mod matching;
pub mod proxy;
pub mod registry;
pub mod request;
pub mod response;
pub mod scenario;
pub mod server;

pub use config::{ProxyAndRecordSettings, ServerSettings};
pub use error::{DecoyError, Result};
pub use mapping::{Mapping, MappingBuilder, MappingModel, MappingOrigin};
pub use matchers::{MatchBehaviour, MatchOperator, PatternMatcher};
pub use matching::{RequestMatchResult, RequestMatcher};
pub use registry::{MappingRegistry, Resolution};
pub use request::RequestValue;
pub use response::{ResponseDefinition, ResponseMessage};
pub use scenario::{ScenarioState, ScenarioStore};
pub use server::{DecoyServer, MockEngine};
