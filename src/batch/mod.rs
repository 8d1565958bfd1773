//! Batched, paginated query assembly
//!
//! A batch names one or more resources; each is resolved independently
//! against its own cache entry and the results are placed in an envelope in
//! request order. A failing resource only fails its own entry.

pub mod envelope;
pub mod query;

use futures::future::join_all;
use serde_json::Value;
use tracing::debug;

use crate::cache::Dataset;
use crate::errors::{ApyError, ApyResult, NotFoundError, ValidationError};
use crate::service::YieldService;

pub use envelope::{BatchEntry, BatchResponseEnvelope};
pub use query::{
    paginate, select_subnets, select_validators, Page, PageDefaults, PageMeta, QueryParams,
    RawQuery, SortKey, SortOrder,
};

/// A resource name resolved to its collection and response key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resource {
    pub dataset: Dataset,
    /// Key under `result.data` in the envelope
    pub data_key: &'static str,
}

impl Resource {
    /// Resolve a plain resource name or one of the client procedure aliases
    pub fn resolve(name: &str) -> Option<Self> {
        let (dataset, data_key) = match name.trim() {
            "validators" => (Dataset::Validators, "validators"),
            "delegates.getDelegates4" => (Dataset::Validators, "delegates"),
            "subnets" | "subnets.getSubnetsNameAndSymbol" => (Dataset::Subnets, "subnets"),
            _ => return None,
        };
        Some(Self { dataset, data_key })
    }
}

/// One requested resource with its own parameters
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceRequest {
    pub name: String,
    pub query: RawQuery,
}

impl ResourceRequest {
    pub fn new(name: impl Into<String>, query: RawQuery) -> Self {
        Self {
            name: name.into(),
            query,
        }
    }
}

/// Split a comma separated procedure path into requests sharing `shared`.
///
/// `input` is the client's batch input, a JSON object keyed by request
/// index whose values (or their `json` member) override the shared
/// parameters for that index.
pub fn parse_batch(
    procedures: &str,
    shared: &RawQuery,
    input: Option<&str>,
) -> ApyResult<Vec<ResourceRequest>> {
    let overrides = match input.map(str::trim).filter(|s| !s.is_empty()) {
        Some(text) => match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(map)) => map,
            Ok(_) => return Err(ValidationError::with_parameter("input must be a JSON object", "input").into()),
            Err(e) => {
                return Err(ValidationError::with_parameter(
                    format!("input is not valid JSON: {}", e),
                    "input",
                )
                .into())
            }
        },
        None => serde_json::Map::new(),
    };

    let requests = procedures
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .enumerate()
        .map(|(index, name)| {
            let local = overrides.get(&index.to_string()).and_then(|v| match v {
                Value::Object(obj) => match obj.get("json") {
                    Some(Value::Object(inner)) => Some(inner),
                    _ => Some(obj),
                },
                _ => None,
            });
            let query = match local {
                Some(obj) => shared.overlay(obj),
                None => shared.clone(),
            };
            ResourceRequest::new(name, query)
        })
        .collect::<Vec<_>>();

    if requests.is_empty() {
        return Err(ValidationError::with_parameter("no procedures requested", "procedures").into());
    }
    Ok(requests)
}

/// Builds batch envelopes from the service's cached collections
pub struct BatchResponseAssembler<'a> {
    service: &'a YieldService,
    defaults: PageDefaults,
}

impl<'a> BatchResponseAssembler<'a> {
    pub fn new(service: &'a YieldService) -> Self {
        Self {
            defaults: PageDefaults::from(&service.config().server),
            service,
        }
    }

    /// Resolve every request concurrently; entry `i` answers request `i`.
    pub async fn assemble(&self, requests: &[ResourceRequest]) -> BatchResponseEnvelope {
        let entries = join_all(requests.iter().map(|r| self.resolve(r))).await;
        let envelope = BatchResponseEnvelope::new(entries);
        debug!(
            resources = envelope.len(),
            failed = envelope.entries().iter().filter(|e| e.is_error()).count(),
            "Assembled batch response"
        );
        envelope
    }

    async fn resolve(&self, request: &ResourceRequest) -> BatchEntry {
        match self.resolve_inner(request).await {
            Ok(entry) => entry,
            Err(err) => BatchEntry::Error(err),
        }
    }

    async fn resolve_inner(&self, request: &ResourceRequest) -> ApyResult<BatchEntry> {
        let resource = Resource::resolve(&request.name).ok_or_else(|| {
            ApyError::from(NotFoundError {
                message: format!("Unknown procedure: {}", request.name),
                kind: Some("procedure".to_string()),
                id: Some(request.name.clone()),
            })
        })?;
        let params = QueryParams::parse(&request.query, self.defaults)?;

        let items = match resource.dataset {
            Dataset::Validators => {
                let entry = self.service.validators().await?;
                serde_json::to_value(select_validators(&entry.value, &params).data)?
            }
            Dataset::Subnets => {
                let entry = self.service.subnets().await?;
                serde_json::to_value(select_subnets(&entry.value, &params).data)?
            }
        };

        Ok(BatchEntry::Data {
            key: resource.data_key,
            items,
        })
    }
}
