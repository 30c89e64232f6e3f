use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use tracing::debug;
use ureq::{Agent, AgentBuilder};

use crate::{config::ReconcileConfig, error::FetchError};

const SPARQL_RESULTS_JSON: &str = "application/sparql-results+json";

/// Something that can answer a SPARQL SELECT query with a JSON results body.
pub trait SparqlEndpoint {
    fn select(&self, query: &str) -> Result<String, FetchError>;

    /// A string that is identical for identical requests, used as a cache key.
    fn request_key(&self, query: &str) -> String {
        query.to_owned()
    }
}

impl<E: SparqlEndpoint + ?Sized> SparqlEndpoint for &E {
    fn select(&self, query: &str) -> Result<String, FetchError> {
        (**self).select(query)
    }

    fn request_key(&self, query: &str) -> String {
        (**self).request_key(query)
    }
}

impl<E: SparqlEndpoint + ?Sized> SparqlEndpoint for Box<E> {
    fn select(&self, query: &str) -> Result<String, FetchError> {
        (**self).select(query)
    }

    fn request_key(&self, query: &str) -> String {
        (**self).request_key(query)
    }
}

/// A remote SPARQL endpoint reached with blocking HTTP GET requests.
pub struct HttpEndpoint {
    endpoint: String,
    agent: Agent,
}

impl HttpEndpoint {
    pub fn new(config: &ReconcileConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            agent: build_agent(config),
        }
    }

    pub fn request_url(&self, query: &str) -> String {
        let separator = if self.endpoint.contains('?') { '&' } else { '?' };
        format!(
            "{}{separator}format=json&query={}",
            self.endpoint,
            utf8_percent_encode(query, NON_ALPHANUMERIC)
        )
    }
}

/// Every request made through the agent is bounded by the configured timeout.
pub fn build_agent(config: &ReconcileConfig) -> Agent {
    AgentBuilder::new()
        .timeout(config.timeout())
        .user_agent(&config.user_agent)
        .build()
}

impl SparqlEndpoint for HttpEndpoint {
    fn select(&self, query: &str) -> Result<String, FetchError> {
        let url = self.request_url(query);
        debug!(endpoint = %self.endpoint, "sending SPARQL query");
        let response = self
            .agent
            .get(&url)
            .set("Accept", SPARQL_RESULTS_JSON)
            .call()?;
        if response.status() != 200 {
            return Err(FetchError::Transport(format!(
                "Got HTTP {}",
                response.status()
            )));
        }
        if !is_json_content_type(response.content_type()) {
            return Err(FetchError::Protocol(format!(
                "Content type is {}",
                response.content_type()
            )));
        }
        response
            .into_string()
            .map_err(|err| FetchError::Transport(format!("Failed to read response body: {err}")))
    }

    fn request_key(&self, query: &str) -> String {
        self.request_url(query)
    }
}

fn is_json_content_type<T: AsRef<str>>(content_type: T) -> bool {
    let content_type = content_type.as_ref();
    content_type == "application/json" || content_type == SPARQL_RESULTS_JSON
}
