use serde::Serialize;
use tracing::{debug, warn};

use crate::{
    config::ReconcileConfig,
    error::{FetchError, LookupError},
    identifier_csv::Identifier,
    sparql::{build_reconcile_query, Binding, SparqlResponse, SparqlTerm},
    sparql_endpoint::SparqlEndpoint,
    wikidata::parse_qid_from_entity_uri,
};

const ITEM_VAR: &str = "item";
const LABEL_VAR: &str = "itemLabel";
const ARTICLE_VAR: &str = "article";

/// One remote entity that carries the identifier we looked up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchResult {
    #[serde(rename = "entityURI")]
    pub entity_uri: String,

    /// Only set if the entity has a label in the configured language.
    pub label: Option<String>,

    #[serde(rename = "secondaryLink")]
    pub secondary_link: Option<String>,
}

impl MatchResult {
    /// Builds a match out of one result row. Rows without a usable entity
    /// can't be matched to anything and yield `None`. The label and link are
    /// optional: if either is unbound or malformed, only that field is left
    /// empty.
    pub fn from_binding(binding: &Binding) -> Option<Self> {
        let entity_uri = match SparqlTerm::from_binding(binding, ITEM_VAR)? {
            Ok(term) => term.value,
            Err(err) => {
                warn!("malformed ?{ITEM_VAR} in result row: {err}");
                return None;
            }
        };
        Some(MatchResult {
            entity_uri,
            label: optional_value(binding, LABEL_VAR),
            secondary_link: optional_value(binding, ARTICLE_VAR),
        })
    }

    pub fn qid(&self) -> Option<u64> {
        parse_qid_from_entity_uri(&self.entity_uri)
    }
}

fn optional_value(binding: &Binding, var: &str) -> Option<String> {
    match SparqlTerm::from_binding(binding, var)? {
        Ok(term) => Some(term.value),
        Err(err) => {
            warn!("ignoring malformed ?{var} in result row: {err}");
            None
        }
    }
}

pub struct ReconciliationClient<'a, E> {
    config: &'a ReconcileConfig,
    endpoint: E,
}

impl<'a, E: SparqlEndpoint> ReconciliationClient<'a, E> {
    pub fn new(config: &'a ReconcileConfig, endpoint: E) -> Self {
        Self { config, endpoint }
    }

    pub fn config(&self) -> &ReconcileConfig {
        self.config
    }

    pub fn query_for(&self, id: &Identifier) -> String {
        build_reconcile_query(self.config, id)
    }

    /// Finds every entity whose configured external-identifier property
    /// equals `id`. An empty vec means the identifier isn't known remotely.
    pub fn lookup(&self, id: &Identifier) -> Result<Vec<MatchResult>, LookupError> {
        let query = self.query_for(id);
        debug!(identifier = %id, "looking up identifier");
        let body = self
            .endpoint
            .select(&query)
            .map_err(|err| err.for_identifier(id))?;
        let response = SparqlResponse::parse(&body).map_err(|err| {
            FetchError::Protocol(format!("Malformed SPARQL results: {err}")).for_identifier(id)
        })?;
        let mut matches = Vec::with_capacity(response.results.bindings.len());
        for binding in response.results.bindings.iter() {
            match MatchResult::from_binding(binding) {
                Some(result) => matches.push(result),
                None => warn!(
                    identifier = %id,
                    "dropping result row without ?{ITEM_VAR}: {binding:?}"
                ),
            }
        }
        debug!(identifier = %id, matches = matches.len(), "lookup finished");
        Ok(matches)
    }
}
