use std::collections::HashMap;

use anyhow::{anyhow, Result};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde::Deserialize;
use ureq::Agent;

use crate::config::ReconcileConfig;
use crate::sparql_endpoint::build_agent;

const ENTITY_URI_PREFIXES: [&str; 4] = [
    "http://www.wikidata.org/entity/Q",
    "https://www.wikidata.org/entity/Q",
    "http://www.wikidata.org/wiki/Q",
    "https://www.wikidata.org/wiki/Q",
];

pub fn parse_qid_from_entity_uri<T: AsRef<str>>(uri: T) -> Option<u64> {
    let uri = uri.as_ref();
    ENTITY_URI_PREFIXES
        .iter()
        .find_map(|prefix| uri.strip_prefix(prefix))
        .and_then(|slice| slice.parse::<u64>().ok())
}

/// Accepts `Q76`, `76` or an entity URI.
pub fn parse_qid<T: AsRef<str>>(value: T) -> Option<u64> {
    let value = value.as_ref().trim();
    if let Some(qid) = parse_qid_from_entity_uri(value) {
        return Some(qid);
    }
    value
        .strip_prefix('Q')
        .unwrap_or(value)
        .parse::<u64>()
        .ok()
}

#[derive(Debug, Deserialize)]
struct WbGetClaimsResponse {
    #[serde(default)]
    claims: HashMap<String, Vec<Statement>>,

    error: Option<ApiError>,
}

impl WbGetClaimsResponse {
    /// String values of the property's statements. Statements whose snak is
    /// `novalue`/`somevalue` (no datavalue) or non-string are skipped.
    fn string_values<T: AsRef<str>>(&self, property: T) -> Vec<String> {
        let Some(statements) = self.claims.get(property.as_ref()) else {
            return vec![];
        };
        statements
            .iter()
            .filter_map(|statement| statement.mainsnak.datavalue.as_ref())
            .filter_map(|datavalue| datavalue.value.as_str())
            .map(|value| value.to_owned())
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: String,
    info: String,
}

#[derive(Debug, Deserialize)]
struct Statement {
    mainsnak: Mainsnak,
}

#[derive(Debug, Deserialize)]
struct Mainsnak {
    datavalue: Option<Datavalue>,
}

#[derive(Debug, Deserialize)]
struct Datavalue {
    value: serde_json::Value,
}

/// Reads claims straight off an entity through the Wikibase action API.
pub struct WikidataApi<'a> {
    config: &'a ReconcileConfig,
    agent: Agent,
}

impl<'a> WikidataApi<'a> {
    pub fn new(config: &'a ReconcileConfig) -> Self {
        Self {
            config,
            agent: build_agent(config),
        }
    }

    fn claims_url(&self, qid: u64, property: &str) -> String {
        format!(
            "{}?action=wbgetclaims&property={}&entity=Q{qid}&format=json",
            self.config.api_url,
            utf8_percent_encode(property, NON_ALPHANUMERIC)
        )
    }

    /// Returns the values of an external-identifier property stated on the
    /// entity, e.g. its VIAF IDs for `P214`.
    pub fn external_ids(&self, qid: u64, property: &str) -> Result<Vec<String>> {
        let response = self.agent.get(&self.claims_url(qid, property)).call()?;
        if response.status() != 200 {
            return Err(anyhow!("Got HTTP {}", response.status()));
        }
        let body = response.into_string()?;
        parse_external_ids(&body, property)
    }
}

fn parse_external_ids<T: AsRef<str>>(body: &str, property: T) -> Result<Vec<String>> {
    let response: WbGetClaimsResponse = serde_json::from_str(body)?;
    if let Some(ApiError { code, info }) = response.error {
        return Err(anyhow!("Wikidata API error {code}: {info}"));
    }
    Ok(response.string_values(property))
}
