use std::collections::HashMap;

use serde::Deserialize;

use crate::config::ReconcileConfig;

/// Escapes a value for use inside a double-quoted SPARQL string literal.
pub fn escape_string_literal<T: AsRef<str>>(value: T) -> String {
    let mut escaped = String::with_capacity(value.as_ref().len() + 2);
    for c in value.as_ref().chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Builds the query that finds every item whose external-identifier
/// property equals `identifier`, along with its label in the configured
/// language and its article on the configured site. Both of the latter are
/// OPTIONAL, so a missing label or article never hides the item itself.
pub fn build_reconcile_query<T: AsRef<str>>(config: &ReconcileConfig, identifier: T) -> String {
    format!(
        r#"PREFIX wdt: <http://www.wikidata.org/prop/direct/>
PREFIX rdfs: <http://www.w3.org/2000/01/rdf-schema#>
PREFIX schema: <http://schema.org/>

SELECT ?item ?itemLabel ?article WHERE {{
  ?item wdt:{property} "{literal}" .
  OPTIONAL {{
    ?item rdfs:label ?itemLabel .
    FILTER(LANG(?itemLabel) = "{language}")
  }}
  OPTIONAL {{
    ?article schema:about ?item ;
             schema:isPartOf <{article_site}> .
  }}
}}
"#,
        property = config.property,
        literal = escape_string_literal(identifier),
        language = config.language,
        article_site = config.article_site,
    )
}

/// The SPARQL 1.1 query results JSON format, as far as we need it.
#[derive(Debug, Deserialize)]
pub struct SparqlResponse {
    pub results: SparqlResults,
}

#[derive(Debug, Deserialize)]
pub struct SparqlResults {
    pub bindings: Vec<Binding>,
}

/// One result row. Terms are kept as raw JSON so that a single malformed
/// term can be rejected without failing the whole response.
pub type Binding = HashMap<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SparqlTerm {
    #[serde(rename = "type")]
    pub term_type: String,

    pub value: String,

    #[serde(rename = "xml:lang", default)]
    pub lang: Option<String>,
}

impl SparqlTerm {
    /// `None` if `var` is unbound in the row, `Some(Err(..))` if it is bound
    /// to something that isn't a well-formed term.
    pub fn from_binding(binding: &Binding, var: &str) -> Option<serde_json::Result<Self>> {
        binding.get(var).map(SparqlTerm::deserialize)
    }
}

impl SparqlResponse {
    pub fn parse<T: AsRef<str>>(body: T) -> serde_json::Result<Self> {
        serde_json::from_str(body.as_ref())
    }
}
