//! Resource index query URL construction.

use std::collections::BTreeMap;

use url::form_urlencoded::byte_serialize;

use crate::config::{RESULT_FORMAT, RESULT_TYPE, RISEARCH_PATH};

/// Query parameters sent to the resource index.
///
/// Ordered so that generated URLs are reproducible.
pub type QueryParameters = BTreeMap<String, String>;

/// Build a query parameter map from pairs.
pub fn query_params<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> QueryParameters {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Percent-encode a value as UTF-8, with spaces as `%20`.
///
/// # Examples
/// ```
/// use fedora_oai_driver::query::encode;
///
/// assert_eq!(encode("a b&c=d"), "a%20b%26c%3Dd");
/// assert_eq!(encode("1+1"), "1%2B1");
/// ```
pub fn encode(value: &str) -> String {
    // byte_serialize writes a literal '+' as %2B, so any '+' left is a space.
    byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

/// Build the risearch URL for a query.
///
/// The result type and format directives are always set, replacing any
/// caller-supplied values for those names.
///
/// # Arguments
/// * `base_url` - Repository base URL, ending in `/`
/// * `params` - Caller query parameters
///
/// # Examples
/// ```
/// use fedora_oai_driver::query::{build_query_url, query_params};
///
/// let url = build_query_url(
///     "http://localhost:8080/fedora/",
///     query_params([("lang", "itql"), ("query", "select $s")]),
/// );
/// assert_eq!(
///     url,
///     "http://localhost:8080/fedora/risearch?format=Sparql&lang=itql&query=select%20%24s&type=tuples"
/// );
/// ```
pub fn build_query_url(base_url: &str, mut params: QueryParameters) -> String {
    params.insert(RESULT_TYPE.0.to_string(), RESULT_TYPE.1.to_string());
    params.insert(RESULT_FORMAT.0.to_string(), RESULT_FORMAT.1.to_string());

    let query = params
        .iter()
        .map(|(name, value)| format!("{}={}", encode(name), encode(value)))
        .collect::<Vec<_>>()
        .join("&");

    format!("{base_url}{RISEARCH_PATH}?{query}")
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "http://localhost:8080/fedora/";

    #[test]
    fn test_directives_present_exactly_once() {
        let url = build_query_url(
            BASE,
            query_params([("type", "triples"), ("format", "N-Triples"), ("lang", "itql")]),
        );
        assert_eq!(url.matches("type=").count(), 1);
        assert_eq!(url.matches("format=").count(), 1);
        assert!(url.contains("type=tuples"));
        assert!(url.contains("format=Sparql"));
        assert!(!url.contains("triples"));
    }

    #[test]
    fn test_empty_params_still_get_directives() {
        assert_eq!(
            build_query_url(BASE, QueryParameters::new()),
            "http://localhost:8080/fedora/risearch?format=Sparql&type=tuples"
        );
    }

    #[test]
    fn test_reserved_characters_encoded() {
        let url = build_query_url(BASE, query_params([("query", "a b&c=d")]));
        let (_, query) = url.split_once('?').unwrap();
        let value = query
            .split('&')
            .find_map(|pair| pair.strip_prefix("query="))
            .unwrap();
        assert_eq!(value, "a%20b%26c%3Dd");
        assert!(!value.contains(' '));
        assert!(!query.contains('+'));
    }

    #[test]
    fn test_utf8_encoding() {
        assert_eq!(encode("é"), "%C3%A9");
        assert_eq!(encode("<info:fedora/*/oai_dc>"), "%3Cinfo%3Afedora%2F*%2Foai_dc%3E");
    }

    #[test]
    fn test_build_is_deterministic() {
        let params = query_params([("z", "1"), ("a", "2"), ("m", "3")]);
        assert_eq!(
            build_query_url(BASE, params.clone()),
            build_query_url(BASE, params)
        );
    }
}
