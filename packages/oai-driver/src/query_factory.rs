//! Query factories: the queries the driver sends for each operation.
//!
//! Factories are resolved by name from a [`QueryFactoryRegistry`], so the
//! query language can be swapped through configuration.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::config::{
    Properties, PROP_ITEMID, PROP_SETSPEC, PROP_SETSPEC_DISSTYPE, PROP_SETSPEC_NAME,
};
use crate::error::{RepositoryError, Result};
use crate::query::{query_params, QueryParameters};

/// Builds query parameters for each driver operation.
pub trait QueryFactory {
    /// Query returning the newest change date in a `date` binding, newest first.
    fn latest_record_date_query(&self) -> QueryParameters;

    /// Queries returning `setSpec`, `setName` and optionally `setDiss` per set.
    ///
    /// Each set must appear in exactly one of the results, and each result
    /// must be ordered by `setSpec`.
    fn set_info_queries(&self) -> Vec<QueryParameters>;

    /// Query returning records of one dissemination type changed in a range.
    fn list_records_query(
        &self,
        from: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
        diss_type: &str,
    ) -> QueryParameters;
}

/// Constructor stored in the registry.
pub type FactoryConstructor = fn(&Properties) -> Result<Box<dyn QueryFactory>>;

/// Name of the built-in iTQL factory.
pub const ITQL_FACTORY: &str = "itql";

/// Long name accepted for the built-in iTQL factory.
pub const ITQL_FACTORY_LONG: &str = "fedora.services.oaiprovider.ITQLQueryFactory";

/// Table of query factories by configuration name.
pub struct QueryFactoryRegistry {
    constructors: HashMap<String, FactoryConstructor>,
}

impl QueryFactoryRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Registry with the built-in factories.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(ITQL_FACTORY, ItqlQueryFactory::boxed);
        registry.register(ITQL_FACTORY_LONG, ItqlQueryFactory::boxed);
        registry
    }

    /// Register a factory constructor under `name`.
    pub fn register(&mut self, name: impl Into<String>, constructor: FactoryConstructor) {
        self.constructors.insert(name.into(), constructor);
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    /// Resolve and initialise the factory registered under `name`.
    pub fn create(&self, name: &str, props: &Properties) -> Result<Box<dyn QueryFactory>> {
        let constructor = self
            .constructors
            .get(name)
            .ok_or_else(|| RepositoryError::QueryFactory {
                name: name.to_string(),
                message: "no query factory registered under this name".to_string(),
            })?;
        constructor(props).map_err(|e| match e {
            RepositoryError::QueryFactory { .. } => e,
            other => RepositoryError::QueryFactory {
                name: name.to_string(),
                message: other.to_string(),
            },
        })
    }
}

impl Default for QueryFactoryRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

const VIEW_NS: &str = "info:fedora/fedora-system:def/view#";

/// iTQL queries against the Fedora resource index.
#[derive(Debug, Clone)]
pub struct ItqlQueryFactory {
    item_id: String,
    set_spec: String,
    set_spec_name: String,
    set_spec_diss_type: String,
}

impl ItqlQueryFactory {
    pub fn from_properties(props: &Properties) -> Result<Self> {
        Ok(Self {
            item_id: props.get_required(PROP_ITEMID)?.to_string(),
            set_spec: props.get_required(PROP_SETSPEC)?.to_string(),
            set_spec_name: props.get_required(PROP_SETSPEC_NAME)?.to_string(),
            set_spec_diss_type: props.get_required(PROP_SETSPEC_DISSTYPE)?.to_string(),
        })
    }

    fn boxed(props: &Properties) -> Result<Box<dyn QueryFactory>> {
        Ok(Box::new(Self::from_properties(props)?))
    }

    fn itql(query: &str) -> QueryParameters {
        query_params([("lang", "itql"), ("query", query)])
    }
}

fn date_literal(date: DateTime<Utc>) -> String {
    format!(
        "'{}'^^<http://www.w3.org/2001/XMLSchema#dateTime> in <#xsd>",
        date.format("%Y-%m-%dT%H:%M:%S%.3fZ")
    )
}

impl QueryFactory for ItqlQueryFactory {
    fn latest_record_date_query(&self) -> QueryParameters {
        let query = format!(
            "select $date from <#ri> \
             where $item <{item_id}> $itemID \
             and $item <{VIEW_NS}lastModifiedDate> $date \
             order by $date desc limit 1",
            item_id = self.item_id,
        );
        Self::itql(&query)
    }

    fn set_info_queries(&self) -> Vec<QueryParameters> {
        let set = format!(
            "$set <{set_spec}> $setSpec and $set <{set_name}> $setName",
            set_spec = self.set_spec,
            set_name = self.set_spec_name,
        );
        let description = format!(
            "$set <{VIEW_NS}disseminates> $setDiss \
             and $setDiss <{VIEW_NS}disseminationType> <{diss_type}>",
            diss_type = self.set_spec_diss_type,
        );

        // iTQL has no optional patterns: described sets first, then the rest.
        let described = format!(
            "select $setSpec $setName $setDiss from <#ri> \
             where {set} and {description} order by $setSpec"
        );
        let undescribed = format!(
            "select $setSpec $setName from <#ri> \
             where {set} minus ({description}) order by $setSpec"
        );
        vec![Self::itql(&described), Self::itql(&undescribed)]
    }

    fn list_records_query(
        &self,
        from: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
        diss_type: &str,
    ) -> QueryParameters {
        let mut query = format!(
            "select $itemID $recordDiss $date from <#ri> \
             where $item <{item_id}> $itemID \
             and $item <{VIEW_NS}disseminates> $recordDiss \
             and $recordDiss <{VIEW_NS}disseminationType> <{diss_type}> \
             and $recordDiss <{VIEW_NS}lastModifiedDate> $date",
            item_id = self.item_id,
        );
        if let Some(from) = from {
            query.push_str(&format!(
                " and $date <http://tucana.org/tucana#after> {}",
                date_literal(from)
            ));
        }
        if let Some(until) = until {
            query.push_str(&format!(
                " and $date <http://tucana.org/tucana#before> {}",
                date_literal(until)
            ));
        }
        query.push_str(" order by $date");
        Self::itql(&query)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::config::tests::sample_properties;

    struct FixedFactory;

    impl QueryFactory for FixedFactory {
        fn latest_record_date_query(&self) -> QueryParameters {
            query_params([("query", "latest")])
        }

        fn set_info_queries(&self) -> Vec<QueryParameters> {
            vec![query_params([("query", "sets")])]
        }

        fn list_records_query(
            &self,
            _from: Option<DateTime<Utc>>,
            _until: Option<DateTime<Utc>>,
            _diss_type: &str,
        ) -> QueryParameters {
            query_params([("query", "records")])
        }
    }

    fn fixed(_props: &Properties) -> Result<Box<dyn QueryFactory>> {
        Ok(Box::new(FixedFactory))
    }

    #[test]
    fn test_defaults_resolve_both_names() {
        let registry = QueryFactoryRegistry::with_defaults();
        assert!(registry.contains(ITQL_FACTORY));
        assert!(registry.contains(ITQL_FACTORY_LONG));
        assert!(registry.create(ITQL_FACTORY, &sample_properties()).is_ok());
    }

    #[test]
    fn test_unknown_name_fails() {
        let registry = QueryFactoryRegistry::with_defaults();
        let err = registry
            .create("com.example.Missing", &sample_properties())
            .err()
            .unwrap();
        assert!(
            matches!(err, RepositoryError::QueryFactory { ref name, .. } if name == "com.example.Missing")
        );
    }

    #[test]
    fn test_init_failure_is_classified() {
        let registry = QueryFactoryRegistry::with_defaults();
        let err = registry.create(ITQL_FACTORY, &Properties::new()).err().unwrap();
        assert!(matches!(err, RepositoryError::QueryFactory { .. }));
        assert!(err.to_string().contains("driver.fedora.itemID"));
    }

    #[test]
    fn test_custom_registration() {
        let mut registry = QueryFactoryRegistry::new();
        registry.register("fixed", fixed);
        let factory = registry.create("fixed", &Properties::new()).unwrap();
        assert_eq!(factory.set_info_queries(), vec![query_params([("query", "sets")])]);
    }

    #[test]
    fn test_itql_latest_date_query() {
        let factory = ItqlQueryFactory::from_properties(&sample_properties()).unwrap();
        let params = factory.latest_record_date_query();
        assert_eq!(params.get("lang").map(String::as_str), Some("itql"));
        let query = &params["query"];
        assert!(query.starts_with("select $date from <#ri>"));
        assert!(query.contains("<http://www.openarchives.org/OAI/2.0/itemID>"));
        assert!(query.ends_with("order by $date desc limit 1"));
    }

    #[test]
    fn test_itql_set_info_queries_use_configured_predicates() {
        let factory = ItqlQueryFactory::from_properties(&sample_properties()).unwrap();
        for params in factory.set_info_queries() {
            let query = &params["query"];
            assert!(query.contains("<http://www.openarchives.org/OAI/2.0/setSpec> $setSpec"));
            assert!(query.contains("<http://www.openarchives.org/OAI/2.0/setName> $setName"));
            assert!(query.contains("<info:fedora/*/SetInfo.xml>"));
            assert!(query.ends_with("order by $setSpec"));
        }
    }

    #[test]
    fn test_itql_set_info_covers_sets_without_description() {
        let factory = ItqlQueryFactory::from_properties(&sample_properties()).unwrap();
        let queries: Vec<String> = factory
            .set_info_queries()
            .into_iter()
            .map(|params| params["query"].clone())
            .collect();
        assert_eq!(queries.len(), 2);

        let (described, undescribed) = (&queries[0], &queries[1]);
        assert!(described.starts_with("select $setSpec $setName $setDiss from <#ri>"));
        assert!(!described.contains(" minus "));

        // The second query selects no setDiss and excludes described sets.
        assert!(undescribed.starts_with("select $setSpec $setName from <#ri>"));
        let (kept, excluded) = undescribed.split_once(" minus ").unwrap();
        assert!(!kept.contains("disseminates"));
        assert!(excluded.starts_with("($set <info:fedora/fedora-system:def/view#disseminates> $setDiss"));
    }

    #[test]
    fn test_itql_list_records_range() {
        let factory = ItqlQueryFactory::from_properties(&sample_properties()).unwrap();
        let from = Utc.with_ymd_and_hms(2005, 1, 1, 0, 0, 0).unwrap();
        let query = factory.list_records_query(Some(from), None, "info:fedora/*/oai_dc")["query"].clone();
        assert!(query.contains("<info:fedora/*/oai_dc>"));
        assert!(query.contains("'2005-01-01T00:00:00.000Z'"));
        assert!(query.contains("#after>"));
        assert!(!query.contains("#before>"));
    }
}
