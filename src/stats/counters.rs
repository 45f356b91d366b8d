use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::collections::HashMap;
use std::sync::Arc;
use strum_macros::{AsRefStr, Display, EnumIter};
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use super::StatsError;

/// Record collections the counters run against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Collection {
    Games,
    GameResults,
    PhaseResults,
    Bans,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Text(String),
    Bool(bool),
    /// Matches a list-valued field that contains the value
    Member(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct EqualityFilter {
    pub field: &'static str,
    pub value: FilterValue,
}

impl EqualityFilter {
    pub fn text(field: &'static str, value: impl Into<String>) -> Self {
        Self {
            field,
            value: FilterValue::Text(value.into()),
        }
    }

    pub fn bool(field: &'static str, value: bool) -> Self {
        Self {
            field,
            value: FilterValue::Bool(value),
        }
    }

    pub fn member(field: &'static str, value: impl Into<String>) -> Self {
        Self {
            field,
            value: FilterValue::Member(value.into()),
        }
    }
}

/// Count of records in `collection` matching every filter
#[derive(Debug, Clone, PartialEq)]
pub struct CountQuery {
    pub collection: Collection,
    pub filters: Vec<EqualityFilter>,
}

/// The counter query set run for each recalculation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, Display)]
pub enum Counter {
    StartedGames,
    FinishedGames,
    SoloWins,
    ForcedDraws,
    Eliminations,
    Drops,
    MissedTurnPhases,
    ActiveTurnPhases,
    ReadyTurnPhases,
    OwnedBans,
    SharedBans,
}

impl Counter {
    pub fn query(self, user_id: &str) -> CountQuery {
        use Collection::*;

        let (collection, filters) = match self {
            Counter::StartedGames => (
                Games,
                vec![
                    EqualityFilter::member("member_ids", user_id),
                    EqualityFilter::bool("started", true),
                ],
            ),
            Counter::FinishedGames => (
                Games,
                vec![
                    EqualityFilter::member("member_ids", user_id),
                    EqualityFilter::bool("finished", true),
                ],
            ),
            Counter::SoloWins => (
                GameResults,
                vec![EqualityFilter::text("solo_winner", user_id)],
            ),
            Counter::ForcedDraws => (
                GameResults,
                vec![EqualityFilter::member("draw_users", user_id)],
            ),
            Counter::Eliminations => (
                GameResults,
                vec![EqualityFilter::member("eliminated_users", user_id)],
            ),
            Counter::Drops => (
                GameResults,
                vec![EqualityFilter::member("dropped_users", user_id)],
            ),
            Counter::MissedTurnPhases => (
                PhaseResults,
                vec![EqualityFilter::member("missed_users", user_id)],
            ),
            Counter::ActiveTurnPhases => (
                PhaseResults,
                vec![EqualityFilter::member("active_users", user_id)],
            ),
            Counter::ReadyTurnPhases => (
                PhaseResults,
                vec![EqualityFilter::member("ready_users", user_id)],
            ),
            Counter::OwnedBans => (Bans, vec![EqualityFilter::member("owner_ids", user_id)]),
            Counter::SharedBans => (Bans, vec![EqualityFilter::member("user_ids", user_id)]),
        };

        CountQuery {
            collection,
            filters,
        }
    }
}

/// Backend for counted queries
#[async_trait]
pub trait CountStore: Send + Sync {
    async fn count(&self, query: &CountQuery) -> Result<u64, StatsError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Bool(bool),
    List(Vec<String>),
}

/// A schemaless record held by [`InMemoryCountStore`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: HashMap<&'static str, FieldValue>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(mut self, field: &'static str, value: impl Into<String>) -> Self {
        self.fields.insert(field, FieldValue::Text(value.into()));
        self
    }

    pub fn with_bool(mut self, field: &'static str, value: bool) -> Self {
        self.fields.insert(field, FieldValue::Bool(value));
        self
    }

    pub fn with_list<I, S>(mut self, field: &'static str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.fields.insert(field, FieldValue::List(values));
        self
    }

    pub fn matches(&self, filter: &EqualityFilter) -> bool {
        match (self.fields.get(filter.field), &filter.value) {
            (Some(FieldValue::Text(actual)), FilterValue::Text(expected)) => actual == expected,
            (Some(FieldValue::Bool(actual)), FilterValue::Bool(expected)) => actual == expected,
            (Some(FieldValue::List(values)), FilterValue::Member(expected)) => {
                values.iter().any(|v| v == expected)
            }
            _ => false,
        }
    }
}

/// In-memory record collections for development and testing
#[derive(Debug, Default)]
pub struct InMemoryCountStore {
    collections: Arc<RwLock<HashMap<Collection, Vec<Record>>>>,
}

impl InMemoryCountStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, collection: Collection, record: Record) {
        self.collections
            .write()
            .await
            .entry(collection)
            .or_default()
            .push(record);
    }
}

#[async_trait]
impl CountStore for InMemoryCountStore {
    async fn count(&self, query: &CountQuery) -> Result<u64, StatsError> {
        let collections = self.collections.read().await;
        let count = collections
            .get(&query.collection)
            .map(|records| {
                records
                    .iter()
                    .filter(|record| query.filters.iter().all(|f| record.matches(f)))
                    .count()
            })
            .unwrap_or(0);
        Ok(count as u64)
    }
}

/// PostgreSQL implementation of the counted query primitive
///
/// Collections map to tables of the same name; list-valued fields are
/// `TEXT[]` columns.
pub struct PostgresCountStore {
    pool: PgPool,
}

impl PostgresCountStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn build(query: &CountQuery) -> QueryBuilder<'_, Postgres> {
        let mut builder = QueryBuilder::new("SELECT COUNT(*) FROM ");
        builder.push(query.collection.as_ref());

        for (index, filter) in query.filters.iter().enumerate() {
            builder.push(if index == 0 { " WHERE " } else { " AND " });
            match &filter.value {
                FilterValue::Text(value) => {
                    builder.push(filter.field).push(" = ").push_bind(value.as_str());
                }
                FilterValue::Bool(value) => {
                    builder.push(filter.field).push(" = ").push_bind(*value);
                }
                FilterValue::Member(value) => {
                    builder
                        .push_bind(value.as_str())
                        .push(" = ANY(")
                        .push(filter.field)
                        .push(")");
                }
            }
        }

        builder
    }
}

#[async_trait]
impl CountStore for PostgresCountStore {
    #[instrument(skip(self), fields(collection = %query.collection))]
    async fn count(&self, query: &CountQuery) -> Result<u64, StatsError> {
        let count: i64 = Self::build(query)
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                warn!(error = %e, "Counted query failed");
                StatsError::Query(e.to_string())
            })?;

        debug!(count, "Counted query finished");
        Ok(count.max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_every_counter_filters_on_the_user() {
        for counter in Counter::iter() {
            let query = counter.query("user-1");
            assert!(
                query.filters.iter().any(|f| matches!(
                    &f.value,
                    FilterValue::Text(v) | FilterValue::Member(v) if v == "user-1"
                )),
                "{} does not filter on the user",
                counter
            );
        }
    }

    #[test]
    fn test_game_counters_add_status_filter() {
        let started = Counter::StartedGames.query("u");
        let finished = Counter::FinishedGames.query("u");

        assert_eq!(started.collection, Collection::Games);
        assert!(started.filters.contains(&EqualityFilter::bool("started", true)));
        assert!(finished.filters.contains(&EqualityFilter::bool("finished", true)));
    }

    #[test]
    fn test_postgres_query_uses_any_for_membership() {
        let query = Counter::StartedGames.query("user-1");
        let builder = PostgresCountStore::build(&query);

        assert_eq!(
            builder.sql(),
            "SELECT COUNT(*) FROM games WHERE $1 = ANY(member_ids) AND started = $2"
        );
    }

    #[test]
    fn test_postgres_query_uses_equality_for_scalars() {
        let query = Counter::SoloWins.query("user-1");
        let builder = PostgresCountStore::build(&query);

        assert_eq!(
            builder.sql(),
            "SELECT COUNT(*) FROM game_results WHERE solo_winner = $1"
        );
    }

    #[tokio::test]
    async fn test_in_memory_count_applies_all_filters() {
        let store = InMemoryCountStore::new();
        store
            .insert(
                Collection::Games,
                Record::new()
                    .with_list("member_ids", ["user-1", "user-2"])
                    .with_bool("started", true)
                    .with_bool("finished", false),
            )
            .await;
        store
            .insert(
                Collection::Games,
                Record::new()
                    .with_list("member_ids", ["user-2"])
                    .with_bool("started", true)
                    .with_bool("finished", true),
            )
            .await;

        let started = store.count(&Counter::StartedGames.query("user-1")).await.unwrap();
        let finished = store.count(&Counter::FinishedGames.query("user-1")).await.unwrap();
        let other_started = store.count(&Counter::StartedGames.query("user-2")).await.unwrap();

        assert_eq!(started, 1);
        assert_eq!(finished, 0);
        assert_eq!(other_started, 2);
    }

    #[tokio::test]
    async fn test_in_memory_count_of_empty_collection_is_zero() {
        let store = InMemoryCountStore::new();

        let count = store.count(&Counter::OwnedBans.query("user-1")).await.unwrap();

        assert_eq!(count, 0);
    }

    #[test]
    fn test_type_mismatch_never_matches() {
        let record = Record::new().with_text("solo_winner", "user-1");

        assert!(!record.matches(&EqualityFilter::member("solo_winner", "user-1")));
        assert!(record.matches(&EqualityFilter::text("solo_winner", "user-1")));
    }
}
