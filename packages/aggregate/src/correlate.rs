//! Cross-source person search.

use std::collections::BTreeMap;
use std::sync::Arc;

use blotter_incident_models::{
    CorrelatedResult, CorrelatedType, SourceRecord, field_text, first_text,
};
use blotter_resolver::CoordinateResolver;
use blotter_source::{DetailTable, SourceDefinition, supervision_kind};
use blotter_spatial::RadiusFilter;
use blotter_sql::select::MAX_ROWS;
use blotter_sql::{Filter, OrderBy, SelectQuery, SqlError};
use blotter_upstream::SourceQueryClient;
use futures::future::{join_all, try_join};
use serde::Serialize;

use crate::person::{ExactMatch, NameMatchPolicy, PersonQuery, SubstringMatch};
use crate::{AggregateError, clamp_page, partition_outcomes};

/// One page of merged person-search results.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrelatedPage {
    /// Results on this page, newest first.
    pub results: Vec<CorrelatedResult>,
    /// Whether the merged set extends past this page.
    pub has_more: bool,
    /// Sources whose query failed.
    pub failed_sources: Vec<String>,
    /// Effective page number.
    pub page: u32,
    /// Effective page size.
    pub page_size: u32,
}

/// A corrections case file.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OffenderDetail {
    /// Case number.
    pub offender_number: String,
    /// Display name from the summary row.
    pub name: Option<String>,
    /// Supervision kind.
    pub kind: CorrelatedType,
    /// The summary row.
    pub summary: SourceRecord,
    /// Every detail row for the case.
    pub details: Vec<SourceRecord>,
}

/// Searches every person-bearing source for a name.
#[derive(Debug, Clone)]
pub struct Correlator {
    pub(crate) client: SourceQueryClient,
    pub(crate) resolver: CoordinateResolver,
    pub(crate) sources: Vec<SourceDefinition>,
    policy: Arc<dyn NameMatchPolicy>,
    pub(crate) fetch_cap: u32,
}

/// Aggregated detail rows for one case number.
#[derive(Debug, Default)]
struct CaseDetails {
    details: Vec<String>,
    location: Option<String>,
    kind: Option<String>,
    extra: SourceRecord,
}

impl Correlator {
    /// Creates a correlator over the person-bearing entries of `sources`,
    /// matching names by substring.
    #[must_use]
    pub fn new(
        client: SourceQueryClient,
        resolver: CoordinateResolver,
        sources: Vec<SourceDefinition>,
    ) -> Self {
        Self {
            client,
            resolver,
            sources: sources.into_iter().filter(|s| s.person.is_some()).collect(),
            policy: Arc::new(SubstringMatch),
            fetch_cap: MAX_ROWS,
        }
    }

    /// Replaces the name-matching policy.
    #[must_use]
    pub fn with_policy(mut self, policy: Arc<dyn NameMatchPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Caps how many rows are requested from each source per search.
    /// Clamped to `1..=MAX_ROWS`.
    #[must_use]
    pub fn with_fetch_cap(mut self, cap: u32) -> Self {
        self.fetch_cap = cap.clamp(1, MAX_ROWS);
        self
    }

    fn search_query(
        &self,
        source: &SourceDefinition,
        query: &PersonQuery,
        fetch: u32,
    ) -> Result<String, SqlError> {
        let name_filter = source
            .person
            .as_ref()
            .and_then(|person| query.filter_for(person, self.policy.as_ref()));

        source
            .base_query()?
            .top(Some(fetch))
            .filter_opt(name_filter)
            .to_sql()
    }

    /// Searches for `text` across all person sources and returns one page
    /// of the merged, date-ordered results.
    ///
    /// Each source is asked for enough rows to fill every page up to this
    /// one plus one more, so `has_more` is exact until that per-source
    /// fetch hits the row cap. An empty query lists the most recent records
    /// of every source. With a `radius`, coordinates are resolved for the
    /// whole merged set and unplaced or distant rows are dropped before
    /// paging.
    ///
    /// # Errors
    ///
    /// Returns [`AggregateError::Sql`] if a query cannot be built, or the
    /// first upstream error if every source failed.
    pub async fn search(
        &self,
        text: &str,
        page: u32,
        page_size: u32,
        radius: Option<RadiusFilter>,
    ) -> Result<CorrelatedPage, AggregateError> {
        let (page, page_size) = clamp_page(page, page_size);
        let query = PersonQuery::parse(text);
        let end = u64::from(page) * u64::from(page_size);
        let fetch = u32::try_from(end + 1)
            .unwrap_or(self.fetch_cap)
            .min(self.fetch_cap);

        let queries = self
            .sources
            .iter()
            .map(|source| Ok((source, self.search_query(source, &query, fetch)?)))
            .collect::<Result<Vec<_>, SqlError>>()?;

        log::debug!(
            "Person search {query:?} ({} policy): page {page}, size {page_size}, fetch {fetch}",
            self.policy.name()
        );

        let outcomes = join_all(queries.iter().map(|(source, sql)| async move {
            let outcome = match self.client.raw(sql).await {
                Ok(rows) => Ok(self.to_results(source, rows).await),
                Err(e) => Err(AggregateError::from(e)),
            };
            (source.id.clone(), outcome)
        }))
        .await;

        let (mut merged, failed_sources) = partition_outcomes(outcomes)?;
        // `None` sorts first ascending, so descending leaves undated rows last.
        merged.sort_by(|a, b| b.date.cmp(&a.date));

        if let Some(radius) = radius {
            self.resolve_all(&mut merged).await;
            merged.retain(|r| radius.admits(r.coordinate));
        }

        let total = merged.len();
        let start = usize::try_from(end - u64::from(page_size)).unwrap_or(usize::MAX);
        let stop = usize::try_from(end).unwrap_or(usize::MAX);
        let has_more = total > stop;

        let mut results: Vec<CorrelatedResult> = merged
            .into_iter()
            .skip(start)
            .take(stop.saturating_sub(start))
            .collect();

        if radius.is_none() {
            self.resolve_all(&mut results).await;
        }

        Ok(CorrelatedPage {
            results,
            has_more,
            failed_sources,
            page,
            page_size,
        })
    }

    async fn resolve_all(&self, results: &mut [CorrelatedResult]) {
        let coordinates = join_all(results.iter().map(|r| self.resolver.resolve(&r.raw))).await;
        for (result, coordinate) in results.iter_mut().zip(coordinates) {
            result.coordinate = coordinate;
        }
    }

    /// Projects rows, enriching them from the source's detail table when
    /// it has one. A failed detail lookup leaves the rows unenriched.
    async fn to_results(
        &self,
        source: &SourceDefinition,
        rows: Vec<SourceRecord>,
    ) -> Vec<CorrelatedResult> {
        let enrichment = source.person.as_ref().and_then(|person| {
            person
                .case_number
                .as_deref()
                .zip(person.detail.as_ref())
        });

        let Some((case_column, detail)) = enrichment else {
            return rows
                .into_iter()
                .map(|row| source.to_correlated(row, None))
                .collect();
        };

        let numbers: Vec<String> = rows
            .iter()
            .filter_map(|row| field_text(row, case_column))
            .collect();
        let cases = match self.case_details(detail, &numbers).await {
            Ok(cases) => cases,
            Err(e) => {
                log::warn!("{}: detail lookup failed: {e}", source.id);
                BTreeMap::new()
            }
        };

        rows.into_iter()
            .map(|mut row| {
                let case = field_text(&row, case_column).and_then(|n| cases.get(&n));
                if let Some(case) = case {
                    for (key, value) in &case.extra {
                        row.entry(key.clone()).or_insert_with(|| value.clone());
                    }
                }
                let mut result = source.to_correlated(row, None);
                result.result_type = supervision_kind(case.and_then(|c| c.kind.as_deref()));
                if let Some(case) = case {
                    if !case.details.is_empty() {
                        result.details = Some(case.details.join("; "));
                    }
                    if case.location.is_some() {
                        result.location.clone_from(&case.location);
                    }
                }
                result
            })
            .collect()
    }

    async fn case_details(
        &self,
        detail: &DetailTable,
        numbers: &[String],
    ) -> Result<BTreeMap<String, CaseDetails>, AggregateError> {
        let mut cases: BTreeMap<String, CaseDetails> = BTreeMap::new();
        if numbers.is_empty() {
            return Ok(cases);
        }

        let query = SelectQuery::table(&detail.table)
            .filter(Filter::is_in(&detail.key, numbers.iter().map(String::as_str)))
            .top(Some(MAX_ROWS));

        for row in self.client.select(&query).await? {
            let Some(number) = field_text(&row, &detail.key) else {
                continue;
            };
            let case = cases.entry(number).or_default();

            for value in detail.details.iter().filter_map(|f| field_text(&row, f)) {
                if !case.details.contains(&value) {
                    case.details.push(value);
                }
            }
            if case.location.is_none() {
                case.location = first_text(&row, &detail.location);
            }
            if case.kind.is_none() {
                case.kind = detail
                    .kind_field
                    .as_deref()
                    .and_then(|f| field_text(&row, f));
            }
            for (key, value) in row {
                if !value.is_null() {
                    case.extra.entry(key).or_insert(value);
                }
            }
        }

        Ok(cases)
    }

    pub(crate) fn case_source(
        &self,
    ) -> Result<(&SourceDefinition, &str, &DetailTable), AggregateError> {
        self.sources
            .iter()
            .find_map(|source| {
                let person = source.person.as_ref()?;
                Some((source, person.case_number.as_deref()?, person.detail.as_ref()?))
            })
            .ok_or_else(|| AggregateError::UnknownSource {
                id: "probation".to_string(),
            })
    }

    /// Loads a corrections case file by case number.
    ///
    /// # Errors
    ///
    /// Returns [`AggregateError::UnknownSource`] if no source has a detail
    /// table, or any upstream error.
    pub async fn offender_detail(
        &self,
        number: &str,
    ) -> Result<Option<OffenderDetail>, AggregateError> {
        let (source, case_column, detail) = self.case_source()?;
        let number = number.trim();
        if number.is_empty() {
            return Ok(None);
        }

        let summary_query = SelectQuery::table(&source.table)
            .filter(Filter::equals(case_column, number))
            .order_by(OrderBy::desc(&source.time_column))
            .top(Some(1));
        let detail_query = SelectQuery::table(&detail.table)
            .filter(Filter::equals(&detail.key, number))
            .top(Some(MAX_ROWS));

        let (summary, details) = try_join(
            self.client.select(&summary_query),
            self.client.select(&detail_query),
        )
        .await?;

        let Some(summary) = summary.into_iter().next() else {
            return Ok(None);
        };

        let kind = supervision_kind(
            detail
                .kind_field
                .as_deref()
                .and_then(|f| details.iter().find_map(|row| field_text(row, f)))
                .as_deref(),
        );

        Ok(Some(OffenderDetail {
            offender_number: number.to_string(),
            name: source
                .person
                .as_ref()
                .and_then(|p| p.display_name(&summary)),
            kind,
            summary,
            details,
        }))
    }

    /// Finds a case file by name: an exact `First Last` / `Last, First`
    /// match first, then a partial match. The most recent matching case
    /// wins.
    ///
    /// # Errors
    ///
    /// Returns [`AggregateError::UnknownSource`] if no source has a detail
    /// table, or any upstream error.
    pub async fn offender_detail_by_name(
        &self,
        first: &str,
        last: &str,
    ) -> Result<Option<OffenderDetail>, AggregateError> {
        let (source, case_column, _) = self.case_source()?;
        let Some(person) = source.person.as_ref() else {
            return Ok(None);
        };
        let query = PersonQuery::from_parts(first, last);

        let policies: [&dyn NameMatchPolicy; 2] = [&ExactMatch, &SubstringMatch];
        for policy in policies {
            let Some(name_filter) = query.filter_for(person, policy) else {
                return Ok(None);
            };
            let lookup = SelectQuery::table(&source.table)
                .columns([case_column])
                .filter(name_filter)
                .order_by(OrderBy::desc(&source.time_column))
                .top(Some(1));

            let number = self
                .client
                .select(&lookup)
                .await?
                .first()
                .and_then(|row| field_text(row, case_column));

            if let Some(number) = number {
                log::debug!("Offender {query:?} matched case {number} ({})", policy.name());
                return self.offender_detail(&number).await;
            }
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeStore, correlator, record};

    fn smith_arrests(count: u32) -> Vec<SourceRecord> {
        (0..count)
            .map(|i| {
                record(serde_json::json!({
                    "id": i,
                    "key": "AR",
                    "firstname": "JOHN",
                    "lastname": "SMITH",
                    "charge": "PETIT LARCENY",
                    "event_time": format!("2024-01-{:02} 10:00:00", 28 - i),
                }))
            })
            .collect()
    }

    #[tokio::test]
    async fn pages_through_merged_results() {
        let store = Arc::new(FakeStore::new().rows("[key] = 'AR'", smith_arrests(25)));
        let correlator = correlator(&store);

        let first = correlator.search("Smith", 1, 20, None).await.unwrap();
        assert_eq!(first.results.len(), 20);
        assert!(first.has_more);
        assert_eq!(first.results[0].date.unwrap().to_string(), "2024-01-28 10:00:00 UTC");
        assert!(first.results.iter().all(|r| r.result_type == CorrelatedType::Arrest));

        let second = correlator.search("Smith", 2, 20, None).await.unwrap();
        assert_eq!(second.results.len(), 5);
        assert!(!second.has_more);
        assert_eq!(second.results[4].date.unwrap().to_string(), "2024-01-04 10:00:00 UTC");
    }

    #[tokio::test]
    async fn fetch_size_grows_with_page() {
        let store = Arc::new(FakeStore::new());
        let correlator = correlator(&store);

        correlator.search("Smith", 2, 20, None).await.unwrap();
        let statements = store.statements();
        assert_eq!(statements.len(), 7);
        assert!(statements.iter().all(|s| s.starts_with("SELECT TOP 41 ")));
    }

    #[tokio::test]
    async fn fetch_cap_bounds_per_source_rows() {
        let store = Arc::new(FakeStore::new());
        let correlator = correlator(&store).with_fetch_cap(30);

        correlator.search("Smith", 2, 20, None).await.unwrap();
        assert!(store.statements().iter().all(|s| s.starts_with("SELECT TOP 30 ")));
    }

    #[tokio::test]
    async fn page_and_size_are_normalized() {
        let store = Arc::new(FakeStore::new().rows("[key] = 'AR'", smith_arrests(3)));
        let page = correlator(&store).search("Smith", 0, 0, None).await.unwrap();
        assert_eq!((page.page, page.page_size), (1, 1));
        assert_eq!(page.results.len(), 1);
        assert!(page.has_more);
    }

    #[tokio::test]
    async fn failed_source_is_listed_not_fatal() {
        let store = Arc::new(
            FakeStore::new()
                .failing("[dbo].[JailInmates]", 500)
                .rows("[key] = 'AR'", smith_arrests(2)),
        );
        let page = correlator(&store).search("Smith", 1, 20, None).await.unwrap();
        assert_eq!(page.results.len(), 2);
        assert_eq!(page.failed_sources, vec!["jail".to_string()]);
    }

    #[tokio::test]
    async fn merges_sources_by_date_with_undated_last() {
        let store = Arc::new(
            FakeStore::new()
                .rows("[key] = 'AR'", smith_arrests(1))
                .rows(
                    "[dbo].[sexoffender_registrants]",
                    vec![
                        record(serde_json::json!({
                            "registrant_id": 5, "first_name": "JOHN", "last_name": "SMITH",
                            "tier": "3", "registration_date": "2024-02-01",
                        })),
                        record(serde_json::json!({
                            "registrant_id": 6, "first_name": "JON", "last_name": "SMITH",
                            "tier": "1",
                        })),
                    ],
                ),
        );
        let page = correlator(&store).search("Smith", 1, 20, None).await.unwrap();

        let types: Vec<_> = page.results.iter().map(|r| r.result_type).collect();
        assert_eq!(
            types,
            vec![
                CorrelatedType::SexOffender,
                CorrelatedType::Arrest,
                CorrelatedType::SexOffender
            ]
        );
        assert!(page.results[2].date.is_none());
        assert_eq!(page.results[0].coordinate, None);
    }

    #[tokio::test]
    async fn probation_rows_are_enriched_from_detail_table() {
        let store = Arc::new(
            FakeStore::new()
                .rows(
                    "[dbo].[Offender_Detail]",
                    vec![
                        record(serde_json::json!({
                            "OffenderNumber": "P-1", "Offense": "BURGLARY 3RD",
                            "Location": "9 ELM ST", "SupervisionStatus": "Active Parole",
                        })),
                        record(serde_json::json!({
                            "OffenderNumber": "P-1", "Offense": "CRIM MISCHIEF",
                        })),
                        record(serde_json::json!({
                            "OffenderNumber": "P-1", "Offense": "BURGLARY 3RD",
                        })),
                    ],
                )
                .rows(
                    "[dbo].[Offender_Summary]",
                    vec![
                        record(serde_json::json!({
                            "OffenderNumber": "P-1", "Name": "JOHN SMITH",
                            "DateScraped": "2024-03-01",
                        })),
                        record(serde_json::json!({
                            "OffenderNumber": "P-2", "Name": "JANE SMITH",
                            "DateScraped": "2024-02-01",
                        })),
                    ],
                ),
        );
        let page = correlator(&store).search("Smith", 1, 20, None).await.unwrap();

        assert_eq!(page.results.len(), 2);
        let john = &page.results[0];
        assert_eq!(john.result_type, CorrelatedType::Parole);
        assert_eq!(john.details.as_deref(), Some("BURGLARY 3RD; CRIM MISCHIEF"));
        assert_eq!(john.location.as_deref(), Some("9 ELM ST"));
        assert_eq!(john.raw["SupervisionStatus"], "Active Parole");

        let jane = &page.results[1];
        assert_eq!(jane.result_type, CorrelatedType::Doc);

        let detail_sql = store
            .statements()
            .into_iter()
            .find(|s| s.contains("Offender_Detail"))
            .unwrap();
        assert!(detail_sql.contains("[OffenderNumber] IN ('P-1', 'P-2')"));
    }

    #[tokio::test]
    async fn empty_query_lists_recent_records() {
        let store = Arc::new(FakeStore::new().rows("[key] = 'AR'", smith_arrests(3)));
        let page = correlator(&store).search("  ", 1, 20, None).await.unwrap();
        assert_eq!(page.results.len(), 3);
        assert!(store.statements().iter().all(|s| !s.contains("LIKE")));
    }

    #[tokio::test]
    async fn offender_detail_by_number() {
        let store = Arc::new(
            FakeStore::new()
                .rows(
                    "[dbo].[Offender_Detail]",
                    vec![record(serde_json::json!({
                        "OffenderNumber": "P-1", "Offense": "DWI", "SupervisionStatus": "Probation",
                    }))],
                )
                .rows(
                    "[dbo].[Offender_Summary]",
                    vec![record(serde_json::json!({"OffenderNumber": "P-1", "Name": "JOHN SMITH"}))],
                ),
        );
        let detail = correlator(&store)
            .offender_detail("P-1")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(detail.kind, CorrelatedType::Probation);
        assert_eq!(detail.name.as_deref(), Some("JOHN SMITH"));
        assert_eq!(detail.details.len(), 1);
    }

    #[tokio::test]
    async fn offender_by_name_falls_back_to_partial_match() {
        let store = Arc::new(
            FakeStore::new()
                // Exact lookups find nothing.
                .rows("[Name] = ", Vec::new())
                .rows(
                    "[Name] LIKE",
                    vec![record(serde_json::json!({"OffenderNumber": "P-9"}))],
                )
                .rows(
                    "[dbo].[Offender_Summary] WHERE [OffenderNumber] = 'P-9'",
                    vec![record(serde_json::json!({"OffenderNumber": "P-9", "Name": "SMITH, JOHN Q"}))],
                ),
        );
        let detail = correlator(&store)
            .offender_detail_by_name("John", "Smith")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(detail.offender_number, "P-9");
        assert_eq!(detail.kind, CorrelatedType::Doc);

        let statements = store.statements();
        assert!(statements[0].contains("[Name] = 'John Smith' OR [Name] = 'Smith, John'"));
        assert!(statements[1].contains("[Name] LIKE '%John%' AND [Name] LIKE '%Smith%'"));
    }

    #[tokio::test]
    async fn offender_by_name_without_match_is_none() {
        let store = Arc::new(FakeStore::new());
        assert!(
            correlator(&store)
                .offender_detail_by_name("Nobody", "Here")
                .await
                .unwrap()
                .is_none()
        );
    }
}
