//! Arrestees who already have a corrections case.
//!
//! Recent arrests are joined to the corrections summary table on the
//! arrestee's full name (`first middle last`, compared case-insensitively).
//! Each match carries every case number filed under that name and the
//! distinct offenses recorded against those cases.

use std::collections::{BTreeMap, BTreeSet};

use blotter_incident_models::{
    CorrelatedResult, SourceRecord, SourceType, field_text, join_text,
};
use blotter_source::SourceDefinition;
use blotter_sql::select::MAX_ROWS;
use blotter_sql::{Filter, SelectQuery};
use futures::future::{join_all, try_join_all};
use serde::Serialize;

use crate::correlate::Correlator;
use crate::{AggregateError, clamp_page};

/// Values per `IN (...)` list.
const LOOKUP_BATCH: usize = 200;

/// An arrest whose arrestee matches a corrections case by name.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reoffender {
    /// The arrest.
    #[serde(flatten)]
    pub arrest: CorrelatedResult,
    /// Case numbers filed under the arrestee's name, sorted.
    pub offender_numbers: Vec<String>,
    /// Distinct offenses across those cases, sorted.
    pub original_offenses: Vec<String>,
}

/// One page of [`Correlator::reoffenders`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReoffenderPage {
    /// Matches on this page, newest arrest first.
    pub records: Vec<Reoffender>,
    /// Whether more matches follow.
    pub has_more: bool,
    /// Effective page number.
    pub page: u32,
    /// Effective page size.
    pub page_size: u32,
}

fn name_key(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

impl Correlator {
    fn arrest_source(&self) -> Result<(&SourceDefinition, &[String]), AggregateError> {
        self.sources
            .iter()
            .filter(|source| source.source_type == SourceType::Arrest)
            .find_map(|source| {
                let parts = &source.person.as_ref()?.name_parts;
                (!parts.is_empty()).then_some((source, parts.as_slice()))
            })
            .ok_or_else(|| AggregateError::UnknownSource {
                id: SourceType::Arrest.to_string(),
            })
    }

    /// Rows of `table` whose `columns[0]` is one of `values`, fetched in
    /// batches.
    async fn select_in(
        &self,
        table: &str,
        columns: [&str; 2],
        values: &BTreeSet<&str>,
        also: Option<&Filter>,
    ) -> Result<Vec<SourceRecord>, AggregateError> {
        let values: Vec<&str> = values.iter().copied().collect();
        let queries: Vec<SelectQuery> = values
            .chunks(LOOKUP_BATCH)
            .map(|batch| {
                SelectQuery::table(table)
                    .columns(columns)
                    .filter(Filter::is_in(columns[0], batch.iter().copied()))
                    .filter_opt(also.cloned())
                    .top(Some(MAX_ROWS))
            })
            .collect();

        let batches = try_join_all(queries.iter().map(|q| self.client.select(q))).await?;
        Ok(batches.into_iter().flatten().collect())
    }

    /// Lists recent arrests of people with a corrections case on file,
    /// newest first.
    ///
    /// Identical arrest rows (same name, charge, time and location) are
    /// reported once.
    ///
    /// # Errors
    ///
    /// Returns [`AggregateError::UnknownSource`] if no arrest source with
    /// split names or no corrections source with a detail table is
    /// configured, or any upstream error.
    pub async fn reoffenders(
        &self,
        page: u32,
        page_size: u32,
    ) -> Result<ReoffenderPage, AggregateError> {
        let (page, page_size) = clamp_page(page, page_size);
        let (arrests, name_parts) = self.arrest_source()?;
        let (cases, case_column, detail) = self.case_source()?;
        let unconfigured = || AggregateError::UnknownSource {
            id: cases.id.clone(),
        };
        let summary_name = cases
            .person
            .as_ref()
            .and_then(|p| p.full_name.as_deref())
            .ok_or_else(unconfigured)?;
        let offense_column = detail.details.first().ok_or_else(unconfigured)?;

        let rows = self
            .client
            .select(&arrests.base_query()?.top(Some(self.fetch_cap)))
            .await?;
        let keyed: Vec<(String, SourceRecord)> = rows
            .into_iter()
            .filter_map(|row| Some((name_key(&join_text(&row, name_parts, " ")?), row)))
            .collect();

        let names: BTreeSet<&str> = keyed.iter().map(|(key, _)| key.as_str()).collect();
        let name_count = names.len();
        let mut numbers_by_name: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for row in self
            .select_in(&cases.table, [summary_name, case_column], &names, None)
            .await?
        {
            if let (Some(name), Some(number)) =
                (field_text(&row, summary_name), field_text(&row, case_column))
            {
                numbers_by_name
                    .entry(name_key(&name))
                    .or_default()
                    .insert(number);
            }
        }

        let numbers: BTreeSet<&str> = numbers_by_name
            .values()
            .flatten()
            .map(String::as_str)
            .collect();
        let has_offense = Filter::IsNull {
            column: offense_column.clone(),
            negated: true,
        };
        let mut offenses: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for row in self
            .select_in(
                &detail.table,
                [detail.key.as_str(), offense_column.as_str()],
                &numbers,
                Some(&has_offense),
            )
            .await?
        {
            if let (Some(number), Some(offense)) =
                (field_text(&row, &detail.key), field_text(&row, offense_column))
            {
                offenses.entry(number).or_default().insert(offense);
            }
        }

        let mut seen = BTreeSet::new();
        let mut matches = Vec::new();
        for (key, row) in keyed {
            let Some(case_numbers) = numbers_by_name.get(&key) else {
                continue;
            };
            let arrest = arrests.to_correlated(row, None);
            let identity = (
                arrest.name.clone(),
                arrest.details.clone(),
                arrest.date,
                arrest.location.clone(),
            );
            if !seen.insert(identity) {
                continue;
            }

            let original_offenses: BTreeSet<&String> = case_numbers
                .iter()
                .filter_map(|number| offenses.get(number))
                .flatten()
                .collect();
            matches.push(Reoffender {
                arrest,
                offender_numbers: case_numbers.iter().cloned().collect(),
                original_offenses: original_offenses.into_iter().cloned().collect(),
            });
        }

        log::debug!(
            "Reoffenders: {} arrests match a case across {name_count} arrestee names",
            matches.len()
        );

        let start = usize::try_from((u64::from(page) - 1) * u64::from(page_size))
            .unwrap_or(usize::MAX);
        let size = usize::try_from(page_size).unwrap_or(usize::MAX);
        let has_more = matches.len() > start.saturating_add(size);
        let mut records: Vec<Reoffender> = matches.into_iter().skip(start).take(size).collect();

        let coordinates = join_all(
            records
                .iter()
                .map(|r| self.resolver.resolve(&r.arrest.raw)),
        )
        .await;
        for (record, coordinate) in records.iter_mut().zip(coordinates) {
            record.arrest.coordinate = coordinate;
        }

        Ok(ReoffenderPage {
            records,
            has_more,
            page,
            page_size,
        })
    }
}
