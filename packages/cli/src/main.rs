#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Operator CLI for blotter.
//!
//! Runs the same flows as the gateway against the configured upstream
//! store and prints the results as JSON. Configuration is read exactly as
//! the gateway reads it (`BLOTTER_CONFIG` plus environment overrides).

use std::collections::BTreeMap;

use blotter_aggregate::{DEFAULT_PAGE_SIZE, IncidentOptions, ProximityOptions};
use blotter_geocoder::normalize_location;
use blotter_server::{AppState, ServerConfig, geocoding_service};
use blotter_sql::{Filter, OrderBy};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;

/// Query public-safety records across every configured source.
#[derive(Parser)]
#[command(name = "blotter_cli")]
#[command(about = "Query public-safety records across every configured source")]
struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand)]
enum Commands {
    /// List upstream tables.
    Tables,

    /// Describe a table's columns.
    Schema {
        /// Table name.
        table: String,
    },

    /// Run a guarded `SELECT TOP` against one table.
    Query {
        /// Table name.
        table: String,

        /// Comma-separated columns (default: all).
        #[arg(long)]
        columns: Option<String>,

        /// Filter expression, e.g. `nature = 'ALARM' AND id > 10`.
        #[arg(long)]
        filter: Option<String>,

        /// Order, e.g. `starttime DESC`.
        #[arg(long)]
        order_by: Option<String>,

        /// Row limit.
        #[arg(long)]
        limit: Option<u32>,
    },

    /// Merged incident feed.
    Incidents {
        /// Limit for every source without its own.
        #[arg(long)]
        limit: Option<u32>,

        /// Per-source limit as `source_id=N`. Repeatable.
        #[arg(long = "source-limit", value_parser = parse_source_limit)]
        source_limits: Vec<(String, u32)>,

        /// First day (`YYYY-MM-DD`).
        #[arg(long)]
        from: Option<NaiveDate>,

        /// Last day (`YYYY-MM-DD`).
        #[arg(long)]
        to: Option<NaiveDate>,

        /// Filter expression applied to every source.
        #[arg(long)]
        filter: Option<String>,
    },

    /// Recent dispatch calls near an address.
    Proximity {
        /// Center address.
        address: String,

        /// Days back to search.
        #[arg(long, default_value_t = 7)]
        days: u32,

        /// Substring of the call nature.
        #[arg(long)]
        nature: Option<String>,

        /// Radius in feet.
        #[arg(long, default_value_t = 1000.0)]
        distance: f64,
    },

    /// Search every person source by name.
    Search {
        /// Name, e.g. `John Smith` or `Smith, John`.
        #[arg(num_args = 1..)]
        name: Vec<String>,

        /// 1-based page.
        #[arg(long, default_value_t = 1)]
        page: u32,

        /// Rows per page.
        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        page_size: u32,
    },

    /// Show a corrections case file.
    Offender {
        /// Offender number.
        #[arg(long, conflicts_with_all = ["first", "last"])]
        number: Option<String>,

        /// First name.
        #[arg(long)]
        first: Option<String>,

        /// Last name.
        #[arg(long)]
        last: Option<String>,
    },

    /// Recent arrestees with a corrections case under the same name.
    Reoffenders {
        /// 1-based page.
        #[arg(long, default_value_t = 1)]
        page: u32,

        /// Rows per page.
        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        page_size: u32,
    },

    /// Page through one source, newest first.
    Records {
        /// Source id (e.g. `jail`).
        source: String,

        /// 1-based page.
        #[arg(long, default_value_t = 1)]
        page: u32,

        /// Rows per page.
        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        page_size: u32,
    },

    /// Geocode an address through the cache.
    Geocode {
        /// Address words.
        #[arg(num_args = 1..)]
        address: Vec<String>,
    },

    /// Start the HTTP gateway.
    Serve,
}

fn parse_source_limit(text: &str) -> Result<(String, u32), String> {
    let (id, limit) = text
        .split_once('=')
        .ok_or_else(|| format!("expected source_id=N, got {text:?}"))?;
    let limit = limit
        .trim()
        .parse()
        .map_err(|e| format!("invalid limit in {text:?}: {e}"))?;
    Ok((id.trim().to_string(), limit))
}

fn parse_filter(text: Option<&str>) -> Result<Option<Filter>, blotter_sql::SqlError> {
    text.map(str::trim)
        .filter(|t| !t.is_empty())
        .map(Filter::parse)
        .transpose()
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[allow(clippy::too_many_lines)]
async fn run(state: &AppState, command: Commands) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Tables => print_json(&state.client.list_tables().await?),
        Commands::Schema { table } => print_json(&state.client.schema(&table).await?),
        Commands::Query {
            table,
            columns,
            filter,
            order_by,
            limit,
        } => {
            let columns: Vec<String> = columns
                .as_deref()
                .map(|c| {
                    c.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            let filter = parse_filter(filter.as_deref())?;
            let order_by = order_by
                .as_deref()
                .map(OrderBy::parse_list)
                .transpose()?
                .unwrap_or_default();
            let rows = state
                .client
                .query(&table, &columns, filter.as_ref(), &order_by, limit)
                .await?;
            print_json(&rows)
        }
        Commands::Incidents {
            limit,
            source_limits,
            from,
            to,
            filter,
        } => {
            let options = IncidentOptions {
                limits: source_limits.into_iter().collect::<BTreeMap<_, _>>(),
                default_limit: limit,
                date_from: from,
                date_to: to,
                filter: parse_filter(filter.as_deref())?,
                radius: None,
            };
            let feed = state.orchestrator.get_incidents(&options).await?;
            for id in &feed.failed_sources {
                log::warn!("Source {id} failed; its rows are missing");
            }
            print_json(&feed)
        }
        Commands::Proximity {
            address,
            days,
            nature,
            distance,
        } => {
            let options = ProximityOptions {
                days,
                nature,
                distance_ft: distance,
                ..ProximityOptions::new(address)
            };
            print_json(&state.orchestrator.proximity(&options).await?)
        }
        Commands::Search {
            name,
            page,
            page_size,
        } => {
            let page = state
                .correlator
                .search(&name.join(" "), page, page_size, None)
                .await?;
            print_json(&page)
        }
        Commands::Offender {
            number,
            first,
            last,
        } => {
            let detail = match number {
                Some(number) => state.correlator.offender_detail(&number).await?,
                None => {
                    state
                        .correlator
                        .offender_detail_by_name(
                            first.as_deref().unwrap_or_default(),
                            last.as_deref().unwrap_or_default(),
                        )
                        .await?
                }
            };
            if detail.is_none() {
                log::warn!("No matching offender");
            }
            print_json(&detail)
        }
        Commands::Reoffenders { page, page_size } => {
            print_json(&state.correlator.reoffenders(page, page_size).await?)
        }
        Commands::Records {
            source,
            page,
            page_size,
        } => print_json(
            &state
                .orchestrator
                .list_records(&source, page, page_size)
                .await?,
        ),
        Commands::Geocode { address } => {
            let query = normalize_location(&address.join(" "), &state.locality)
                .ok_or("not a geocodable address")?;
            log::info!("Geocoding {query:?}");
            print_json(&state.geocoder.lookup(&query).await)
        }
        Commands::Serve => Err("serve runs on its own runtime".into()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if matches!(cli.command, Commands::Serve) {
        // The server uses actix-web's runtime, so it runs on a blocking
        // thread rather than nesting inside this one.
        tokio::task::spawn_blocking(|| {
            actix_web::rt::System::new().block_on(blotter_server::run_server())
        })
        .await??;
        return Ok(());
    }

    pretty_env_logger::init_custom_env("RUST_LOG");

    let config = ServerConfig::load()?;
    let service = geocoding_service(&config)?;
    let state = AppState::from_config(&config, &service)?;

    run(&state, cli.command).await
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn source_limits_parse() {
        assert_eq!(
            parse_source_limit("dispatch=25").unwrap(),
            ("dispatch".to_string(), 25)
        );
        assert!(parse_source_limit("dispatch").is_err());
        assert!(parse_source_limit("dispatch=many").is_err());
    }

    #[test]
    fn incidents_arguments() {
        let cli = Cli::try_parse_from([
            "blotter_cli",
            "incidents",
            "--source-limit",
            "arrests=5",
            "--source-limit",
            "dispatch=2",
            "--from",
            "2024-01-01",
        ])
        .unwrap();

        let Commands::Incidents {
            source_limits,
            from,
            ..
        } = cli.command
        else {
            panic!("expected incidents");
        };
        assert_eq!(source_limits.len(), 2);
        assert_eq!(from, NaiveDate::from_ymd_opt(2024, 1, 1));
    }

    #[test]
    fn search_joins_name_words() {
        let cli = Cli::try_parse_from(["blotter_cli", "search", "John", "Smith", "--page", "2"])
            .unwrap();
        let Commands::Search { name, page, .. } = cli.command else {
            panic!("expected search");
        };
        assert_eq!(name.join(" "), "John Smith");
        assert_eq!(page, 2);
    }

    #[test]
    fn offender_number_conflicts_with_names() {
        assert!(
            Cli::try_parse_from(["blotter_cli", "offender", "--number", "1", "--last", "X"])
                .is_err()
        );
    }

    #[test]
    fn reoffenders_paging_arguments() {
        let cli = Cli::try_parse_from(["blotter_cli", "reoffenders", "--page-size", "5"]).unwrap();
        let Commands::Reoffenders { page, page_size } = cli.command else {
            panic!("expected reoffenders");
        };
        assert_eq!((page, page_size), (1, 5));
    }

    #[test]
    fn blank_filter_is_none() {
        assert!(parse_filter(Some("  ")).unwrap().is_none());
        assert!(parse_filter(Some("nature = 'ALARM'")).unwrap().is_some());
        assert!(parse_filter(Some("nature; DROP")).is_err());
    }
}
