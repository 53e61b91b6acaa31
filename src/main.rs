mod cli;

use clap::Parser;
use eyre::{Result, WrapErr, eyre};
use futures::StreamExt;
use serde::Serialize;
use std::sync::Arc;

use cli::{Cli, Command};
use ipscope::api::{self, ApiResponse};
use ipscope::catalog::LATENCY_TARGETS;
use ipscope::config::Settings;
use ipscope::detect::{Detector, HttpAddressSource};
use ipscope::history::{FileStore, HistoryService};
use ipscope::lookup::{LookupRequest, LookupService};
use ipscope::measure::latency::{CATALOG_PING_GAP, CATALOG_PING_TIMEOUT};
use ipscope::measure::{DownloadProbe, HttpRoundTrip, LatencyProber, SpeedUnit, SpeedtestSession, ping_catalog};
use ipscope::pretty;
use ipscope::types::{HistoryEntry, IpVersion};

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).wrap_err("failed to serialize output")?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::default()
        .with_history_file(cli.history_file.clone())
        .with_provider_timeout(cli.provider_timeout)
        .with_log_file(cli.log_file.clone())
        .with_log_filters(cli.log_level.clone());

    if let Err(e) = ipscope::init_logging(&settings) {
        eprintln!("Warning: Failed to initialize logging: {}", e);
    }

    log::info!("================================================================================");
    log::info!("NEW IPSCOPE SESSION STARTING");
    log::info!("================================================================================");

    let history = HistoryService::new(Arc::new(FileStore::new(settings.history_file.clone())));

    match cli.command {
        Command::Lookup { ip, ip_version, save } => {
            let lookup = LookupService::from_settings(&settings).wrap_err("failed to build HTTP client")?;
            let response = api::ipinfo(&lookup, &LookupRequest::new(ip, ip_version)).await;

            if cli.json {
                print_json(&response)?;
            }
            let Some(record) = response.data else {
                return Err(eyre!(response.error.unwrap_or_default()));
            };
            if !cli.json {
                pretty::print_record(&record);
            }
            if save {
                let entry = match record.ip_version {
                    IpVersion::V4 => HistoryEntry::new(Some(record), None),
                    IpVersion::V6 => HistoryEntry::new(None, Some(record)),
                };
                history.save(&entry).await.wrap_err("failed to save history")?;
            }
        }

        Command::Detect { no_save } => {
            let client = settings.http_client().wrap_err("failed to build HTTP client")?;
            let detector = Detector::new(Box::new(HttpAddressSource::new(client)), settings.detection_timeout);
            let addresses = detector.detect().await?;
            if !cli.json {
                pretty::print_detected(&addresses);
            }
            if addresses.is_empty() {
                return Err(eyre!("no public address detected"));
            }

            let lookup = LookupService::from_settings(&settings).wrap_err("failed to build HTTP client")?;
            let (ipv4, ipv6) = futures::join!(
                async {
                    match &addresses.ipv4 {
                        Some(ip) => Some(lookup.lookup_ip(ip, Some(IpVersion::V4)).await),
                        None => None,
                    }
                },
                async {
                    match &addresses.ipv6 {
                        Some(ip) => Some(lookup.lookup_ip(ip, Some(IpVersion::V6)).await),
                        None => None,
                    }
                },
            );
            let entry = HistoryEntry::new(ipv4, ipv6);

            if cli.json {
                print_json(&ApiResponse::ok(&entry))?;
            } else {
                for record in [&entry.ipv4, &entry.ipv6].into_iter().flatten() {
                    pretty::print_record(record);
                }
            }
            if !no_save {
                history.save(&entry).await.wrap_err("failed to save history")?;
            }
        }

        Command::History { clear } => {
            if clear {
                let response = api::clear_history(&history).await;
                if cli.json {
                    print_json(&response)?;
                } else if let Some(count) = response.data {
                    println!("Cleared {} entries", count);
                }
                if let Some(error) = response.error {
                    return Err(eyre!(error));
                }
            } else {
                let response = api::history(&history).await;
                if cli.json {
                    print_json(&response)?;
                } else if let Some(entries) = &response.data {
                    pretty::print_header("History");
                    pretty::print_history(entries, chrono::Utc::now().timestamp_millis());
                }
                if let Some(error) = response.error {
                    return Err(eyre!(error));
                }
            }
        }

        Command::Ping => {
            let client = settings.http_client().wrap_err("failed to build HTTP client")?;
            let reports = ping_catalog(
                &HttpRoundTrip::head(client),
                &api::ping_targets(),
                CATALOG_PING_TIMEOUT,
                CATALOG_PING_GAP,
            )
            .await;
            if cli.json {
                print_json(&reports)?;
            } else {
                pretty::print_header("Connectivity");
                pretty::print_ping_reports(&reports);
            }
        }

        Command::Speedtest { server, unit } => {
            let unit: SpeedUnit = unit.parse()?;
            let client = settings.http_client().wrap_err("failed to build HTTP client")?;
            let download = DownloadProbe::new(client.clone(), settings.download_timeout);
            let latency = LatencyProber::new(
                Arc::new(HttpRoundTrip::get(client)),
                LATENCY_TARGETS.iter().map(|t| t.to_string()).collect(),
                settings.latency_timeout,
                settings.probe_gap,
            );

            let mut session = SpeedtestSession::new(server.as_deref(), unit);
            let cancel = session.cancel_handle();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    log::info!("[main] ctrl_c: cancelling speedtest");
                    cancel.cancel();
                }
            });

            let mut samples = session.samples();
            let live = !cli.json;
            let printer = tokio::spawn(async move {
                while let Some(sample) = samples.next().await {
                    if live {
                        eprint!("\r{:>6.1}s  {}      ", sample.time, pretty::format_speed(sample.speed, unit));
                    }
                }
                if live {
                    eprintln!();
                }
            });

            if !cli.json {
                pretty::print_header(&format!("Speedtest: {}", session.server().name));
            }
            let result = session.run(&download, &latency).await;
            let _ = printer.await;

            let report = result?;
            if cli.json {
                print_json(&report)?;
            } else {
                pretty::print_speedtest(&report, session.window(), session.unit());
            }
        }

        Command::Servers { url_for: Some(id) } => {
            let target = api::speedtest_url(Some(&id));
            if cli.json {
                print_json(&target)?;
            } else {
                pretty::print_speedtest_url(&target);
            }
        }

        Command::Servers { url_for: None } => {
            let listing = api::speedtest_servers();
            if cli.json {
                print_json(&listing)?;
            } else {
                pretty::print_servers(&listing);
            }
        }
    }

    Ok(())
}
