use crate::api::{ServerListing, SpeedtestUrl};
use crate::detect::DetectedAddresses;
use crate::measure::{PingGrade, PingReport, SpeedUnit, SpeedWindow, SpeedtestReport};
use crate::types::{HistoryEntry, IpVersion, NormalizedIpRecord, Sources};
use std::time::Duration;

const SEPARATOR_WIDTH: usize = 80;
const SECONDS_PER_MINUTE: u64 = 60;
const SECONDS_PER_HOUR: u64 = 3600;
const SECONDS_PER_DAY: u64 = 86_400;
const SPARK_LEVELS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

pub fn print_separator() {
    println!("{}", "─".repeat(SEPARATOR_WIDTH));
}

pub fn print_header(title: &str) {
    println!("🎯 {}", title);
    print_separator();
}

pub fn print_record(record: &NormalizedIpRecord) {
    let native = if record.is_native { ", native" } else { "" };
    println!("🌐 {} {}", record.ip_version, record.ip);
    println!("  ├─ Location: {}", format_location(record));
    println!("  ├─ Network:  {} - {} ({})", record.asn, record.org, record.isp);
    println!("  ├─ Type:     {}{}", record.ip_type, native);
    println!("  ├─ Timezone: {} ({:+}s)", record.timezone, record.offset);

    let flags = format_flags(record);
    if !flags.is_empty() {
        println!("  ├─ Flags:    {}", flags);
    }
    println!("  └─ Sources:  {}", format_sources(&record.sources));
}

pub fn print_detected(addresses: &DetectedAddresses) {
    let show = |version: IpVersion, address: &Option<String>| match address {
        Some(address) => println!("✅ {}: {}", version, address),
        None => println!("❌ {}: not detected", version),
    };
    show(IpVersion::V4, &addresses.ipv4);
    show(IpVersion::V6, &addresses.ipv6);
}

pub fn print_history(entries: &[HistoryEntry], now_millis: i64) {
    if entries.is_empty() {
        println!("No history");
        return;
    }

    for entry in entries {
        let age = Duration::from_millis(now_millis.saturating_sub(entry.timestamp).max(0) as u64);
        println!("🕒 {} ago", format_duration(age));
        for record in [&entry.ipv4, &entry.ipv6].into_iter().flatten() {
            println!("  ├─ {} {} - {} ({})", record.ip_version, record.ip, format_location(record), record.ip_type);
        }
    }
}

pub fn print_ping_reports(reports: &[PingReport]) {
    for report in reports {
        let icon = match report.grade {
            PingGrade::Good => "🟢",
            PingGrade::Fair => "🟡",
            PingGrade::Slow => "🟠",
            PingGrade::Unreachable => "🔴",
        };
        match report.latency_ms {
            Some(ms) => println!("{} {} ({}): {}ms", icon, report.name, report.host, ms),
            None => println!("{} {} ({}): unreachable", icon, report.name, report.host),
        }
    }
}

pub fn print_speedtest(report: &SpeedtestReport, window: &SpeedWindow, unit: SpeedUnit) {
    if report.simulated {
        println!("⚠️  Simulated result: {}", report.failure.as_deref().unwrap_or("measurement failed"));
    }
    println!("Server:   {}", report.server);
    println!("Download: {}", format_speed(report.download, unit));
    println!("Upload:   {} (simulated)", format_speed(report.upload.speed, unit));
    let fallback = if report.latency.measured { "" } else { " (fallback)" };
    println!("Latency:  {}ms, jitter {}ms{}", report.latency.average, report.latency.jitter, fallback);
    if !window.is_empty() {
        println!("Curve:    {}", render_sparkline(window));
    }
}

pub fn print_servers(listing: &ServerListing) {
    for server in &listing.servers {
        println!("{:<12} {:<12} {} MiB", server.id, server.name, server.size / (1024 * 1024));
    }
}

pub fn print_speedtest_url(target: &SpeedtestUrl) {
    println!("{} ({} MiB): {}", target.name, target.size / (1024 * 1024), target.url);
}

pub fn format_speed(mbps: f64, unit: SpeedUnit) -> String {
    format!("{:.2} {}", unit.convert(mbps), unit.label())
}

fn format_location(record: &NormalizedIpRecord) -> String {
    [record.city.as_str(), record.region.as_str(), record.country.as_str()]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_flags(record: &NormalizedIpRecord) -> String {
    [
        (record.is_bogon, "bogon"),
        (record.is_mobile, "mobile"),
        (record.is_proxy, "proxy"),
        (record.is_crawler, "crawler"),
    ]
    .into_iter()
    .filter_map(|(set, name)| set.then_some(name))
    .collect::<Vec<_>>()
    .join(", ")
}

fn format_sources(sources: &Sources) -> String {
    let mark = |ok: bool| if ok { "✓" } else { "✗" };
    format!(
        "api.ip.sb {} ip-api.com {} freeipapi.com {}",
        mark(sources.ip_sb),
        mark(sources.ip_api),
        mark(sources.freeipapi)
    )
}

/// One block character per sample, scaled between the window's min and max.
pub fn render_sparkline(window: &SpeedWindow) -> String {
    let Some((min, max)) = window.bounds() else {
        return String::new();
    };
    let span = max - min;
    let top = SPARK_LEVELS.len() - 1;

    window
        .points()
        .map(|p| {
            if span <= f64::EPSILON {
                SPARK_LEVELS[top]
            } else {
                let level = ((p.speed - min) / span * top as f64).round() as usize;
                SPARK_LEVELS[level.min(top)]
            }
        })
        .collect()
}

fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();

    if total_secs < SECONDS_PER_MINUTE {
        format!("{}s", total_secs)
    } else if total_secs < SECONDS_PER_HOUR {
        format!("{}m{}s", total_secs / SECONDS_PER_MINUTE, total_secs % SECONDS_PER_MINUTE)
    } else if total_secs < SECONDS_PER_DAY {
        let hours = total_secs / SECONDS_PER_HOUR;
        let minutes = (total_secs % SECONDS_PER_HOUR) / SECONDS_PER_MINUTE;
        format!("{}h{}m", hours, minutes)
    } else {
        format!("{}d{}h", total_secs / SECONDS_PER_DAY, (total_secs % SECONDS_PER_DAY) / SECONDS_PER_HOUR)
    }
}
