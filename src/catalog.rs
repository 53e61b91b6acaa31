use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetCategory {
    Domestic,
    Blocked,
    Accessible,
}

#[derive(Debug, Clone, Serialize)]
pub struct PingTarget {
    pub host: &'static str,
    pub name: &'static str,
    #[serde(rename = "type")]
    pub category: TargetCategory,
}

const fn target(host: &'static str, name: &'static str, category: TargetCategory) -> PingTarget {
    PingTarget { host, name, category }
}

/// Connectivity-check targets, grouped the way they are reported.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PingTargets {
    pub domestic: Vec<PingTarget>,
    pub blocked_foreign: Vec<PingTarget>,
    pub accessible_foreign: Vec<PingTarget>,
}

impl PingTargets {
    /// Probe order: domestic, then reachable foreign sites, then usually-blocked ones.
    pub fn in_probe_order(&self) -> impl Iterator<Item = &PingTarget> {
        self.domestic
            .iter()
            .chain(self.accessible_foreign.iter())
            .chain(self.blocked_foreign.iter())
    }
}

impl Default for PingTargets {
    fn default() -> Self {
        use TargetCategory::*;
        Self {
            domestic: vec![
                target("www.baidu.com", "Baidu", Domestic),
                target("www.aliyun.com", "Aliyun", Domestic),
                target("cloud.tencent.com", "Tencent Cloud", Domestic),
            ],
            blocked_foreign: vec![
                target("www.google.com", "Google", Blocked),
                target("www.facebook.com", "Facebook", Blocked),
                target("twitter.com", "Twitter", Blocked),
            ],
            accessible_foreign: vec![
                target("www.cloudflare.com", "Cloudflare", Accessible),
                target("github.com", "GitHub", Accessible),
            ],
        }
    }
}

/// Hosts timed by the latency/jitter probe.
pub const LATENCY_TARGETS: [&str; 3] = ["1.1.1.1", "8.8.8.8", "9.9.9.9"];

const TEST_FILE_SIZE: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpeedtestServer {
    pub id: &'static str,
    pub name: &'static str,
    pub url: &'static str,
    pub size: u64,
}

pub const SPEEDTEST_SERVERS: [SpeedtestServer; 3] = [
    SpeedtestServer {
        id: "cloudflare",
        name: "Cloudflare",
        url: "https://speed.cloudflare.com/__down?bytes=10485760",
        size: TEST_FILE_SIZE,
    },
    SpeedtestServer {
        id: "ovh",
        name: "OVH Network",
        url: "https://proof.ovh.net/files/10Mb.dat",
        size: TEST_FILE_SIZE,
    },
    SpeedtestServer {
        id: "speedtest",
        name: "Speedtest Closest",
        url: "https://speedtest.sjc01.softlayer.com/downloads/test10.zip",
        size: TEST_FILE_SIZE,
    },
];

/// Look up a server by id; unknown or missing ids get the first server.
pub fn find_server(id: Option<&str>) -> &'static SpeedtestServer {
    id.and_then(|id| SPEEDTEST_SERVERS.iter().find(|s| s.id == id))
        .unwrap_or(&SPEEDTEST_SERVERS[0])
}
