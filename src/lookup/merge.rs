use super::classify;
use super::fields::{self, ProviderResponses};
use crate::types::{IpVersion, NormalizedIpRecord, Sources, UNKNOWN};

/// Merge up to three provider payloads into one record.
///
/// Pure over its inputs apart from stamping the merge time. A provider that
/// failed contributes nothing but a `false` in `sources`; when every provider
/// failed the result is a fully defaulted record.
pub fn merge(ip: &str, version_hint: Option<IpVersion>, responses: &ProviderResponses) -> NormalizedIpRecord {
    merge_at(ip, version_hint, responses, chrono::Utc::now().timestamp_millis())
}

pub fn merge_at(
    ip: &str,
    version_hint: Option<IpVersion>,
    responses: &ProviderResponses,
    timestamp: i64,
) -> NormalizedIpRecord {
    let sources = Sources {
        ip_sb: responses.ip_sb.is_some(),
        ip_api: responses.ip_api.is_some(),
        freeipapi: responses.freeipapi.is_some(),
    };

    log::debug!("[lookup::merge] merge: ip={} hint={:?} answered={}", ip, version_hint, sources.answered());

    NormalizedIpRecord {
        ip: ip.to_string(),
        ip_version: version_hint.unwrap_or_else(|| IpVersion::infer(ip)),
        country: responses.string_or(&fields::COUNTRY, UNKNOWN),
        country_code: responses.string_or(&fields::COUNTRY_CODE, ""),
        region: responses.string_or(&fields::REGION, UNKNOWN),
        region_code: responses.string_or(&fields::REGION_CODE, ""),
        city: responses.string_or(&fields::CITY, UNKNOWN),
        latitude: responses.number_or(&fields::LATITUDE, 0.0),
        longitude: responses.number_or(&fields::LONGITUDE, 0.0),
        isp: responses.string_or(&fields::ISP, UNKNOWN),
        asn: responses.string_or(&fields::ASN, UNKNOWN),
        org: responses.string_or(&fields::ORG, UNKNOWN),
        timezone: responses.string_or(&fields::TIMEZONE, UNKNOWN),
        offset: responses.number_or(&fields::OFFSET, 0.0).round() as i64,
        is_bogon: responses.flag(&fields::BOGON),
        is_mobile: responses.flag(&fields::MOBILE),
        is_proxy: responses.flag(&fields::PROXY),
        is_crawler: responses.flag(&fields::CRAWLER),
        ip_type: classify::classify(responses),
        is_native: classify::is_native(responses),
        sources,
        timestamp,
    }
}
