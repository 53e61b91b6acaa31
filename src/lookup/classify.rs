use super::fields::{self, ProviderResponses};
use crate::types::IpType;

const DATACENTER_MARKERS: [&str; 3] = ["cloud", "data center", "datacenter"];
const PROXY_MARKER: &str = "proxy";
const NATIVE_COUNTRY_NAME: &str = "China";
const NATIVE_COUNTRY_CODE: &str = "CN";

/// Lower-cased organization and ISP strings, resolved in field precedence order.
fn network_names(responses: &ProviderResponses) -> [String; 2] {
    [
        responses.string(&fields::ORG).unwrap_or_default().to_lowercase(),
        responses.string(&fields::ISP).unwrap_or_default().to_lowercase(),
    ]
}

fn looks_like_datacenter(names: &[String; 2]) -> bool {
    names
        .iter()
        .any(|name| DATACENTER_MARKERS.iter().any(|marker| name.contains(marker)))
}

/// Classify the address. Rules are evaluated in priority order and the first match wins.
pub fn classify(responses: &ProviderResponses) -> IpType {
    let ip_api = responses.ip_api.as_ref();
    let freeipapi = responses.freeipapi.as_ref();

    if ProviderResponses::provider_flag(ip_api, "hosting") {
        return IpType::Datacenter;
    }
    if ProviderResponses::provider_flag(ip_api, "proxy") {
        return IpType::Proxy;
    }

    if let Some(reported) = ProviderResponses::provider_string(responses.ip_sb.as_ref(), "type") {
        return IpType::Reported(reported);
    }
    if let Some(reported) = ProviderResponses::provider_string(freeipapi, "proxyType") {
        return IpType::Reported(reported);
    }

    let names = network_names(responses);
    if looks_like_datacenter(&names) {
        return IpType::Datacenter;
    }

    if names.iter().any(|name| name.contains(PROXY_MARKER))
        || ProviderResponses::provider_flag(freeipapi, "isProxy")
        || ProviderResponses::provider_flag(freeipapi, "isCrawler")
    {
        return IpType::Proxy;
    }

    if ProviderResponses::provider_flag(ip_api, "mobile") {
        return IpType::Mobile;
    }

    IpType::Residential
}

/// Native-IP heuristic. Only Chinese addresses outside cloud, hosting and
/// proxy networks qualify; every other country is non-native.
pub fn is_native(responses: &ProviderResponses) -> bool {
    let named_china = responses
        .string(&fields::COUNTRY)
        .is_some_and(|country| country == NATIVE_COUNTRY_NAME || country == NATIVE_COUNTRY_CODE);
    let coded_china = responses
        .string(&fields::COUNTRY_CODE)
        .is_some_and(|code| code.eq_ignore_ascii_case(NATIVE_COUNTRY_CODE));
    let in_china = named_china || coded_china;
    if !in_china {
        return false;
    }

    let ip_api = responses.ip_api.as_ref();
    !(looks_like_datacenter(&network_names(responses))
        || ProviderResponses::provider_flag(ip_api, "proxy")
        || ProviderResponses::provider_flag(ip_api, "hosting")
        || ProviderResponses::provider_flag(responses.freeipapi.as_ref(), "isProxy"))
}
