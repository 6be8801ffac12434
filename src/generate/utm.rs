//! UTM parameter merging for promoted links.

use url::form_urlencoded;

/// UTM parameters to apply to a content link.
///
/// `configured` is the `UTM_PARAMS` setting, with or without a leading `?`.
/// A per-content `campaign` overrides any configured `utm_campaign`.
#[must_use]
pub fn desired_utms(configured: &str, campaign: Option<&str>) -> Vec<(String, String)> {
    let configured = configured.trim();
    let configured = configured.strip_prefix('?').unwrap_or(configured);

    let mut params: Vec<(String, String)> = Vec::new();
    for (key, value) in form_urlencoded::parse(configured.as_bytes()) {
        if value.is_empty() {
            continue;
        }
        upsert(&mut params, &key, &value);
    }

    if let Some(campaign) = campaign.map(str::trim).filter(|c| !c.is_empty()) {
        upsert(&mut params, "utm_campaign", campaign);
    }
    params
}

/// Merge `desired` UTM parameters into `url`.
///
/// Non-UTM parameters keep their order and come first. UTM parameters already
/// on the URL are kept unless `desired` sets the same key. The result has
/// exactly one `?`.
#[must_use]
pub fn apply_utms(url: &str, desired: &[(String, String)]) -> String {
    if desired.is_empty() {
        return url.to_string();
    }

    let (without_fragment, fragment) = match url.split_once('#') {
        Some((head, fragment)) => (head, Some(fragment)),
        None => (url, None),
    };
    let (base, query) = without_fragment
        .split_once('?')
        .unwrap_or((without_fragment, ""));

    // Non-UTM segments are copied byte for byte
    let mut other: Vec<&str> = Vec::new();
    let mut utms: Vec<(String, String)> = Vec::new();
    for segment in query.split('&').filter(|s| !s.is_empty()) {
        match form_urlencoded::parse(segment.as_bytes()).next() {
            Some((key, value)) if key.starts_with("utm_") => upsert(&mut utms, &key, &value),
            _ => other.push(segment),
        }
    }
    for (key, value) in desired {
        upsert(&mut utms, key, value);
    }

    let mut out = base.to_string();
    out.push('?');
    if !other.is_empty() {
        out.push_str(&other.join("&"));
        out.push('&');
    }
    out.push_str(&encode(&utms));
    if let Some(fragment) = fragment {
        out.push('#');
        out.push_str(fragment);
    }
    out
}

fn upsert(params: &mut Vec<(String, String)>, key: &str, value: &str) {
    if let Some(existing) = params.iter_mut().find(|(k, _)| k == key) {
        existing.1 = value.to_string();
    } else {
        params.push((key.to_string(), value.to_string()));
    }
}

fn encode(params: &[(String, String)]) -> String {
    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params)
        .finish()
}
