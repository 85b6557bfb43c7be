//! Pure URL canonicalization.
//!
//! Middleman sites wrap course links in affiliate redirects and tack tracking
//! parameters onto everything. `normalize` unwraps the redirect, keeps only
//! the discount-code parameter, and cleans up mangled paths so that string
//! equality on the output is a usable dedup key. No I/O, never fails:
//! malformed input comes back unchanged.

use url::Url;

/// Query parameter carrying the discount code; the only one kept.
pub const COUPON_PARAM: &str = "couponCode";

/// Redirect-wrapper parameters whose value is the real destination.
const REDIRECT_PARAMS: &[&str] = &["u", "murl"];

/// Tracking parameters are stripped by name prefix.
const TRACKING_PREFIXES: &[&str] = &["utm_", "im_"];

/// Plus well-known exact names, including the LinkSynergy affiliate triple.
/// Exact matches, so an unrelated parameter like `range` survives.
const TRACKING_EXACT: &[&str] = &[
    "ref", "gclid", "fbclid", "mc_cid", "mc_eid", "ranMID", "ranEAID", "ranSiteID",
];

/// Unwrapping depth guard; redirect wrappers are never nested deeper in
/// practice, and a cycle of `u=` params must not loop forever.
const MAX_UNWRAP_DEPTH: usize = 4;

/// Canonicalize a URL. Idempotent: `normalize(normalize(x)) == normalize(x)`.
pub fn normalize(raw: &str) -> String {
    let trimmed = raw.trim();
    let mut url = match Url::parse(trimmed) {
        Ok(u) => u,
        Err(_) => return trimmed.to_string(),
    };

    // Step 1: substitute the embedded destination of an affiliate redirect.
    for _ in 0..MAX_UNWRAP_DEPTH {
        match embedded_redirect(&url) {
            Some(inner) => url = inner,
            None => break,
        }
    }

    // Step 2/3: keep only the coupon parameter, drop everything else.
    let coupon = url
        .query_pairs()
        .find(|(name, _)| name == COUPON_PARAM)
        .map(|(_, value)| value.into_owned());
    match coupon {
        Some(code) => {
            url.set_query(None);
            url.query_pairs_mut().append_pair(COUPON_PARAM, &code);
        }
        None => url.set_query(None),
    }
    url.set_fragment(None);

    // Step 4: collapse duplicate separators and empty segments that source
    // HTML sometimes introduces.
    let cleaned: Vec<&str> = url
        .path()
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect();
    let path = if cleaned.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", cleaned.join("/"))
    };
    url.set_path(&path);

    url.to_string()
}

/// Extract the inner URL of a redirect wrapper, if the URL carries one.
fn embedded_redirect(url: &Url) -> Option<Url> {
    for (name, value) in url.query_pairs() {
        if REDIRECT_PARAMS.contains(&name.as_ref()) {
            if let Ok(inner) = Url::parse(&value) {
                return Some(inner);
            }
        }
    }
    None
}

fn is_tracking_param(name: &str) -> bool {
    TRACKING_PREFIXES.iter().any(|p| name.starts_with(p))
        || TRACKING_EXACT.contains(&name)
}

/// Strip tracking parameters from a URL while keeping everything else.
///
/// `normalize` goes further and drops all non-coupon parameters; this is the
/// lighter cleanup applied to hrefs read out of middleman pages before the
/// redirect chain is followed.
pub fn strip_tracking(raw: &str) -> String {
    let mut url = match Url::parse(raw.trim()) {
        Ok(u) => u,
        Err(_) => return raw.trim().to_string(),
    };
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(name, _)| !is_tracking_param(name))
        .map(|(n, v)| (n.into_owned(), v.into_owned()))
        .collect();
    url.set_query(None);
    if !kept.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (name, value) in &kept {
            pairs.append_pair(name, value);
        }
    }
    url.to_string()
}

/// Stable identifier for a target, derived from the canonical URL path.
///
/// Course pages live under `/course/<slug>/`; for anything else the last
/// non-empty path segment is used, falling back to the host for bare roots.
pub fn slug_of(canonical_url: &str) -> String {
    if let Ok(url) = Url::parse(canonical_url) {
        let segments: Vec<&str> = url
            .path()
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();
        for window in segments.windows(2) {
            if window[0] == "course" {
                return window[1].to_string();
            }
        }
        if let Some(last) = segments.last() {
            return last.to_string();
        }
        if let Some(host) = url.host_str() {
            return host.to_string();
        }
    }
    canonical_url.to_string()
}
