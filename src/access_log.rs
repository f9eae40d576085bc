//! per-request access logging — `original_source/feather/http.py`'s access-log line, emitted as
//! a structured `tracing` event instead of a formatted string written to a file handle.
//!
//! kept as a `tracing::info!` event (rather than a dedicated file writer) per §1.1's ambient
//! logging stack: the fields below are exactly spec.md §6's Common-Log-ish format, just carried
//! as structured fields instead of pre-formatted text so a subscriber can filter/index on them.

use std::{net::SocketAddr, time::Duration};

use feather_http::http::{HeaderMap, Method, StatusCode, Uri, Version, header};

const FORWARDED_FOR: header::HeaderName = header::HeaderName::from_static("x-forwarded-for");
const REAL_IP: header::HeaderName = header::HeaderName::from_static("x-real-ip");

#[allow(clippy::too_many_arguments)]
pub(crate) fn log(method: &Method, uri: &Uri, version: Version, headers: &HeaderMap, addr: SocketAddr, status: StatusCode, body_len: usize, elapsed: Duration) {
    let ip = client_ip(headers, addr);
    let referer = headers.get(header::REFERER).and_then(|v| v.to_str().ok()).unwrap_or("-");
    let user_agent = headers.get(header::USER_AGENT).and_then(|v| v.to_str().ok()).unwrap_or("-");
    let request_line = format!("{method} {uri} {version:?}");

    tracing::info!(
        target: "feather::access",
        ip = %ip,
        time = %clf_time(),
        request_line = %request_line,
        code = status.as_u16(),
        body_len,
        referer,
        user_agent,
        elapsed_us = elapsed.as_micros() as u64,
        "{ip} - - [{}] \"{request_line}\" {} {body_len} \"{referer}\" \"{user_agent}\"",
        clf_time(),
        status.as_u16(),
    );
}

/// `X-Forwarded-For` (first hop), then `X-Real-IP`, then the socket peer — per spec.md §6. Never
/// trusted for anything but this log line; a reverse proxy header spoofed by a direct client only
/// corrupts its own access log entry.
fn client_ip(headers: &HeaderMap, addr: SocketAddr) -> String {
    if let Some(v) = headers.get(FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        if let Some(first) = v.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    if let Some(v) = headers.get(REAL_IP).and_then(|v| v.to_str().ok()) {
        if !v.trim().is_empty() {
            return v.trim().to_string();
        }
    }
    addr.ip().to_string()
}

const MONTHS: [&str; 12] = ["Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec"];

/// `DD/Mon/YYYY:HH:MM:SS +0000` — spec.md §6's `{time}` field. Hand-rolled rather than pulling in
/// a calendar crate: `httpdate` (already a dependency, used for the `Date` response header) only
/// formats RFC 1123, not this CLF layout, so the civil-from-days conversion is done directly
/// against `SystemTime`, the same epoch-arithmetic `httpdate` itself performs internally.
fn clf_time() -> String {
    let secs = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64;

    let days = secs.div_euclid(86_400);
    let time_of_day = secs.rem_euclid(86_400);
    let (hour, minute, second) = (time_of_day / 3600, (time_of_day / 60) % 60, time_of_day % 60);
    let (year, month, day) = civil_from_days(days);

    format!("{day:02}/{}/{year:04}:{hour:02}:{minute:02}:{second:02} +0000", MONTHS[(month - 1) as usize])
}

/// Howard Hinnant's `civil_from_days`: days since the Unix epoch -> (year, month, day), proleptic
/// Gregorian calendar. Avoids a calendar-date dependency for the one CLF timestamp this module
/// needs.
fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    (if m <= 2 { y + 1 } else { y }, m, d)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn civil_from_days_matches_known_epoch_dates() {
        assert_eq!(civil_from_days(0), (1970, 1, 1));
        assert_eq!(civil_from_days(11_017), (2000, 2, 29));
        assert_eq!(civil_from_days(19_723), (2024, 1, 1));
    }

    #[test]
    fn client_ip_prefers_forwarded_for_then_real_ip_then_peer() {
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();

        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers, addr), "127.0.0.1");

        headers.insert(REAL_IP, "10.0.0.5".parse().unwrap());
        assert_eq!(client_ip(&headers, addr), "10.0.0.5");

        headers.insert(FORWARDED_FOR, "203.0.113.9, 10.0.0.1".parse().unwrap());
        assert_eq!(client_ip(&headers, addr), "203.0.113.9");
    }
}
