use rama::http::{
    HeaderMap, HeaderValue, Uri,
    header::{Entry, HOST},
};
use rama::telemetry::tracing;

/// Point the `Host` header at the authority of the given uri.
///
/// The inbound `Host` names the proxy itself, which the destination
/// has no use for (and virtual hosted targets would reject).
pub fn rewrite_host_header(headers: &mut HeaderMap, target: &Uri) {
    let Some(authority) = target.authority() else {
        return;
    };

    match HeaderValue::from_str(authority.as_str()) {
        Ok(value) => match headers.entry(HOST) {
            Entry::Occupied(mut entry) => {
                let previous = entry.insert(value);
                tracing::trace!(header = %HOST, ?previous, "rewrote host header");
            }
            Entry::Vacant(entry) => {
                entry.insert(value);
            }
        },
        Err(err) => {
            tracing::debug!(%authority, "failed to create host header value: {err}; drop header");
            let _ = headers.remove(HOST);
        }
    }
}
