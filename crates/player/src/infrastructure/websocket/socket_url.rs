//! Socket URL construction.

use url::Url;

use sleuth_domain::{ScriptId, SessionId};

use crate::ports::outbound::TransportError;

/// Append the session and script to the base socket URL as query parameters.
///
/// Existing `session_id` / `script_id` parameters on the base URL are replaced.
pub fn build_socket_url(
    base: &str,
    session_id: &SessionId,
    script_id: Option<ScriptId>,
) -> Result<String, TransportError> {
    let mut url = Url::parse(base).map_err(|e| TransportError::InvalidUrl(format!("{base}: {e}")))?;
    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(TransportError::InvalidUrl(format!(
            "{base}: expected ws:// or wss://"
        )));
    }

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != "session_id" && key != "script_id")
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    {
        let mut query = url.query_pairs_mut();
        query.clear();
        query.extend_pairs(kept);
        query.append_pair("session_id", session_id.as_str());
        if let Some(script_id) = script_id {
            query.append_pair("script_id", &script_id.to_string());
        }
    }

    Ok(url.into())
}
