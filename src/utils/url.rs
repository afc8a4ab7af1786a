//! URL helpers for the agent server endpoints.

use reqwest::Url;

/// Check that `endpoint` is something the chat transport can dial.
pub fn validate_chat_endpoint(endpoint: &str) -> Result<Url, String> {
    let url = Url::parse(endpoint).map_err(|e| format!("invalid endpoint '{endpoint}': {e}"))?;
    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(format!(
            "unsupported scheme '{other}' in '{endpoint}' (expected ws or wss)"
        )),
    }
}

/// HTTP root of the server hosting a chat endpoint.
///
/// # Examples
///
/// ```
/// use heysol::utils::url::status_url_for;
///
/// assert_eq!(
///     status_url_for("ws://localhost:8002/chat").unwrap(),
///     "http://localhost:8002/"
/// );
/// ```
pub fn status_url_for(endpoint: &str) -> Result<String, String> {
    let mut url = validate_chat_endpoint(endpoint)?;
    let scheme = if url.scheme() == "wss" { "https" } else { "http" };
    url.set_scheme(scheme)
        .map_err(|_| format!("cannot derive status URL from '{endpoint}'"))?;
    url.set_path("/");
    url.set_query(None);
    url.set_fragment(None);
    Ok(url.to_string())
}
