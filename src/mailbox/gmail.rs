//! Gmail mailbox over the REST API, read-only scope.
//!
//! Authenticates with the authorized-user token file produced by the
//! one-time interactive login. Expired access tokens are refreshed in place
//! and written back; a refresh the server rejects means the login has to be
//! redone out of process, reported as [`MailboxError::AuthExpired`].

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use jiff::Timestamp;
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::model::Message;

use super::{Mailbox, MailboxError, Page, Result};

const API_BASE: &str = "https://gmail.googleapis.com/gmail/v1";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const PAGE_SIZE: u32 = 100;

/// Refresh this long before the recorded expiry.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Gmail sends base64url with or without padding.
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Gmail client bound to one token file.
pub struct GmailMailbox {
    client: Client,
    token_path: PathBuf,
    token: TokenFile,
    max_body_chars: usize,
}

/// The authorized-user token file. Unknown fields are preserved on rewrite.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TokenFile {
    token: Option<String>,
    refresh_token: Option<String>,
    token_uri: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    expiry: Option<String>,

    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

impl TokenFile {
    /// Whether the access token is missing or about to expire.
    fn needs_refresh(&self, now: Timestamp) -> bool {
        if self.token.as_deref().is_none_or(str::is_empty) {
            return true;
        }
        match self.expiry.as_deref().and_then(parse_expiry) {
            Some(expiry) => expiry.as_second() - EXPIRY_MARGIN_SECS <= now.as_second(),
            None => false,
        }
    }
}

/// Token files carry RFC 3339 expiries, sometimes without the zone suffix.
fn parse_expiry(s: &str) -> Option<Timestamp> {
    s.parse()
        .ok()
        .or_else(|| format!("{s}Z").parse().ok())
}

impl GmailMailbox {
    /// Load credentials from `token_path`.
    ///
    /// Fails when the token file is missing or unreadable: the interactive
    /// login has not been done on this machine.
    pub fn new(
        token_path: &Path,
        timeout: Duration,
        max_body_chars: usize,
    ) -> core::result::Result<Self, String> {
        let contents = fs::read_to_string(token_path).map_err(|e| {
            format!(
                "Gmail credentials not found at {}: {e}\n\
                 Authorize this machine and place the resulting token.json there.",
                token_path.display()
            )
        })?;
        let token: TokenFile = serde_json::from_str(&contents)
            .map_err(|e| format!("invalid token file {}: {e}", token_path.display()))?;
        if token.refresh_token.is_none() && token.token.is_none() {
            return Err(format!(
                "token file {} holds neither an access nor a refresh token",
                token_path.display()
            ));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| format!("failed to build HTTP client: {e}"))?;

        Ok(Self {
            client,
            token_path: token_path.to_path_buf(),
            token,
            max_body_chars,
        })
    }

    /// A usable access token, refreshing first if needed.
    fn access_token(&mut self) -> Result<String> {
        if self.token.needs_refresh(Timestamp::now()) {
            self.refresh()?;
        }
        self.token
            .token
            .clone()
            .ok_or_else(|| MailboxError::AuthExpired("no access token".into()))
    }

    /// Exchange the refresh token for a new access token and persist it.
    fn refresh(&mut self) -> Result<()> {
        let refresh_token = self
            .token
            .refresh_token
            .clone()
            .ok_or_else(|| MailboxError::AuthExpired("no refresh token available".into()))?;
        let token_uri = self
            .token
            .token_uri
            .clone()
            .unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string());

        info!("refreshing Gmail access token");
        let response = self
            .client
            .post(&token_uri)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
                ("client_id", self.token.client_id.as_deref().unwrap_or_default()),
                (
                    "client_secret",
                    self.token.client_secret.as_deref().unwrap_or_default(),
                ),
            ])
            .send()
            .map_err(|e| MailboxError::Transient(format!("token refresh failed: {e}")))?;

        let status = response.status();
        if matches!(status, StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED) {
            let body = response.text().unwrap_or_default();
            return Err(MailboxError::AuthExpired(format!(
                "token refresh rejected ({status}): {body}"
            )));
        }
        if !status.is_success() {
            return Err(MailboxError::Transient(format!(
                "token refresh failed ({status})"
            )));
        }

        let refreshed: RefreshResponse = response
            .json()
            .map_err(|e| MailboxError::Transient(format!("invalid refresh response: {e}")))?;

        self.token.token = Some(refreshed.access_token);
        self.token.expiry = refreshed.expires_in.and_then(|secs| {
            Timestamp::from_second(Timestamp::now().as_second() + secs)
                .ok()
                .map(|t| t.to_string())
        });
        if let Some(rotated) = refreshed.refresh_token {
            self.token.refresh_token = Some(rotated);
        }

        match serde_json::to_string_pretty(&self.token) {
            Ok(json) => {
                if let Err(e) = fs::write(&self.token_path, json) {
                    warn!(
                        path = %self.token_path.display(),
                        error = %e,
                        "failed to persist refreshed token"
                    );
                }
            }
            Err(e) => warn!(error = %e, "failed to serialize refreshed token"),
        }
        Ok(())
    }

    /// Send an authorized GET, refreshing once on 401.
    fn get<T: DeserializeOwned>(
        &mut self,
        build: impl Fn(&Client) -> RequestBuilder,
    ) -> Result<T> {
        let token = self.access_token()?;
        let mut response = send(build(&self.client).bearer_auth(token))?;

        if response.status() == StatusCode::UNAUTHORIZED {
            debug!("access token rejected, refreshing");
            self.refresh()?;
            let token = self.access_token()?;
            response = send(build(&self.client).bearer_auth(token))?;
        }

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(status_error(status, &body));
        }

        response
            .json()
            .map_err(|e| MailboxError::Transient(format!("invalid Gmail response: {e}")))
    }
}

/// Map a failed Gmail API response.
///
/// A 401 here has already survived a refresh. Gmail also answers 403 for
/// rate limits and quota, so a 403 only means a bad credential when the
/// error names a permission problem.
fn status_error(status: StatusCode, body: &str) -> MailboxError {
    let detail = body.chars().take(200).collect::<String>();
    if status == StatusCode::UNAUTHORIZED {
        return MailboxError::AuthExpired(format!("Gmail rejected credential ({status})"));
    }
    if status == StatusCode::FORBIDDEN {
        let reasons = serde_json::from_str::<ErrorResponse>(body)
            .map(|e| e.error.errors)
            .unwrap_or_default();
        if reasons
            .iter()
            .any(|r| matches!(r.reason.as_str(), "insufficientPermissions" | "authError"))
        {
            return MailboxError::AuthExpired(format!(
                "Gmail denied access ({status}): {detail}"
            ));
        }
    }
    MailboxError::Transient(format!("Gmail API error ({status}): {detail}"))
}

fn send(request: RequestBuilder) -> Result<Response> {
    request
        .send()
        .map_err(|e| MailboxError::Transient(e.to_string()))
}

impl Mailbox for GmailMailbox {
    fn list_page(&mut self, since: Timestamp, page: Option<&str>) -> Result<Page> {
        let query = format!("after:{}", since.as_second());
        let page = page.map(str::to_string);
        let url = format!("{API_BASE}/users/me/messages");
        debug!(%query, "listing Gmail messages");

        let listing: ListResponse = self.get(|client| {
            let mut request = client
                .get(&url)
                .query(&[("q", query.as_str())])
                .query(&[("maxResults", PAGE_SIZE)]);
            if let Some(token) = &page {
                request = request.query(&[("pageToken", token.as_str())]);
            }
            request
        })?;

        Ok(Page {
            ids: listing.messages.into_iter().map(|m| m.id).collect(),
            next_page: listing.next_page_token,
        })
    }

    fn fetch(&mut self, id: &str) -> Result<Message> {
        let url = format!("{API_BASE}/users/me/messages/{id}");
        let raw: RawMessage = self.get(|client| client.get(&url).query(&[("format", "full")]))?;
        Ok(parse_message(raw, self.max_body_chars))
    }
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<ErrorReason>,
}

#[derive(Debug, Deserialize)]
struct ErrorReason {
    #[serde(default)]
    reason: String,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    expires_in: Option<i64>,
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    messages: Vec<IdRef>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IdRef {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMessage {
    id: String,
    internal_date: Option<String>,
    payload: Option<Part>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    mime_type: Option<String>,
    #[serde(default)]
    headers: Vec<Header>,
    body: Option<Body>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Header {
    name: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct Body {
    data: Option<String>,
}

/// Reduce a raw Gmail message to what the pipeline needs.
fn parse_message(raw: RawMessage, max_body_chars: usize) -> Message {
    let payload = raw.payload.unwrap_or_default();
    let header = |name: &str| {
        payload
            .headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.clone())
    };

    let received_at = raw
        .internal_date
        .as_deref()
        .and_then(|ms| ms.parse::<i64>().ok())
        .and_then(|ms| Timestamp::from_millisecond(ms).ok())
        .unwrap_or_else(Timestamp::now);

    let body = extract_text(&payload).unwrap_or_else(|| "No text content found".to_string());

    Message {
        id: raw.id,
        sender: header("From").unwrap_or_else(|| "Unknown".to_string()),
        subject: header("Subject").unwrap_or_else(|| "No Subject".to_string()),
        body: body.chars().take(max_body_chars).collect(),
        received_at,
    }
}

/// The first `text/plain` part, depth-first.
fn extract_text(part: &Part) -> Option<String> {
    if part.mime_type.as_deref() == Some("text/plain")
        && let Some(data) = part.body.as_ref().and_then(|b| b.data.as_deref())
    {
        return decode_body(data);
    }
    part.parts.iter().find_map(extract_text)
}

fn decode_body(data: &str) -> Option<String> {
    match URL_SAFE_LENIENT.decode(data.trim()) {
        Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) => {
            warn!(error = %e, "failed to decode message body");
            None
        }
    }
}
