//! HMAC-signed unsubscribe tokens.
//!
//! Wire format is six `|`-separated fields:
//! `docId|userRef|event|mode|YYYYMMDD|base64urlHmac`. The signature
//! covers the first five fields with HMAC-SHA-256 keyed by the
//! recipient's per-user unsubscribe key, so validation needs no login.
//! Tokens expire 60 days after minting, at UTC day granularity.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use docpost_core::DocpostError;

type HmacSha256 = Hmac<Sha256>;

/// Token lifetime in UTC days.
pub const TOKEN_TTL_DAYS: i64 = 60;

/// Which notification stream the link unsubscribes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsubscribeEvent {
    DocChanges,
    Comments,
}

impl UnsubscribeEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnsubscribeEvent::DocChanges => "doc-changes",
            UnsubscribeEvent::Comments => "comments",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "doc-changes" => Some(UnsubscribeEvent::DocChanges),
            "comments" => Some(UnsubscribeEvent::Comments),
            _ => None,
        }
    }
}

/// How far the unsubscribe goes. Only meaningful for comment links:
/// `Normal` drops back to relevant-only, `Full` silences the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsubscribeMode {
    Normal,
    Full,
}

impl UnsubscribeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnsubscribeMode::Normal => "normal",
            UnsubscribeMode::Full => "full",
        }
    }
}

fn mode_str(mode: Option<UnsubscribeMode>) -> &'static str {
    mode.map(|m| m.as_str()).unwrap_or("")
}

fn parse_mode(s: &str) -> Result<Option<UnsubscribeMode>, ()> {
    match s {
        "" => Ok(None),
        "normal" => Ok(Some(UnsubscribeMode::Normal)),
        "full" => Ok(Some(UnsubscribeMode::Full)),
        _ => Err(()),
    }
}

/// A syntactically valid token. Parsing does not verify; call
/// [`verify`] with the recipient's key before trusting it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsubscribeToken {
    pub doc_id: String,
    pub user_ref: String,
    pub event: UnsubscribeEvent,
    pub mode: Option<UnsubscribeMode>,
    /// Absolute expiry day, `YYYYMMDD` in UTC.
    pub expires: String,
    signature: String,
}

fn signing_input(
    doc_id: &str,
    user_ref: &str,
    event: UnsubscribeEvent,
    mode: Option<UnsubscribeMode>,
    expires: &str,
) -> String {
    format!(
        "{doc_id}|{user_ref}|{event}|{mode}|{expires}",
        event = event.as_str(),
        mode = mode_str(mode),
    )
}

fn hmac_for(key: &str, input: &str) -> HmacSha256 {
    let mut mac =
        HmacSha256::new_from_slice(key.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(input.as_bytes());
    mac
}

/// Mint a signed token expiring `TOKEN_TTL_DAYS` from `now`.
pub fn sign(
    doc_id: &str,
    user_ref: &str,
    event: UnsubscribeEvent,
    mode: Option<UnsubscribeMode>,
    key: &str,
    now: DateTime<Utc>,
) -> String {
    let expires = (now + Duration::days(TOKEN_TTL_DAYS))
        .format("%Y%m%d")
        .to_string();
    let input = signing_input(doc_id, user_ref, event, mode, &expires);
    let sig = URL_SAFE_NO_PAD.encode(hmac_for(key, &input).finalize().into_bytes());
    format!("{input}|{sig}")
}

/// Parse a token's six fields without verifying the signature.
pub fn parse(token: &str) -> Result<UnsubscribeToken, DocpostError> {
    let fields: Vec<&str> = token.split('|').collect();
    let [doc_id, user_ref, event, mode, expires, signature] = fields[..] else {
        return Err(DocpostError::InvalidInput(format!(
            "expected 6 token fields, got {}",
            fields.len()
        )));
    };
    if doc_id.is_empty() {
        return Err(DocpostError::InvalidInput("empty doc id".to_string()));
    }
    if signature.is_empty() {
        return Err(DocpostError::InvalidInput("empty signature".to_string()));
    }
    let event = UnsubscribeEvent::parse(event)
        .ok_or_else(|| DocpostError::InvalidInput(format!("unknown event '{event}'")))?;
    let mode = parse_mode(mode)
        .map_err(|()| DocpostError::InvalidInput(format!("unknown mode '{mode}'")))?;
    Ok(UnsubscribeToken {
        doc_id: doc_id.to_string(),
        user_ref: user_ref.to_string(),
        event,
        mode,
        expires: expires.to_string(),
        signature: signature.to_string(),
    })
}

/// Recompute the HMAC (constant-time compare) and check expiry.
pub fn verify(
    token: &UnsubscribeToken,
    key: &str,
    now: DateTime<Utc>,
) -> Result<(), DocpostError> {
    let input = signing_input(
        &token.doc_id,
        &token.user_ref,
        token.event,
        token.mode,
        &token.expires,
    );
    let sig = URL_SAFE_NO_PAD
        .decode(&token.signature)
        .map_err(|_| DocpostError::BadSignature)?;
    hmac_for(key, &input)
        .verify_slice(&sig)
        .map_err(|_| DocpostError::BadSignature)?;

    // Expiry days compare lexicographically in YYYYMMDD form.
    let today = now.format("%Y%m%d").to_string();
    if today.as_str() > token.expires.as_str() {
        return Err(DocpostError::ExpiredToken);
    }
    Ok(())
}
