use axum::extract::{Request, State};
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::state::SharedState;

pub const COOKIE_NAME: &str = "downloader_session";
const MAX_AGE_SECS: u64 = 14 * 24 * 3600;

type HmacSha256 = Hmac<Sha256>;

/// Browser session that owns a set of jobs. Inserted by `session_layer`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub id: String,
}

impl Session {
    /// First eight characters, for display.
    pub fn short_id(&self) -> &str {
        self.id.get(..8).unwrap_or(&self.id)
    }
}

fn mac_for(secret: &str, id: &str) -> HmacSha256 {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC can take any key length");
    mac.update(id.as_bytes());
    mac
}

/// `<id>.<hex hmac-sha256(secret, id)>`
pub fn sign(secret: &str, id: &str) -> String {
    let tag = mac_for(secret, id).finalize().into_bytes();
    format!("{id}.{}", hex::encode(tag))
}

/// Returns the session id when `value` carries a valid signature.
pub fn verify(secret: &str, value: &str) -> Option<String> {
    let (id, tag) = value.split_once('.')?;
    Uuid::parse_str(id).ok()?;
    let tag = hex::decode(tag).ok()?;
    mac_for(secret, id).verify_slice(&tag).ok()?;
    Some(id.to_string())
}

fn cookie_value<'a>(req: &'a Request, name: &str) -> Option<&'a str> {
    req.headers()
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v)
}

/// Attaches a `Session` to every request, issuing a new signed cookie when
/// the browser has none or sent one that fails verification.
pub async fn session_layer(State(state): State<SharedState>, mut req: Request, next: Next) -> Response {
    let secret = &state.config.secret_key;

    let existing = match cookie_value(&req, COOKIE_NAME) {
        Some(raw) => {
            let verified = verify(secret, raw);
            if verified.is_none() {
                warn!("session: rejected cookie with bad signature");
            }
            verified
        }
        None => None,
    };

    let (id, fresh) = match existing {
        Some(id) => (id, false),
        None => (Uuid::new_v4().to_string(), true),
    };
    req.extensions_mut().insert(Session { id: id.clone() });

    let mut resp = next.run(req).await;

    if fresh {
        let mut cookie = format!(
            "{COOKIE_NAME}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={MAX_AGE_SECS}",
            sign(secret, &id)
        );
        if state.config.session_cookie_secure {
            cookie.push_str("; Secure");
        }
        match HeaderValue::from_str(&cookie) {
            Ok(v) => {
                resp.headers_mut().append(SET_COOKIE, v);
                debug!(session = %&id[..8], "session: issued");
            }
            Err(e) => warn!("session: could not encode cookie: {e}"),
        }
    }

    resp
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-key-material";

    #[test]
    fn signed_value_verifies() {
        let id = Uuid::new_v4().to_string();
        let value = sign(SECRET, &id);
        assert_eq!(verify(SECRET, &value), Some(id));
    }

    #[test]
    fn tampering_is_rejected() {
        let id = Uuid::new_v4().to_string();
        let value = sign(SECRET, &id);

        assert_eq!(verify("another-secret", &value), None);

        let other = Uuid::new_v4().to_string();
        let (_, tag) = value.split_once('.').unwrap();
        assert_eq!(verify(SECRET, &format!("{other}.{tag}")), None);

        assert_eq!(verify(SECRET, &id), None);
        assert_eq!(verify(SECRET, "not-a-uuid.abcd"), None);
        assert_eq!(verify(SECRET, &format!("{id}.zz")), None);
    }

    #[test]
    fn short_id_is_prefix() {
        let s = Session { id: "0123456789abcdef".to_string() };
        assert_eq!(s.short_id(), "01234567");
    }
}
