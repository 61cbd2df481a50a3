//! Cookie sessions and flash messages.
//!
//! - A successful login or registration sets a `sessionid` cookie holding an
//!   HS256 JWT signed with the process-wide signing key
//! - The API also accepts the same JWT as `Authorization: Bearer <jwt>`
//! - Logout simply drops the cookie; the JWT expiry bounds any copied token
//!
//! Flash messages ride in a `messages` cookie that the next page render
//! consumes.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::db::User;

pub const SESSION_COOKIE: &str = "sessionid";
pub const FLASH_COOKIE: &str = "messages";

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    /// User id
    sub: String,
    username: String,
    /// Issued-at unix seconds
    iat: i64,
    /// Expiration unix seconds
    exp: i64,
}

/// Identity attached to a request once the gate has authenticated it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: i64,
    pub username: String,
}

impl From<&User> for CurrentUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
        }
    }
}

/// Signing material derived from the resolved signing key.
pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_hours: i64,
    secure_cookies: bool,
}

impl SessionKeys {
    pub fn new(secret: &str, ttl_hours: i64, secure_cookies: bool) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl_hours: ttl_hours.max(1),
            secure_cookies,
        }
    }

    /// Issue a session JWT for `user`.
    pub fn issue(&self, user: &User) -> anyhow::Result<String> {
        let now = Utc::now();
        let exp = now + Duration::hours(self.ttl_hours);
        let claims = Claims {
            sub: user.id.to_string(),
            username: user.username.clone(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
        };
        Ok(jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &self.encoding,
        )?)
    }

    /// Decode a session JWT; `None` if forged, malformed or expired.
    pub fn verify(&self, token: &str) -> Option<CurrentUser> {
        let data =
            jsonwebtoken::decode::<Claims>(token, &self.decoding, &Validation::default()).ok()?;
        let id = data.claims.sub.parse().ok()?;
        Some(CurrentUser {
            id,
            username: data.claims.username,
        })
    }

    /// Add the session cookie for `user` to `jar`.
    pub fn login(&self, jar: CookieJar, user: &User) -> anyhow::Result<CookieJar> {
        let token = self.issue(user)?;
        let cookie = Cookie::build((SESSION_COOKIE, token))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.secure_cookies)
            .build();
        Ok(jar.add(cookie))
    }
}

pub fn logout(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(SESSION_COOKIE).path("/").build())
}

/// Session JWT from the cookie, if present.
pub fn session_token(jar: &CookieJar) -> Option<String> {
    jar.get(SESSION_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}

/// Queue a message for the next rendered page.
pub fn flash(jar: CookieJar, message: &str) -> CookieJar {
    let cookie = Cookie::build((FLASH_COOKIE, urlencoding::encode(message).into_owned()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build();
    jar.add(cookie)
}

/// Consume the pending flash message, if any.
pub fn take_flash(jar: CookieJar) -> (CookieJar, Option<String>) {
    let message = jar.get(FLASH_COOKIE).and_then(|c| {
        urlencoding::decode(c.value())
            .ok()
            .map(|m| m.into_owned())
            .filter(|m| !m.is_empty())
    });
    match message {
        Some(message) => (
            jar.remove(Cookie::build(FLASH_COOKIE).path("/").build()),
            Some(message),
        ),
        None => (jar, None),
    }
}
