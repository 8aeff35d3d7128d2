use anyhow::Result;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use semchat_protocol::UserRef;
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

/// Claims carried by session tokens. Tokens are issued by the surrounding
/// identity system; this service only verifies them.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct Claims {
    /// Stable user id.
    pub sub: String,
    /// Display name snapshot, stamped onto messages as `sender.name`.
    pub name: String,
    pub exp: usize,
}

impl Claims {
    /// The identity this session stamps onto everything it sends.
    pub fn user(&self) -> UserRef {
        UserRef {
            id: self.sub.clone(),
            name: self.name.clone(),
        }
    }
}

/// Issue a session token for a user valid for the provided duration.
/// Exists for tests and for the identity system that fronts this service.
pub fn issue_jwt(secret: &[u8], user: &UserRef, valid_for: Duration) -> Result<String> {
    let exp = (OffsetDateTime::now_utc() + valid_for).unix_timestamp() as usize;
    let claims = Claims {
        sub: user.id.clone(),
        name: user.name.clone(),
        exp,
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret),
    )?;
    Ok(token)
}

/// Verify a session token and return its claims if valid.
pub fn verify_jwt(secret: &[u8], token: &str) -> Result<Claims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    let data = decode::<Claims>(token, &DecodingKey::from_secret(secret), &validation)?;
    if data.claims.exp < OffsetDateTime::now_utc().unix_timestamp() as usize {
        anyhow::bail!("expired");
    }
    Ok(data.claims)
}
