use log::debug;
use turn_rs::attributes::stun::{MessageIntegrity, Nonce, Realm, UserName};
use turn_rs::{HMACKey, StunAttribute, StunMessage};

pub const ERROR_CODE_UNAUTHENTICATED: u16 = 401;
pub const ERROR_CODE_STALE_NONCE: u16 = 438;

#[derive(Debug, Clone)]
struct LongTermCredentialAttributes {
    realm: Realm,
    nonce: Nonce,
    key: HMACKey,
}

/// Why a request has to be sent again with new credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryCause {
    Unauthenticated,
    StaleNonce,
}

/// Client side of the long-term credential mechanism,
/// [`RFC5389`](https://datatracker.ietf.org/doc/html/rfc5389#section-10.2).
/// The first request goes out without credentials, the server challenges it
/// with a 401 carrying REALM and NONCE, and every later request is protected
/// with the key derived from them.
#[derive(Debug)]
pub struct LongTermCredentialClient {
    user_name: UserName,
    password: String,
    params: Option<LongTermCredentialAttributes>,
}

impl LongTermCredentialClient {
    pub fn new<P>(user_name: UserName, password: P) -> Self
    where
        P: Into<String>,
    {
        Self {
            user_name,
            password: password.into(),
            params: None,
        }
    }

    #[cfg(test)]
    pub fn is_authenticated(&self) -> bool {
        self.params.is_some()
    }

    pub fn key(&self) -> Option<&HMACKey> {
        self.params.as_ref().map(|params| &params.key)
    }

    #[cfg(test)]
    pub fn realm(&self) -> Option<&Realm> {
        self.params.as_ref().map(|params| &params.realm)
    }

    #[cfg(test)]
    pub fn nonce(&self) -> Option<&Nonce> {
        self.params.as_ref().map(|params| &params.nonce)
    }

    /// Attributes to add to the next request. Empty until the server has
    /// challenged the client.
    pub fn request_attributes(&self) -> Vec<StunAttribute> {
        let Some(params) = &self.params else {
            return Vec::new();
        };

        vec![
            self.user_name.clone().into(),
            params.realm.clone().into(),
            params.nonce.clone().into(),
            MessageIntegrity::new(params.key.clone()).into(),
        ]
    }

    fn process_unauthenticated(&mut self, msg: &StunMessage) -> Option<RetryCause> {
        let realm = msg.get::<Realm>().and_then(|attr| attr.as_realm().ok());
        let nonce = msg.get::<Nonce>().and_then(|attr| attr.as_nonce().ok());
        let (Some(realm), Some(nonce)) = (realm, nonce) else {
            debug!(
                "[{}] REALM or NONCE missing in 401 response",
                msg.transaction_id()
            );
            return None;
        };

        let key = match HMACKey::new_long_term(&self.user_name, realm, &self.password) {
            Ok(key) => key,
            Err(e) => {
                debug!("Can not derive long-term key: {}", e);
                return None;
            }
        };

        self.params = Some(LongTermCredentialAttributes {
            realm: realm.clone(),
            nonce: nonce.clone(),
            key,
        });
        Some(RetryCause::Unauthenticated)
    }

    fn process_stale_nonce(&mut self, msg: &StunMessage) -> Option<RetryCause> {
        let Some(nonce) = msg.get::<Nonce>().and_then(|attr| attr.as_nonce().ok()) else {
            debug!("[{}] No Nonce attribute found in 438 response", msg.transaction_id());
            return None;
        };
        let Some(params) = self.params.as_mut() else {
            debug!(
                "[{}] No authentication parameters were set yet.",
                msg.transaction_id()
            );
            return None;
        };

        params.nonce = nonce.clone();
        Some(RetryCause::StaleNonce)
    }

    /// Picks up the credentials carried by an error response. Returns the
    /// reason to retry the request, or `None` if the error is not related to
    /// authentication or does not provide what is needed to retry.
    pub fn process_error_response(&mut self, code: u16, msg: &StunMessage) -> Option<RetryCause> {
        match code {
            ERROR_CODE_UNAUTHENTICATED => self.process_unauthenticated(msg),
            ERROR_CODE_STALE_NONCE => self.process_stale_nonce(msg),
            _ => None,
        }
    }
}
