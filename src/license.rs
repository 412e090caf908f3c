use std::fmt;

use base64::{Engine as _, engine::general_purpose};
use digest::Digest;
use reqwest::{
    Client, StatusCode,
    header::{HeaderValue, USER_AGENT},
};
use secrecy::{ExposeSecret, SecretString};
use sha1::Sha1;
use tracing::{debug, info};

use crate::{descriptor::MediaDescriptor, error::OdmError};

/// Identifiers of the OverDrive Media Console client we present ourselves as.
/// The license server only accepts requests hashed with exactly these values.
pub const CLIENT_ID: &str = "00000000-0000-0000-0000-000000000000";
pub const OMC_VERSION: &str = "1.2.0";
pub const OS_VERSION: &str = "10.14.2";
pub const HASH_SECRET: &str = "ELOSNOC*AIDEM*EVIRDREVO";
pub const USER_AGENT_VALUE: &str = "OverDrive Media Console";

/// Base64 of the SHA-1 of `client|omc|os|secret`, hashed as UTF-16LE.
pub fn license_hash_for(client_id: &str, omc: &str, os: &str, secret: &str) -> String {
    let value = format!("{client_id}|{omc}|{os}|{secret}");
    let mut hasher = Sha1::new();
    for unit in value.encode_utf16() {
        hasher.update(unit.to_le_bytes());
    }
    general_purpose::STANDARD.encode(hasher.finalize())
}

pub fn license_hash() -> String {
    license_hash_for(CLIENT_ID, OMC_VERSION, OS_VERSION, HASH_SECRET)
}

/// Token returned by the acquisition endpoint. Only ever lives in memory.
#[derive(Clone)]
pub struct License {
    token: SecretString,
}

impl fmt::Debug for License {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("License").field("token", &"***").finish()
    }
}

impl License {
    /// Fails if the token could not be sent back as a header
    pub fn from_body(body: &str) -> Result<License, OdmError> {
        let token = body.trim();
        HeaderValue::from_str(token).map_err(|e| OdmError::InvalidLicense {
            message: e.to_string(),
        })?;
        Ok(License {
            token: SecretString::from(token.to_string()),
        })
    }

    pub(crate) fn header_value(&self) -> Result<HeaderValue, OdmError> {
        let mut value = HeaderValue::from_str(self.token.expose_secret()).map_err(|e| {
            OdmError::InvalidLicense {
                message: e.to_string(),
            }
        })?;
        value.set_sensitive(true);
        Ok(value)
    }
}

/// Asks the descriptor's acquisition endpoint for a license. Never retried.
pub async fn acquire_license(
    client: &Client,
    descriptor: &MediaDescriptor,
) -> Result<License, OdmError> {
    let hash = license_hash();
    let mut url = descriptor.acquisition_url.clone();
    url.set_query(None);
    url.query_pairs_mut()
        .append_pair("MediaID", &descriptor.content_id)
        .append_pair("ClientID", CLIENT_ID)
        .append_pair("OMC", OMC_VERSION)
        .append_pair("OS", OS_VERSION)
        .append_pair("Hash", &hash);

    debug!(
        media_id = descriptor.content_id.as_str(),
        client_id = CLIENT_ID,
        omc = OMC_VERSION,
        os = OS_VERSION,
        hash = hash.as_str(),
        "acquiring license"
    );

    let response = client
        .get(url)
        .header(USER_AGENT, USER_AGENT_VALUE)
        .send()
        .await?;
    let status = response.status();
    let body = response.text().await?;

    if status != StatusCode::OK {
        return Err(OdmError::Acquisition {
            status: status.as_u16(),
            body,
        });
    }

    info!(status = status.as_u16(), "license acquired");
    License::from_body(&body)
}
