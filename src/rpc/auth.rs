//! Header construction for the `jsonrpsee` client builder. Public RPC
//! providers usually need no credentials; private nodes sit behind basic auth.

use crate::rpc::options::RpcCredentials;
use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use jsonrpsee::http_client::{HeaderMap, HeaderValue};

pub(crate) fn build_headers(credentials: Option<&RpcCredentials>) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    if let Some(credentials) = credentials {
        let encoded =
            BASE64_STANDARD.encode(format!("{}:{}", credentials.user, credentials.password));
        let value = HeaderValue::from_str(&format!("Basic {encoded}"))
            .context("failed to build Authorization header")?;
        headers.insert("Authorization", value);
    }
    Ok(headers)
}
