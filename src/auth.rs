//! Credentials for the Azure Blob service and the two ways of configuring them
//!
//! A container can be reached either through a shared access signature (SAS)
//! URL that already carries its authorization, or through an account
//! connection string whose account key is used to sign each request.
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use percent_encoding::percent_decode_str;
use sha2::Sha256;
use url::Url;

use crate::error::{Result, StorageError};

/// The storage emulator account used by `UseDevelopmentStorage=true`
pub const DEV_STORE_ACCOUNT: &str = "devstoreaccount1";
const DEV_STORE_KEY: &str =
    "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";
const DEV_STORE_BLOB_ENDPOINT: &str = "http://127.0.0.1:10000/devstoreaccount1";

const DEFAULT_PROTOCOL: &str = "https";
const DEFAULT_ENDPOINT_SUFFIX: &str = "core.windows.net";

/// How requests against a container are authorized
#[derive(Clone)]
pub enum Credential {
    /// Requests are signed with the account key
    SharedKey { account: String, key: Vec<u8> },
    /// The signature is appended to every request URL as query parameters
    SharedAccessSignature { token: String },
}

// Custom implementation of Debug to avoid printing the key or signature
impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::SharedKey { account, .. } => f
                .debug_struct("SharedKey")
                .field("account", account)
                .field("key", &"**********")
                .finish(),
            Credential::SharedAccessSignature { .. } => f
                .debug_struct("SharedAccessSignature")
                .field("token", &"**********")
                .finish(),
        }
    }
}

impl Credential {
    /// Adds the SAS token (if any) to the query of `url`.
    ///
    /// Must be called before any other query parameters are appended since
    /// it replaces the whole query.
    pub(crate) fn apply_to_url(&self, url: &mut Url) {
        if let Credential::SharedAccessSignature { token } = self {
            url.set_query(Some(token));
        }
    }

    /// Computes the `Authorization` header for a request, if this credential signs requests
    pub(crate) fn authorization(&self, request: &RequestToSign<'_>) -> Result<Option<String>> {
        match self {
            Credential::SharedKey { account, key } => {
                let string_to_sign = string_to_sign(account, request);
                let mut mac = Hmac::<Sha256>::new_from_slice(key)
                    .map_err(|e| StorageError::invalid_config(format!("bad account key: {e}")))?;
                mac.update(string_to_sign.as_bytes());
                let signature = BASE64_STANDARD.encode(mac.finalize().into_bytes());
                Ok(Some(format!("SharedKey {}:{}", account, signature)))
            }
            Credential::SharedAccessSignature { .. } => Ok(None),
        }
    }
}

/// The parts of a request that go into a Shared Key signature
pub(crate) struct RequestToSign<'a> {
    pub method: &'a str,
    pub url: &'a Url,
    pub content_length: usize,
    pub content_type: &'a str,
    /// All `x-ms-*` headers sent with the request
    pub ms_headers: &'a [(&'a str, String)],
}

fn string_to_sign(account: &str, request: &RequestToSign<'_>) -> String {
    // An empty body is signed as an empty Content-Length, not "0"
    let content_length = match request.content_length {
        0 => String::new(),
        len => len.to_string(),
    };

    let mut ms_headers = request
        .ms_headers
        .iter()
        .map(|(k, v)| (k.to_lowercase(), v.trim().to_string()))
        .collect::<Vec<_>>();
    ms_headers.sort_by(|a, b| a.0.cmp(&b.0));
    let canonicalized_headers = ms_headers
        .iter()
        .map(|(k, v)| format!("{}:{}", k, v))
        .collect::<Vec<_>>()
        .join("\n");

    let path = percent_decode_str(request.url.path()).decode_utf8_lossy();
    let mut canonicalized_resource = format!("/{}{}", account, path);
    let mut query = request
        .url
        .query_pairs()
        .map(|(k, v)| (k.to_lowercase(), v.into_owned()))
        .collect::<Vec<_>>();
    query.sort();
    for (k, v) in &query {
        canonicalized_resource.push_str(&format!("\n{}:{}", k, v));
    }

    // VERB, Content-Encoding, Content-Language, Content-Length, Content-MD5,
    // Content-Type, Date, If-Modified-Since, If-Match, If-None-Match,
    // If-Unmodified-Since, Range
    format!(
        "{}\n\n\n{}\n\n{}\n\n\n\n\n\n\n{}\n{}",
        request.method,
        content_length,
        request.content_type,
        canonicalized_headers,
        canonicalized_resource
    )
}

/// A parsed account connection string
///
/// ```ignore
/// let conn = ConnectionString::parse(
///     "DefaultEndpointsProtocol=https;AccountName=myaccount;AccountKey=bXlrZXk=",
/// )?;
/// assert_eq!(conn.blob_endpoint.as_str(), "https://myaccount.blob.core.windows.net/");
/// ```
#[derive(Clone, Debug)]
pub struct ConnectionString {
    pub account_name: String,
    pub blob_endpoint: Url,
    pub credential: Credential,
}

impl ConnectionString {
    pub fn parse(connection_string: &str) -> Result<Self> {
        let mut protocol = None;
        let mut account_name = None;
        let mut account_key = None;
        let mut endpoint_suffix = None;
        let mut blob_endpoint = None;
        let mut sas = None;
        let mut development = false;

        for segment in connection_string.split(';') {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }
            let (key, value) = segment.split_once('=').ok_or_else(|| {
                StorageError::invalid_config(format!(
                    "connection string segment '{}' is not a key=value pair",
                    segment
                ))
            })?;
            match key {
                "DefaultEndpointsProtocol" => protocol = Some(value),
                "AccountName" => account_name = Some(value),
                "AccountKey" => account_key = Some(value),
                "EndpointSuffix" => endpoint_suffix = Some(value),
                "BlobEndpoint" => blob_endpoint = Some(value),
                "SharedAccessSignature" => sas = Some(value),
                "UseDevelopmentStorage" => development = value.eq_ignore_ascii_case("true"),
                _ => {}
            }
        }

        if development {
            account_name = account_name.or(Some(DEV_STORE_ACCOUNT));
            account_key = account_key.or(Some(DEV_STORE_KEY));
            blob_endpoint = blob_endpoint.or(Some(DEV_STORE_BLOB_ENDPOINT));
        }

        let account_name = account_name
            .filter(|name| !name.is_empty())
            .ok_or_else(|| StorageError::invalid_config("connection string has no AccountName"))?;

        let credential = match (account_key, sas) {
            (Some(key), _) => {
                let key = BASE64_STANDARD.decode(key).map_err(|e| {
                    StorageError::invalid_config(format!("AccountKey is not valid base64: {e}"))
                })?;
                Credential::SharedKey {
                    account: account_name.to_string(),
                    key,
                }
            }
            (None, Some(token)) => Credential::SharedAccessSignature {
                token: token.trim_start_matches('?').to_string(),
            },
            (None, None) => {
                return Err(StorageError::invalid_config(
                    "connection string has neither AccountKey nor SharedAccessSignature",
                ))
            }
        };

        let blob_endpoint = match blob_endpoint {
            Some(endpoint) => endpoint.to_string(),
            None => format!(
                "{}://{}.blob.{}",
                protocol.unwrap_or(DEFAULT_PROTOCOL),
                account_name,
                endpoint_suffix.unwrap_or(DEFAULT_ENDPOINT_SUFFIX)
            ),
        };
        let blob_endpoint = parse_http_url(&blob_endpoint, "BlobEndpoint")?;

        Ok(Self {
            account_name: account_name.to_string(),
            blob_endpoint,
            credential,
        })
    }
}

/// A container URL carrying a shared access signature
#[derive(Clone, Debug)]
pub struct ContainerSasUrl {
    /// The container URL without its query
    pub container_url: Url,
    pub container_name: String,
    pub credential: Credential,
}

impl ContainerSasUrl {
    pub fn parse(sas_url: &str) -> Result<Self> {
        let mut url = parse_http_url(sas_url, "container URL")?;

        let container_name = url
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
            .map(|name| percent_decode_str(name).decode_utf8_lossy().into_owned())
            .ok_or_else(|| StorageError::invalid_config("container URL has no container name"))?;

        let token = url
            .query()
            .filter(|query| !query.is_empty())
            .map(str::to_string)
            .ok_or_else(|| StorageError::invalid_config("container URL has no signature"))?;
        if !url.query_pairs().any(|(k, _)| k == "sig") {
            return Err(StorageError::invalid_config(
                "container URL query has no sig parameter",
            ));
        }

        url.set_query(None);
        url.set_fragment(None);

        Ok(Self {
            container_url: url,
            container_name,
            credential: Credential::SharedAccessSignature { token },
        })
    }
}

fn parse_http_url(value: &str, what: &str) -> Result<Url> {
    let url = Url::parse(value)
        .map_err(|e| StorageError::invalid_config(format!("{} '{}' is malformed: {}", what, value, e)))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(StorageError::invalid_config(format!(
            "{} must use http or https, got {}",
            what,
            url.scheme()
        )));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(StorageError::invalid_config(format!("{} has no host", what)));
    }
    Ok(url)
}
