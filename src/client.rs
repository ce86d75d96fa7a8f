//! A Rust definition of the container operations the workflow needs and a REST client for them
use std::{env, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use once_cell::sync::Lazy;
use percent_encoding::percent_decode_str;
use reqwest::{Client, Method, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::{
    auth::{ConnectionString, ContainerSasUrl, Credential, RequestToSign},
    error::{Result, StorageError},
};

const BLOB_API_VERSION: &str = "2021-08-06";
const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";
static GLOBAL_CLIENT: Lazy<Client> = Lazy::new(Client::new);

/// Operations on a single blob container
///
/// This is the seam between the workflow and whatever actually stores the
/// blobs.  [`AzureContainerClient`] talks to the Azure Blob service and
/// [`InMemoryContainer`](crate::memory::InMemoryContainer) keeps everything
/// in process.
#[async_trait]
pub trait BlobContainerApi: Send + Sync {
    /// The name of the container
    fn container_name(&self) -> &str;

    /// Creates the container unless it already exists
    ///
    /// # Returns
    ///
    /// True if the container was created by this call, false if it was already there
    async fn create_if_not_exists(&self) -> Result<bool>;

    /// Lists one page of blobs in the container
    ///
    /// Listings are always flat: a `/` in a blob name is just another
    /// character and no virtual directories are reported.
    ///
    /// # Arguments
    ///
    /// * `options` - Options for the list operation
    ///
    /// # Returns
    ///
    /// The blobs on this page, in the order the store returned them, and
    /// the marker for the next page (if any)
    async fn list(&self, options: ListBlobsOptions) -> Result<ListBlobsResult>;

    /// Uploads `text` as the full content of the blob `name`
    ///
    /// An existing blob with the same name is overwritten.
    async fn upload_text(&self, name: &str, text: &str) -> Result<()>;

    /// Downloads the full content of the blob `name`
    async fn download(&self, name: &str) -> Result<Bytes>;

    /// Deletes the blob `name`
    ///
    /// Deleting a blob that does not exist reports [`StorageError::BlobNotFound`].
    async fn delete(&self, name: &str) -> Result<()>;

    /// Downloads the blob `name` and decodes it as UTF-8 text
    async fn download_text(&self, name: &str) -> Result<String> {
        let contents = self.download(name).await?;
        String::from_utf8(contents.to_vec()).map_err(|e| {
            StorageError::InvalidResponse(format!("blob {} is not valid UTF-8 text: {}", name, e))
        })
    }
}

/// The minimal description of a listed blob
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct BlobDescriptor {
    /// The name of the blob within its container
    pub name: String,
}

impl BlobDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Options for the list operation
///
/// If `max_results` is reached then the result carries a `next_marker`
/// that can be passed back as `marker` to get the next page.
#[derive(Clone, Debug, Default)]
pub struct ListBlobsOptions {
    /// Only list blobs whose names start with this prefix
    pub prefix: Option<String>,
    /// The maximum number of results to return
    pub max_results: Option<u32>,
    /// A marker (returned from a previous list call) used to page results
    pub marker: Option<String>,
}

/// The response from the list operation
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListBlobsResult {
    /// The blobs found by the operation
    pub blobs: Vec<BlobDescriptor>,
    /// A marker that can be used to fetch the next page
    pub next_marker: Option<String>,
}

/// Hands out container handles for the two ways of configuring access
///
/// This mirrors the account / container split of the storage service:
/// a SAS URL names a container directly, while a connection string names
/// an account in which the container is then looked up by name.
pub trait StorageConnector: Send + Sync {
    /// Builds a container handle from a container URL carrying a shared access signature
    fn container_from_sas_url(&self, sas_url: &str) -> Result<Arc<dyn BlobContainerApi>>;

    /// Builds a container handle from an account connection string and a container name
    fn container_from_connection_string(
        &self,
        connection_string: &str,
        container_name: &str,
    ) -> Result<Arc<dyn BlobContainerApi>>;
}

/// A [`StorageConnector`] for the Azure Blob service
#[derive(Clone, Copy, Debug, Default)]
pub struct AzureConnector;

impl StorageConnector for AzureConnector {
    fn container_from_sas_url(&self, sas_url: &str) -> Result<Arc<dyn BlobContainerApi>> {
        Ok(Arc::new(AzureContainerClient::from_sas_url(sas_url)?))
    }

    fn container_from_connection_string(
        &self,
        connection_string: &str,
        container_name: &str,
    ) -> Result<Arc<dyn BlobContainerApi>> {
        let account = StorageAccount::from_connection_string(connection_string)?;
        if container_name.is_empty() {
            return Err(StorageError::invalid_config("container name is required"));
        }
        Ok(Arc::new(account.container(container_name)))
    }
}

/// A storage account reachable through its blob endpoint
#[derive(Clone, Debug)]
pub struct StorageAccount {
    blob_endpoint: Url,
    credential: Credential,
}

impl StorageAccount {
    pub fn from_connection_string(connection_string: &str) -> Result<Self> {
        let parsed = ConnectionString::parse(connection_string)?;
        Ok(Self {
            blob_endpoint: parsed.blob_endpoint,
            credential: parsed.credential,
        })
    }

    /// A handle to the container `name` in this account.  The container is
    /// not required to exist yet.
    pub fn container(&self, name: &str) -> AzureContainerClient {
        let mut container_url = self.blob_endpoint.clone();
        container_url.set_query(None);
        if let Ok(mut segments) = container_url.path_segments_mut() {
            segments.pop_if_empty().push(name);
        }
        AzureContainerClient {
            container_url,
            container_name: name.to_string(),
            credential: self.credential.clone(),
            api_version: AzureContainerClient::get_api_version(),
        }
    }
}

/// A client for one container in the Azure Blob service
pub struct AzureContainerClient {
    /// The container URL, without any query
    container_url: Url,
    container_name: String,
    credential: Credential,
    /// The x-ms-version sent with every request
    api_version: String,
}

/// Body of an upload request
struct TextBody<'a> {
    text: &'a str,
    content_type: &'a str,
}

impl AzureContainerClient {
    /// Creates a client from a container URL carrying a shared access signature
    pub fn from_sas_url(sas_url: &str) -> Result<Self> {
        let parsed = ContainerSasUrl::parse(sas_url)?;
        Ok(Self {
            container_url: parsed.container_url,
            container_name: parsed.container_name,
            credential: parsed.credential,
            api_version: Self::get_api_version(),
        })
    }

    /// The container URL, without any signature
    pub fn url(&self) -> &Url {
        &self.container_url
    }

    fn get_api_version() -> String {
        env::var("AZURE_BLOB_API_VERSION_OVERRIDE").unwrap_or_else(|_| BLOB_API_VERSION.to_string())
    }

    fn container_request_url(&self, params: &[(&str, String)]) -> Url {
        let mut url = self.container_url.clone();
        self.credential.apply_to_url(&mut url);
        if !params.is_empty() {
            let mut query = url.query_pairs_mut();
            for (key, value) in params {
                query.append_pair(key, value);
            }
        }
        url
    }

    fn blob_request_url(&self, name: &str) -> Url {
        let mut url = self.container_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(name.split('/'));
        }
        self.credential.apply_to_url(&mut url);
        url
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        mut ms_headers: Vec<(&str, String)>,
        body: Option<TextBody<'_>>,
    ) -> Result<Response> {
        ms_headers.push((
            "x-ms-date",
            Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string(),
        ));
        ms_headers.push(("x-ms-version", self.api_version.clone()));

        let (content_length, content_type) = body
            .as_ref()
            .map_or((0, ""), |body| (body.text.len(), body.content_type));
        let authorization = self.credential.authorization(&RequestToSign {
            method: method.as_str(),
            url: &url,
            content_length,
            content_type,
            ms_headers: &ms_headers,
        })?;

        debug!(method = %method, path = url.path(), "sending blob service request");

        let is_put = method == Method::PUT;
        let mut request = GLOBAL_CLIENT.request(method, url);
        for (name, value) in &ms_headers {
            request = request.header(*name, value);
        }
        if let Some(authorization) = authorization {
            request = request.header("authorization", authorization);
        }
        request = match body {
            Some(body) => request
                .header("content-type", body.content_type)
                .body(body.text.to_string()),
            // The service insists on a Content-Length, even for empty PUTs
            None if is_put => request.body(""),
            None => request,
        };

        Ok(request.send().await?)
    }

    async fn handle_error(response: Response) -> StorageError {
        let status = response.status();
        if status.is_server_error() {
            return StorageError::unknown_error(status);
        }
        let header_code = response
            .headers()
            .get("x-ms-error-code")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.unwrap_or_default();
        let code = header_code.or_else(|| xml_element(&body, "Code"));
        match code.as_deref() {
            Some("ContainerNotFound") => StorageError::ContainerNotFound(),
            Some("BlobNotFound") => StorageError::BlobNotFound(),
            Some("ContainerAlreadyExists") => StorageError::ContainerAlreadyExists(),
            Some("AuthenticationFailed")
            | Some("AuthorizationFailure")
            | Some("AuthorizationPermissionMismatch") => StorageError::Forbidden(),
            _ if status == StatusCode::FORBIDDEN => StorageError::Forbidden(),
            _ if status == StatusCode::BAD_REQUEST => StorageError::BadRequest(
                xml_element(&body, "Message")
                    .or(code)
                    .unwrap_or_else(|| "unknown details".to_string()),
            ),
            _ => StorageError::unknown_error(status),
        }
    }
}

#[async_trait]
impl BlobContainerApi for AzureContainerClient {
    fn container_name(&self) -> &str {
        &self.container_name
    }

    async fn create_if_not_exists(&self) -> Result<bool> {
        let url = self.container_request_url(&[("restype", "container".to_string())]);
        let response = self.send(Method::PUT, url, vec![], None).await?;

        if response.status() == StatusCode::CREATED {
            return Ok(true);
        }
        match Self::handle_error(response).await {
            StorageError::ContainerAlreadyExists() => Ok(false),
            err => Err(err),
        }
    }

    async fn list(&self, options: ListBlobsOptions) -> Result<ListBlobsResult> {
        let mut params = vec![
            ("restype", "container".to_string()),
            ("comp", "list".to_string()),
        ];
        if let Some(prefix) = options.prefix {
            params.push(("prefix", prefix));
        }
        if let Some(max_results) = options.max_results {
            params.push(("maxresults", max_results.to_string()));
        }
        if let Some(marker) = options.marker {
            params.push(("marker", marker));
        }
        let url = self.container_request_url(&params);
        let response = self.send(Method::GET, url, vec![], None).await?;

        if response.status() != StatusCode::OK {
            Err(Self::handle_error(response).await)
        } else {
            parse_list_response(&response.text().await?)
        }
    }

    async fn upload_text(&self, name: &str, text: &str) -> Result<()> {
        if name.is_empty() {
            return Err(StorageError::required("name"));
        }

        let url = self.blob_request_url(name);
        let response = self
            .send(
                Method::PUT,
                url,
                vec![("x-ms-blob-type", "BlockBlob".to_string())],
                Some(TextBody {
                    text,
                    content_type: TEXT_CONTENT_TYPE,
                }),
            )
            .await?;

        if response.status() != StatusCode::CREATED {
            Err(Self::handle_error(response).await)
        } else {
            Ok(())
        }
    }

    async fn download(&self, name: &str) -> Result<Bytes> {
        if name.is_empty() {
            return Err(StorageError::required("name"));
        }

        let url = self.blob_request_url(name);
        let response = self.send(Method::GET, url, vec![], None).await?;

        if response.status() != StatusCode::OK {
            Err(Self::handle_error(response).await)
        } else {
            Ok(response.bytes().await?)
        }
    }

    async fn delete(&self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(StorageError::required("name"));
        }

        let url = self.blob_request_url(name);
        let response = self.send(Method::DELETE, url, vec![], None).await?;

        if response.status() != StatusCode::ACCEPTED {
            Err(Self::handle_error(response).await)
        } else {
            Ok(())
        }
    }
}

/// Pulls the blob names and next marker out of an `EnumerationResults` document
fn parse_list_response(body: &str) -> Result<ListBlobsResult> {
    if !body.contains("<EnumerationResults") {
        return Err(StorageError::InvalidResponse(
            "list response is not an EnumerationResults document".to_string(),
        ));
    }

    let mut blobs = Vec::new();
    let mut rest = body;
    while let Some(start) = rest.find("<Blob>") {
        let blob = &rest[start..];
        let end = blob.find("</Blob>").ok_or_else(|| {
            StorageError::InvalidResponse("unterminated Blob element".to_string())
        })?;
        let name = blob_name(&blob[..end]).ok_or_else(|| {
            StorageError::InvalidResponse("Blob element without a Name".to_string())
        })?;
        blobs.push(BlobDescriptor { name });
        rest = &blob[end..];
    }

    Ok(ListBlobsResult {
        blobs,
        next_marker: xml_element(body, "NextMarker"),
    })
}

/// The name of a listed blob
///
/// Names holding characters that XML cannot carry come back percent-encoded
/// and flagged with `Encoded="true"`.
fn blob_name(blob: &str) -> Option<String> {
    let (attributes, raw) = find_element(blob, "Name")?;
    let text = unescape_xml(raw);
    let name = if attributes.contains("Encoded=\"true\"") {
        percent_decode_str(&text).decode_utf8_lossy().into_owned()
    } else {
        text
    };
    (!name.is_empty()).then_some(name)
}

/// The unescaped text of the first non-empty `tag` element in `xml`
fn xml_element(xml: &str, tag: &str) -> Option<String> {
    let (_, raw) = find_element(xml, tag)?;
    let text = unescape_xml(raw);
    (!text.is_empty()).then_some(text)
}

/// The attributes and raw content of the first `tag` element in `xml`
///
/// A self-closing element has empty content.
fn find_element<'a>(xml: &'a str, tag: &str) -> Option<(&'a str, &'a str)> {
    let open = format!("<{}", tag);
    let close = format!("</{}>", tag);
    let mut rest = xml;
    loop {
        let after = &rest[rest.find(&open)? + open.len()..];
        match after.chars().next()? {
            '>' | '/' | ' ' | '\t' | '\r' | '\n' => {
                let tag_end = after.find('>')?;
                let attributes = &after[..tag_end];
                if let Some(attributes) = attributes.strip_suffix('/') {
                    return Some((attributes, ""));
                }
                let content = &after[tag_end + 1..];
                let end = content.find(&close)?;
                return Some((attributes, &content[..end]));
            }
            // Some longer tag that merely starts with `tag`
            _ => rest = after,
        }
    }
}

fn unescape_xml(text: &str) -> String {
    let mut unescaped = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        unescaped.push_str(&rest[..amp]);
        let reference = &rest[amp..];
        let decoded = reference
            .find(';')
            .and_then(|end| Some((decode_reference(&reference[1..end])?, end)));
        match decoded {
            Some((c, end)) => {
                unescaped.push(c);
                rest = &reference[end + 1..];
            }
            None => {
                unescaped.push('&');
                rest = &reference[1..];
            }
        }
    }
    unescaped.push_str(rest);
    unescaped
}

fn decode_reference(reference: &str) -> Option<char> {
    match reference {
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "amp" => Some('&'),
        _ => {
            let code = match reference
                .strip_prefix("#x")
                .or_else(|| reference.strip_prefix("#X"))
            {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => reference.strip_prefix('#')?.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}

/// These unit tests test against a mock server.  They will not test integration issues
/// with the blob service but they are useful for regression and testing corner cases.
#[cfg(test)]
mod tests {

    use all_asserts::{assert_false, assert_true};
    use mockito::{Matcher, ServerGuard};

    use super::*;

    const DEV_KEY: &str =
        "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";

    fn mock_list_body(names: &[&str], next_marker: Option<&str>) -> String {
        let blobs = names
            .iter()
            .map(|name| {
                format!(
                    "<Blob><Name>{}</Name><Properties><Content-Length>5</Content-Length>\
                     <BlobType>BlockBlob</BlobType></Properties></Blob>",
                    name
                )
            })
            .collect::<String>();
        let marker = match next_marker {
            Some(marker) => format!("<NextMarker>{}</NextMarker>", marker),
            None => "<NextMarker />".to_string(),
        };
        format!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>\
             <EnumerationResults ServiceEndpoint=\"http://127.0.0.1/\" ContainerName=\"samples\">\
             <MaxResults>50</MaxResults><Blobs>{}</Blobs>{}</EnumerationResults>",
            blobs, marker
        )
    }

    fn shared_key_client(server: &ServerGuard) -> AzureContainerClient {
        let account = StorageAccount::from_connection_string(&format!(
            "DefaultEndpointsProtocol=http;AccountName=devstoreaccount1;AccountKey={};BlobEndpoint={}/devstoreaccount1;",
            DEV_KEY,
            server.url()
        ))
        .unwrap();
        account.container("samples")
    }

    fn sas_client(server: &ServerGuard) -> AzureContainerClient {
        AzureContainerClient::from_sas_url(&format!(
            "{}/samples?sv=2021-08-06&sr=c&sp=rwdl&sig=abc",
            server.url()
        ))
        .unwrap()
    }

    fn container_path() -> Matcher {
        Matcher::Regex(r"^/devstoreaccount1/samples(\?|$)".to_string())
    }

    fn blob_path(name: &str) -> Matcher {
        Matcher::Regex(format!(r"^/devstoreaccount1/samples/{}(\?|$)", name))
    }

    #[tokio::test]
    async fn can_list_first_page() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", container_path())
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("restype".into(), "container".into()),
                Matcher::UrlEncoded("comp".into(), "list".into()),
                Matcher::UrlEncoded("maxresults".into(), "50".into()),
            ]))
            .match_header(
                "authorization",
                Matcher::Regex("^SharedKey devstoreaccount1:".to_string()),
            )
            .match_header("x-ms-version", BLOB_API_VERSION)
            .match_header("x-ms-date", Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/xml")
            .with_body(mock_list_body(&["a.txt", "b.txt", "c.txt"], Some("marker-1")))
            .create_async()
            .await;

        let client = shared_key_client(&server);

        let results = client
            .list(ListBlobsOptions {
                max_results: Some(50),
                ..Default::default()
            })
            .await
            .unwrap();

        let names = results
            .blobs
            .iter()
            .map(|blob| blob.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["a.txt", "b.txt", "c.txt"]);
        assert_eq!(results.next_marker.as_deref(), Some("marker-1"));

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn can_list_last_page_with_marker() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", container_path())
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("marker".into(), "marker-1".into()),
                Matcher::UrlEncoded("comp".into(), "list".into()),
            ]))
            .with_status(200)
            .with_body(mock_list_body(&["d&amp;e.txt"], None))
            .create_async()
            .await;

        let client = shared_key_client(&server);

        let results = client
            .list(ListBlobsOptions {
                marker: Some("marker-1".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(results.blobs, vec![BlobDescriptor::new("d&e.txt")]);
        assert_true!(results.next_marker.is_none());

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn sas_requests_carry_the_signature() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", Matcher::Regex(r"^/samples(\?|$)".to_string()))
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("sig".into(), "abc".into()),
                Matcher::UrlEncoded("sv".into(), "2021-08-06".into()),
                Matcher::UrlEncoded("comp".into(), "list".into()),
            ]))
            .match_header("authorization", Matcher::Missing)
            .with_status(200)
            .with_body(mock_list_body(&[], None))
            .create_async()
            .await;

        let client = sas_client(&server);
        assert_eq!(client.container_name(), "samples");

        let results = client.list(Default::default()).await.unwrap();
        assert_true!(results.blobs.is_empty());

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn create_if_not_exists_reports_creation() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", container_path())
            .match_query(Matcher::UrlEncoded("restype".into(), "container".into()))
            .with_status(201)
            .create_async()
            .await;

        let client = shared_key_client(&server);
        assert_true!(client.create_if_not_exists().await.unwrap());

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn create_if_not_exists_tolerates_existing_container() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", container_path())
            .with_status(409)
            .with_header("x-ms-error-code", "ContainerAlreadyExists")
            .create_async()
            .await;

        let client = shared_key_client(&server);
        assert_false!(client.create_if_not_exists().await.unwrap());

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn can_upload_text() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", blob_path("new.txt"))
            .match_header("x-ms-blob-type", "BlockBlob")
            .match_header("content-type", TEXT_CONTENT_TYPE)
            .match_header(
                "authorization",
                Matcher::Regex("^SharedKey devstoreaccount1:".to_string()),
            )
            .match_body("hello")
            .with_status(201)
            .create_async()
            .await;

        let client = shared_key_client(&server);
        client.upload_text("new.txt", "hello").await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn upload_requires_a_name() {
        let server = mockito::Server::new_async().await;
        let client = shared_key_client(&server);

        let err = client.upload_text("", "hello").await.unwrap_err();
        assert_true!(matches!(err, StorageError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn can_download_text() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", Matcher::Regex(r"^/samples/notes/today\.txt(\?|$)".to_string()))
            .match_query(Matcher::UrlEncoded("sig".into(), "abc".into()))
            .with_status(200)
            .with_body("hello world")
            .create_async()
            .await;

        let client = sas_client(&server);
        let text = client.download_text("notes/today.txt").await.unwrap();
        assert_eq!(text, "hello world");

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn download_rejects_binary_content() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", blob_path("image.bin"))
            .with_status(200)
            .with_body(vec![0xff_u8, 0xfe, 0x00])
            .create_async()
            .await;

        let client = shared_key_client(&server);
        let err = client.download_text("image.bin").await.unwrap_err();
        assert_true!(matches!(err, StorageError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn can_delete() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("DELETE", blob_path("old.txt"))
            .with_status(202)
            .create_async()
            .await;

        let client = shared_key_client(&server);
        client.delete("old.txt").await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn delete_of_missing_blob_is_reported() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("DELETE", blob_path("gone.txt"))
            .with_status(404)
            .with_header("x-ms-error-code", "BlobNotFound")
            .create_async()
            .await;

        let client = shared_key_client(&server);
        let err = client.delete("gone.txt").await.unwrap_err();
        assert_true!(matches!(err, StorageError::BlobNotFound()));
    }

    #[tokio::test]
    async fn maps_service_errors() {
        let mut server = mockito::Server::new_async().await;
        let _forbidden = server
            .mock("GET", blob_path("secret.txt"))
            .with_status(403)
            .with_header("x-ms-error-code", "AuthenticationFailed")
            .create_async()
            .await;
        let _bad = server
            .mock("DELETE", blob_path("bad.txt"))
            .with_status(400)
            .with_body(
                "<?xml version=\"1.0\" encoding=\"utf-8\"?><Error><Code>InvalidUri</Code>\
                 <Message>The requested URI does not represent any resource</Message></Error>",
            )
            .create_async()
            .await;
        let _unavailable = server
            .mock("GET", container_path())
            .with_status(503)
            .create_async()
            .await;

        let client = shared_key_client(&server);

        let err = client.download("secret.txt").await.unwrap_err();
        assert_true!(matches!(err, StorageError::Forbidden()));

        match client.delete("bad.txt").await.unwrap_err() {
            StorageError::BadRequest(message) => {
                assert_eq!(message, "The requested URI does not represent any resource")
            }
            other => panic!("Expected a bad request error, got {:?}", other),
        }

        match client.list(Default::default()).await.unwrap_err() {
            StorageError::UnknownError(status, _) => assert_eq!(status, 503),
            other => panic!("Expected an unknown error, got {:?}", other),
        }
    }

    #[test]
    fn list_parser_rejects_garbage() {
        let err = parse_list_response("<html>oops</html>").unwrap_err();
        assert_true!(matches!(err, StorageError::InvalidResponse(_)));

        let err = parse_list_response("<EnumerationResults><Blobs><Blob><Name>a")
            .unwrap_err();
        assert_true!(matches!(err, StorageError::InvalidResponse(_)));
    }

    #[test]
    fn list_parser_decodes_awkward_names() {
        let body = "<?xml version=\"1.0\" encoding=\"utf-8\"?>\
                    <EnumerationResults ContainerName=\"samples\"><Blobs>\
                    <Blob><Name Encoded=\"true\">a%01b</Name></Blob>\
                    <Blob><Name>fish &amp; chips</Name></Blob>\
                    <Blob><Name>caf&#xE9; &#60;menu&#62;</Name></Blob>\
                    <Blob><Name>plain.txt</Name><Properties><Content-Length>1</Content-Length></Properties></Blob>\
                    </Blobs><NextMarker>2!token</NextMarker></EnumerationResults>";

        let result = parse_list_response(body).unwrap();

        assert_eq!(
            result.blobs,
            vec![
                BlobDescriptor::new("a\u{1}b"),
                BlobDescriptor::new("fish & chips"),
                BlobDescriptor::new("caf\u{e9} <menu>"),
                BlobDescriptor::new("plain.txt"),
            ]
        );
        assert_eq!(result.next_marker.as_deref(), Some("2!token"));
    }

    #[test]
    fn unescape_leaves_stray_ampersands() {
        assert_eq!(unescape_xml("a & b &amp;lt; &#xZZ; &bogus;"), "a & b &lt; &#xZZ; &bogus;");
        assert_eq!(xml_element("<NextMarker />", "NextMarker"), None);
    }

    #[test]
    fn container_urls_from_account() {
        let account = StorageAccount::from_connection_string(&format!(
            "AccountName=acct;AccountKey={}",
            DEV_KEY
        ))
        .unwrap();
        let client = account.container("samples");
        assert_eq!(
            client.url().as_str(),
            "https://acct.blob.core.windows.net/samples"
        );
        assert_eq!(
            client.blob_request_url("dir/a b.txt").as_str(),
            "https://acct.blob.core.windows.net/samples/dir/a%20b.txt"
        );
    }
}
