//! S3-compatible gateway (path-style addressing, SigV4).

use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Body, Client, Method, Response, StatusCode, Url};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, instrument};

use super::sigv4::{self, CanonicalRequest, Credentials};
use super::{ObjectMeta, ObjectStore, StoreResult};
use crate::config::StoreConfig;
use crate::error::StoreError;

/// Object store speaking the S3 REST API
#[derive(Debug, Clone)]
pub struct S3Store {
    client: Client,
    endpoint: Url,
    bucket: String,
    creds: Credentials,
}

/// Body of a signed request
enum Payload {
    Empty,
    Bytes(Bytes),
    File { path: std::path::PathBuf, len: u64 },
}

impl S3Store {
    pub fn new(config: &StoreConfig) -> StoreResult<Self> {
        let endpoint = Url::parse(config.endpoint.trim_end_matches('/'))
            .map_err(|e| StoreError::Backend(format!("invalid endpoint URL: {e}")))?;
        if endpoint.host_str().is_none() {
            return Err(StoreError::Backend(format!(
                "endpoint URL has no host: {}",
                config.endpoint
            )));
        }

        let client = Client::builder().timeout(config.request_timeout).build()?;

        Ok(Self {
            client,
            endpoint,
            bucket: config.bucket.clone(),
            creds: Credentials {
                access_key_id: config.access_key_id.clone(),
                secret_access_key: config.secret_access_key.clone(),
                region: config.region.clone(),
            },
        })
    }

    fn host_header(&self) -> String {
        let host = self.endpoint.host_str().unwrap_or_default();
        match self.endpoint.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        }
    }

    /// Encoded `/{bucket}/{key}` path, under any base path of the endpoint
    fn object_path(&self, key: &str) -> String {
        let base = self.endpoint.path().trim_end_matches('/');
        sigv4::encode_path(&format!("{base}/{}/{key}", self.bucket))
    }

    fn bucket_path(&self) -> String {
        let base = self.endpoint.path().trim_end_matches('/');
        sigv4::encode_path(&format!("{base}/{}", self.bucket))
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        extra_headers: &[(&str, String)],
        payload: Payload,
    ) -> StoreResult<Response> {
        let now = Utc::now();
        let (payload_hash, body, content_length) = match payload {
            Payload::Empty => (sigv4::sha256_hex(b""), None, None),
            Payload::Bytes(bytes) => {
                let len = bytes.len() as u64;
                (sigv4::sha256_hex(&bytes), Some(Body::from(bytes)), Some(len))
            }
            Payload::File { path: source, len } => {
                let file = tokio::fs::File::open(&source).await?;
                let stream = ReaderStream::new(file);
                (
                    sigv4::UNSIGNED_PAYLOAD.to_string(),
                    Some(Body::wrap_stream(stream)),
                    Some(len),
                )
            }
        };

        let mut signed: Vec<(&str, String)> = vec![
            ("host", self.host_header()),
            ("x-amz-content-sha256", payload_hash.clone()),
            ("x-amz-date", sigv4::amz_date(now)),
        ];
        signed.extend(extra_headers.iter().cloned());

        let auth = sigv4::authorization(
            &self.creds,
            &CanonicalRequest {
                method: method.as_str(),
                path,
                query,
                headers: &signed,
                payload_hash: &payload_hash,
            },
            now,
        );

        let mut url = self.endpoint.clone();
        url.set_path(path);
        let query_string = sigv4::canonical_query(query);
        url.set_query((!query_string.is_empty()).then_some(query_string.as_str()));

        let mut headers = HeaderMap::new();
        for (name, value) in signed.iter().filter(|(name, _)| *name != "host") {
            headers.insert(header_name(name)?, header_value(value)?);
        }
        headers.insert(reqwest::header::AUTHORIZATION, header_value(&auth)?);
        if let Some(len) = content_length {
            headers.insert(reqwest::header::CONTENT_LENGTH, HeaderValue::from(len));
        }

        debug!(method = %method, url = %url, "S3 request");
        let mut request = self.client.request(method, url).headers(headers);
        if let Some(body) = body {
            request = request.body(body);
        }
        Ok(request.send().await?)
    }

    async fn put_payload(
        &self,
        key: &str,
        payload: Payload,
        content_type: Option<&str>,
        if_none_match: bool,
    ) -> StoreResult<Response> {
        let mut extra = Vec::new();
        if let Some(ct) = content_type {
            extra.push(("content-type", ct.to_string()));
        }
        if if_none_match {
            extra.push(("if-none-match", "*".to_string()));
        }
        self.send(Method::PUT, &self.object_path(key), &[], &extra, payload)
            .await
    }
}

fn header_name(name: &str) -> StoreResult<HeaderName> {
    HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| StoreError::Backend(format!("invalid header name {name}: {e}")))
}

fn header_value(value: &str) -> StoreResult<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| StoreError::Backend(format!("invalid header value: {e}")))
}

/// Map a non-success response to a store error
async fn error_for(key: &str, response: Response) -> StoreError {
    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return StoreError::NotFound(key.to_string());
    }
    let body = response.text().await.unwrap_or_default();
    let code = xml_tag(&body, "Code").unwrap_or_default();
    StoreError::Backend(format!("{status} {code} for {key}").trim().to_string())
}

fn last_modified_header(response: &Response) -> DateTime<Utc> {
    response
        .headers()
        .get(reqwest::header::LAST_MODIFIED)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| DateTime::parse_from_rfc2822(v).ok())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}

/// Text of the first `<tag>...</tag>` in `xml`, entity-decoded
fn xml_tag(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = xml.find(&open)? + open.len();
    let end = start + xml[start..].find(&close)?;
    Some(xml_unescape(&xml[start..end]))
}

/// Every `<tag>...</tag>` block body in `xml`
fn xml_blocks<'a>(xml: &'a str, tag: &str) -> Vec<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let mut blocks = Vec::new();
    let mut rest = xml;
    while let Some(start) = rest.find(&open) {
        let body_start = start + open.len();
        let Some(len) = rest[body_start..].find(&close) else {
            break;
        };
        blocks.push(&rest[body_start..body_start + len]);
        rest = &rest[body_start + len + close.len()..];
    }
    blocks
}

fn xml_unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// One page of a ListObjectsV2 response
fn parse_list_page(xml: &str) -> StoreResult<(Vec<ObjectMeta>, Option<String>)> {
    let mut objects = Vec::new();
    for block in xml_blocks(xml, "Contents") {
        let key = xml_tag(block, "Key")
            .ok_or_else(|| StoreError::Backend("listing entry without Key".to_string()))?;
        let last_modified = xml_tag(block, "LastModified")
            .and_then(|v| DateTime::parse_from_rfc3339(&v).ok())
            .map(|t| t.with_timezone(&Utc))
            .ok_or_else(|| StoreError::Backend(format!("bad LastModified for {key}")))?;
        let size = xml_tag(block, "Size")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        objects.push(ObjectMeta {
            key,
            last_modified,
            size,
        });
    }

    let truncated = xml_tag(xml, "IsTruncated").as_deref() == Some("true");
    let token = if truncated {
        xml_tag(xml, "NextContinuationToken")
    } else {
        None
    };
    Ok((objects, token))
}

#[async_trait]
impl ObjectStore for S3Store {
    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> StoreResult<Bytes> {
        let response = self
            .send(Method::GET, &self.object_path(key), &[], &[], Payload::Empty)
            .await?;
        if !response.status().is_success() {
            return Err(error_for(key, response).await);
        }
        Ok(response.bytes().await?)
    }

    #[instrument(skip(self, body), fields(bytes = body.len()))]
    async fn put(&self, key: &str, body: Bytes, content_type: Option<&str>) -> StoreResult<()> {
        let response = self
            .put_payload(key, Payload::Bytes(body), content_type, false)
            .await?;
        if !response.status().is_success() {
            return Err(error_for(key, response).await);
        }
        Ok(())
    }

    #[instrument(skip(self, body))]
    async fn put_if_absent(
        &self,
        key: &str,
        body: Bytes,
        content_type: Option<&str>,
    ) -> StoreResult<bool> {
        let response = self
            .put_payload(key, Payload::Bytes(body), content_type, true)
            .await?;
        match response.status() {
            s if s.is_success() => Ok(true),
            StatusCode::PRECONDITION_FAILED | StatusCode::CONFLICT => Ok(false),
            StatusCode::NOT_IMPLEMENTED => Err(StoreError::Unsupported(
                crate::error::constants::ERR_CONDITIONAL_PUT,
            )),
            _ => Err(error_for(key, response).await),
        }
    }

    #[instrument(skip(self))]
    async fn delete(&self, key: &str) -> StoreResult<()> {
        let response = self
            .send(Method::DELETE, &self.object_path(key), &[], &[], Payload::Empty)
            .await?;
        if !response.status().is_success() {
            return Err(error_for(key, response).await);
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn head(&self, key: &str) -> StoreResult<ObjectMeta> {
        let response = self
            .send(Method::HEAD, &self.object_path(key), &[], &[], Payload::Empty)
            .await?;
        if !response.status().is_success() {
            return Err(error_for(key, response).await);
        }
        Ok(ObjectMeta {
            key: key.to_string(),
            last_modified: last_modified_header(&response),
            size: response
                .headers()
                .get(reqwest::header::CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
        })
    }

    #[instrument(skip(self))]
    async fn list(&self, prefix: &str) -> StoreResult<Vec<ObjectMeta>> {
        let path = self.bucket_path();
        let mut objects = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let mut query = vec![("list-type", "2".to_string()), ("prefix", prefix.to_string())];
            if let Some(t) = token.take() {
                query.push(("continuation-token", t));
            }

            let response = self
                .send(Method::GET, &path, &query, &[], Payload::Empty)
                .await?;
            if !response.status().is_success() {
                let err = error_for(&self.bucket, response).await;
                return Err(match err {
                    StoreError::NotFound(bucket) => {
                        StoreError::Backend(format!("bucket not found: {bucket}"))
                    }
                    other => other,
                });
            }

            let xml = response.text().await?;
            let (page, next) = parse_list_page(&xml)?;
            objects.extend(page);
            match next {
                Some(t) => token = Some(t),
                None => break,
            }
        }

        Ok(objects)
    }

    #[instrument(skip(self))]
    async fn put_file(&self, key: &str, path: &Path) -> StoreResult<()> {
        let len = tokio::fs::metadata(path).await?.len();
        let payload = Payload::File {
            path: path.to_path_buf(),
            len,
        };
        let response = self.put_payload(key, payload, None, false).await?;
        if !response.status().is_success() {
            return Err(error_for(key, response).await);
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_to_file(&self, key: &str, path: &Path) -> StoreResult<()> {
        let response = self
            .send(Method::GET, &self.object_path(key), &[], &[], Payload::Empty)
            .await?;
        if !response.status().is_success() {
            return Err(error_for(key, response).await);
        }

        let mut file = tokio::fs::File::create(path).await?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            file.write_all(&chunk?).await?;
        }
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
  <Name>worlds</Name><Prefix>backups/</Prefix><KeyCount>2</KeyCount>
  <IsTruncated>true</IsTruncated>
  <NextContinuationToken>abc==</NextContinuationToken>
  <Contents><Key>backups/backup-20240101-000000.tar.gz</Key><LastModified>2024-01-01T00:00:05.000Z</LastModified><Size>1024</Size></Contents>
  <Contents><Key>backups/a&amp;b.tar.gz</Key><LastModified>2024-01-02T00:00:05Z</LastModified><Size>7</Size></Contents>
</ListBucketResult>"#;

    #[test]
    fn test_parse_list_page() {
        let (objects, token) = parse_list_page(PAGE).unwrap();
        assert_eq!(token.as_deref(), Some("abc=="));
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].key, "backups/backup-20240101-000000.tar.gz");
        assert_eq!(objects[0].size, 1024);
        assert_eq!(objects[1].key, "backups/a&b.tar.gz");
        assert!(objects[0].last_modified < objects[1].last_modified);
    }

    #[test]
    fn test_last_page_has_no_token() {
        let xml = "<ListBucketResult><IsTruncated>false</IsTruncated></ListBucketResult>";
        let (objects, token) = parse_list_page(xml).unwrap();
        assert!(objects.is_empty());
        assert!(token.is_none());
    }

    #[test]
    fn test_paths() {
        let config = StoreConfig {
            endpoint: "https://acct.r2.cloudflarestorage.com".into(),
            bucket: "worlds".into(),
            access_key_id: "ak".into(),
            secret_access_key: "sk".into(),
            ..StoreConfig::default()
        };
        let store = S3Store::new(&config).unwrap();
        assert_eq!(store.host_header(), "acct.r2.cloudflarestorage.com");
        assert_eq!(store.object_path("server.lock"), "/worlds/server.lock");
        assert_eq!(store.bucket_path(), "/worlds");
    }
}
