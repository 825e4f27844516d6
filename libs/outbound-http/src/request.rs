use crate::client::PooledClient;
use crate::config::TransportSecurity;
use crate::error::{HttpError, InvalidUriKind};
use crate::response::PooledResponse;
use bytes::Bytes;
use http::Request;
use http::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use http_body_util::Full;
use serde::Serialize;

/// Encoded request body and the content type it implies.
#[derive(Clone, Debug, Default)]
struct Body {
    bytes: Bytes,
    content_type: Option<&'static str>,
}

/// Single outbound request on a [`PooledClient`].
///
/// Obtained from [`PooledClient::get`], [`PooledClient::post`] or
/// [`PooledClient::request`]. A malformed header is remembered and reported
/// by the next fallible call.
///
/// ```ignore
/// let resp = client
///     .post("https://sts.example.com/oauth2/token")
///     .header("accept", "application/json")
///     .form(&[("grant_type", "client_credentials")])?
///     .send()
///     .await?;
/// ```
#[must_use = "nothing is sent until .send() is awaited"]
pub struct RequestBuilder {
    client: PooledClient,
    method: http::Method,
    url: String,
    headers: HeaderMap,
    body: Body,
    deferred: Option<HttpError>,
}

impl RequestBuilder {
    pub(crate) fn new(client: PooledClient, method: http::Method, url: String) -> Self {
        Self {
            client,
            method,
            url,
            headers: HeaderMap::new(),
            body: Body::default(),
            deferred: None,
        }
    }

    /// Set a header, replacing any previous value with the same name.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if self.deferred.is_none() {
            let parsed = HeaderName::try_from(name)
                .map_err(HttpError::from)
                .and_then(|n| Ok((n, HeaderValue::try_from(value)?)));
            match parsed {
                Ok((n, v)) => {
                    self.headers.insert(n, v);
                }
                Err(e) => self.deferred = Some(e),
            }
        }
        self
    }

    /// Merge an already validated header map, replacing same-named entries.
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        for (name, value) in &headers {
            self.headers.insert(name.clone(), value.clone());
        }
        self
    }

    /// Encode `body` as JSON. `Content-Type: application/json` is added at
    /// send time unless a content type was set.
    ///
    /// # Errors
    ///
    /// Serialization failure, or a header error recorded earlier.
    pub fn json<T: Serialize + ?Sized>(self, body: &T) -> Result<Self, HttpError> {
        let bytes = serde_json::to_vec(body)?;
        self.with_body(bytes.into(), "application/json")
    }

    /// Encode `fields` as `application/x-www-form-urlencoded`.
    ///
    /// # Errors
    ///
    /// Encoding failure, or a header error recorded earlier.
    pub fn form<T: Serialize + ?Sized>(self, fields: &T) -> Result<Self, HttpError> {
        let encoded = serde_urlencoded::to_string(fields)?;
        self.with_body(encoded.into(), "application/x-www-form-urlencoded")
    }

    fn with_body(mut self, bytes: Bytes, content_type: &'static str) -> Result<Self, HttpError> {
        if let Some(e) = self.deferred.take() {
            return Err(e);
        }
        self.body = Body {
            bytes,
            content_type: Some(content_type),
        };
        Ok(self)
    }

    /// Send the request and buffer the response.
    ///
    /// Any status, including 3xx, is returned as `Ok`.
    ///
    /// # Errors
    ///
    /// Invalid URL or scheme, a recorded header error, a pool wait or
    /// exchange timeout, or a transport failure.
    pub async fn send(mut self) -> Result<PooledResponse, HttpError> {
        if let Some(e) = self.deferred.take() {
            return Err(e);
        }
        let uri = target_uri(&self.url, self.client.transport_security())?;

        if let Some(ct) = self.body.content_type
            && !self.headers.contains_key(CONTENT_TYPE)
        {
            self.headers.insert(CONTENT_TYPE, HeaderValue::from_static(ct));
        }

        let mut request = Request::builder()
            .method(self.method)
            .uri(uri)
            .body(Full::new(self.body.bytes))?;
        *request.headers_mut() = self.headers;

        self.client.execute(request).await
    }
}

/// Parse `url` and check that its scheme is permitted by `transport`.
fn target_uri(url: &str, transport: TransportSecurity) -> Result<http::Uri, HttpError> {
    let invalid = |kind, reason: String| HttpError::InvalidUri {
        url: url.to_owned(),
        kind,
        reason,
    };

    let uri: http::Uri = url
        .parse()
        .map_err(|e: http::uri::InvalidUri| invalid(InvalidUriKind::ParseError, e.to_string()))?;
    let Some(scheme) = uri.scheme_str() else {
        return Err(invalid(InvalidUriKind::MissingScheme, "no scheme".to_owned()));
    };
    if uri.host().is_none_or(str::is_empty) {
        return Err(invalid(InvalidUriKind::MissingAuthority, "no host".to_owned()));
    }

    let permitted = match scheme {
        "https" => true,
        "http" => transport == TransportSecurity::AllowInsecureHttp,
        _ => false,
    };
    if permitted {
        Ok(uri)
    } else {
        Err(HttpError::InvalidScheme {
            scheme: scheme.to_owned(),
            reason: match transport {
                TransportSecurity::TlsOnly => "only https:// targets are allowed".to_owned(),
                TransportSecurity::AllowInsecureHttp => {
                    "only http:// and https:// targets are allowed".to_owned()
                }
            },
        })
    }
}
