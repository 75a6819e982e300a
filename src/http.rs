//! Blocking HTTP transport for talking to the Duplicati server.
//!
//! Requests are described by `HttpRequest` and executed through the
//! `Transport` trait so the session logic can be driven by a scripted
//! transport in tests. Redirects are never followed: the login probe relies
//! on seeing the raw 302.

use crate::error::ClientError;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

/// Timeout applied to every request
const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

/// A file uploaded as `multipart/form-data` together with plain form fields
#[derive(Debug, Clone, PartialEq)]
pub struct MultipartUpload {
    pub field: String,
    pub file_name: String,
    pub mime: String,
    pub content: String,
    pub fields: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Form(Vec<(String, String)>),
    Json(String),
    Multipart(MultipartUpload),
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub cookies: Vec<(String, String)>,
    pub body: RequestBody,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            cookies: Vec::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn cookie(mut self, name: &str, value: &str) -> Self {
        self.cookies.push((name.to_string(), value.to_string()));
        self
    }

    pub fn form(mut self, fields: &[(&str, &str)]) -> Self {
        self.body = RequestBody::Form(
            fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
        self
    }

    pub fn json(mut self, body: String) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    pub fn multipart(mut self, upload: MultipartUpload) -> Self {
        self.body = RequestBody::Multipart(upload);
        self
    }

    /// Value for the `Cookie` header, if any cookies are attached
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    pub status: u16,
    /// Raw `name=value` pairs taken from `Set-Cookie` headers
    pub cookies: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }

    /// Percent-decoded value of a cookie set by the server
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.cookies
            .iter()
            .rev()
            .find(|(k, _)| k == name)
            .map(|(_, v)| decode_component(v))
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ClientError> {
        serde_json::from_str(&self.body).map_err(|e| ClientError::InvalidResponse(e.to_string()))
    }
}

/// Percent-decode a cookie or JSON value; undecodable input is kept as-is
pub fn decode_component(value: &str) -> String {
    urlencoding::decode(value)
        .map(|v| v.into_owned())
        .unwrap_or_else(|_| value.to_string())
}

/// Parse the `name=value` pair at the front of a `Set-Cookie` header
fn parse_set_cookie(header: &str) -> Option<(String, String)> {
    let pair = header.split(';').next()?;
    let (name, value) = pair.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.trim().trim_matches('"').to_string()))
}

/// Trait for HTTP transports to allow mocking and abstraction
pub trait Transport {
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ClientError>;
}

/// Default transport: `ureq` for regular calls, `reqwest` for multipart uploads
pub struct HttpClient {
    agent: ureq::Agent,
    uploader: reqwest::blocking::Client,
}

impl HttpClient {
    pub fn new() -> Result<Self, ClientError> {
        let timeout = Duration::from_secs(REQUEST_TIMEOUT_SECS);
        let agent = ureq::AgentBuilder::new()
            .redirects(0)
            .timeout(timeout)
            .build();
        let uploader = reqwest::blocking::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        Ok(Self { agent, uploader })
    }

    fn execute_ureq(&self, request: HttpRequest) -> Result<HttpResponse, ClientError> {
        let mut req = self.agent.request(request.method.as_str(), &request.url);
        for (key, value) in &request.query {
            req = req.query(key, value);
        }
        for (name, value) in &request.headers {
            req = req.set(name, value);
        }
        if let Some(cookies) = request.cookie_header() {
            req = req.set("Cookie", &cookies);
        }

        let result = match &request.body {
            RequestBody::Empty => req.call(),
            RequestBody::Form(fields) => {
                let pairs: Vec<(&str, &str)> = fields
                    .iter()
                    .map(|(k, v)| (k.as_str(), v.as_str()))
                    .collect();
                req.send_form(&pairs)
            }
            RequestBody::Json(body) => req
                .set("Content-Type", "application/json")
                .send_string(body),
            RequestBody::Multipart(_) => {
                return Err(ClientError::Transport(
                    "multipart bodies are sent through the upload client".to_string(),
                ))
            }
        };

        let resp = match result {
            Ok(r) => r,
            // Error statuses are answers too; callers decide what they mean
            Err(ureq::Error::Status(_, r)) => r,
            Err(e) => return Err(ClientError::Transport(e.to_string())),
        };

        let status = resp.status();
        let cookies = resp
            .all("set-cookie")
            .into_iter()
            .filter_map(parse_set_cookie)
            .collect();
        let body = resp.into_string().unwrap_or_default();
        Ok(HttpResponse {
            status,
            cookies,
            body,
        })
    }

    fn execute_upload(
        &self,
        request: &HttpRequest,
        upload: &MultipartUpload,
    ) -> Result<HttpResponse, ClientError> {
        use reqwest::blocking::multipart;

        let part = multipart::Part::text(upload.content.clone())
            .file_name(upload.file_name.clone())
            .mime_str(&upload.mime)
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        let mut form = multipart::Form::new().part(upload.field.clone(), part);
        for (key, value) in &upload.fields {
            form = form.text(key.clone(), value.clone());
        }

        let mut req = self
            .uploader
            .post(&request.url)
            .query(&request.query)
            .multipart(form);
        for (name, value) in &request.headers {
            req = req.header(name.as_str(), value.as_str());
        }
        if let Some(cookies) = request.cookie_header() {
            req = req.header(reqwest::header::COOKIE, cookies);
        }

        let resp = req
            .send()
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        let status = resp.status().as_u16();
        let cookies = resp
            .headers()
            .get_all(reqwest::header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(parse_set_cookie)
            .collect();
        let body = resp.text().unwrap_or_default();
        Ok(HttpResponse {
            status,
            cookies,
            body,
        })
    }
}

impl Transport for HttpClient {
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ClientError> {
        debug!(method = request.method.as_str(), url = %request.url, "sending request");
        let response = match &request.body {
            RequestBody::Multipart(upload) => self.execute_upload(&request, upload),
            _ => self.execute_ureq(request),
        }?;
        debug!(status = response.status, "received response");
        Ok(response)
    }
}

#[cfg(test)]
impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            cookies: Vec::new(),
            body: body.into(),
        }
    }

    pub fn with_cookie(mut self, name: &str, value: &str) -> Self {
        self.cookies.push((name.to_string(), value.to_string()));
        self
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    /// Transport that replays scripted responses and records every request
    #[derive(Default)]
    pub struct MockTransport {
        responses: RefCell<VecDeque<HttpResponse>>,
        pub requests: RefCell<Vec<HttpRequest>>,
    }

    impl MockTransport {
        pub fn new(responses: Vec<HttpResponse>) -> Self {
            Self {
                responses: RefCell::new(responses.into()),
                requests: RefCell::new(Vec::new()),
            }
        }

        pub fn request_count(&self) -> usize {
            self.requests.borrow().len()
        }

        pub fn request(&self, index: usize) -> HttpRequest {
            self.requests.borrow()[index].clone()
        }
    }

    impl Transport for MockTransport {
        fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ClientError> {
            self.requests.borrow_mut().push(request);
            self.responses
                .borrow_mut()
                .pop_front()
                .ok_or_else(|| ClientError::Transport("no scripted response left".to_string()))
        }
    }
}
