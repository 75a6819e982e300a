//! Session lifecycle against the Duplicati server.
//!
//! Login is a two-phase exchange selected by an unauthenticated probe of the
//! server root:
//! - 200: the server is open, the `xsrf-token` cookie is the whole session
//! - 302: password protected; a nonce and salt are requested from
//!   `/login.cgi` and a salted, nonced SHA-256 digest is posted back
//!
//! Sessions use a sliding expiry: every HTTP 200 on an authenticated call
//! pushes `token_expires` to now + 10 minutes and persists it.

use crate::config::{ServerConfig, Session, SessionStore};
use crate::credentials::CredentialProvider;
use crate::error::ClientError;
use crate::http::{decode_component, HttpRequest, Method, Transport};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::info;

/// Session lifetime in seconds, renewed on every successful call
pub const SESSION_TTL_SECS: i64 = 600;

/// Login endpoint for nonce requests and password submission
const LOGIN_PATH: &str = "/login.cgi";

pub const XSRF_COOKIE: &str = "xsrf-token";
pub const XSRF_HEADER: &str = "X-XSRF-TOKEN";
pub const NONCE_COOKIE: &str = "session-nonce";
pub const AUTH_COOKIE: &str = "session-auth";

/// How the server let us in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginMode {
    /// The server required no password
    Open,
    /// Password challenge completed
    Password,
}

/// Server endpoint fields parsed out of a login URL. `None` means the field
/// falls back to the persisted configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlOverride {
    pub protocol: Option<String>,
    pub host: Option<String>,
    pub port: Option<String>,
}

impl UrlOverride {
    /// Split `protocol:host:port`-like input.
    ///
    /// Slashes and underscores are dropped first, so `https://nas:8200`
    /// parses like `https:nas:8200`. With a single colon, a colon before
    /// index 6 marks a protocol, otherwise a port.
    pub fn parse(input: &str) -> Result<Self, ClientError> {
        let cleaned: String = input.chars().filter(|c| *c != '/' && *c != '_').collect();
        let parts: Vec<&str> = cleaned.split(':').collect();

        let (protocol, host, port) = match parts.len() {
            3 => (parts[0], parts[1], parts[2]),
            2 if cleaned.find(':').is_some_and(|i| i < 6) => (parts[0], parts[1], ""),
            2 => ("", parts[0], parts[1]),
            1 => ("", parts[0], ""),
            _ => return Err(ClientError::InvalidUrl(input.to_string())),
        };

        let port: String = port.chars().filter(|c| c.is_ascii_digit()).collect();
        let protocol = protocol.to_lowercase();
        Ok(Self {
            protocol: ["http", "https"]
                .contains(&protocol.as_str())
                .then_some(protocol),
            host: (!host.is_empty()).then(|| host.to_string()),
            port: (!port.is_empty()).then_some(port),
        })
    }

    /// Overlay the parsed fields on the persisted endpoint
    pub fn resolve(&self, current: &ServerConfig) -> ServerConfig {
        ServerConfig {
            protocol: self
                .protocol
                .clone()
                .unwrap_or_else(|| current.protocol.clone()),
            url: self.host.clone().unwrap_or_else(|| current.url.clone()),
            port: self.port.clone().unwrap_or_else(|| current.port.clone()),
        }
    }
}

/// `SHA256(nonce || SHA256(password || salt))`, base64-encoded.
///
/// `salt` and `nonce` arrive base64-encoded from the server.
pub fn password_digest(password: &str, salt_b64: &str, nonce_b64: &str) -> Result<String, ClientError> {
    let salt = BASE64
        .decode(salt_b64)
        .map_err(|e| auth_failed(format!("Invalid salt from server: {}", e), None))?;
    let nonce = BASE64
        .decode(nonce_b64)
        .map_err(|e| auth_failed(format!("Invalid nonce from server: {}", e), None))?;
    Ok(BASE64.encode(digest_bytes(password.as_bytes(), &salt, &nonce)))
}

fn digest_bytes(password: &[u8], salt: &[u8], nonce: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(password);
    hasher.update(salt);
    let salted = hasher.finalize();

    let mut hasher = Sha256::new();
    hasher.update(nonce);
    hasher.update(salted);
    hasher.finalize().into()
}

fn auth_failed(message: impl Into<String>, status: Option<u16>) -> ClientError {
    ClientError::AuthenticationFailed {
        message: message.into(),
        status,
    }
}

#[derive(Debug, Deserialize)]
struct NonceResponse {
    #[serde(rename = "Salt")]
    salt: String,
    #[serde(rename = "Nonce")]
    nonce: String,
}

/// Credentials a successful handshake hands back
struct Issued {
    token: String,
    nonce: Option<String>,
    session_auth: Option<String>,
}

/// Owns every transition of the persisted session
pub struct SessionManager<'a> {
    store: &'a mut SessionStore,
    transport: &'a dyn Transport,
}

impl<'a> SessionManager<'a> {
    pub fn new(store: &'a mut SessionStore, transport: &'a dyn Transport) -> Self {
        Self { store, transport }
    }

    #[cfg(test)]
    pub fn store(&self) -> &SessionStore {
        &*self.store
    }

    pub fn transport(&self) -> &dyn Transport {
        self.transport
    }

    pub fn server(&self) -> &ServerConfig {
        self.store.server()
    }

    /// Fail unless a token is present and has not expired
    pub fn ensure_authenticated(&self) -> Result<&Session, ClientError> {
        self.ensure_authenticated_at(Utc::now())
    }

    pub fn ensure_authenticated_at(&self, now: DateTime<Utc>) -> Result<&Session, ClientError> {
        let session = self.store.session();
        let expires = match (&session.token, session.token_expires) {
            (Some(_), Some(expires)) => expires,
            _ => return Err(ClientError::Unauthenticated("Not logged in".to_string())),
        };
        if now >= expires {
            return Err(ClientError::Unauthenticated("Token expired".to_string()));
        }
        Ok(session)
    }

    /// Attach the session's header and cookies to `request`
    pub fn authorize(&self, request: HttpRequest) -> Result<HttpRequest, ClientError> {
        let session = self.ensure_authenticated()?;
        Ok(with_session_cookies(request, session).header(XSRF_HEADER, session_token(session)))
    }

    /// Log in, optionally pointing the client at a new server first.
    ///
    /// The resolved endpoint is persisted before the handshake so it sticks
    /// even when the login itself fails.
    pub fn login(
        &mut self,
        url: Option<&str>,
        password: Option<String>,
        credentials: &dyn CredentialProvider,
    ) -> Result<LoginMode, ClientError> {
        if let Some(url) = url {
            let server = UrlOverride::parse(url)?.resolve(self.store.server());
            self.store.config_mut().server = server;
            self.store.save()?;
        }

        let base = self.store.server().base_url("");
        info!("Connecting to {}...", base);
        let probe = self
            .transport
            .execute(HttpRequest::new(Method::Get, base))?;

        let (mode, issued) = match probe.status {
            200 => {
                info!("OK");
                let token = probe
                    .cookie(XSRF_COOKIE)
                    .ok_or_else(|| auth_failed("Server did not issue an xsrf-token", Some(200)))?;
                let issued = Issued {
                    token,
                    nonce: None,
                    session_auth: None,
                };
                (LoginMode::Open, issued)
            }
            302 => {
                let password = match password {
                    Some(p) => p,
                    None => credentials.password()?,
                };
                (LoginMode::Password, self.challenge(&password)?)
            }
            503 => return Err(ClientError::ServerUnavailable),
            status => return Err(ClientError::ConnectionError { status }),
        };

        self.establish(issued, Utc::now())?;
        Ok(mode)
    }

    fn challenge(&self, password: &str) -> Result<Issued, ClientError> {
        let login_url = self.store.server().base_url(LOGIN_PATH);

        info!("Getting nonce and salt...");
        let resp = self.transport.execute(
            HttpRequest::new(Method::Post, login_url.clone()).form(&[("get-nonce", "1")]),
        )?;
        if !resp.is_ok() {
            return Err(auth_failed(
                "Error getting salt from server",
                Some(resp.status),
            ));
        }
        let token = resp
            .cookie(XSRF_COOKIE)
            .ok_or_else(|| auth_failed("Server did not issue an xsrf-token", Some(resp.status)))?;
        let challenge: NonceResponse = resp.json()?;
        let nonce = decode_component(&challenge.nonce);

        info!("Hashing password...");
        let digest = password_digest(password, &challenge.salt, &nonce)?;

        info!("Authenticating...");
        let resp = self.transport.execute(
            HttpRequest::new(Method::Post, login_url)
                .form(&[("password", digest.as_str())])
                .cookie(XSRF_COOKIE, &token)
                .cookie(NONCE_COOKIE, &nonce),
        )?;
        if !resp.is_ok() {
            return Err(auth_failed(
                "Error authenticating against the server",
                Some(resp.status),
            ));
        }
        let session_auth = resp.cookie(AUTH_COOKIE).ok_or_else(|| {
            auth_failed("Server did not issue a session-auth cookie", Some(resp.status))
        })?;

        Ok(Issued {
            token,
            nonce: Some(nonce),
            session_auth: Some(session_auth),
        })
    }

    fn establish(&mut self, issued: Issued, now: DateTime<Utc>) -> Result<(), ClientError> {
        let session = self.store.session_mut();
        session.token = Some(issued.token);
        session.nonce = issued.nonce;
        session.session_auth = issued.session_auth;
        session.token_expires = Some(now + Duration::seconds(SESSION_TTL_SECS));
        session.last_login = Some(now);
        self.store.save()
    }

    /// Forget the token locally. The server-side session is left alone.
    pub fn logout(&mut self) -> Result<(), ClientError> {
        self.store.session_mut().token = None;
        self.store.save()
    }

    /// React to the status of an authenticated call
    pub fn observe_response(&mut self, status: u16) -> Result<(), ClientError> {
        self.observe_response_at(status, Utc::now())
    }

    pub fn observe_response_at(&mut self, status: u16, now: DateTime<Utc>) -> Result<(), ClientError> {
        match status {
            400 => Err(ClientError::SessionExpired),
            503 => Err(ClientError::ServerUnavailable),
            200 => {
                self.store.session_mut().token_expires =
                    Some(now + Duration::seconds(SESSION_TTL_SECS));
                self.store.save()
            }
            _ => Ok(()),
        }
    }
}

fn session_token(session: &Session) -> &str {
    session.token.as_deref().unwrap_or_default()
}

/// Cookies that identify the session: always the CSRF token, plus the nonce
/// and auth cookie for password sessions
pub fn with_session_cookies(request: HttpRequest, session: &Session) -> HttpRequest {
    let request = request.cookie(XSRF_COOKIE, session_token(session));
    match &session.nonce {
        Some(nonce) => request
            .cookie(NONCE_COOKIE, nonce)
            .cookie(AUTH_COOKIE, session.session_auth.as_deref().unwrap_or_default()),
        None => request,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::StaticPassword;
    use crate::http::mock::MockTransport;
    use crate::http::{HttpResponse, RequestBody};
    use tempfile::TempDir;

    fn open_store(dir: &TempDir) -> SessionStore {
        SessionStore::open(&dir.path().join("config.yml"), false).unwrap()
    }

    fn logged_in_store(dir: &TempDir, expires: DateTime<Utc>) -> SessionStore {
        let mut store = open_store(dir);
        let session = store.session_mut();
        session.token = Some("csrf".to_string());
        session.token_expires = Some(expires);
        store.save().unwrap();
        store
    }

    fn reload(dir: &TempDir) -> SessionStore {
        open_store(dir)
    }

    struct NoPrompt;

    impl CredentialProvider for NoPrompt {
        fn password(&self) -> Result<String, ClientError> {
            panic!("password prompt must not be shown");
        }
    }

    #[test]
    fn test_parse_protocol_host_port() {
        let parsed = UrlOverride::parse("https:myserver:8200").unwrap();
        assert_eq!(parsed.protocol.as_deref(), Some("https"));
        assert_eq!(parsed.host.as_deref(), Some("myserver"));
        assert_eq!(parsed.port.as_deref(), Some("8200"));
    }

    #[test]
    fn test_parse_host_port() {
        let parsed = UrlOverride::parse("myserver:8200").unwrap();
        assert_eq!(parsed.protocol, None);
        assert_eq!(parsed.host.as_deref(), Some("myserver"));
        assert_eq!(parsed.port.as_deref(), Some("8200"));
    }

    #[test]
    fn test_parse_host_only() {
        let parsed = UrlOverride::parse("myserver").unwrap();
        assert_eq!(
            parsed,
            UrlOverride {
                protocol: None,
                host: Some("myserver".to_string()),
                port: None,
            }
        );
    }

    #[test]
    fn test_parse_protocol_host() {
        let parsed = UrlOverride::parse("http:nas").unwrap();
        assert_eq!(parsed.protocol.as_deref(), Some("http"));
        assert_eq!(parsed.host.as_deref(), Some("nas"));
        assert_eq!(parsed.port, None);
    }

    #[test]
    fn test_parse_full_url_with_slashes() {
        let parsed = UrlOverride::parse("https://backup.lan:8300/").unwrap();
        assert_eq!(parsed.protocol.as_deref(), Some("https"));
        assert_eq!(parsed.host.as_deref(), Some("backup.lan"));
        assert_eq!(parsed.port.as_deref(), Some("8300"));
    }

    #[test]
    fn test_parse_strips_non_digits_from_port() {
        let parsed = UrlOverride::parse("myserver:82a00x").unwrap();
        assert_eq!(parsed.host.as_deref(), Some("myserver"));
        assert_eq!(parsed.port.as_deref(), Some("8200"));
    }

    #[test]
    fn test_parse_short_host_reads_as_protocol() {
        // A single colon before index 6 separates protocol and host
        let parsed = UrlOverride::parse("nas:8200").unwrap();
        assert_eq!(parsed.protocol, None);
        assert_eq!(parsed.host.as_deref(), Some("8200"));
        assert_eq!(parsed.port, None);
    }

    #[test]
    fn test_parse_too_many_colons() {
        assert!(matches!(
            UrlOverride::parse("a:b:c:d"),
            Err(ClientError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_unknown_protocol_falls_back() {
        let current = ServerConfig {
            protocol: "https".to_string(),
            url: "old".to_string(),
            port: "1234".to_string(),
        };
        let resolved = UrlOverride::parse("ftp:newhost").unwrap().resolve(&current);
        assert_eq!(resolved.protocol, "https");
        assert_eq!(resolved.url, "newhost");
        assert_eq!(resolved.port, "1234");
    }

    #[test]
    fn test_digest_fixture() {
        // password "password", salt "salt", nonce "nonce"
        let digest = digest_bytes(b"password", b"salt", b"nonce");
        let salted = Sha256::digest(b"passwordsalt");
        let mut expected = Sha256::new();
        expected.update(b"nonce");
        expected.update(salted);
        assert_eq!(digest.as_slice(), expected.finalize().as_slice());

        let encoded = password_digest("password", "c2FsdA==", "bm9uY2U=").unwrap();
        assert_eq!(encoded, BASE64.encode(digest));
        // Deterministic across calls
        assert_eq!(
            encoded,
            password_digest("password", "c2FsdA==", "bm9uY2U=").unwrap()
        );
    }

    #[test]
    fn test_digest_matches_fixture_vector() {
        assert_eq!(
            password_digest("password", "c2FsdA==", "bm9uY2U=").unwrap(),
            "lsHoVAQ3uzTLq3xBTGEkfRjMG3aCURCkPkAstZYuG3o="
        );
    }

    #[test]
    fn test_digest_known_vector() {
        // SHA256("abc") is the FIPS 180-2 test vector; with an empty salt the
        // inner hash is SHA256(password)
        let inner = Sha256::digest(b"abc");
        assert_eq!(
            format!("{:x}", inner),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        let digest = digest_bytes(b"abc", b"", b"");
        assert_eq!(digest.as_slice(), Sha256::digest(inner).as_slice());
    }

    #[test]
    fn test_digest_rejects_bad_base64() {
        assert!(matches!(
            password_digest("pw", "not base64!", "bm9uY2U="),
            Err(ClientError::AuthenticationFailed { .. })
        ));
    }

    #[test]
    fn test_ensure_authenticated_valid() {
        let dir = TempDir::new().unwrap();
        let now = Utc::now();
        let mut store = logged_in_store(&dir, now + Duration::seconds(300));
        let before = store.session().clone();
        let transport = MockTransport::default();
        let manager = SessionManager::new(&mut store, &transport);

        let session = manager.ensure_authenticated_at(now).unwrap();
        assert_eq!(session, &before);
        assert_eq!(transport.request_count(), 0);
        assert_eq!(reload(&dir).session(), &before);
    }

    #[test]
    fn test_ensure_authenticated_expired() {
        let dir = TempDir::new().unwrap();
        let now = Utc::now();
        let mut store = logged_in_store(&dir, now - Duration::seconds(1));
        let transport = MockTransport::default();
        let manager = SessionManager::new(&mut store, &transport);

        let err = manager.ensure_authenticated_at(now).unwrap_err();
        assert!(matches!(err, ClientError::Unauthenticated(ref m) if m == "Token expired"));
        assert_eq!(transport.request_count(), 0);
    }

    #[test]
    fn test_ensure_authenticated_expiry_boundary() {
        let dir = TempDir::new().unwrap();
        let now = Utc::now();
        let mut store = logged_in_store(&dir, now);
        let transport = MockTransport::default();
        let manager = SessionManager::new(&mut store, &transport);
        assert!(manager.ensure_authenticated_at(now).is_err());
    }

    #[test]
    fn test_ensure_authenticated_without_token() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        let transport = MockTransport::default();
        let manager = SessionManager::new(&mut store, &transport);

        let err = manager.ensure_authenticated().unwrap_err();
        assert!(matches!(err, ClientError::Unauthenticated(ref m) if m == "Not logged in"));
        assert_eq!(transport.request_count(), 0);
    }

    #[test]
    fn test_logout_invalidates_future_session() {
        let dir = TempDir::new().unwrap();
        let mut store = logged_in_store(&dir, Utc::now() + Duration::days(365));
        let transport = MockTransport::default();
        let mut manager = SessionManager::new(&mut store, &transport);

        manager.logout().unwrap();
        assert!(matches!(
            manager.ensure_authenticated(),
            Err(ClientError::Unauthenticated(_))
        ));
        // Idempotent
        manager.logout().unwrap();
        assert_eq!(reload(&dir).session().token, None);
    }

    #[test]
    fn test_observe_200_slides_expiry() {
        let dir = TempDir::new().unwrap();
        let mut store = logged_in_store(&dir, Utc::now() + Duration::days(3));
        let transport = MockTransport::default();
        let mut manager = SessionManager::new(&mut store, &transport);

        let call_time = Utc::now();
        manager.observe_response_at(200, call_time).unwrap();
        let expected = call_time + Duration::seconds(SESSION_TTL_SECS);
        assert_eq!(manager.store().session().token_expires, Some(expected));
        assert_eq!(reload(&dir).session().token_expires, Some(expected));
    }

    #[test]
    fn test_observe_200_with_wall_clock() {
        let dir = TempDir::new().unwrap();
        let mut store = logged_in_store(&dir, Utc::now() + Duration::seconds(5));
        let transport = MockTransport::default();
        let mut manager = SessionManager::new(&mut store, &transport);

        let before = Utc::now();
        manager.observe_response(200).unwrap();
        let expires = manager.store().session().token_expires.unwrap();
        let delta = expires - before;
        assert!(delta >= Duration::seconds(SESSION_TTL_SECS));
        assert!(delta < Duration::seconds(SESSION_TTL_SECS + 5));
    }

    #[test]
    fn test_observe_400_expires_session_without_refresh() {
        let dir = TempDir::new().unwrap();
        let expires = Utc::now() + Duration::seconds(30);
        let mut store = logged_in_store(&dir, expires);
        let transport = MockTransport::default();
        let mut manager = SessionManager::new(&mut store, &transport);

        let err = manager.observe_response(400).unwrap_err();
        assert!(matches!(err, ClientError::SessionExpired));
        assert_eq!(manager.store().session().token_expires, Some(expires));
        assert_eq!(reload(&dir).session().token_expires, Some(expires));
    }

    #[test]
    fn test_observe_other_statuses() {
        let dir = TempDir::new().unwrap();
        let expires = Utc::now() + Duration::seconds(30);
        let mut store = logged_in_store(&dir, expires);
        let transport = MockTransport::default();
        let mut manager = SessionManager::new(&mut store, &transport);

        assert!(matches!(
            manager.observe_response(503),
            Err(ClientError::ServerUnavailable)
        ));
        manager.observe_response(404).unwrap();
        manager.observe_response(500).unwrap();
        assert_eq!(manager.store().session().token_expires, Some(expires));
    }

    #[test]
    fn test_login_open_server() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        store.session_mut().nonce = Some("stale".to_string());
        store.session_mut().session_auth = Some("stale".to_string());
        let transport = MockTransport::new(vec![
            HttpResponse::new(200, "<html/>").with_cookie("xsrf-token", "abc%3D%3D")
        ]);
        let mut manager = SessionManager::new(&mut store, &transport);

        let before = Utc::now();
        let mode = manager.login(None, None, &NoPrompt).unwrap();
        assert_eq!(mode, LoginMode::Open);

        let probe = transport.request(0);
        assert_eq!(probe.method, Method::Get);
        assert_eq!(probe.url, "http://localhost:8200");
        assert!(probe.cookies.is_empty());

        let session = reload(&dir).session().clone();
        assert_eq!(session.token.as_deref(), Some("abc=="));
        assert_eq!(session.nonce, None);
        assert_eq!(session.session_auth, None);
        let expires = session.token_expires.unwrap();
        assert!(expires >= before + Duration::seconds(SESSION_TTL_SECS));
        assert!(session.last_login.unwrap() >= before);
    }

    #[test]
    fn test_login_password_challenge() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        let transport = MockTransport::new(vec![
            HttpResponse::new(302, ""),
            HttpResponse::new(200, r#"{"Salt":"c2FsdA==","Nonce":"bm9uY2U%3D"}"#)
                .with_cookie("xsrf-token", "tok%2Ben"),
            HttpResponse::new(200, "").with_cookie("session-auth", "auth%21"),
        ]);
        let mut manager = SessionManager::new(&mut store, &transport);

        let mode = manager
            .login(
                Some("https://nas:8300"),
                None,
                &StaticPassword("password".to_string()),
            )
            .unwrap();
        assert_eq!(mode, LoginMode::Password);
        assert_eq!(transport.request_count(), 3);

        assert_eq!(transport.request(0).url, "https://nas:8300");

        let nonce_req = transport.request(1);
        assert_eq!(nonce_req.url, "https://nas:8300/login.cgi");
        assert_eq!(
            nonce_req.body,
            RequestBody::Form(vec![("get-nonce".to_string(), "1".to_string())])
        );

        let auth_req = transport.request(2);
        let expected = password_digest("password", "c2FsdA==", "bm9uY2U=").unwrap();
        assert_eq!(
            auth_req.body,
            RequestBody::Form(vec![("password".to_string(), expected)])
        );
        assert_eq!(
            auth_req.cookies,
            vec![
                ("xsrf-token".to_string(), "tok+en".to_string()),
                ("session-nonce".to_string(), "bm9uY2U=".to_string()),
            ]
        );

        let reloaded = reload(&dir);
        assert_eq!(reloaded.server().protocol, "https");
        assert_eq!(reloaded.server().url, "nas");
        assert_eq!(reloaded.server().port, "8300");
        let session = reloaded.session();
        assert_eq!(session.token.as_deref(), Some("tok+en"));
        assert_eq!(session.nonce.as_deref(), Some("bm9uY2U="));
        assert_eq!(session.session_auth.as_deref(), Some("auth!"));
    }

    #[test]
    fn test_login_wrong_password_persists_no_session() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        let transport = MockTransport::new(vec![
            HttpResponse::new(302, ""),
            HttpResponse::new(200, r#"{"Salt":"c2FsdA==","Nonce":"bm9uY2U="}"#)
                .with_cookie("xsrf-token", "tok"),
            HttpResponse::new(401, ""),
        ]);
        let mut manager = SessionManager::new(&mut store, &transport);

        let err = manager
            .login(Some("nas"), Some("wrong".to_string()), &NoPrompt)
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::AuthenticationFailed {
                status: Some(401),
                ..
            }
        ));

        let reloaded = reload(&dir);
        assert_eq!(reloaded.server().url, "nas");
        assert_eq!(reloaded.session(), &Session::default());
    }

    #[test]
    fn test_login_probe_failure() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        let transport = MockTransport::new(vec![HttpResponse::new(404, "")]);
        let mut manager = SessionManager::new(&mut store, &transport);

        let err = manager.login(None, None, &NoPrompt).unwrap_err();
        assert!(matches!(err, ClientError::ConnectionError { status: 404 }));
        assert_eq!(transport.request_count(), 1);
        assert_eq!(reload(&dir).session(), &Session::default());
    }

    #[test]
    fn test_login_probe_unavailable() {
        let dir = TempDir::new().unwrap();
        let mut store = logged_in_store(&dir, Utc::now() + Duration::seconds(60));
        let before = store.session().clone();
        let transport = MockTransport::new(vec![HttpResponse::new(503, "")]);
        let mut manager = SessionManager::new(&mut store, &transport);

        let err = manager.login(None, None, &NoPrompt).unwrap_err();
        assert!(matches!(err, ClientError::ServerUnavailable));
        assert_eq!(transport.request_count(), 1);
        assert_eq!(reload(&dir).session(), &before);
    }

    #[test]
    fn test_login_open_server_without_token_cookie() {
        let dir = TempDir::new().unwrap();
        let mut store = logged_in_store(&dir, Utc::now() + Duration::seconds(60));
        let before = store.session().clone();
        let transport = MockTransport::new(vec![HttpResponse::new(200, "<html/>")]);
        let mut manager = SessionManager::new(&mut store, &transport);

        let err = manager.login(None, None, &NoPrompt).unwrap_err();
        assert!(matches!(
            err,
            ClientError::AuthenticationFailed {
                status: Some(200),
                ..
            }
        ));
        assert_eq!(reload(&dir).session(), &before);
    }

    #[test]
    fn test_login_invalid_url_makes_no_request() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        let transport = MockTransport::default();
        let mut manager = SessionManager::new(&mut store, &transport);

        let err = manager.login(Some("a:b:c:d"), None, &NoPrompt).unwrap_err();
        assert!(matches!(err, ClientError::InvalidUrl(_)));
        assert_eq!(transport.request_count(), 0);
    }

    #[test]
    fn test_authorize_attaches_credentials() {
        let dir = TempDir::new().unwrap();
        let mut store = logged_in_store(&dir, Utc::now() + Duration::seconds(60));
        store.session_mut().nonce = Some("n".to_string());
        store.session_mut().session_auth = Some("a".to_string());
        let transport = MockTransport::default();
        let manager = SessionManager::new(&mut store, &transport);

        let req = manager
            .authorize(HttpRequest::new(Method::Get, "http://localhost:8200/api/v1/backups"))
            .unwrap();
        assert_eq!(req.headers, vec![("X-XSRF-TOKEN".to_string(), "csrf".to_string())]);
        assert_eq!(
            req.cookie_header().as_deref(),
            Some("xsrf-token=csrf; session-nonce=n; session-auth=a")
        );
    }

    #[test]
    fn test_authorize_open_session_sends_only_token() {
        let dir = TempDir::new().unwrap();
        let mut store = logged_in_store(&dir, Utc::now() + Duration::seconds(60));
        let transport = MockTransport::default();
        let manager = SessionManager::new(&mut store, &transport);

        let req = manager
            .authorize(HttpRequest::new(Method::Get, "http://localhost:8200"))
            .unwrap();
        assert_eq!(req.cookie_header().as_deref(), Some("xsrf-token=csrf"));
    }
}
