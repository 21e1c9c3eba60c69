// API client module: a small blocking HTTP client for the BioT platform.
// Only the calls needed to onboard one device are covered: login,
// organization listing, the two template lookups and the two create calls.

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::{ApiError, HttpMethod, UploadError};

/// Device template used for every ONASPORT device.
pub const ONASPORT_TEMPLATE_ID: &str = "0acb3d5b-c70b-4101-b8f7-be17c452fbc5";

const ORGANIZATIONS_LIMIT: u32 = 30;
const TEMPLATES_LIMIT: u32 = 1000;

/// Fully built endpoint URLs for one environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub base: Url,
    pub login: Url,
    pub organizations: Url,
    pub registration_code_templates: Url,
    pub registration_codes: Url,
    pub device_template: Url,
    pub devices: Url,
}

impl Endpoints {
    pub fn new(base_url: &str) -> Result<Self, UploadError> {
        let base = Url::parse(base_url).map_err(|e| UploadError::Url(format!("{base_url}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(UploadError::Url(format!("{base_url}: not a base URL")));
        }
        let join = |path: &str| {
            base.join(path)
                .map_err(|e| UploadError::Url(format!("{base_url}{path}: {e}")))
        };

        let mut organizations = join("/organization/v1/organizations")?;
        let search = serde_json::json!({
            "limit": ORGANIZATIONS_LIMIT,
            "filter": {},
            "freeTextSearch": "",
        });
        organizations
            .query_pairs_mut()
            .append_pair("searchRequest", &search.to_string());

        let mut registration_code_templates = join("/settings/v1/templates/minimized")?;
        let search = serde_json::json!({
            "filter": { "entityTypeName": { "in": ["registration-code"] } },
            "limit": TEMPLATES_LIMIT,
        });
        registration_code_templates
            .query_pairs_mut()
            .append_pair("searchRequest", &search.to_string());

        let mut device_template =
            join("/settings/v1/portal-builder/MANUFACTURER_PORTAL/views-full-info/TEMPLATE_EXPAND")?;
        device_template
            .query_pairs_mut()
            .append_pair("entityTypeName", "device")
            .append_pair("templateId", ONASPORT_TEMPLATE_ID);

        Ok(Endpoints {
            login: join("/ums/v2/users/login")?,
            organizations,
            registration_code_templates,
            registration_codes: join("/organization/v1/registration-codes")?,
            device_template,
            devices: join("/device/v2/devices")?,
            base,
        })
    }
}

/// Username/password pair for the login call.
#[derive(Clone, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Authenticated session: bearer token plus the endpoints of the environment
/// it was issued for. Lives for one run and is passed to every call.
#[derive(Clone)]
pub struct Session {
    token: String,
    endpoints: Endpoints,
}

impl Session {
    pub fn new(token: impl Into<String>, endpoints: Endpoints) -> Self {
        Session {
            token: token.into(),
            endpoints,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("token", &"<redacted>")
            .field("base", &self.endpoints.base.as_str())
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(rename = "accessJwt")]
    access_jwt: AccessJwt,
}

#[derive(Debug, Deserialize)]
struct AccessJwt {
    token: String,
}

/// Paged listing envelope used by the search endpoints.
#[derive(Debug, Deserialize)]
struct Page<T> {
    data: Vec<T>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_name")]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateSummary {
    pub id: String,
}

#[derive(Debug, Deserialize)]
struct TemplateView {
    template: TemplateSummary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub id: String,
}

/// Body of the registration-code create call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewRegistrationCode {
    #[serde(rename = "_ownerOrganization")]
    pub owner_organization: EntityRef,
    #[serde(rename = "_code")]
    pub code: String,
    #[serde(rename = "_templateId")]
    pub template_id: String,
}

/// Id assigned by the platform to a created entity.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreatedEntity {
    #[serde(rename = "_id")]
    pub id: String,
}

/// Body of the device create call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewDevice {
    #[serde(rename = "_ownerOrganization")]
    pub owner_organization: EntityRef,
    #[serde(rename = "_registrationCode")]
    pub registration_code: EntityRef,
    #[serde(rename = "_id")]
    pub serial_number: String,
    #[serde(rename = "_description")]
    pub description: String,
    #[serde(rename = "device_version")]
    pub version: String,
    #[serde(rename = "_templateId")]
    pub template_id: String,
}

/// The remote calls the onboarding workflow depends on. `BiotClient` talks
/// HTTP; tests substitute an in-memory fake.
pub trait BiotApi {
    fn login(&self, endpoints: &Endpoints, credentials: &Credentials) -> Result<Session, ApiError>;

    fn list_organizations(&self, session: &Session) -> Result<Vec<Organization>, ApiError>;

    fn registration_code_templates(&self, session: &Session) -> Result<Vec<TemplateSummary>, ApiError>;

    fn create_registration_code(
        &self,
        session: &Session,
        code: &NewRegistrationCode,
    ) -> Result<CreatedEntity, ApiError>;

    fn device_template(&self, session: &Session) -> Result<TemplateSummary, ApiError>;

    fn create_device(&self, session: &Session, device: &NewDevice) -> Result<(), ApiError>;
}

/// Blocking reqwest implementation of [`BiotApi`].
#[derive(Clone)]
pub struct BiotClient {
    client: Client,
}

impl BiotClient {
    pub fn new(config: &ClientConfig) -> Result<Self, UploadError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| UploadError::Unexpected(format!("failed to build HTTP client: {e}")))?;
        Ok(BiotClient { client })
    }

    fn send(&self, method: HttpMethod, url: &Url, req: RequestBuilder) -> Result<Response, ApiError> {
        debug!(%method, %url, "sending request");
        let res = req.send().map_err(|e| ApiError::Unreachable {
            method,
            url: url.to_string(),
            message: e.to_string(),
        })?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().unwrap_or_default();
            return Err(ApiError::Rejected {
                method,
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(res)
    }

    fn decode<T: DeserializeOwned>(method: HttpMethod, url: &Url, res: Response) -> Result<T, ApiError> {
        res.json().map_err(|e| {
            // The body never fully arrived: a transport failure, not a bad payload.
            if e.is_timeout() || e.is_request() || e.is_body() {
                ApiError::Unreachable {
                    method,
                    url: url.to_string(),
                    message: e.to_string(),
                }
            } else {
                ApiError::Decode {
                    method,
                    url: url.to_string(),
                    message: e.to_string(),
                }
            }
        })
    }

    fn get<T: DeserializeOwned>(&self, session: &Session, url: &Url) -> Result<T, ApiError> {
        let req = self.client.get(url.clone()).bearer_auth(session.token());
        let res = self.send(HttpMethod::Get, url, req)?;
        Self::decode(HttpMethod::Get, url, res)
    }

    fn post<B: Serialize>(&self, session: &Session, url: &Url, body: &B) -> Result<Response, ApiError> {
        let req = self
            .client
            .post(url.clone())
            .bearer_auth(session.token())
            .json(body);
        self.send(HttpMethod::Post, url, req)
    }
}

impl BiotApi for BiotClient {
    fn login(&self, endpoints: &Endpoints, credentials: &Credentials) -> Result<Session, ApiError> {
        let url = &endpoints.login;
        let req = self.client.post(url.clone()).json(credentials);
        let res = self.send(HttpMethod::Post, url, req)?;
        let login: LoginResponse = Self::decode(HttpMethod::Post, url, res)?;
        Ok(Session::new(login.access_jwt.token, endpoints.clone()))
    }

    fn list_organizations(&self, session: &Session) -> Result<Vec<Organization>, ApiError> {
        let page: Page<Organization> = self.get(session, &session.endpoints().organizations)?;
        Ok(page.data)
    }

    fn registration_code_templates(&self, session: &Session) -> Result<Vec<TemplateSummary>, ApiError> {
        let page: Page<TemplateSummary> =
            self.get(session, &session.endpoints().registration_code_templates)?;
        Ok(page.data)
    }

    fn create_registration_code(
        &self,
        session: &Session,
        code: &NewRegistrationCode,
    ) -> Result<CreatedEntity, ApiError> {
        let url = &session.endpoints().registration_codes;
        let res = self.post(session, url, code)?;
        Self::decode(HttpMethod::Post, url, res)
    }

    fn device_template(&self, session: &Session) -> Result<TemplateSummary, ApiError> {
        let view: TemplateView = self.get(session, &session.endpoints().device_template)?;
        Ok(view.template)
    }

    fn create_device(&self, session: &Session, device: &NewDevice) -> Result<(), ApiError> {
        self.post(session, &session.endpoints().devices, device)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread::{self, JoinHandle};
    use std::time::Duration;

    /// Serve `responses` one per connection on 127.0.0.1 and hand back the
    /// raw requests that were received.
    fn serve(responses: Vec<(u16, &'static str)>) -> (String, JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let handle = thread::spawn(move || {
            let mut requests = Vec::new();
            for (status, body) in responses {
                let (mut stream, _) = listener.accept().unwrap();
                requests.push(read_request(&mut stream));
                let reply = format!(
                    "HTTP/1.1 {status} Canned\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                stream.write_all(reply.as_bytes()).unwrap();
                stream.flush().unwrap();
            }
            requests
        });
        (base, handle)
    }

    fn read_request(stream: &mut std::net::TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = stream.read(&mut chunk).unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf).into_owned();
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if buf.len() >= end + 4 + length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    fn client() -> BiotClient {
        // Same settings as `BiotClient::new`, minus any proxy from the environment.
        let client = Client::builder()
            .no_proxy()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap();
        BiotClient { client }
    }

    fn session(base: &str) -> Session {
        Session::new("tok-123", Endpoints::new(base).unwrap())
    }

    fn credentials() -> Credentials {
        Credentials {
            username: "ops@onalabs.com".into(),
            password: "secret".into(),
        }
    }

    fn has_bearer(request: &str) -> bool {
        request
            .lines()
            .any(|line| line.to_ascii_lowercase() == "authorization: bearer tok-123")
    }

    #[test]
    fn client_runs_every_call_with_bearer_after_login() {
        let (base, server) = serve(vec![
            (200, r#"{"accessJwt":{"token":"tok-123"}}"#),
            (200, r#"{"data":[{"_id":"org-1","_name":"Tri-excellence.com"}]}"#),
            (200, r#"{"data":[{"id":"rc-tpl"}]}"#),
            (201, r#"{"_id":"rc-1"}"#),
            (200, r#"{"template":{"id":"dev-tpl"}}"#),
            (201, "{}"),
        ]);
        let api = client();
        let endpoints = Endpoints::new(&base).unwrap();

        let session = api.login(&endpoints, &credentials()).unwrap();
        assert_eq!(session.token(), "tok-123");
        let orgs = api.list_organizations(&session).unwrap();
        assert_eq!(orgs[0].id, "org-1");
        let templates = api.registration_code_templates(&session).unwrap();
        assert_eq!(templates[0].id, "rc-tpl");
        let created = api
            .create_registration_code(
                &session,
                &NewRegistrationCode {
                    owner_organization: EntityRef { id: "org-1".into() },
                    code: "RC".into(),
                    template_id: "rc-tpl".into(),
                },
            )
            .unwrap();
        assert_eq!(created.id, "rc-1");
        assert_eq!(api.device_template(&session).unwrap().id, "dev-tpl");
        api.create_device(
            &session,
            &NewDevice {
                owner_organization: EntityRef { id: "org-1".into() },
                registration_code: EntityRef { id: "rc-1".into() },
                serial_number: "1234567891".into(),
                description: "ONAS0000".into(),
                version: "2.0.0".into(),
                template_id: "dev-tpl".into(),
            },
        )
        .unwrap();

        let requests = server.join().unwrap();
        assert_eq!(requests.len(), 6);
        assert!(requests[0].starts_with("POST /ums/v2/users/login "));
        assert!(requests[0].contains(r#""password":"secret""#));
        assert!(!requests[0].to_ascii_lowercase().contains("authorization:"));
        for request in &requests[1..] {
            assert!(has_bearer(request), "{request}");
        }
        assert!(requests[1].starts_with("GET /organization/v1/organizations?searchRequest="));
        assert!(requests[3].starts_with("POST /organization/v1/registration-codes "));
        assert!(requests[5].starts_with("POST /device/v2/devices "));
        assert!(requests[5].contains(r#""_id":"1234567891""#));
    }

    #[test]
    fn non_success_status_is_rejected() {
        let (base, server) = serve(vec![(401, r#"{"code":"UNAUTHORIZED"}"#)]);
        let err = client()
            .login(&Endpoints::new(&base).unwrap(), &credentials())
            .unwrap_err();
        match err {
            ApiError::Rejected { method, status, body, .. } => {
                assert_eq!(method, HttpMethod::Post);
                assert_eq!(status, 401);
                assert!(body.contains("UNAUTHORIZED"));
            }
            other => panic!("expected Rejected, got {other:?}"),
        }
        server.join().unwrap();
    }

    #[test]
    fn unparsable_body_is_decode_error() {
        let (base, server) = serve(vec![(200, "<html>maintenance</html>")]);
        let err = client().list_organizations(&session(&base)).unwrap_err();
        assert!(
            matches!(err, ApiError::Decode { method: HttpMethod::Get, .. }),
            "{err:?}"
        );
        server.join().unwrap();
    }

    #[test]
    fn truncated_body_is_unreachable_not_decode() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            read_request(&mut stream);
            let reply = "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 100\r\n\r\n{\"data\":[";
            stream.write_all(reply.as_bytes()).unwrap();
        });

        let err = client().registration_code_templates(&session(&base)).unwrap_err();
        assert!(
            matches!(err, ApiError::Unreachable { method: HttpMethod::Get, .. }),
            "{err:?}"
        );
        assert_eq!(UploadError::from_step(err, UploadError::RegistrationTemplate).code(), 8);
        server.join().unwrap();
    }

    #[test]
    fn refused_connection_is_unreachable_with_method() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let base = format!("http://127.0.0.1:{port}");
        let api = client();

        let err = api.device_template(&session(&base)).unwrap_err();
        assert!(
            matches!(err, ApiError::Unreachable { method: HttpMethod::Get, .. }),
            "{err:?}"
        );

        let err = api
            .create_device(
                &session(&base),
                &NewDevice {
                    owner_organization: EntityRef { id: "org".into() },
                    registration_code: EntityRef { id: "rc".into() },
                    serial_number: "1234567891".into(),
                    description: "d".into(),
                    version: "1".into(),
                    template_id: "t".into(),
                },
            )
            .unwrap_err();
        assert!(
            matches!(err, ApiError::Unreachable { method: HttpMethod::Post, .. }),
            "{err:?}"
        );
        assert_eq!(UploadError::from_step(err, UploadError::CreateDevice).code(), 9);
    }

    #[test]
    fn endpoints_follow_base_url() {
        let e = Endpoints::new("https://api.dev.onalabs.biot-med.com").unwrap();
        assert_eq!(e.login.as_str(), "https://api.dev.onalabs.biot-med.com/ums/v2/users/login");
        assert_eq!(e.devices.as_str(), "https://api.dev.onalabs.biot-med.com/device/v2/devices");
        assert_eq!(
            e.registration_codes.as_str(),
            "https://api.dev.onalabs.biot-med.com/organization/v1/registration-codes"
        );
    }

    #[test]
    fn search_requests_are_encoded_as_json() {
        let e = Endpoints::new("https://api.onalabs.biot-med.com").unwrap();
        let (key, value) = e.organizations.query_pairs().next().unwrap();
        assert_eq!(key, "searchRequest");
        let search: serde_json::Value = serde_json::from_str(&value).unwrap();
        assert_eq!(search["limit"], 30);
        assert_eq!(search["freeTextSearch"], "");

        let (_, value) = e.registration_code_templates.query_pairs().next().unwrap();
        let search: serde_json::Value = serde_json::from_str(&value).unwrap();
        assert_eq!(search["filter"]["entityTypeName"]["in"][0], "registration-code");
    }

    #[test]
    fn device_template_pins_onasport_template() {
        let e = Endpoints::new("https://api.onalabs.biot-med.com").unwrap();
        let pairs: Vec<(String, String)> = e
            .device_template
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert!(pairs.contains(&("templateId".into(), ONASPORT_TEMPLATE_ID.into())));
        assert!(pairs.contains(&("entityTypeName".into(), "device".into())));
    }

    #[test]
    fn bad_base_url_is_code_10() {
        let err = Endpoints::new("not a url").unwrap_err();
        assert_eq!(err.code(), 10);
        let err = Endpoints::new("mailto:ops@example.com").unwrap_err();
        assert_eq!(err.code(), 10);
    }

    #[test]
    fn device_body_uses_platform_field_names() {
        let device = NewDevice {
            owner_organization: EntityRef { id: "org-1".into() },
            registration_code: EntityRef { id: "rc-1".into() },
            serial_number: "1234567891".into(),
            description: "ONAS0000".into(),
            version: "2.0.0".into(),
            template_id: "tpl".into(),
        };
        let v = serde_json::to_value(&device).unwrap();
        assert_eq!(v["_ownerOrganization"]["id"], "org-1");
        assert_eq!(v["_registrationCode"]["id"], "rc-1");
        assert_eq!(v["_id"], "1234567891");
        assert_eq!(v["_description"], "ONAS0000");
        assert_eq!(v["device_version"], "2.0.0");
        assert_eq!(v["_templateId"], "tpl");
    }

    #[test]
    fn login_response_reads_access_token() {
        let body = r#"{"accessJwt":{"token":"abc","expiration":"2030-01-01"},"refreshJwt":{}}"#;
        let parsed: LoginResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.access_jwt.token, "abc");
    }

    #[test]
    fn secrets_are_not_debug_printed() {
        let creds = Credentials {
            username: "ops@onalabs.com".into(),
            password: "hunter2".into(),
        };
        assert!(!format!("{creds:?}").contains("hunter2"));

        let session = Session::new("secret-token", Endpoints::new(crate::config::URL_DEV).unwrap());
        assert!(!format!("{session:?}").contains("secret-token"));
    }
}
