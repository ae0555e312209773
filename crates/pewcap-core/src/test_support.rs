//! In-memory stand-ins for the remote API, session store and operator, plus
//! a loopback HTTP server for exercising the real client.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;

use async_trait::async_trait;

use crate::api::{ApiError, AuthLevel, RemoteApi, TransactionResponse, TwoFactorMethod};
use crate::auth::{OperatorInput, Session, SessionError, SessionStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Identify(String),
    Challenge(TwoFactorMethod),
    Verify(TwoFactorMethod, String),
    Password(String),
    Fetch(String, Vec<(String, String)>),
}

pub struct FakeApi {
    pub level: AuthLevel,
    pub fail_identify: bool,
    pub fail_challenge: bool,
    pub fail_verify: bool,
    pub fail_password: bool,
    pub fetch_unauthorized: bool,
    pub fetch_server_error: bool,
    pub body: Vec<u8>,
    calls: Vec<Call>,
    session: Session,
}

impl FakeApi {
    pub fn new(level: AuthLevel) -> Self {
        Self {
            level,
            fail_identify: false,
            fail_challenge: false,
            fail_verify: false,
            fail_password: false,
            fetch_unauthorized: false,
            fetch_server_error: false,
            body: b"{}".to_vec(),
            calls: Vec::new(),
            session: Session::new(),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.clone()
    }

    fn rejected(what: &str) -> ApiError {
        ApiError::Rejected(format!("{} refused", what))
    }
}

#[async_trait]
impl RemoteApi for FakeApi {
    fn session(&self) -> Session {
        self.session.clone()
    }

    fn set_session(&mut self, session: Session) {
        self.session = session;
    }

    async fn identify_user(&mut self, email: &str) -> Result<AuthLevel, ApiError> {
        self.calls.push(Call::Identify(email.to_string()));
        if self.fail_identify {
            return Err(Self::rejected("identify"));
        }
        Ok(self.level)
    }

    async fn challenge(&mut self, method: TwoFactorMethod) -> Result<(), ApiError> {
        self.calls.push(Call::Challenge(method));
        if self.fail_challenge {
            return Err(Self::rejected("challenge"));
        }
        Ok(())
    }

    async fn verify(&mut self, method: TwoFactorMethod, code: &str) -> Result<(), ApiError> {
        self.calls.push(Call::Verify(method, code.to_string()));
        if self.fail_verify {
            return Err(Self::rejected("verify"));
        }
        self.session.insert("PMData", "fresh");
        Ok(())
    }

    async fn authenticate_password(&mut self, secret: &str) -> Result<(), ApiError> {
        self.calls.push(Call::Password(secret.to_string()));
        if self.fail_password {
            return Err(Self::rejected("password"));
        }
        Ok(())
    }

    async fn fetch(
        &mut self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<TransactionResponse, ApiError> {
        let params = params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.calls.push(Call::Fetch(endpoint.to_string(), params));
        if self.fetch_unauthorized {
            return Err(ApiError::Unauthorized);
        }
        if self.fetch_server_error {
            return Err(ApiError::ServerError("boom".to_string()));
        }
        Ok(TransactionResponse::from(self.body.clone()))
    }
}

#[derive(Default)]
pub struct MemoryStore {
    loaded: Session,
    saved: RefCell<Option<Session>>,
}

impl MemoryStore {
    pub fn with(session: Session) -> Self {
        Self {
            loaded: session,
            saved: RefCell::new(None),
        }
    }

    pub fn saved(&self) -> Option<Session> {
        self.saved.borrow().clone()
    }
}

impl SessionStore for MemoryStore {
    fn load(&self) -> Session {
        self.loaded.clone()
    }

    fn save(&self, session: &Session) -> Result<(), SessionError> {
        *self.saved.borrow_mut() = Some(session.clone());
        Ok(())
    }
}

/// Answers prompts from a fixed script; running out is an EOF error
pub struct ScriptedInput {
    answers: RefCell<VecDeque<String>>,
    prompts: RefCell<Vec<String>>,
}

impl ScriptedInput {
    pub fn new<I, T>(answers: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            answers: RefCell::new(answers.into_iter().map(Into::into).collect()),
            prompts: RefCell::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.borrow().clone()
    }

    fn next(&self, message: &str) -> io::Result<String> {
        self.prompts.borrow_mut().push(message.to_string());
        self.answers
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "no more scripted input"))
    }
}

impl OperatorInput for ScriptedInput {
    fn prompt(&self, message: &str) -> io::Result<String> {
        self.next(message)
    }

    fn prompt_secret(&self, message: &str) -> io::Result<String> {
        self.next(message)
    }
}

// ============================================================================
// Loopback HTTP server
// ============================================================================

/// One request as received by [`HttpServer`]
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    headers: Vec<(String, String)>,
    pub body: String,
}

impl Recorded {
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Decoded value of a urlencoded form field
    pub fn field(&self, name: &str) -> Option<String> {
        let url = reqwest::Url::parse(&format!("http://form.test/?{}", self.body)).ok()?;
        url.query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }
}

/// Canned response for one route
#[derive(Debug, Clone)]
pub struct Reply {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Reply {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::status(200, body)
    }

    pub fn status(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn redirect(location: &str) -> Self {
        Self::status(302, Vec::new()).header("Location", location)
    }

    pub fn cookie(self, set_cookie: &str) -> Self {
        self.header("Set-Cookie", set_cookie)
    }

    fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

/// Serves fixed replies keyed by method and path on 127.0.0.1, one
/// connection per request, and records everything it receives.
/// Unknown routes get a 404.
pub struct HttpServer {
    base_url: String,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl HttpServer {
    pub fn start(routes: Vec<(&'static str, &'static str, Reply)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&requests);

        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                let Some(request) = read_request(&stream) else {
                    continue;
                };
                let reply = routes
                    .iter()
                    .find(|(method, path, _)| *method == request.method && *path == request.path)
                    .map(|(_, _, reply)| reply.clone())
                    .unwrap_or_else(|| Reply::status(404, "no such route"));
                log.lock().unwrap().push(request);
                write_reply(stream, &reply);
            }
        });

        Self { base_url, requests }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    /// The single recorded request for `path`
    pub fn request_to(&self, path: &str) -> Recorded {
        let matching: Vec<Recorded> = self
            .requests()
            .into_iter()
            .filter(|r| r.path == path)
            .collect();
        assert_eq!(matching.len(), 1, "expected one request to {}", path);
        matching[0].clone()
    }
}

fn read_request(stream: &TcpStream) -> Option<Recorded> {
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    reader.read_line(&mut line).ok()?;
    let mut parts = line.split_whitespace();
    let method = parts.next()?.to_string();
    let path = parts.next()?.to_string();

    let mut headers = Vec::new();
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).ok()?;
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.push((name.trim().to_ascii_lowercase(), value.trim().to_string()));
        }
    }

    let length = headers
        .iter()
        .find(|(k, _)| k == "content-length")
        .and_then(|(_, v)| v.parse().ok())
        .unwrap_or(0);
    let mut body = vec![0; length];
    reader.read_exact(&mut body).ok()?;

    Some(Recorded {
        method,
        path,
        headers,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

fn write_reply(mut stream: TcpStream, reply: &Reply) {
    let reason = match reply.status {
        200 => "OK",
        302 => "Found",
        401 => "Unauthorized",
        404 => "Not Found",
        _ => "Status",
    };
    let mut head = format!(
        "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n",
        reply.status,
        reason,
        reply.body.len()
    );
    for (name, value) in &reply.headers {
        head.push_str(&format!("{}: {}\r\n", name, value));
    }
    head.push_str("\r\n");

    let _ = stream.write_all(head.as_bytes());
    let _ = stream.write_all(&reply.body);
    let _ = stream.flush();
}
