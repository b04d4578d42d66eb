use std::{sync::Arc, time::Duration};

use anyhow::Context;
use async_trait::async_trait;
use log::{debug, info};
use reqwest::{
    Client, ClientBuilder, Response, StatusCode,
    cookie::Jar,
    header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue, ORIGIN, REFERER, USER_AGENT},
};

use crate::{
    config::PortalConfig,
    encoder::Challenge,
    error::MonitorError,
    login::{LoginForm, LoginPortal, LoginResponse},
};

// The portal is slow at the start of every term.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(1000);

pub const CHALLENGE_PATH: &str = "/Logon.do?method=logon&flag=sess";
pub const CAPTCHA_PATH: &str = "/verifycode.servlet";
pub const LOGIN_PATH: &str = "/Logon.do?method=logonLdap";

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/114.0.0.0 Safari/537.36";
const BROWSER_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";

/// Cookie-carrying HTTP session against the portal.
pub struct PortalSession {
    client: Client,
    cookies: Arc<Jar>,
    portal: PortalConfig,
}

impl PortalSession {
    pub fn new(portal: PortalConfig) -> anyhow::Result<Self> {
        let cookies = Arc::new(Jar::default());
        let client = ClientBuilder::new()
            .cookie_provider(cookies.clone())
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            cookies,
            portal,
        })
    }

    /// Starts a fresh session and grabs the login challenge. No retries here.
    pub async fn open(portal: &PortalConfig) -> Result<(Self, Challenge), MonitorError> {
        let session =
            Self::new(portal.clone()).map_err(|e| MonitorError::Connection(format!("{e:#}")))?;
        let url = session.portal.url(CHALLENGE_PATH);
        let raw = session
            .fetch_url_body(&url)
            .await
            .map_err(|e| MonitorError::Connection(format!("{e:#}")))?;
        debug!("Challenge string received ({} chars)", raw.trim().chars().count());
        let challenge = Challenge::parse(&raw)?;
        info!("Session opened against {}", session.portal.base_url);
        Ok((session, challenge))
    }

    pub fn cookies(&self) -> Arc<Jar> {
        self.cookies.clone()
    }

    pub fn portal(&self) -> &PortalConfig {
        &self.portal
    }

    pub async fn fetch_url_response(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> anyhow::Result<Response> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .with_context(|| format!("GET {url} failed"))?;
        Ok(response)
    }

    pub async fn fetch_url_body(&self, url: &str) -> anyhow::Result<String> {
        self.fetch_query_body(url, &[]).await
    }

    /// Body of a page that must answer 200.
    pub async fn fetch_query_body(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> anyhow::Result<String> {
        let response = self.fetch_url_response(url, query).await?;
        let status = response.status();
        if status != StatusCode::OK {
            anyhow::bail!("GET {url} answered with status {status}");
        }
        let body = response.text().await?;
        Ok(body)
    }

    fn login_headers(&self) -> anyhow::Result<HeaderMap> {
        let base = self.portal.base_url.trim_end_matches('/');
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(BROWSER_ACCEPT));
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
        headers.insert(ORIGIN, HeaderValue::from_str(base)?);
        headers.insert(REFERER, HeaderValue::from_str(&format!("{base}/"))?);
        Ok(headers)
    }
}

#[async_trait]
impl LoginPortal for PortalSession {
    async fn fetch_captcha(&self) -> anyhow::Result<Vec<u8>> {
        let url = self.portal.url(CAPTCHA_PATH);
        let response = self.fetch_url_response(&url, &[]).await?;
        let status = response.status();
        if status != StatusCode::OK {
            anyhow::bail!("请求验证码失败，状态码: {}", status.as_u16());
        }
        let image = response.bytes().await?;
        Ok(image.to_vec())
    }

    async fn submit_login(&self, form: &LoginForm) -> Result<LoginResponse, MonitorError> {
        let url = self.portal.url(LOGIN_PATH);
        let response = self
            .client
            .post(&url)
            .headers(self.login_headers()?)
            .form(&form.fields())
            .send()
            .await
            .map_err(|e| MonitorError::Connection(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| MonitorError::Connection(e.to_string()))?;
        Ok(LoginResponse { status, body })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;

    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::{TcpListener, TcpStream},
    };

    use super::*;

    /// Local HTTP/1.1 server that answers each connection with the next
    /// canned reply and keeps every raw request it saw.
    pub(crate) struct FakePortal {
        pub base_url: String,
        requests: Arc<Mutex<Vec<String>>>,
    }

    impl FakePortal {
        pub(crate) async fn start(replies: Vec<String>) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let base_url = format!("http://{}", listener.local_addr().unwrap());
            let requests = Arc::new(Mutex::new(Vec::new()));
            let seen = requests.clone();
            tokio::spawn(async move {
                for reply in replies {
                    let Ok((mut stream, _)) = listener.accept().await else {
                        return;
                    };
                    let request = read_request(&mut stream).await;
                    seen.lock().unwrap().push(request);
                    let _ = stream.write_all(reply.as_bytes()).await;
                    let _ = stream.shutdown().await;
                }
            });
            Self { base_url, requests }
        }

        pub(crate) fn config(&self) -> PortalConfig {
            PortalConfig {
                base_url: self.base_url.clone(),
            }
        }

        pub(crate) fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }
    }

    /// A complete response; every header line is written as given.
    pub(crate) fn reply(status: &str, headers: &[&str], body: &str) -> String {
        let extra: String = headers.iter().map(|h| format!("{h}\r\n")).collect();
        format!(
            "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n{extra}\r\n{body}",
            body.len()
        )
    }

    pub(crate) fn ok(body: &str) -> String {
        reply("200 OK", &["Content-Type: text/html; charset=utf-8"], body)
    }

    pub(crate) fn request_line(request: &str) -> &str {
        request.lines().next().unwrap_or_default()
    }

    pub(crate) fn header<'a>(request: &'a str, name: &str) -> Option<&'a str> {
        let head = request.split("\r\n\r\n").next()?;
        head.lines().skip(1).find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim().eq_ignore_ascii_case(name).then(|| value.trim())
        })
    }

    pub(crate) fn body(request: &str) -> &str {
        request
            .split_once("\r\n\r\n")
            .map(|(_, body)| body)
            .unwrap_or_default()
    }

    async fn read_request(stream: &mut TcpStream) -> String {
        let mut raw = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            let n = stream.read(&mut buf).await.unwrap_or(0);
            if n == 0 {
                break;
            }
            raw.extend_from_slice(&buf[..n]);
            if let Some(end) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&raw[..end]).into_owned();
                let length = header(&head, "content-length")
                    .and_then(|v| v.parse::<usize>().ok())
                    .unwrap_or(0);
                if raw.len() >= end + 4 + length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&raw).into_owned()
    }

    #[tokio::test]
    async fn session_cookie_is_sent_with_captcha_and_login() {
        let portal = FakePortal::start(vec![
            reply("200 OK", &["Set-Cookie: JSESSIONID=abc; Path=/"], "abcde#11111"),
            reply("200 OK", &["Content-Type: image/jpeg"], "JPEG"),
            ok("<html>main</html>"),
        ])
        .await;

        let (session, challenge) = PortalSession::open(&portal.config()).await.unwrap();
        assert_eq!(challenge, Challenge::parse("abcde#11111").unwrap());
        let image = session.fetch_captcha().await.unwrap();
        assert_eq!(image, b"JPEG");
        let form = LoginForm {
            user_account: "u".to_string(),
            user_password: "p w".to_string(),
            random_code: "c".to_string(),
            encoded: "e%".to_string(),
        };
        let response = session.submit_login(&form).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, "<html>main</html>");

        let requests = portal.requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(
            request_line(&requests[0]),
            "GET /Logon.do?method=logon&flag=sess HTTP/1.1"
        );
        assert_eq!(header(&requests[0], "cookie"), None);
        assert_eq!(request_line(&requests[1]), "GET /verifycode.servlet HTTP/1.1");
        assert_eq!(header(&requests[1], "cookie"), Some("JSESSIONID=abc"));

        let login = &requests[2];
        assert_eq!(request_line(login), "POST /Logon.do?method=logonLdap HTTP/1.1");
        assert_eq!(header(login, "cookie"), Some("JSESSIONID=abc"));
        assert_eq!(
            header(login, "content-type"),
            Some("application/x-www-form-urlencoded")
        );
        assert_eq!(header(login, "origin"), Some(portal.base_url.as_str()));
        assert_eq!(
            header(login, "referer"),
            Some(format!("{}/", portal.base_url).as_str())
        );
        assert_eq!(
            body(login),
            "userAccount=u&userPassword=p+w&RANDOMCODE=c&encoded=e%25"
        );
    }

    #[tokio::test]
    async fn captcha_error_status_fails_the_fetch() {
        let portal = FakePortal::start(vec![reply("500 Internal Server Error", &[], "")]).await;
        let session = PortalSession::new(portal.config()).unwrap();

        let err = session.fetch_captcha().await.unwrap_err();
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn challenge_without_separator_is_malformed() {
        let portal = FakePortal::start(vec![ok("<html>maintenance</html>")]).await;

        let Err(err) = PortalSession::open(&portal.config()).await else {
            panic!("a body without '#' must not open a session");
        };
        assert!(matches!(err, MonitorError::MalformedChallenge(_)));
    }

    #[tokio::test]
    async fn login_reply_status_is_passed_through() {
        let portal = FakePortal::start(vec![reply("502 Bad Gateway", &[], "upstream")]).await;
        let session = PortalSession::new(portal.config()).unwrap();
        let form = LoginForm {
            user_account: "u".to_string(),
            user_password: "p".to_string(),
            random_code: "c".to_string(),
            encoded: "e".to_string(),
        };

        let response = session.submit_login(&form).await.unwrap();
        assert_eq!(response.status, 502);
        assert!(matches!(response.classify(), Err(MonitorError::Transport(502))));
    }
}
