use async_trait::async_trait;
use log::{info, warn};

use crate::{
    captcha::CaptchaSolver,
    config::Credentials,
    encoder::{Challenge, encode},
    error::MonitorError,
};

pub const MAX_LOGIN_ATTEMPTS: usize = 3;

const CAPTCHA_MISMATCH_MARKER: &str = "验证码错误!!";
const CREDENTIAL_MISMATCH_MARKER: &str = "密码错误";

/// The two portal calls the login loop needs.
#[async_trait]
pub trait LoginPortal: Send + Sync {
    async fn fetch_captcha(&self) -> anyhow::Result<Vec<u8>>;
    async fn submit_login(&self, form: &LoginForm) -> Result<LoginResponse, MonitorError>;
}

#[async_trait]
impl<T: LoginPortal + ?Sized> LoginPortal for &T {
    async fn fetch_captcha(&self) -> anyhow::Result<Vec<u8>> {
        (**self).fetch_captcha().await
    }

    async fn submit_login(&self, form: &LoginForm) -> Result<LoginResponse, MonitorError> {
        (**self).submit_login(form).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginForm {
    pub user_account: String,
    pub user_password: String,
    pub random_code: String,
    pub encoded: String,
}

impl LoginForm {
    pub fn fields(&self) -> [(&str, &str); 4] {
        [
            ("userAccount", self.user_account.as_str()),
            ("userPassword", self.user_password.as_str()),
            ("RANDOMCODE", self.random_code.as_str()),
            ("encoded", self.encoded.as_str()),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct LoginResponse {
    pub status: u16,
    pub body: String,
}

impl LoginResponse {
    /// `Ok` means logged in; retryable errors mean "spend another attempt".
    pub fn classify(&self) -> Result<(), MonitorError> {
        if self.status != 200 {
            return Err(MonitorError::Transport(self.status));
        }
        if self.body.contains(CAPTCHA_MISMATCH_MARKER) {
            return Err(MonitorError::CaptchaMismatch);
        }
        if self.body.contains(CREDENTIAL_MISMATCH_MARKER) {
            return Err(MonitorError::Authentication);
        }
        Ok(())
    }
}

pub struct LoginOrchestrator<S> {
    solver: S,
    max_attempts: usize,
}

impl<S: CaptchaSolver> LoginOrchestrator<S> {
    pub fn new(solver: S) -> Self {
        Self {
            solver,
            max_attempts: MAX_LOGIN_ATTEMPTS,
        }
    }

    /// Drives captcha -> encode -> submit until the portal lets us in.
    ///
    /// The challenge comes from session bootstrap and is reused for every
    /// attempt. On success the portal (and the cookies it now carries) is
    /// handed back to the caller.
    pub async fn login<P: LoginPortal>(
        &self,
        portal: P,
        challenge: &Challenge,
        credentials: &Credentials,
    ) -> Result<P, MonitorError> {
        for attempt in 1..=self.max_attempts {
            match self.attempt(&portal, challenge, credentials).await {
                Ok(()) => {
                    info!("登录成功 (attempt {attempt}/{})", self.max_attempts);
                    return Ok(portal);
                }
                Err(e) if e.is_retryable() => {
                    warn!("{e}，重试第{attempt}次");
                }
                Err(e) => return Err(e),
            }
        }
        Err(MonitorError::CaptchaExhausted(self.max_attempts))
    }

    async fn attempt<P: LoginPortal>(
        &self,
        portal: &P,
        challenge: &Challenge,
        credentials: &Credentials,
    ) -> Result<(), MonitorError> {
        let image = portal
            .fetch_captcha()
            .await
            .map_err(|e| MonitorError::CaptchaRecognition(format!("{e:#}")))?;
        let guess = match self.solver.solve(&image).await {
            Ok(Some(guess)) if !guess.trim().is_empty() => guess.trim().to_string(),
            Ok(_) => return Err(MonitorError::CaptchaRecognition("no text".to_string())),
            Err(e) => return Err(MonitorError::CaptchaRecognition(format!("{e:#}"))),
        };
        info!("验证码: {guess}");

        let form = LoginForm {
            user_account: credentials.account.clone(),
            user_password: credentials.secret.clone(),
            random_code: guess,
            encoded: encode(challenge, &credentials.account, &credentials.secret),
        };
        portal.submit_login(&form).await?.classify()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::{
            Mutex,
            atomic::{AtomicUsize, Ordering},
        },
    };

    use super::*;

    /// Portal that replays scripted captcha and login responses.
    #[derive(Debug, Default)]
    struct ScriptedPortal {
        captchas: Mutex<VecDeque<anyhow::Result<Vec<u8>>>>,
        responses: Mutex<VecDeque<LoginResponse>>,
        captcha_calls: AtomicUsize,
        submits: Mutex<Vec<LoginForm>>,
    }

    impl ScriptedPortal {
        fn with_responses(responses: Vec<LoginResponse>) -> Self {
            let portal = Self::default();
            *portal.responses.lock().unwrap() = responses.into();
            portal
        }

        fn submit_count(&self) -> usize {
            self.submits.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl LoginPortal for ScriptedPortal {
        async fn fetch_captcha(&self) -> anyhow::Result<Vec<u8>> {
            self.captcha_calls.fetch_add(1, Ordering::SeqCst);
            self.captchas
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(vec![0x89, b'P', b'N', b'G']))
        }

        async fn submit_login(&self, form: &LoginForm) -> Result<LoginResponse, MonitorError> {
            self.submits.lock().unwrap().push(form.clone());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| MonitorError::Connection("unexpected submit".to_string()))
        }
    }

    struct FixedSolver(Option<&'static str>);

    #[async_trait]
    impl CaptchaSolver for FixedSolver {
        async fn solve(&self, _image: &[u8]) -> anyhow::Result<Option<String>> {
            Ok(self.0.map(str::to_string))
        }
    }

    fn ok(body: &str) -> LoginResponse {
        LoginResponse {
            status: 200,
            body: body.to_string(),
        }
    }

    fn credentials() -> Credentials {
        Credentials {
            account: "2021416001".to_string(),
            secret: "Passw0rd!123".to_string(),
        }
    }

    fn challenge() -> Challenge {
        Challenge::parse("abcdefghijklmnopqrstuvwxyz0123456789#2010302100102011001200").unwrap()
    }

    #[tokio::test]
    async fn succeeds_on_first_clean_response() {
        let portal = ScriptedPortal::with_responses(vec![ok("<html>main</html>")]);
        let orchestrator = LoginOrchestrator::new(FixedSolver(Some("ab12")));

        let portal = orchestrator
            .login(portal, &challenge(), &credentials())
            .await
            .unwrap();

        let submits = portal.submits.lock().unwrap();
        assert_eq!(submits.len(), 1);
        assert_eq!(submits[0].random_code, "ab12");
        assert_eq!(submits[0].encoded, "2ab02c14def16gh0i01%j%%klPamsnsw0orpqd!123");
    }

    #[tokio::test]
    async fn three_captcha_mismatches_exhaust_the_budget() {
        let mismatch = ok("<script>alert('验证码错误!!')</script>");
        let portal = ScriptedPortal::with_responses(vec![
            mismatch.clone(),
            mismatch.clone(),
            mismatch.clone(),
            ok("would be a fourth call"),
        ]);
        let orchestrator = LoginOrchestrator::new(FixedSolver(Some("zzzz")));

        let portal = &portal;
        let err = orchestrator
            .login(portal, &challenge(), &credentials())
            .await
            .unwrap_err();

        assert!(matches!(err, MonitorError::CaptchaExhausted(3)));
        assert_eq!(portal.submit_count(), 3);
        assert_eq!(portal.captcha_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn wrong_password_aborts_immediately() {
        let portal = ScriptedPortal::with_responses(vec![ok("用户名或密码错误"), ok("main page")]);
        let orchestrator = LoginOrchestrator::new(FixedSolver(Some("ab12")));

        let portal = &portal;
        let err = orchestrator
            .login(portal, &challenge(), &credentials())
            .await
            .unwrap_err();

        assert!(matches!(err, MonitorError::Authentication));
        assert_eq!(portal.submit_count(), 1);
    }

    #[tokio::test]
    async fn non_200_status_is_fatal() {
        let portal = ScriptedPortal::with_responses(vec![LoginResponse {
            status: 502,
            body: String::new(),
        }]);
        let orchestrator = LoginOrchestrator::new(FixedSolver(Some("ab12")));

        let portal = &portal;
        let err = orchestrator
            .login(portal, &challenge(), &credentials())
            .await
            .unwrap_err();

        assert!(matches!(err, MonitorError::Transport(502)));
        assert_eq!(portal.submit_count(), 1);
    }

    #[tokio::test]
    async fn unrecognised_captcha_counts_as_an_attempt() {
        let portal = ScriptedPortal::default();
        let orchestrator = LoginOrchestrator::new(FixedSolver(None));

        let portal = &portal;
        let err = orchestrator
            .login(portal, &challenge(), &credentials())
            .await
            .unwrap_err();

        assert!(matches!(err, MonitorError::CaptchaExhausted(3)));
        assert_eq!(portal.captcha_calls.load(Ordering::SeqCst), 3);
        assert_eq!(portal.submit_count(), 0);
    }

    #[tokio::test]
    async fn captcha_fetch_failure_is_not_fatal() {
        let portal = ScriptedPortal::with_responses(vec![ok("main page")]);
        portal
            .captchas
            .lock()
            .unwrap()
            .push_back(Err(anyhow::anyhow!("connection reset")));
        let orchestrator = LoginOrchestrator::new(FixedSolver(Some("ab12")));

        let portal = &portal;
        orchestrator
            .login(portal, &challenge(), &credentials())
            .await
            .unwrap();

        assert_eq!(portal.captcha_calls.load(Ordering::SeqCst), 2);
        assert_eq!(portal.submit_count(), 1);
    }

    #[tokio::test]
    async fn mismatch_then_success_reuses_the_challenge() {
        let portal = ScriptedPortal::with_responses(vec![ok("验证码错误!!"), ok("welcome")]);
        let orchestrator = LoginOrchestrator::new(FixedSolver(Some("ab12")));

        let portal = &portal;
        orchestrator
            .login(portal, &challenge(), &credentials())
            .await
            .unwrap();

        let submits = portal.submits.lock().unwrap();
        assert_eq!(submits.len(), 2);
        assert_eq!(submits[0].encoded, submits[1].encoded);
    }

    #[test]
    fn form_uses_portal_field_names() {
        let form = LoginForm {
            user_account: "a".into(),
            user_password: "b".into(),
            random_code: "c".into(),
            encoded: "d".into(),
        };
        let names: Vec<_> = form.fields().iter().map(|(k, _)| *k).collect();
        assert_eq!(names, ["userAccount", "userPassword", "RANDOMCODE", "encoded"]);
    }
}
