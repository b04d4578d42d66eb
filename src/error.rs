use thiserror::Error;

/// Everything that can end (or interrupt) a monitoring run.
#[derive(Error, Debug)]
pub enum MonitorError {
    /// Portal could not be reached or did not answer in time.
    #[error("无法连接教务系统: {0}")]
    Connection(String),

    #[error("登录挑战串格式错误: {0:?}")]
    MalformedChallenge(String),

    /// OCR produced no usable guess.
    #[error("验证码识别失败: {0}")]
    CaptchaRecognition(String),

    /// Portal rejected the CAPTCHA guess.
    #[error("验证码错误")]
    CaptchaMismatch,

    #[error("用户名或密码错误")]
    Authentication,

    #[error("登录失败，状态码: {0}")]
    Transport(u16),

    #[error("验证码{0}次识别失败，请重试")]
    CaptchaExhausted(usize),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("读取成绩文件失败: {0}")]
    SnapshotParse(String),

    #[error("通知发送失败: {0}")]
    Notification(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl MonitorError {
    /// Errors the login loop may recover from by spending another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MonitorError::CaptchaRecognition(_) | MonitorError::CaptchaMismatch
        )
    }
}
