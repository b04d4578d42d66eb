use log::{error, info, warn};

use crate::{
    captcha::{CaptchaSolver, OcrServiceSolver},
    config::{AccountIndex, MonitorConfig},
    diff::{DiffOutcome, evaluate},
    error::MonitorError,
    login::LoginOrchestrator,
    requests::PortalSession,
    scores::{CreditGpaSummary, ScoreRecord, ScoreScraper, ScoreSnapshot},
    scraping_context::ScrapingContext,
};

pub const NOTICE_TITLE: &str = "成绩监控通知";
pub const ERROR_TITLE: &str = "成绩监控错误";

const UNREACHABLE_MESSAGE: &str = "无法连接教务系统，请检查网络或系统可用性";
const UNKNOWN: &str = "未知";

pub struct ScoreMonitor<S = OcrServiceSolver> {
    ctx: ScrapingContext,
    login: LoginOrchestrator<S>,
}

impl ScoreMonitor {
    pub fn from_config(config: MonitorConfig) -> anyhow::Result<Self> {
        let solver = OcrServiceSolver::new(config.captcha_ocr_url.clone())?;
        Ok(Self::new(ScrapingContext::new(config)?, solver))
    }
}

impl<S: CaptchaSolver> ScoreMonitor<S> {
    pub fn new(ctx: ScrapingContext, solver: S) -> Self {
        Self {
            ctx,
            login: LoginOrchestrator::new(solver),
        }
    }

    pub fn context(&self) -> &ScrapingContext {
        &self.ctx
    }

    /// One full pass: login, diff scores, notify, write the GPA summary.
    ///
    /// The summary is refreshed even when score delivery failed; that error
    /// is reported once the summary is on disk.
    pub async fn run(&self) -> Result<(), MonitorError> {
        let config = &self.ctx.config;
        let (session, challenge) = PortalSession::open(&config.portal).await?;
        let session = self
            .login
            .login(session, &challenge, &config.credentials)
            .await?;

        let scraper = ScoreScraper::new(&session);
        let current = scraper.fetch_current_scores().await?;
        let processed = self.process_scores(current).await;

        let summary = scraper.fetch_summary(&config.semester).await;
        if let Ok(summary) = &summary {
            self.write_summary(summary);
        }
        processed?;
        summary?;
        Ok(())
    }

    /// Compares a fresh scrape with the baseline and acts on the outcome.
    ///
    /// The baseline is only replaced once the new scores went out on the
    /// mandatory channel, so a failed delivery is retried on the next run.
    pub async fn process_scores(
        &self,
        current: ScoreSnapshot,
    ) -> Result<DiffOutcome, MonitorError> {
        let index = self.ctx.config.account_index;
        let previous = self.ctx.store.load();
        let outcome = evaluate(&current, &previous);

        match &outcome {
            DiffOutcome::Baseline => {
                self.ctx.store.save(&current)?;
                let message = format!("初始化保存成功！\n当前已记录{}门课程成绩", current.len());
                self.notify(&message).await?;
            }
            DiffOutcome::Unchanged => info!("账号{index}无新成绩"),
            DiffOutcome::Changed { new } if new.is_empty() => {
                warn!("账号{index}成绩表有变化但没有新增成绩, keeping the stored baseline");
            }
            DiffOutcome::Changed { new } => {
                info!("账号{index}发现成绩变化");
                self.notify(&new_scores_message(new)).await?;
                self.ctx.store.save(&current)?;
            }
        }
        Ok(outcome)
    }

    async fn notify(&self, message: &str) -> Result<(), MonitorError> {
        let full = format!("{}\n{message}", self.ctx.account_header());
        info!("发送通知: {full}");
        self.ctx.dispatcher.send(NOTICE_TITLE, &full).await
    }

    fn write_summary(&self, summary: &CreditGpaSummary) {
        let config = &self.ctx.config;
        let text = format_summary(config.account_index, &config.semester, summary);
        match self.ctx.store.write_summary(&text) {
            Ok(()) => info!("GPA summary written to {}", self.ctx.store.summary_path().display()),
            Err(e) => error!("{e:#}"),
        }
    }

    /// Best-effort report of a failed run on the mandatory channel.
    pub async fn report_failure(&self, err: &MonitorError) {
        let (title, message) = match err {
            MonitorError::Configuration(_) => {
                error!("{err}");
                return;
            }
            MonitorError::Connection(_) => {
                (NOTICE_TITLE, format!("{UNREACHABLE_MESSAGE}\n{err}"))
            }
            other => (ERROR_TITLE, format!("发生错误: {other}")),
        };
        let full = format!("{}\n{message}", self.ctx.account_header());
        error!("{full}");
        if let Err(e) = self.ctx.dispatcher.send_primary(title, &full).await {
            error!("{e}");
        }
    }
}

fn new_scores_message(new: &[ScoreRecord]) -> String {
    let rows: Vec<String> = new
        .iter()
        .map(|r| format!("科目: {}\n成绩: {}", r.subject, r.score))
        .collect();
    format!("发现{}门新成绩！\n{}", new.len(), rows.join("\n"))
}

pub fn format_summary(index: AccountIndex, semester: &str, summary: &CreditGpaSummary) -> String {
    format!(
        "账号{index} 总学分: {}\n账号{index} 平均绩点: {}\n账号{index} {semester} 学期绩点: {:.2}\n",
        summary.total_credits.as_deref().unwrap_or(UNKNOWN),
        summary.average_gpa.as_deref().unwrap_or(UNKNOWN),
        summary.semester_gpa,
    )
}
