use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::{
    gpa::weighted_gpa,
    parser::{DataListParser, ScorePageParser},
    requests::PortalSession,
};

pub const SCORE_LIST_PATH: &str = "/jsxsd/kscj/cjcx_list";

/// One published score. Stored on disk as `[subject, score]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "(String, String)", into = "(String, String)")]
pub struct ScoreRecord {
    pub subject: String,
    /// Numeric mark or grade symbol, exactly as printed.
    pub score: String,
}

impl ScoreRecord {
    pub fn new(subject: impl Into<String>, score: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            score: score.into(),
        }
    }
}

impl From<(String, String)> for ScoreRecord {
    fn from((subject, score): (String, String)) -> Self {
        Self { subject, score }
    }
}

impl From<ScoreRecord> for (String, String) {
    fn from(record: ScoreRecord) -> Self {
        (record.subject, record.score)
    }
}

pub type ScoreSnapshot = Vec<ScoreRecord>;

#[derive(Debug, Clone, PartialEq)]
pub struct CreditGpaSummary {
    pub total_credits: Option<String>,
    pub average_gpa: Option<String>,
    pub semester_gpa: f64,
}

/// Filters of the score listing. Empty fields are still sent, the portal
/// expects the full set once any of them is present.
#[derive(Debug, Clone, Default)]
pub struct ScoreQuery {
    pub semester: String,
    pub course_type: String,
    pub course_name: String,
    pub display_mode: String,
}

impl ScoreQuery {
    pub fn for_semester(semester: &str) -> Self {
        Self {
            semester: semester.to_string(),
            display_mode: "all".to_string(),
            ..Default::default()
        }
    }

    pub fn params(&self) -> [(&str, &str); 4] {
        [
            ("kksj", self.semester.as_str()),
            ("kcxz", self.course_type.as_str()),
            ("kcmc", self.course_name.as_str()),
            ("xsfs", self.display_mode.as_str()),
        ]
    }
}

pub struct ScoreScraper<'a, P = DataListParser> {
    session: &'a PortalSession,
    parser: P,
}

impl<'a> ScoreScraper<'a> {
    pub fn new(session: &'a PortalSession) -> Self {
        Self::with_parser(session, DataListParser)
    }
}

impl<'a, P: ScorePageParser> ScoreScraper<'a, P> {
    pub fn with_parser(session: &'a PortalSession, parser: P) -> Self {
        Self { session, parser }
    }

    async fn fetch_listing(&self, query: Option<&ScoreQuery>) -> anyhow::Result<String> {
        let url = self.session.portal().url(SCORE_LIST_PATH);
        match query {
            Some(query) => {
                debug!("Fetching score listing with {query:?}");
                self.session.fetch_query_body(&url, &query.params()).await
            }
            None => self.session.fetch_url_body(&url).await,
        }
    }

    pub async fn fetch_current_scores(&self) -> anyhow::Result<ScoreSnapshot> {
        let html = self.fetch_listing(None).await?;
        let scores = self.parser.parse_scores(&html);
        info!("Scraped {} score rows", scores.len());
        Ok(scores)
    }

    /// Portal-wide totals plus the credit-weighted GPA of one semester.
    pub async fn fetch_summary(&self, semester: &str) -> anyhow::Result<CreditGpaSummary> {
        let overview = self.fetch_listing(None).await?;
        let totals = self.parser.parse_totals(&overview);

        let term_page = self
            .fetch_listing(Some(&ScoreQuery::for_semester(semester)))
            .await?;
        let credit_points = self.parser.parse_credit_points(&term_page);
        debug!("{} graded courses in {semester}", credit_points.len());

        Ok(CreditGpaSummary {
            total_credits: totals.total_credits,
            average_gpa: totals.average_gpa,
            semester_gpa: weighted_gpa(&credit_points),
        })
    }
}
