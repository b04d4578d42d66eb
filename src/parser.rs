//! Parsing of the `cjcx_list` score page.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::{scores::ScoreRecord, text_manipulators::extract_cell_text};

const SUBJECT_COLUMN: usize = 3;
const SCORE_COLUMN: usize = 5;
const CREDIT_COLUMN: usize = 7;
const GRADE_POINT_COLUMN: usize = 9;

static TABLE_ROWS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table#dataList tr").expect("static selector"));
static CELLS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("td").expect("static selector"));
static TOTAL_CREDITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"所修总学分:(\d+)").expect("static regex"));
static AVERAGE_GPA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"平均学分绩点:(\d+\.\d+)").expect("static regex"));

/// Totals printed above the score table; each one may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScoreTotals {
    pub total_credits: Option<String>,
    pub average_gpa: Option<String>,
}

/// What the scraper needs out of a score page.
pub trait ScorePageParser: Send + Sync {
    fn parse_scores(&self, html: &str) -> Vec<ScoreRecord>;
    fn parse_credit_points(&self, html: &str) -> Vec<(f64, f64)>;
    fn parse_totals(&self, html: &str) -> ScoreTotals;
}

/// Parser for the portal's `dataList` table layout.
#[derive(Debug, Default, Clone, Copy)]
pub struct DataListParser;

impl ScorePageParser for DataListParser {
    fn parse_scores(&self, html: &str) -> Vec<ScoreRecord> {
        data_rows(html, SCORE_COLUMN + 1)
            .into_iter()
            .map(|cells| ScoreRecord::new(&cells[SUBJECT_COLUMN], &cells[SCORE_COLUMN]))
            .collect()
    }

    fn parse_credit_points(&self, html: &str) -> Vec<(f64, f64)> {
        data_rows(html, GRADE_POINT_COLUMN + 1)
            .into_iter()
            .filter_map(|cells| {
                let credit = cells[CREDIT_COLUMN].parse::<f64>().ok()?;
                let point = cells[GRADE_POINT_COLUMN].parse::<f64>().ok()?;
                Some((credit, point))
            })
            .collect()
    }

    fn parse_totals(&self, html: &str) -> ScoreTotals {
        let capture = |re: &Regex| re.captures(html).map(|caps| caps[1].to_string());
        ScoreTotals {
            total_credits: capture(&TOTAL_CREDITS),
            average_gpa: capture(&AVERAGE_GPA),
        }
    }
}

/// Trimmed cell texts of every `dataList` row after the header that has at
/// least `min_cells` cells. Short (merged or malformed) rows are dropped.
fn data_rows(html: &str, min_cells: usize) -> Vec<Vec<String>> {
    let document = Html::parse_document(html);
    document
        .select(&TABLE_ROWS)
        .skip(1)
        .map(row_cells)
        .filter(|cells| cells.len() >= min_cells)
        .collect()
}

fn row_cells(row: ElementRef) -> Vec<String> {
    row.select(&CELLS).map(extract_cell_text).collect()
}
