use std::{env, io::Write, process::ExitCode};

use chrono::Local;
use dotenv::dotenv;
use log::{LevelFilter, error, info};
use score_reminder::{MonitorConfig, ScoreMonitor};

const CREDIT_LINE: &str = "By W1ndys | https://github.com/W1ndys/QFNUScoreReminder";

fn log_prefix(account_label: &str) -> String {
    format!("[账号{account_label}]")
}

fn init_logger(account_label: &str) {
    let prefix = log_prefix(account_label);
    env_logger::Builder::new()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .format(move |buf, record| {
            writeln!(
                buf,
                "{prefix} {} - {} - {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .init();
}

fn welcome_banner(account_label: &str) -> [String; 2] {
    let stars = "*".repeat(10);
    [
        format!("{stars} 账号{account_label} - 曲阜师范大学成绩监控 {stars}"),
        CREDIT_LINE.to_string(),
    ]
}

fn print_welcome(account_label: &str) {
    for line in welcome_banner(account_label) {
        info!("{line}");
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();
    // Logging comes up before config validation so config errors get labelled too.
    let account_label = env::var("ACCOUNT_INDEX").unwrap_or_else(|_| "1".to_string());
    init_logger(&account_label);
    print_welcome(&account_label);

    // Without an account identity there is nobody to notify.
    let config = match MonitorConfig::load() {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    info!("用户名: {}", config.credentials.masked_account());
    info!("密码: {}", config.credentials.masked_secret());

    let monitor = match ScoreMonitor::from_config(config) {
        Ok(monitor) => monitor,
        Err(e) => {
            error!("failed to set up HTTP clients: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    match monitor.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            monitor.report_failure(&e).await;
            ExitCode::FAILURE
        }
    }
}
