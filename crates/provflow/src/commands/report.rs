use crate::utils;
use colored::Colorize;
use provflow_cloud::ReportWriter;
use std::path::PathBuf;

pub async fn handle(report_dir: Option<PathBuf>, json: bool) -> anyhow::Result<()> {
    let dir = utils::report_dir(report_dir)?;
    let writer = ReportWriter::new(&dir);

    let Some(report) = writer.load_last().await? else {
        println!("{}", "実行履歴がありません".yellow());
        println!("  ディレクトリ: {}", dir.display());
        return Ok(());
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        utils::print_report(&report, None);
    }
    Ok(())
}
