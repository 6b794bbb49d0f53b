use crate::PlanArgs;
use anyhow::Context;
use colored::Colorize;
use provflow_cloud::{RunOutcome, RunReport};
use provflow_core::{PlanFile, ProvisioningPlan, Variables};
use std::path::{Path, PathBuf};

/// `--var KEY=VALUE` をパース
pub fn parse_var(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("KEY=VALUE 形式で指定してください: '{}'", s))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("変数名が空です: '{}'", s));
    }
    Ok((key.to_string(), value.to_string()))
}

/// 読み込み済みのプラン
pub struct LoadedPlan {
    pub path: PathBuf,
    pub file: PlanFile,
    pub plan: ProvisioningPlan,
}

/// プランファイルのパスを決定（--file 優先、なければ自動検出）
pub fn resolve_plan_path(args: &PlanArgs) -> anyhow::Result<PathBuf> {
    match &args.file {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("プランファイルが見つかりません: {}", path.display());
            }
            Ok(path.clone())
        }
        None => Ok(provflow_config::find_plan_file()?),
    }
}

/// プランファイルを読み込み、入力検証し、実行順序を組み立てる
///
/// ここで失敗した場合、プロバイダーは一度も呼ばれていない。
pub fn load_plan(args: &PlanArgs) -> anyhow::Result<LoadedPlan> {
    let path = resolve_plan_path(args)?;
    let overrides: Variables = args.vars.iter().cloned().collect();

    let file = provflow_core::load_plan_file(&path, &overrides)
        .with_context(|| format!("プランファイルの読み込みに失敗しました: {}", path.display()))?;
    provflow_core::validate_resources(&file.resources)?;
    let plan = ProvisioningPlan::build(file.name.clone(), file.resources.clone())?;

    Ok(LoadedPlan { path, file, plan })
}

/// エラーを表示して終了コード1で終了
pub fn exit_with_error(title: &str, error: &anyhow::Error) -> ! {
    eprintln!();
    eprintln!("{}", format!("✗ {}", title).red().bold());
    for (i, cause) in error.chain().enumerate() {
        if i == 0 {
            eprintln!("  {}", cause);
        } else {
            eprintln!("    原因: {}", cause);
        }
    }
    std::process::exit(1);
}

/// 実行レポートの出力先
pub fn report_dir(explicit: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    match explicit {
        Some(dir) => Ok(dir),
        None => {
            let current_dir = std::env::current_dir()?;
            Ok(provflow_config::default_report_dir(&current_dir))
        }
    }
}

fn outcome_label(outcome: Option<RunOutcome>) -> colored::ColoredString {
    match outcome {
        Some(RunOutcome::Succeeded) => "成功".green().bold(),
        Some(RunOutcome::Failed) => "失敗（ロールバック済み）".red().bold(),
        Some(RunOutcome::FailedWithLeaks) => "失敗（削除できなかったリソースあり）".red().bold(),
        None => "未完了".yellow().bold(),
    }
}

/// 実行レポートのサマリーを表示
pub fn print_report(report: &RunReport, saved_to: Option<&Path>) {
    println!();
    println!("{}", "実行結果".bold());
    println!("  実行ID: {}", report.run_id.cyan());
    println!("  結果:   {}", outcome_label(report.outcome));
    if let Some(reason) = &report.halt_reason {
        println!("  停止理由: {}", reason);
    }

    let sections = [
        ("作成済み (ready)", &report.ready),
        ("ロールバック済み", &report.rolled_back),
        ("保持 (既存/retain)", &report.retained),
        ("失敗", &report.failed),
        ("未着手", &report.pending),
    ];
    for (title, resources) in sections {
        if resources.is_empty() {
            continue;
        }
        println!("  {}:", title);
        for r in resources {
            let external = r.external_id.as_deref().unwrap_or("-");
            println!("    - {} [{}] {}", r.id.cyan(), r.kind, external);
        }
    }

    if !report.leaked.is_empty() {
        println!();
        println!(
            "{}",
            "⚠ 以下のリソースは削除できませんでした。手動で削除してください:"
                .red()
                .bold()
        );
        for r in &report.leaked {
            let external = r.external_id.as_deref().unwrap_or("-");
            let error = r.error.as_deref().unwrap_or("");
            println!("    - {} [{}] {} {}", r.id.red(), r.kind, external, error);
        }
    }

    let existing = report.still_existing();
    println!();
    println!("  クラウド上に存在するリソース: {}個", existing.len());

    if let Some(path) = saved_to {
        println!("  レポート: {}", path.display().to_string().cyan());
    }
}
