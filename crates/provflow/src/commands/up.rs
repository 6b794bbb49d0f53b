use crate::utils::{self, LoadedPlan};
use crate::{PlanArgs, ProviderChoice, preflight, progress};
use colored::Colorize;
use provflow_cloud::{
    CancellationToken, EventSink, MemoryProvider, Orchestrator, OrchestratorConfig, Provider,
    ReportWriter, RunReport,
};
use provflow_cloud_exec::ExecProvider;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub struct UpOptions {
    pub max_parallel: Option<usize>,
    pub deadline: Option<u64>,
    pub report_dir: Option<PathBuf>,
    pub provider: ProviderChoice,
    pub yes: bool,
}

/// Settings block + CLI overrides
fn orchestrator_config(loaded: &LoadedPlan, options: &UpOptions) -> OrchestratorConfig {
    let mut config = OrchestratorConfig::from(&loaded.file.settings);
    if let Some(max_parallel) = options.max_parallel {
        config.max_parallel = max_parallel.max(1);
    }
    if let Some(deadline) = options.deadline {
        config.run_deadline = Some(Duration::from_secs(deadline));
    }
    config
}

/// Returns the process exit code
pub async fn handle(args: &PlanArgs, options: UpOptions) -> anyhow::Result<i32> {
    println!("{}", "プロビジョニングを開始します...".blue().bold());

    // 1. 読み込み・入力検証・プラン構築（プロバイダー呼び出しなし）
    let loaded = match utils::load_plan(args) {
        Ok(loaded) => loaded,
        Err(e) => utils::exit_with_error("プランエラー", &e),
    };
    println!(
        "プランファイル: {}",
        loaded.path.display().to_string().cyan()
    );
    println!(
        "プロジェクト: {} ({}個のリソース)",
        loaded.plan.name().cyan(),
        loaded.plan.len()
    );

    // 出力先は実行前に決めておく（実行後の失敗で終了コードを潰さない）
    let report_dir = match utils::report_dir(options.report_dir.clone()) {
        Ok(dir) => dir,
        Err(e) => utils::exit_with_error("レポート出力先エラー", &e),
    };

    // 2. プロバイダーの準備
    let (provider, exec): (Arc<dyn Provider>, Option<Arc<ExecProvider>>) = match options.provider
    {
        ProviderChoice::Memory => {
            let memory: Arc<dyn Provider> = Arc::new(MemoryProvider::new());
            (memory, None)
        }
        ProviderChoice::Exec => {
            let Some(config) = loaded.file.providers.get("exec") else {
                eprintln!();
                eprintln!("{}", "✗ プロバイダー 'exec' が定義されていません".red().bold());
                eprintln!("  プランファイルに provider \"exec\" {{ ... }} を追加するか、");
                eprintln!("  --provider memory でドライランしてください");
                return Ok(1);
            };
            let exec = Arc::new(ExecProvider::new(config.clone()));
            (exec.clone() as Arc<dyn Provider>, Some(exec))
        }
    };

    // 3. 実行前チェック
    println!();
    let report = preflight::run(&loaded.plan, provider.as_ref(), exec.as_deref()).await;
    report.print();
    if !report.passed() {
        eprintln!();
        eprintln!("{}", "✗ 実行前チェックに失敗しました".red().bold());
        return Ok(1);
    }

    // 確認（--yesが指定されていない場合、実際のクラウドには触れない）
    if options.provider == ProviderChoice::Exec && !options.yes {
        println!();
        println!(
            "{}",
            "警告: クラウド上にリソースを作成します。失敗時は作成済みのリソースを削除します。"
                .yellow()
        );
        println!("実行するには --yes オプションを指定してください");
        return Ok(0);
    }

    // 4. 実行
    let config = orchestrator_config(&loaded, &options);
    println!();
    println!(
        "{}",
        format!(
            "実行中... (並行数: {}, 期限: {})",
            config.max_parallel,
            config
                .run_deadline
                .map(|d| format!("{}秒", d.as_secs()))
                .unwrap_or_else(|| "なし".to_string())
        )
        .blue()
    );

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!();
            eprintln!("{}", "中断を受け付けました。ロールバックします...".yellow().bold());
            interrupt.cancel();
        }
    });

    let (tx, rx) = mpsc::unbounded_channel();
    let printer = progress::spawn(rx);
    let orchestrator = Orchestrator::new(provider, config).with_events(EventSink::new(tx));
    let run = orchestrator.run(&loaded.plan, cancel).await;

    // 送信側をドロップして表示タスクを終わらせる
    drop(orchestrator);
    if let Err(e) = printer.await {
        tracing::warn!(error = %e, "Progress printer stopped unexpectedly");
    }

    // 5. レポート
    let report = RunReport::from_run(&run);
    let writer = ReportWriter::new(report_dir);
    let saved = match writer.write(&report).await {
        Ok(path) => Some(path),
        Err(e) => {
            eprintln!("{} レポートを書き込めませんでした: {}", "⚠".yellow(), e);
            None
        }
    };
    utils::print_report(&report, saved.as_deref());

    Ok(run.outcome.map(|o| o.exit_code()).unwrap_or(2))
}
