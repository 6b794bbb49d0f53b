mod commands;
mod preflight;
mod progress;
mod utils;

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "prov")]
#[command(about = "宣言したクラウドリソースを、依存順に作り、失敗したら片付ける。", long_about = None)]
struct Cli {
    /// ログを詳細に出力 (-v: info, -vv: debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// プランファイルの指定（全サブコマンド共通）
#[derive(Args, Debug, Clone, Default)]
pub struct PlanArgs {
    /// プランファイルのパス（省略時は自動検出）
    #[arg(short, long, env = "PROVFLOW_FILE")]
    pub file: Option<PathBuf>,
    /// テンプレート変数 (KEY=VALUE、複数指定可)
    #[arg(long = "var", value_name = "KEY=VALUE", value_parser = utils::parse_var)]
    pub vars: Vec<(String, String)>,
}

/// 使用するプロバイダー
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderChoice {
    /// プランファイルの `provider "exec"` のコマンドを実行
    Exec,
    /// プロセス内のシミュレーション（ドライラン）
    Memory,
}

#[derive(Subcommand)]
enum Commands {
    /// リソースを依存順に作成（失敗時はロールバック）
    Up {
        #[command(flatten)]
        plan: PlanArgs,
        /// 並行実行するワーカー数の上限
        #[arg(long)]
        max_parallel: Option<usize>,
        /// 実行全体の期限（秒）
        #[arg(long, value_name = "SECS")]
        deadline: Option<u64>,
        /// 実行レポートの出力先（デフォルト: ./.provflow/runs）
        #[arg(long)]
        report_dir: Option<PathBuf>,
        /// プロバイダー
        #[arg(long, value_enum, default_value = "exec")]
        provider: ProviderChoice,
        /// 確認なしで実行
        #[arg(short, long)]
        yes: bool,
    },
    /// 実行順序を表示（プロバイダーは呼び出さない）
    Plan {
        #[command(flatten)]
        plan: PlanArgs,
    },
    /// プランファイルを検証
    Validate {
        #[command(flatten)]
        plan: PlanArgs,
    },
    /// 最後の実行レポートを表示
    Report {
        /// 実行レポートのディレクトリ（デフォルト: ./.provflow/runs）
        #[arg(long)]
        report_dir: Option<PathBuf>,
        /// JSONで出力
        #[arg(long)]
        json: bool,
    },
    /// バージョン情報を表示
    Version,
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    // 標準出力は結果表示に使うので、ログはstderrに出力
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Version => {
            println!("provflow {}", env!("CARGO_PKG_VERSION"));
        }
        Commands::Validate { plan } => {
            commands::validate::handle(&plan)?;
        }
        Commands::Plan { plan } => {
            commands::plan::handle(&plan)?;
        }
        Commands::Report { report_dir, json } => {
            commands::report::handle(report_dir, json).await?;
        }
        Commands::Up {
            plan,
            max_parallel,
            deadline,
            report_dir,
            provider,
            yes,
        } => {
            let options = commands::up::UpOptions {
                max_parallel,
                deadline,
                report_dir,
                provider,
                yes,
            };
            let code = commands::up::handle(&plan, options).await?;
            if code != 0 {
                std::process::exit(code);
            }
        }
    }

    Ok(())
}
