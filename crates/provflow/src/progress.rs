//! 実行イベントの進捗表示

use colored::Colorize;
use provflow_cloud::RunEvent;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// イベントチャネルを受信して進捗を表示するタスクを起動
///
/// 送信側がすべてドロップされるとタスクは終了する。
pub fn spawn(mut rx: mpsc::UnboundedReceiver<RunEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let Some(line) = render(&event) {
                println!("{}", line);
            }
        }
    })
}

fn render(event: &RunEvent) -> Option<String> {
    let line = match event {
        RunEvent::StepStarted { id, kind } => {
            format!("  {} {} [{}]", "→".blue(), id.cyan(), kind)
        }
        RunEvent::Adopted { id, external_id } => {
            format!("  {} {} 既存リソースを使用: {}", "=".blue(), id.cyan(), external_id)
        }
        RunEvent::Created {
            id,
            external_id,
            attempts,
        } => {
            if *attempts > 1 {
                format!(
                    "  {} {} 作成: {} ({}回目で成功)",
                    "+".green(),
                    id.cyan(),
                    external_id,
                    attempts
                )
            } else {
                format!("  {} {} 作成: {}", "+".green(), id.cyan(), external_id)
            }
        }
        RunEvent::Retrying {
            id,
            attempt,
            delay,
            error,
        } => format!(
            "  {} {} リトライ ({}回目失敗、{:?}後に再試行): {}",
            "↻".yellow(),
            id.cyan(),
            attempt,
            delay,
            error
        ),
        RunEvent::Ready { id, .. } => format!("  {} {} 準備完了", "✓".green(), id.cyan()),
        RunEvent::Failed { id, error } => {
            format!("  {} {} 失敗: {}", "✗".red(), id.cyan(), error.red())
        }
        RunEvent::Halted { reason } => {
            format!("{} {}", "実行を停止しました:".red().bold(), reason)
        }
        RunEvent::RollbackStarted { count } => {
            format!("{}", format!("ロールバック中... ({}個)", count).yellow().bold())
        }
        RunEvent::RolledBack { id, external_id } => {
            format!("  {} {} 削除: {}", "-".yellow(), id.cyan(), external_id)
        }
        RunEvent::Retained { id, external_id } => {
            format!("  {} {} 保持: {}", "=".blue(), id.cyan(), external_id)
        }
        RunEvent::Leaked {
            id,
            external_id,
            error,
        } => format!(
            "  {} {} 削除失敗: {} ({})",
            "!".red().bold(),
            id.red(),
            external_id,
            error
        ),
        RunEvent::Finished { .. } => return None,
    };
    Some(line)
}
