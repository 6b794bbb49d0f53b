//! 実行前チェック
//!
//! すべてのチェックが通るまで lookup/create は一度も呼ばれない。

use colored::Colorize;
use provflow_cloud::Provider;
use provflow_cloud_exec::ExecProvider;
use provflow_core::ProvisioningPlan;

#[derive(Debug)]
pub struct Check {
    pub name: &'static str,
    pub passed: bool,
    pub detail: String,
}

impl Check {
    fn pass(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            passed: true,
            detail: detail.into(),
        }
    }

    fn fail(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            passed: false,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Default)]
pub struct PreflightReport {
    pub checks: Vec<Check>,
}

impl PreflightReport {
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    pub fn print(&self) {
        println!("{}", "実行前チェック".bold());
        for check in &self.checks {
            if check.passed {
                println!("  {} {}: {}", "✓".green(), check.name, check.detail);
            } else {
                println!("  {} {}: {}", "✗".red(), check.name, check.detail.red());
            }
        }
    }
}

/// プロバイダーに依存するチェック（プラン構築と入力検証は読み込み時に済んでいる）
pub async fn run(
    plan: &ProvisioningPlan,
    provider: &dyn Provider,
    exec: Option<&ExecProvider>,
) -> PreflightReport {
    let mut report = PreflightReport::default();
    report.checks.push(Check::pass(
        "plan",
        format!("{}個のリソース、依存関係に循環なし", plan.len()),
    ));

    if let Some(exec) = exec {
        let shell = exec.shell();
        report.checks.push(match shell.check_available().await {
            Ok(()) => Check::pass("shell", shell.program().to_string()),
            Err(e) => Check::fail("shell", e.to_string()),
        });

        let unmapped = exec.unmapped_kinds(plan.resources().iter().map(|r| &r.kind));
        report.checks.push(if unmapped.is_empty() {
            Check::pass("kinds", "すべての種別にコマンドが定義されています")
        } else {
            Check::fail("kinds", format!("コマンド未定義: {}", unmapped.join(", ")))
        });
    }

    report.checks.push(match provider.check_auth().await {
        Ok(status) if status.authenticated => Check::pass(
            "auth",
            status
                .account_info
                .unwrap_or_else(|| provider.name().to_string()),
        ),
        Ok(status) => Check::fail(
            "auth",
            status.error.unwrap_or_else(|| "認証されていません".to_string()),
        ),
        Err(e) => Check::fail("auth", e.to_string()),
    });

    report
}
