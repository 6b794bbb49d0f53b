use crate::PlanArgs;
use crate::utils;
use colored::Colorize;

pub fn handle(args: &PlanArgs) -> anyhow::Result<()> {
    let loaded = match utils::load_plan(args) {
        Ok(loaded) => loaded,
        Err(e) => utils::exit_with_error("プランエラー", &e),
    };

    let settings = &loaded.file.settings;
    println!("プロジェクト: {}", loaded.plan.name().cyan());
    println!(
        "並行数: {}  ポーリング間隔: {}秒  期限: {}",
        settings.max_parallel,
        settings.poll_interval_secs,
        settings
            .run_deadline_secs
            .map(|s| format!("{}秒", s))
            .unwrap_or_else(|| "なし".to_string())
    );
    println!();
    println!("{}", "実行順序:".bold());

    for (i, spec) in loaded.plan.resources().iter().enumerate() {
        let deps = if spec.depends_on.is_empty() {
            String::new()
        } else {
            format!(" ← {}", spec.depends_on.join(", "))
        };
        let dependents = loaded.plan.dependents_of(&spec.id);
        let dependents = if dependents.is_empty() {
            String::new()
        } else {
            format!(" → {}", dependents.join(", "))
        };
        println!(
            "  {:>2}. {} [{}]{}{} (rollback: {:?}, timeout: {}秒)",
            i + 1,
            spec.id.cyan(),
            spec.kind,
            deps.dimmed(),
            dependents.dimmed(),
            spec.delete_action,
            spec.readiness_timeout_secs
        );
    }

    // 失敗時はこの順で削除される
    let rollback_order: Vec<&str> = loaded
        .plan
        .reverse_order()
        .map(|spec| spec.id.as_str())
        .collect();
    println!();
    println!("{} {}", "ロールバック順序:".bold(), rollback_order.join(" → "));

    Ok(())
}
