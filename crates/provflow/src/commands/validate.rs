use crate::PlanArgs;
use crate::utils;
use colored::Colorize;

pub fn handle(args: &PlanArgs) -> anyhow::Result<()> {
    println!("{}", "プランを検証中...".blue());

    let loaded = match utils::load_plan(args) {
        Ok(loaded) => loaded,
        Err(e) => utils::exit_with_error("検証エラー", &e),
    };

    println!(
        "プランファイル: {}",
        loaded.path.display().to_string().cyan()
    );
    println!("{}", "✓ プランは正常です！".green().bold());
    println!();
    println!("サマリー:");
    println!("  プロジェクト: {}", loaded.file.name.cyan());
    println!("  リソース: {}個", loaded.plan.len());
    for spec in loaded.plan.resources() {
        println!("    - {} ({})", spec.id.cyan(), spec.kind);
    }
    if !loaded.file.providers.is_empty() {
        println!("  プロバイダー: {}個", loaded.file.providers.len());
        for (name, provider) in &loaded.file.providers {
            println!("    - {} ({}種別)", name.cyan(), provider.kinds.len());
        }
    }

    Ok(())
}
