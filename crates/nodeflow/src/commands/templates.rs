use colored::Colorize;
use nodeflow_core::TemplateSource;

pub async fn handle(class: &str) -> anyhow::Result<()> {
    let (path, _) = super::load_config()?;
    let source = super::template_source(&path);

    let names = source.list(class).await?;
    if names.is_empty() {
        println!("{}", format!("No {class} templates found").yellow());
        for dir in source.dirs() {
            println!("  searched: {}", dir.display());
        }
        return Ok(());
    }

    println!("{}", format!("{class} templates:").bold());
    for name in names {
        println!("  - {}", name.cyan());
    }
    Ok(())
}
