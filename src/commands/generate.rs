use anyhow::Result;
use owo_colors::OwoColorize;
use zzzcal_core::config::Config;
use zzzcal_core::output::WriteOutcome;
use zzzcal_core::pipeline;

pub async fn run(config: &Config) -> Result<()> {
    let summary = pipeline::generate(config).await?;

    match &summary.outcome {
        WriteOutcome::Written(changes) => {
            println!(
                "{} {} ({} events)",
                "Wrote".green(),
                config.output_path.display(),
                summary.events
            );
            if changes.is_unchanged() {
                println!("  {}", "No changes".dimmed());
            } else {
                println!("  {changes}");
            }
        }
        WriteOutcome::KeptPrevious => {
            println!(
                "{} {} (nothing extracted)",
                "Kept".yellow(),
                config.output_path.display()
            );
        }
    }

    if summary.skipped > 0 {
        println!(
            "  {}",
            format!("{} posts or records skipped, see log", summary.skipped).yellow()
        );
    }
    println!("  {}", summary.to_string().dimmed());

    Ok(())
}
