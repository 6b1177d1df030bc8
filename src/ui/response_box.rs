use crate::runner::executor::CheckResult;
use crate::ui::format_size;
use owo_colors::OwoColorize;
use reqwest::header::HeaderMap;
use std::time::Duration;

pub fn print_response_box(
    status: u16,
    reason: &str,
    duration: Duration,
    body_size: u64,
    headers: &HeaderMap,
    checks: &[CheckResult],
) {
    println!("╭─ Response ─────────────────────────────╮");

    let status_text = format!("{} {}", status, reason);
    let status_colored = match status {
        200..=299 => status_text.green().to_string(),
        400..=599 => status_text.red().to_string(),
        _ => status_text.yellow().to_string(),
    };

    println!(
        "│ {} • {:.2}ms • {}",
        status_colored,
        duration.as_secs_f64() * 1000.0,
        format_size(body_size)
    );

    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            let line = format!("{}: {}", name.as_str(), value);
            if line.chars().count() <= 60 {
                println!("│ {}", line.dimmed());
            } else {
                let cut: String = line.chars().take(57).collect();
                println!("│ {}...", cut.dimmed());
            }
        }
    }

    if !checks.is_empty() {
        println!("├─ Checks");
        for check in checks {
            if check.passed {
                println!("│ {} {}", "✓".green(), check.name);
            } else {
                println!("│ {} {}", "✗".red(), check.name);
            }
        }
    }

    println!("╰────────────────────────────────────────╯");
}
