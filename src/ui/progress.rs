use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Timeline bar for a load run, measured in seconds.
pub fn create_progress_bar(len_secs: u64) -> ProgressBar {
    let pb = ProgressBar::new(len_secs);
    if let Ok(style) =
        ProgressStyle::default_bar().template("▕{bar:25}▏ {percent:>3}% • {pos}s/{len}s • {wide_msg}")
    {
        pb.set_style(style.progress_chars("█░ "));
    }
    pb
}

pub fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner()
        .tick_strings(&["⠋", "⠙", "⠚", "⠞", "⠖", "⠦", "⠴", "⠲", "⠳", "⠓"])
        .template("{spinner} {wide_msg}")
    {
        pb.set_style(style);
    }
    pb.enable_steady_tick(Duration::from_millis(80));
    pb.set_message(message.to_string());
    pb
}
