use indexmap::IndexMap;
use owo_colors::OwoColorize;

fn masked(key: &str, value: &str) -> String {
    if key.eq_ignore_ascii_case("authorization") {
        format!("{}: ****", key)
    } else {
        format!("{}: {}", key, value)
    }
}

pub fn print_request_box(exec: &str, method: &str, url: &str, headers: &IndexMap<String, String>) {
    let title = format!(" Request · {} ", exec);
    let first_line = format!("{} {}", method, url);
    let header_lines: Vec<String> = headers.iter().map(|(k, v)| masked(k, v)).collect();

    let width = header_lines
        .iter()
        .map(|l| l.chars().count())
        .chain([first_line.chars().count(), title.chars().count()])
        .max()
        .unwrap_or(0)
        .clamp(46, 120)
        + 2;

    let title_len = title.chars().count();
    println!("╭─{}{}╮", title, "─".repeat(width.saturating_sub(title_len + 1)));
    let pad = width.saturating_sub(first_line.chars().count() + 2);
    println!("│ {} {}{} │", method.bright_green(), url, " ".repeat(pad));
    for line in &header_lines {
        let pad = width.saturating_sub(line.chars().count() + 2);
        println!("│ {}{} │", line, " ".repeat(pad));
    }
    println!("╰{}╯", "─".repeat(width));
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorization_is_masked() {
        assert_eq!(masked("Authorization", "Bearer abc"), "Authorization: ****");
        assert_eq!(masked("Accept", "application/json"), "Accept: application/json");
    }
}
