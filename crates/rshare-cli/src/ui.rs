//! UI utilities for the Rshare CLI.

use std::io::{self, Write};
use std::time::Duration;

use rshare_core::file::format_size;

const BOX_WIDTH: usize = 33;

/// A formatted box for displaying share codes.
pub struct CodeBox<'a> {
    code: &'a str,
    expire: Option<&'a str>,
}

impl<'a> CodeBox<'a> {
    /// Create a new code box.
    #[must_use]
    pub const fn new(code: &'a str) -> Self {
        Self { code, expire: None }
    }

    /// Add expiration time to the box.
    #[must_use]
    pub const fn with_expire(mut self, expire: &'a str) -> Self {
        self.expire = Some(expire);
        self
    }

    /// Display the code box to stdout.
    pub fn display(&self) {
        let code_line = format!("Code:  {}", format_code_grouped(self.code));

        println!("  ┌{}┐", "─".repeat(BOX_WIDTH));
        println!("  │{}│", " ".repeat(BOX_WIDTH));
        println!("  │{}│", center_in_box(&code_line, BOX_WIDTH));
        println!("  │{}│", " ".repeat(BOX_WIDTH));

        if let Some(expire) = self.expire {
            let expire_line = format!("Expires in {}", expire);
            println!("  │{}│", center_in_box(&expire_line, BOX_WIDTH));
            println!("  │{}│", " ".repeat(BOX_WIDTH));
        }

        println!("  └{}┘", "─".repeat(BOX_WIDTH));
    }
}

/// Split a code into groups of three digits for reading aloud.
fn format_code_grouped(code: &str) -> String {
    code.chars()
        .collect::<Vec<_>>()
        .chunks(3)
        .map(|group| group.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join(" ")
}

fn center_in_box(content: &str, width: usize) -> String {
    let content_len = content.chars().count();
    let padding = width.saturating_sub(content_len);
    let left = padding / 2;
    let right = padding - left;
    format!("{}{}{}", " ".repeat(left), content, " ".repeat(right))
}

/// Format remaining duration as "M:SS", or "H:MM:SS" past an hour.
pub fn format_remaining(remaining: Duration) -> String {
    let total_secs = remaining.as_secs();
    let hours = total_secs / 3600;
    let mins = (total_secs % 3600) / 60;
    let secs = total_secs % 60;
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, mins, secs)
    } else {
        format!("{}:{:02}", mins, secs)
    }
}

/// Short tag describing a file by MIME type.
pub fn file_icon(mime_type: &str) -> &'static str {
    if mime_type.starts_with("image/") {
        "[img]"
    } else if mime_type.starts_with("video/") {
        "[vid]"
    } else if mime_type.starts_with("audio/") {
        "[aud]"
    } else if mime_type.starts_with("text/") {
        "[txt]"
    } else {
        "[file]"
    }
}

/// Overwrite the current terminal line with transfer progress.
pub fn print_progress(name: &str, done: u64, total: u64) {
    #[allow(clippy::cast_precision_loss)]
    let pct = if total == 0 {
        100.0
    } else {
        done as f64 / total as f64 * 100.0
    };
    print!(
        "\r  [{:>6.2}%] {} - {} / {}    ",
        pct,
        name,
        format_size(done),
        format_size(total)
    );
    let _ = io::stdout().flush();
}
