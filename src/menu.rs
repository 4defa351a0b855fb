//! Rofi menu rendering and invocation (SPEC_FULL.md §6, §4.G's UI trigger).
//!
//! Grounded on `original_source/xClipBoardCapture.c`'s `ShowRofiMenu()` call site and
//! `CBC_Setup.h`'s `PATH_FILE_ROFI_MENU`/`PREVIEW_TXT_LEN` constants.

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

use crate::config::PREVIEW_LEN;
use crate::error::{Error, Result};
use crate::history::{HistoryItem, HistoryKind};

const CLEAR_ALL_LABEL: &str = "--- CLEAR ALL HISTORY ---";

fn icon_for(kind: HistoryKind) -> &'static str {
    match kind {
        HistoryKind::TextUtf8 => "edit-paste",
        HistoryKind::ImagePng | HistoryKind::ImageJpeg | HistoryKind::ImageBmp => "image-x-generic",
        HistoryKind::Unknown => "text-x-generic",
    }
}

/// Truncates to `PREVIEW_LEN` bytes, replacing control bytes with `?` and whitespace runs
/// with a single space, appending `[...]` when truncated.
pub fn sanitize_preview(raw: &[u8]) -> String {
    let mut out = String::with_capacity(PREVIEW_LEN + 8);
    let truncated = raw.len() > PREVIEW_LEN;
    for &byte in raw.iter().take(PREVIEW_LEN) {
        let ch = byte as char;
        if byte.is_ascii_control() {
            out.push('?');
        } else if ch.is_whitespace() {
            out.push(' ');
        } else if byte.is_ascii_graphic() {
            out.push(ch);
        } else {
            out.push('?');
        }
    }
    if truncated {
        out.push_str("[...]");
    }
    out
}

fn preview_label(item: &HistoryItem, db_dir: &Path) -> String {
    match item.kind {
        HistoryKind::TextUtf8 => {
            let bytes = std::fs::read(db_dir.join(&item.filename)).unwrap_or_default();
            sanitize_preview(&bytes)
        }
        _ => item.filename.clone(),
    }
}

fn format_line(index: usize, item: &HistoryItem, db_dir: &Path) -> String {
    format!("{}: {}\0icon\x1f{}\n", index, preview_label(item, db_dir), icon_for(item.kind))
}

/// Writes the menu file listing every item (newest first) plus a trailing clear-all sentinel.
pub fn render(menu_file: &Path, db_dir: &Path, items: &[HistoryItem]) -> Result<()> {
    let mut file = File::create(menu_file)?;
    for (index, item) in items.iter().enumerate() {
        file.write_all(format_line(index, item, db_dir).as_bytes())?;
    }
    writeln!(file, "{}: {}\0icon\x1fedit-clear", items.len(), CLEAR_ALL_LABEL)?;
    Ok(())
}

pub enum MenuChoice {
    Inject(usize),
    ClearAll,
    Cancelled,
}

/// Runs `rofi -dmenu -i -show-icons -p <prompt> < menu_file` and parses its stdout.
pub fn run(menu_file: &Path, prompt: &str, item_count: usize) -> Result<MenuChoice> {
    let input = File::open(menu_file)?;
    let output = Command::new("rofi")
        .args(["-dmenu", "-i", "-show-icons", "-p", prompt])
        .stdin(Stdio::from(input))
        .output()
        .map_err(Error::Io)?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let line = stdout.lines().next().unwrap_or("").trim();
    if line.is_empty() {
        return Ok(MenuChoice::Cancelled);
    }

    let index: usize = match line.split_once(':').and_then(|(idx, _)| idx.trim().parse().ok()) {
        Some(idx) => idx,
        None => return Ok(MenuChoice::Cancelled),
    };

    if index == item_count {
        Ok(MenuChoice::ClearAll)
    } else {
        Ok(MenuChoice::Inject(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_control_and_truncates() {
        let raw = format!("{}{}", "a".repeat(PREVIEW_LEN), "overflow");
        let out = sanitize_preview(raw.as_bytes());
        assert!(out.ends_with("[...]"));
        assert_eq!(out.len(), PREVIEW_LEN + "[...]".len());

        let with_control = sanitize_preview(b"hi\tthere\x01bye");
        assert_eq!(with_control, "hi there?bye");
    }

    #[test]
    fn render_writes_clear_all_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let db_dir = dir.path();
        let menu_file = dir.path().join("menu.txt");
        let items = vec![HistoryItem { filename: "a.txt".into(), timestamp: 1, kind: HistoryKind::TextUtf8 }];
        std::fs::write(db_dir.join("a.txt"), b"hello").unwrap();
        render(&menu_file, db_dir, &items).unwrap();
        let contents = std::fs::read_to_string(&menu_file).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("1: --- CLEAR ALL HISTORY ---"));
    }
}
